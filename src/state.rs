//! Shared application state, injected into handlers via axum `State`.
//!
//! The pool is an explicitly constructed handle passed to each component at
//! construction time rather than a process-wide singleton, so tests can build
//! an `AppState` without a database and exercise everything up to the store
//! boundary.

use std::sync::Arc;

use sqlx::PgPool;

use crate::email::Mailer;
use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    /// `None` when DATABASE_URL is unset or the pool failed to come up; every
    /// store-dependent operation then answers 503 instead of panicking.
    pub db: Option<Arc<PgPool>>,
    pub mailer: Mailer,
}

impl AppState {
    pub fn new(db: Option<Arc<PgPool>>, mailer: Mailer) -> Self {
        Self { db, mailer }
    }

    /// State with no database, used by tests that only exercise validation
    /// and authorization short-circuits.
    #[cfg(test)]
    pub fn detached() -> Self {
        Self {
            db: None,
            mailer: Mailer::from_env(),
        }
    }

    pub fn pool(&self) -> Result<&PgPool, ApiError> {
        self.db.as_deref().ok_or(ApiError::StoreUnavailable)
    }
}
