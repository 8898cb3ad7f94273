//! Application error type shared by every route handler.
//!
//! Bridges store-layer errors (`sqlx::Error`) and the API layer so handlers
//! can use `?` instead of hand-rolling a status/JSON pair at every call site.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::routes::ErrorResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Unique-constraint violation (email, slug, join pair).
    #[error("{0}")]
    Duplicate(String),

    /// Rejected before any store access.
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid credentials/token.
    #[error("{0}")]
    Unauthorized(&'static str),

    /// Authenticated but lacks the required role/permission.
    #[error("{0}")]
    Forbidden(&'static str),

    /// The relational store is unreachable or not configured.
    #[error("Database not available")]
    StoreUnavailable,

    /// Anything else. Details are logged, never sent to the client.
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            // Duplicate keys are a caller problem (pick a different
            // title/email), same as validation failures.
            ApiError::Duplicate(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        if is_unique_violation(&e) {
            return ApiError::Duplicate("Resource already exists".to_string());
        }
        tracing::error!("Database error: {}", e);
        ApiError::Internal
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            success: false,
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

/// True when the store rejected a write on a unique constraint. Handlers use
/// this to attach an entity-specific message before the generic `From` kicks in.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::NotFound("post").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Duplicate("dup".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized("no token").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("missing permission").status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::StoreUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_not_found_message_names_entity() {
        assert_eq!(ApiError::NotFound("Blog post").to_string(), "Blog post not found");
    }
}
