//! Authorization engine: JWT claims, role/permission checks, and the
//! middleware gate in front of the admin content routers.
//!
//! Every mutating content operation sits behind `require_manage_posts` or
//! `require_manage_resources`; handlers never do their own ad hoc checks.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::identity::{self, ADMIN_ROLE};
use crate::state::AppState;

lazy_static::lazy_static! {
    /// JWT secret key from environment
    pub static ref JWT_SECRET: String = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| "default-jwt-secret-change-in-production".to_string());
}

/// Access token expiry in minutes
const ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 15;

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,        // User ID
    pub email: String,      // User email
    pub roles: Vec<String>, // Role names held at login time, canonical casing
    pub exp: i64,           // Expiry timestamp
    pub iat: i64,           // Issued at timestamp
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, ApiError> {
        Uuid::parse_str(&self.sub).map_err(|_| ApiError::Unauthorized("Invalid token subject"))
    }
}

/// Create access token
pub fn create_access_token(
    user_id: Uuid,
    email: &str,
    roles: &[String],
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::minutes(ACCESS_TOKEN_EXPIRY_MINUTES);

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        roles: roles.to_vec(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
}

/// Verify and decode access token
pub fn verify_access_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Resolve the caller from the Authorization header, or fail 401.
pub fn authenticate(headers: &HeaderMap) -> Result<Claims, ApiError> {
    let token =
        extract_bearer_token(headers).ok_or(ApiError::Unauthorized("Authorization required"))?;
    verify_access_token(&token).map_err(|e| {
        tracing::debug!("Token verification failed: {}", e);
        ApiError::Unauthorized("Invalid or expired token")
    })
}

/// True iff any held role has exactly this name, under canonical casing.
pub fn has_role(roles: &[String], role_name: &str) -> bool {
    let wanted = identity::normalize_role_name(role_name);
    roles.iter().any(|r| *r == wanted)
}

pub fn is_admin(roles: &[String]) -> bool {
    has_role(roles, ADMIN_ROLE)
}

/// True iff the user holds `permission_name` through any of their roles.
/// The admin role short-circuits: it is provisioned with every permission.
pub async fn authorize(
    state: &AppState,
    claims: &Claims,
    permission_name: &str,
) -> Result<bool, ApiError> {
    if is_admin(&claims.roles) {
        return Ok(true);
    }
    let pool = state.pool()?;
    identity::user_has_permission(pool, claims.user_id()?, permission_name).await
}

/// Gate for blog post and comment administration.
pub async fn require_manage_posts(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    gate(&state, req, next, "manage_posts").await
}

/// Gate for case study administration.
pub async fn require_manage_resources(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    gate(&state, req, next, "manage_resources").await
}

/// Authenticate, then authorize against one permission, then run the
/// handler with the verified claims attached to the request.
async fn gate(
    state: &AppState,
    mut req: Request,
    next: Next,
    permission: &'static str,
) -> Result<Response, ApiError> {
    let claims = authenticate(req.headers())?;

    if !authorize(state, &claims, permission).await? {
        tracing::warn!(
            user = %claims.email,
            permission,
            "admin access denied"
        );
        return Err(ApiError::Forbidden("Insufficient permissions"));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_access_token_invalid_returns_err() {
        let result = verify_access_token("invalid.jwt.token");
        assert!(result.is_err());
    }

    #[test]
    fn test_access_token_round_trip() {
        let user_id = Uuid::new_v4();
        let roles = vec!["admin".to_string(), "user".to_string()];
        let token = create_access_token(user_id, "admin@rippleworks.com", &roles).unwrap();
        let claims = verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, "admin@rippleworks.com");
        assert_eq!(claims.roles, roles);
        assert_eq!(claims.user_id().unwrap(), user_id);
    }

    #[test]
    fn test_has_role_normalizes_requested_casing() {
        let roles = vec!["admin".to_string()];
        assert!(has_role(&roles, "admin"));
        assert!(has_role(&roles, "ADMIN"));
        assert!(!has_role(&roles, "user"));
    }

    #[test]
    fn test_is_admin() {
        assert!(is_admin(&["admin".to_string()]));
        assert!(is_admin(&["user".to_string(), "admin".to_string()]));
        assert!(!is_admin(&["user".to_string(), "subscriber".to_string()]));
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc.def.ghi"));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Basic abc".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
