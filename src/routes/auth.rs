/**
 * Authentication Routes
 * JWT-based authentication: register, login, me, refresh, logout, plus the
 * email-verification and password-reset flows.
 */
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Duration, Utc};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::authz::{self, create_access_token};
use crate::db::models::{
    User, TOKEN_PURPOSE_PASSWORD_RESET, TOKEN_PURPOSE_VERIFY_EMAIL,
};
use crate::error::ApiError;
use crate::identity::{self, DEFAULT_ROLE};
use crate::routes::MessageResponse;
use crate::state::AppState;

// ============================================================================
// Configuration
// ============================================================================

lazy_static::lazy_static! {
    /// Rate limit storage (IP -> last request timestamp)
    static ref RATE_LIMIT: Arc<RwLock<HashMap<String, i64>>> =
        Arc::new(RwLock::new(HashMap::new()));
}

/// Refresh token expiry in days
const REFRESH_TOKEN_EXPIRY_DAYS: i64 = 7;

/// Email verification token expiry in hours
const VERIFY_TOKEN_EXPIRY_HOURS: i64 = 24;

/// Password reset token expiry in hours
const RESET_TOKEN_EXPIRY_HOURS: i64 = 1;

/// Rate limit window in seconds (1 request per IP per 60 seconds)
#[allow(dead_code)]
const RATE_LIMIT_WINDOW_SECS: i64 = 60;

// ============================================================================
// Request/Response Types
// ============================================================================

/// User info returned to the frontend
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_verified: bool,
    pub roles: Vec<String>,
}

impl UserInfo {
    fn from_user(user: &User, roles: Vec<String>) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_verified: user.is_verified,
            roles,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    pub user: UserInfo,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub success: bool,
    pub user: UserInfo,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Generate a random opaque token (refresh / verification / reset)
fn generate_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 64)
}

/// Hash a token for storage using SHA-256. Only the hash ever touches the
/// database, so a leaked table cannot be replayed.
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// bcrypt is intentionally CPU-intensive; run it outside the async executor
/// so it doesn't block other in-flight tasks.
async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash(&password, DEFAULT_COST))
        .await
        .map_err(|e| {
            tracing::error!("spawn_blocking panic during hash: {}", e);
            ApiError::Internal
        })?
        .map_err(|e| {
            tracing::error!("Failed to hash password: {}", e);
            ApiError::Internal
        })
}

async fn verify_password(password: String, password_hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify(&password, &password_hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

fn validate_credentials(email: &str, password: &str) -> Result<(), ApiError> {
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::Validation(
            "Email and password are required".into(),
        ));
    }
    if !email.contains('@') {
        return Err(ApiError::Validation("Invalid email format".into()));
    }
    Ok(())
}

/// Check rate limit for an IP.
///
/// Stale entries are evicted on every write so the map stays proportional to
/// the number of active IPs.
async fn check_rate_limit(ip: &str) -> bool {
    #[cfg(test)]
    {
        let _ = ip;
        return true; // Bypass in tests so validation and credentials are exercised
    }

    #[cfg(not(test))]
    {
        let now = Utc::now().timestamp();
        let mut limits = RATE_LIMIT.write().await;

        limits.retain(|_, last| now - *last < RATE_LIMIT_WINDOW_SECS);

        if let Some(last_request) = limits.get(ip) {
            if now - last_request < RATE_LIMIT_WINDOW_SECS {
                return false;
            }
        }

        limits.insert(ip.to_string(), now);
        true
    }
}

/// Issue an access token and persist a fresh refresh token.
async fn issue_tokens(
    pool: &PgPool,
    user: &User,
    roles: &[String],
) -> Result<(String, String), ApiError> {
    let access_token = create_access_token(user.id, &user.email, roles).map_err(|e| {
        tracing::error!("Failed to create access token: {}", e);
        ApiError::Internal
    })?;

    let refresh_token = generate_token();
    let expires_at = Utc::now() + Duration::days(REFRESH_TOKEN_EXPIRY_DAYS);

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(user.id)
    .bind(hash_token(&refresh_token))
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok((access_token, refresh_token))
}

/// Store a one-time token for email verification or password reset and
/// return the plaintext to embed in the email link.
async fn create_one_time_token(
    pool: &PgPool,
    user_id: Uuid,
    purpose: &str,
    ttl_hours: i64,
) -> Result<String, ApiError> {
    let token = generate_token();
    let expires_at = Utc::now() + Duration::hours(ttl_hours);

    sqlx::query(
        r#"
        INSERT INTO one_time_tokens (user_id, token_hash, purpose, expires_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(user_id)
    .bind(hash_token(&token))
    .bind(purpose)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(token)
}

/// Consume a one-time token, returning its owner. Expired, already-consumed
/// or unknown tokens all fail identically.
async fn consume_one_time_token(
    pool: &PgPool,
    token: &str,
    purpose: &str,
) -> Result<Uuid, ApiError> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        UPDATE one_time_tokens
        SET consumed = true
        WHERE token_hash = $1 AND purpose = $2 AND consumed = false
              AND expires_at > now()
        RETURNING user_id
        "#,
    )
    .bind(hash_token(token))
    .bind(purpose)
    .fetch_optional(pool)
    .await?;

    row.map(|(user_id,)| user_id)
        .ok_or(ApiError::Unauthorized("Invalid or expired token"))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = addr.ip().to_string();
    if !check_rate_limit(&ip).await {
        return Err(ApiError::Validation(
            "Too many requests. Please try again later.".into(),
        ));
    }

    let email = identity::normalize_email(&payload.email);
    validate_credentials(&email, &payload.password)?;
    if payload.password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters long".into(),
        ));
    }

    let pool = state.pool()?;
    let password_hash = hash_password(payload.password).await?;

    let user = identity::create_user(
        pool,
        &email,
        &password_hash,
        payload.first_name.as_deref(),
        payload.last_name.as_deref(),
    )
    .await?;

    // Every self-registered account starts with the default role. A missing
    // role row means provisioning hasn't run; the account is still usable.
    if let Err(e) = identity::assign_role_by_name(pool, user.id, DEFAULT_ROLE).await {
        tracing::warn!("Could not assign default role to {}: {}", user.email, e);
    }

    let verify_token =
        create_one_time_token(pool, user.id, TOKEN_PURPOSE_VERIFY_EMAIL, VERIFY_TOKEN_EXPIRY_HOURS)
            .await?;
    state
        .mailer
        .send_verification_email(&user.email, user.first_name.as_deref(), &verify_token);

    let roles = identity::user_role_names(pool, user.id).await?;
    let (access_token, refresh_token) = issue_tokens(pool, &user, &roles).await?;

    tracing::info!("User registered: {}", user.email);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            user: UserInfo::from_user(&user, roles),
            access_token,
            refresh_token,
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = addr.ip().to_string();
    if !check_rate_limit(&ip).await {
        return Err(ApiError::Validation(
            "Too many requests. Please try again later.".into(),
        ));
    }

    let email = identity::normalize_email(&payload.email);
    validate_credentials(&email, &payload.password)?;

    let pool = state.pool()?;

    let user = match identity::find_user_by_email(pool, &email).await? {
        Some(user) => user,
        None => {
            tracing::warn!("Login attempt for unknown user: {}", email);
            return Err(ApiError::Unauthorized("Invalid credentials"));
        }
    };

    if !verify_password(payload.password, user.password_hash.clone()).await {
        tracing::warn!("Failed login attempt for: {}", user.email);
        return Err(ApiError::Unauthorized("Invalid credentials"));
    }

    let roles = identity::user_role_names(pool, user.id).await?;
    let (access_token, refresh_token) = issue_tokens(pool, &user, &roles).await?;

    tracing::info!("Successful login for user: {}", user.email);

    Ok(Json(AuthResponse {
        success: true,
        user: UserInfo::from_user(&user, roles),
        access_token,
        refresh_token,
    }))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let claims = authz::authenticate(&headers)?;
    let pool = state.pool()?;

    let user = identity::find_user(pool, claims.user_id()?)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    let roles = identity::user_role_names(pool, user.id).await?;

    Ok(Json(MeResponse {
        success: true,
        user: UserInfo::from_user(&user, roles),
    }))
}

/// POST /api/auth/refresh
/// Rotate the refresh token and mint a new access token.
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.refresh_token.is_empty() {
        return Err(ApiError::Validation("Refresh token is required".into()));
    }

    let pool = state.pool()?;
    let token_hash = hash_token(&payload.refresh_token);

    let row: Option<(Uuid, DateTime<Utc>, bool)> = sqlx::query_as(
        r#"
        SELECT user_id, expires_at, revoked
        FROM refresh_tokens
        WHERE token_hash = $1
        "#,
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?;

    let user_id = match row {
        Some((user_id, expires_at, false)) if expires_at > Utc::now() => user_id,
        _ => return Err(ApiError::Unauthorized("Invalid or expired refresh token")),
    };

    let user = identity::find_user(pool, user_id)
        .await?
        .ok_or(ApiError::Unauthorized("Invalid or expired refresh token"))?;
    let roles = identity::user_role_names(pool, user.id).await?;

    // Rotation: the old token dies the moment the new one is born.
    sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE token_hash = $1")
        .bind(&token_hash)
        .execute(pool)
        .await?;

    let (access_token, refresh_token) = issue_tokens(pool, &user, &roles).await?;

    Ok(Json(RefreshResponse {
        success: true,
        access_token,
        refresh_token,
    }))
}

/// POST /api/auth/logout
/// Revoke refresh token(s). Always succeeds; logout is idempotent.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LogoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Ok(pool) = state.pool() else {
        // Nothing to revoke without a store; the client drops its tokens.
        return Ok(Json(MessageResponse::new("Logged out")));
    };

    if let Some(refresh_token) = payload.refresh_token {
        sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE token_hash = $1")
            .bind(hash_token(&refresh_token))
            .execute(pool)
            .await?;
    }

    // A valid access token revokes every session for that user.
    if let Some(token) = authz::extract_bearer_token(&headers) {
        if let Ok(claims) = authz::verify_access_token(&token) {
            sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE user_id = $1")
                .bind(claims.user_id()?)
                .execute(pool)
                .await?;
        }
    }

    Ok(Json(MessageResponse::new("Logged out")))
}

/// POST /api/auth/verify-email
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.token.is_empty() {
        return Err(ApiError::Validation("Token is required".into()));
    }

    let pool = state.pool()?;
    let user_id =
        consume_one_time_token(pool, &payload.token, TOKEN_PURPOSE_VERIFY_EMAIL).await?;

    sqlx::query("UPDATE users SET is_verified = true, updated_at = now() WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    tracing::info!(user = %user_id, "email verified");

    Ok(Json(MessageResponse::new("Email verified successfully")))
}

/// POST /api/auth/resend-verification
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = identity::normalize_email(&payload.email);
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Validation("Invalid email format".into()));
    }

    let pool = state.pool()?;

    if let Some(user) = identity::find_user_by_email(pool, &email).await? {
        if !user.is_verified {
            let token = create_one_time_token(
                pool,
                user.id,
                TOKEN_PURPOSE_VERIFY_EMAIL,
                VERIFY_TOKEN_EXPIRY_HOURS,
            )
            .await?;
            state
                .mailer
                .send_verification_email(&user.email, user.first_name.as_deref(), &token);
        }
    }

    // Same answer whether or not the account exists.
    Ok(Json(MessageResponse::new(
        "If an account exists for this address, a verification email has been sent",
    )))
}

/// POST /api/auth/forgot-password
/// Always answers 200; the response never reveals whether the account exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = identity::normalize_email(&payload.email);
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Validation("Invalid email format".into()));
    }

    let pool = state.pool()?;

    if let Some(user) = identity::find_user_by_email(pool, &email).await? {
        let token = create_one_time_token(
            pool,
            user.id,
            TOKEN_PURPOSE_PASSWORD_RESET,
            RESET_TOKEN_EXPIRY_HOURS,
        )
        .await?;
        state
            .mailer
            .send_password_reset_email(&user.email, user.first_name.as_deref(), &token);
    }

    Ok(Json(MessageResponse::new(
        "If an account exists for this address, a password reset email has been sent",
    )))
}

/// POST /api/auth/reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.token.is_empty() {
        return Err(ApiError::Validation("Token is required".into()));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters long".into(),
        ));
    }

    let pool = state.pool()?;
    let user_id =
        consume_one_time_token(pool, &payload.token, TOKEN_PURPOSE_PASSWORD_RESET).await?;

    let password_hash = hash_password(payload.password).await?;

    sqlx::query("UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2")
        .bind(&password_hash)
        .bind(user_id)
        .execute(pool)
        .await?;

    // Every open session dies with the old password.
    sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    tracing::info!(user = %user_id, "password reset completed");

    Ok(Json(MessageResponse::new("Password reset successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    fn auth_router() -> Router {
        use axum::extract::connect_info::MockConnectInfo;
        Router::new()
            .route("/api/auth/register", post(register))
            .route("/api/auth/login", post(login))
            .route("/api/auth/me", get(me))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/auth/logout", post(logout))
            .route("/api/auth/verify-email", post(verify_email))
            .route("/api/auth/forgot-password", post(forgot_password))
            .route("/api/auth/reset-password", post(reset_password))
            .with_state(AppState::detached())
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 12345))))
    }

    async fn post_json(
        app: Router,
        uri: &str,
        json: &impl serde::Serialize,
    ) -> (StatusCode, axum::body::Bytes) {
        let body = Body::from(serde_json::to_vec(json).unwrap());
        let req = Request::post(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    #[test]
    fn test_hash_token_is_stable_hex() {
        let a = hash_token("some-token");
        let b = hash_token("some-token");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_token_is_long_and_random() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_login_empty_email_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(),
            "/api/auth/login",
            &LoginRequest {
                email: "".to_string(),
                password: "admin123!".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_invalid_email_format_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(),
            "/api/auth/login",
            &LoginRequest {
                email: "no-at-sign".to_string(),
                password: "admin123!".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_without_store_returns_service_unavailable() {
        let (status, _) = post_json(
            auth_router(),
            "/api/auth/login",
            &LoginRequest {
                email: "admin@rippleworks.com".to_string(),
                password: "admin123!".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_register_short_password_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(),
            "/api/auth/register",
            &RegisterRequest {
                email: "new@example.com".to_string(),
                password: "short".to_string(),
                first_name: None,
                last_name: None,
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_refresh_empty_token_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(),
            "/api/auth/refresh",
            &RefreshRequest {
                refresh_token: "".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_me_without_token_returns_unauthorized() {
        let res = auth_router()
            .oneshot(Request::get("/api/auth/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_without_store_is_still_success() {
        let (status, bytes) = post_json(
            auth_router(),
            "/api/auth/logout",
            &LogoutRequest {
                refresh_token: None,
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body: MessageResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(body.success);
    }

    #[tokio::test]
    async fn test_verify_email_empty_token_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(),
            "/api/auth/verify-email",
            &TokenRequest {
                token: "".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_forgot_password_invalid_email_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(),
            "/api/auth/forgot-password",
            &EmailRequest {
                email: "not-an-email".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reset_password_short_password_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(),
            "/api/auth/reset-password",
            &ResetPasswordRequest {
                token: "sometoken".to_string(),
                password: "short".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
