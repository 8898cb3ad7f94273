//! RippleWorks Backend - library for app logic and testing

pub mod authz;
pub mod content;
pub mod db;
pub mod email;
pub mod error;
pub mod identity;
pub mod logging;
pub mod routes;
pub mod state;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

use state::AppState;

/// Configure CORS from environment variables.
/// Uses ALLOWED_ORIGINS (comma-separated) or FRONTEND_URL.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .and_then(|s| {
            let origins: Vec<HeaderValue> = s
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                None
            } else {
                Some(origins)
            }
        })
        .or_else(|| {
            std::env::var("FRONTEND_URL")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(|| {
            vec![
                "http://localhost:5173".parse().unwrap(),
                "http://127.0.0.1:5173".parse().unwrap(),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

/// Create and configure the application router.
///
/// Admin routers sit behind permission gates as whole sub-trees, so a
/// handler can never be reached without passing its gate first.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors();
    tracing::info!("CORS configured");

    // manage_posts covers the blog CRUD and the comment moderation queue.
    let admin_content = Router::new()
        .route(
            "/api/admin/blog",
            get(routes::admin_blog::list_posts).post(routes::admin_blog::create_post),
        )
        .route(
            "/api/admin/blog/{id}",
            put(routes::admin_blog::update_post).delete(routes::admin_blog::delete_post),
        )
        .route(
            "/api/admin/comments",
            get(routes::admin_comments::list_comments),
        )
        .route(
            "/api/admin/comments/{id}",
            put(routes::admin_comments::moderate_comment),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            authz::require_manage_posts,
        ));

    let admin_resources = Router::new()
        .route(
            "/api/admin/case-studies",
            get(routes::admin_case_studies::list_case_studies)
                .post(routes::admin_case_studies::create_case_study),
        )
        .route(
            "/api/admin/case-studies/{id}",
            put(routes::admin_case_studies::update_case_study)
                .delete(routes::admin_case_studies::delete_case_study),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            authz::require_manage_resources,
        ));

    Router::new()
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/me", get(routes::auth::me))
        .route("/api/auth/refresh", post(routes::auth::refresh))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/verify-email", post(routes::auth::verify_email))
        .route(
            "/api/auth/resend-verification",
            post(routes::auth::resend_verification),
        )
        .route(
            "/api/auth/forgot-password",
            post(routes::auth::forgot_password),
        )
        .route(
            "/api/auth/reset-password",
            post(routes::auth::reset_password),
        )
        .route("/api/blog", get(routes::blog::list_posts))
        .route("/api/blog/{slug}", get(routes::blog::get_post))
        .route(
            "/api/blog/{slug}/comments",
            post(routes::blog::create_comment),
        )
        .route(
            "/api/case-studies",
            get(routes::case_studies::list_case_studies),
        )
        .route(
            "/api/case-studies/{slug}",
            get(routes::case_studies::get_case_study),
        )
        .merge(admin_content)
        .merge(admin_resources)
        .route("/health", get(routes::health::health_ping))
        .route("/health/detailed", get(routes::health::health_detailed))
        .route("/health/database", get(routes::health::health_database))
        .route("/health/ready", get(routes::health::health_ready))
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        // Compress responses with gzip automatically
        .layer(CompressionLayer::new())
        // Global 2 MB request body cap
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024))
        .layer(cors)
        .with_state(state)
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    // Guards MUST be held for the programme's lifetime; dropping them early
    // shuts down background log-writer threads and loses buffered log lines.
    let _log_guards = logging::init();

    routes::health::init_start_time();

    // Refuse to start in production with the insecure default JWT secret.
    let environment = std::env::var("ENVIRONMENT").unwrap_or_default();
    if environment == "production" {
        let secret = std::env::var("JWT_SECRET").unwrap_or_default();
        if secret.is_empty() || secret == "default-jwt-secret-change-in-production" {
            panic!(
                "FATAL: JWT_SECRET must be set to a secure, unique value in production. \
                 Refusing to start with the default secret."
            );
        }
    }

    let db = if std::env::var("DATABASE_URL").is_ok() {
        match db::init_pool(None).await {
            Ok(pool) => {
                if let Err(e) = db::run_migrations(&pool).await {
                    tracing::error!("Failed to run database migrations: {}", e);
                }
                Some(Arc::new(pool))
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize database pool: {}. Continuing degraded; \
                     content routes will answer 503.",
                    e
                );
                None
            }
        }
    } else {
        tracing::info!("DATABASE_URL not set. Running without database connection.");
        None
    };

    let state = AppState::new(db, email::Mailer::from_env());
    let app = create_app(state);

    // Bind address is configurable via HOST / PORT env vars, defaulting to
    // 127.0.0.1:3001 so existing dev setups keep working unchanged.
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3001);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid HOST/PORT configuration");
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        create_app(AppState::detached())
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9999))))
    }

    #[tokio::test]
    async fn test_health_route_is_wired() {
        let res = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_blog_is_gated() {
        let res = app()
            .oneshot(Request::get("/api/admin/blog").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_case_studies_are_gated() {
        let res = app()
            .oneshot(
                Request::get("/api/admin/case-studies")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let res = app()
            .oneshot(Request::get("/api/newsletter").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
