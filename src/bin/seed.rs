//! Seed binary - provisions roles, permissions, the admin account and
//! sample content. Runs migrations first so it works on a fresh database.

use rippleworks_backend::db;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let pool = match db::init_pool(None).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = db::run_migrations(&pool).await {
        tracing::error!("Migrations failed: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = db::seed::run(&pool).await {
        tracing::error!("Seed failed: {}", e);
        std::process::exit(1);
    }
}
