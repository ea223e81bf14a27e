use anyhow::{Context, Result};
use cms_backend::config::Config;
use cms_backend::db::Database;
use cms_backend::server::{router, AppState};
use std::net::SocketAddr;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cms_backend=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;
    let db = Database::connect(&config.database_url).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    if config.debug {
        info!("Debug mode enabled, error responses are descriptive");
    }

    let app = router(AppState::new(config, db));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
