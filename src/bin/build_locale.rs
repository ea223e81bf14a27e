use anyhow::{Context, Result};
use cms_backend::config::Config;
use cms_backend::db::Database;
use cms_backend::locale::{Application, CacheLayout, LocaleCacheBuilder, LocaleService};
use tracing::info;

/// Usage: `build-locale [backend|frontend]` (both when omitted)
#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("build_locale=info".parse()?)
                .add_directive("cms_backend=info".parse()?),
        )
        .init();

    let applications = match std::env::args().nth(1) {
        Some(arg) => vec![arg
            .parse::<Application>()
            .map_err(anyhow::Error::msg)
            .context("Expected `backend` or `frontend`")?],
        None => vec![Application::Backend, Application::Frontend],
    };

    let config = Config::from_env()?;
    let db = Database::connect(&config.database_url).await?;
    let builder = LocaleCacheBuilder::new(db.clone(), CacheLayout::new(config.cache_root()));

    for application in applications {
        let service = LocaleService::new(
            db.clone(),
            builder.clone(),
            application,
            config.site_default_language.clone(),
        );
        let paths = service
            .rebuild_all()
            .await
            .context(format!("Failed to rebuild {} locale", application))?;

        for path in &paths {
            info!("✓ {}", path.display());
        }
        info!("Rebuilt {} {} locale file(s)", paths.len(), application);
    }

    Ok(())
}
