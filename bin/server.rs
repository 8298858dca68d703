// Spesometro - Web Server
// REST API + update stream over the shared board database

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("🌐 Spesometro server v{}", spesometro::VERSION);

    let config = spesometro::Config::load()?;
    spesometro::api::serve(config).await
}
