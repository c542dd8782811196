//! Petcare Bot - Entry Point

use petcare_bot::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Petcare Bot v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    petcare_bot::run(config).await
}
