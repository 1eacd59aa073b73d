use anyhow::Context;
use garo_meter_bridge::{ConfigError, Integration, LogPlatform, MeterConfig};
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Garo meter bridge");

    let config_path = std::env::var("GARO_CONFIG").unwrap_or_else(|_| "garo_meter.json".into());
    let config = load_or_create_config(Path::new(&config_path))?;

    let integration = Integration::setup(config, LogPlatform)
        .await
        .context("failed to set up meter")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutting down");

    integration.unload().await?;
    Ok(())
}

/// Uses the stored record if there is one, otherwise builds it from the
/// environment and stores it for the next start.
fn load_or_create_config(path: &Path) -> anyhow::Result<MeterConfig> {
    match MeterConfig::load(path) {
        Ok(config) => {
            info!(path = %path.display(), "loaded stored config");
            Ok(config)
        }
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            let config = MeterConfig::from_env().context("no stored config and none in environment")?;
            config
                .save(path)
                .with_context(|| format!("failed to store config at {}", path.display()))?;
            info!(path = %path.display(), "stored config from environment");
            Ok(config)
        }
        Err(e) => Err(e).with_context(|| format!("failed to load config from {}", path.display())),
    }
}
