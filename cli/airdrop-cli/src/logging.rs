//! Logging configuration

use merkle_airdrop::config::LoggingSettings;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging; `RUST_LOG` overrides the configured level.
///
/// Logs go to stderr so command output on stdout stays clean.
pub fn init(settings: &LoggingSettings) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if settings.json {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;
    }

    Ok(())
}
