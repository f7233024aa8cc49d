//! Tracing subscriber setup

use agent_relay_coordinator::config::LoggingConfig;
use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` wins over the configured level
pub fn env_filter(level: &str) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level '{}'", level)),
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for the run summary.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = env_filter(&config.level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    installed.context("Failed to initialize logging")
}
