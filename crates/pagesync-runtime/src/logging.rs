//! Global tracing subscriber setup (feature `logging`).

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::config::LoggingConfig;
use crate::error::ConfigError;

/// Install a global subscriber. `RUST_LOG` overrides `config.filter`.
///
/// Fails if the filter is invalid or a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|err| ConfigError::Logging(err.to_string()))?,
    };
    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    result.map_err(|err| ConfigError::Logging(err.to_string()))?;
    tracing::info!(filter = %config.filter, json = config.json, "logging initialized");
    Ok(())
}
