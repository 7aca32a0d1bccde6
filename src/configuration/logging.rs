use std::fs::OpenOptions;

use env_logger::{Builder, Target};

use super::config::Config;
use crate::error_handling::types::ConfigError;

/// Logger for `config`: the configured level unless `RUST_LOG` says
/// otherwise, written to `log_path` when set.
pub fn logger_builder(config: &Config) -> Result<Builder, ConfigError> {
    let mut builder = Builder::new();
    builder
        .filter_level(config.log_level.into())
        .parse_default_env()
        .format_target(false);

    if let Some(path) = &config.log_path {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ConfigError::LoggingFailed(format!("{}: {}", path.display(), e)))?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    Ok(builder)
}

/// Installs the global logger. Fails if one is already installed.
pub fn init_logging(config: &Config) -> Result<(), ConfigError> {
    logger_builder(config)?
        .try_init()
        .map_err(|e| ConfigError::LoggingFailed(e.to_string()))
}
