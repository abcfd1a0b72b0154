//! Structured logging setup.
//!
//! Installs a `tracing-subscriber` fmt subscriber from [`LoggingConfig`]. The
//! configured level is the default filter; `RUST_LOG` overrides it when set.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

fn filter_for(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_lowercase()))
}

/// Install the global subscriber
///
/// File output takes precedence over the console when both are enabled.
///
/// # Errors
/// `ConfigError` if the log file cannot be opened or a global subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_for(config))
        .with_target(true);

    let installed = if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| {
            ProtocolError::ConfigError("log_file_path must be set to log to a file".into())
        })?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open log file: {e}")))?;
        let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
        if config.json_format {
            builder.json().try_init()
        } else {
            builder.try_init()
        }
    } else if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| ProtocolError::ConfigError(format!("Failed to install logger: {e}")))?;
    tracing::info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    Ok(())
}
