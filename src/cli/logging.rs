//! Tracing subscriber setup for the binary

use super::config::LoggingConfig;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Build the level filter; `RUST_LOG` wins over the configured level
fn filter(level: &str) -> Result<EnvFilter, Box<dyn std::error::Error>> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| format!("Invalid log level '{}': {}", level, e).into())
}

/// Install the global subscriber
///
/// Logs go to `file` (appended) when given, otherwise to stderr. A second
/// call in the same process keeps the first subscriber.
pub fn init(
    config: &LoggingConfig,
    file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = filter(&config.level)?;

    let installed = match file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create log directory: {}", e))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file '{}': {}", path.display(), e))?;

            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(filter)
                .try_init()
        }
        None => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .try_init(),
    };

    if installed.is_err() {
        debug!("tracing subscriber already installed");
    }

    Ok(())
}
