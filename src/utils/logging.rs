//! Logging initialization for the relay binary.
//!
//! Supports three formats:
//! - `pretty`: multi-line, coloured, human-readable
//! - `component`: `[timestamp] LEVEL span{fields}: target message {fields}`, compact
//!   and grep-friendly; every component logs inside its own span (`hub`,
//!   `generate`, `conversation{role=..}`, `decrypt`, ...)
//! - `json`: structured JSON lines for log aggregators
//!
//! Events always go to stderr (or the configured file) so that the
//! conversation transcript on stdout stays clean.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{RelayError, Result};

/// Build the level filter: `RUST_LOG` when set, otherwise `cfg.level`.
pub fn env_filter(cfg: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&cfg.level)
            .map_err(|e| RelayError::Config(format!("invalid log level '{}': {}", cfg.level, e))),
    }
}

/// Install the global tracing subscriber from config.
///
/// Call this once at startup, from the binary only. Library components never
/// install a subscriber; they emit into the span they were constructed with.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    let filter = env_filter(cfg)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match (&cfg.format, &cfg.file) {
        (format, Some(path)) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| RelayError::Config(format!("cannot open log file {}: {}", path, e)))?;
            let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
            match format {
                LogFormat::Json => builder.json().try_init(),
                LogFormat::Pretty => builder.pretty().try_init(),
                LogFormat::Component => builder.compact().try_init(),
            }
        }
        (LogFormat::Json, None) => builder.json().with_writer(std::io::stderr).try_init(),
        (LogFormat::Pretty, None) => builder.pretty().with_writer(std::io::stderr).try_init(),
        (LogFormat::Component, None) => {
            builder.compact().with_writer(std::io::stderr).try_init()
        }
    };

    installed.map_err(|e| RelayError::Config(format!("logging already initialised: {}", e)))
}
