//! Logging setup
//!
//! The subscriber is built once at process start and installed as the default
//! dispatcher for the calling thread. The returned [`TelemetryGuard`] owns that
//! installation: dropping it at process exit flushes and detaches the logger.
//! Components never reach for a global logger; they emit `tracing` events and
//! the scoped dispatcher routes them.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The log file could not be opened for appending
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        /// Path that was being opened
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

/// Configuration for telemetry initialization
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name recorded on the startup event
    pub service_name: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
    /// Also append plain-text logs to this file
    pub log_file: Option<PathBuf>,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "stronghold".to_string(),
            json: false,
            log_file: None,
            default_filter: "info".to_string(),
        }
    }
}

/// Keeps the process logger installed until dropped
#[must_use = "dropping the guard uninstalls the logger"]
pub struct TelemetryGuard {
    _default: DefaultGuard,
}

impl std::fmt::Debug for TelemetryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryGuard").finish_non_exhaustive()
    }
}

/// Build the logger and install it for the current thread
///
/// The stronghold binaries run on a current-thread runtime, so every task
/// they spawn observes this dispatcher.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    // Option<Layer> implements Layer, so exactly one of these is active
    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
    });
    let text_layer = (!config.json).then(|| tracing_subscriber::fmt::layer().with_target(false));

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| TelemetryError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer);

    let guard = tracing::subscriber::set_default(subscriber);
    tracing::debug!(service = %config.service_name, "telemetry initialized");

    Ok(TelemetryGuard { _default: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_receives_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("securityservice.log");
        let config = TelemetryConfig {
            log_file: Some(path.clone()),
            ..Default::default()
        };

        {
            let _guard = init_telemetry(&config).unwrap();
            tracing::info!(phase = "init", "vault initialization complete");
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("vault initialization complete"));
        assert!(contents.contains("phase"));
    }

    #[test]
    fn unwritable_log_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = TelemetryConfig {
            log_file: Some(dir.path().join("missing").join("out.log")),
            ..Default::default()
        };

        let err = init_telemetry(&config).unwrap_err();
        assert!(err.to_string().contains("failed to open log file"));
    }
}
