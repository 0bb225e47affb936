//! Error types for secret-store bootstrap

use std::path::{Path, PathBuf};

use stronghold_common::FsError;
use thiserror::Error;

/// Bootstrap errors
///
/// Only [`Error::Transport`] and [`Error::Rejected`] may be absorbed, and
/// only by the health polling loop; every other variant ends the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid configuration, detected before contacting the store
    #[error("configuration error: {0}")]
    Config(String),

    /// The request never produced an HTTP response (timeout, refused, TLS)
    #[error("{operation}: request failed: {source}")]
    Transport {
        /// What was being attempted
        operation: String,
        /// Underlying client error
        source: reqwest::Error,
    },

    /// The store answered with a status the operation does not accept
    #[error("{operation}: store rejected request with status {status}: {body}")]
    Rejected {
        /// What was being attempted
        operation: String,
        /// HTTP status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// The store cannot be brought to an operational state by this process
    #[error("irrecoverable state: {0}")]
    Irrecoverable(String),

    /// A store response or persisted document is not valid JSON of the
    /// expected shape
    #[error("{context}: invalid JSON: {source}")]
    Decode {
        /// What was being decoded
        context: String,
        /// Underlying parse error
        source: serde_json::Error,
    },

    /// Reading a local file or directory failed
    #[error("filesystem error on {path}: {source}")]
    FileSystem {
        /// Path being accessed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Persisting a secret-store response failed
    #[error(transparent)]
    Write(#[from] FsError),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an irrecoverable-state error with the given message
    pub fn irrecoverable(msg: impl Into<String>) -> Self {
        Self::Irrecoverable(msg.into())
    }

    /// Wrap a client error for `operation`
    pub fn transport(operation: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            operation: operation.into(),
            source,
        }
    }

    /// Reject a response with an unexpected status
    pub fn rejected(operation: impl Into<String>, status: u16, body: &[u8]) -> Self {
        Self::Rejected {
            operation: operation.into(),
            status,
            body: String::from_utf8_lossy(body).trim().to_string(),
        }
    }

    /// Wrap a JSON error with what was being decoded
    pub fn decode(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            context: context.into(),
            source,
        }
    }

    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether a later polling cycle may succeed where this attempt failed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Rejected { .. })
    }

    /// HTTP status of a rejection
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for bootstrap operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_recoverable_only_for_the_poller() {
        let err = Error::rejected("unseal", 500, b"{\"errors\":[\"busy\"]}\n");
        assert!(err.is_recoverable());
        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains("status 500"));
        assert!(err.to_string().ends_with("{\"errors\":[\"busy\"]}"));
    }

    #[test]
    fn local_failures_are_fatal() {
        let missing = Error::io(
            Path::new("/vault/file/resp-init.json"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(!missing.is_recoverable());
        assert!(missing.to_string().contains("resp-init.json"));

        assert!(!Error::irrecoverable("shares exhausted").is_recoverable());
        assert!(!Error::config("threshold exceeds shares").is_recoverable());
        assert_eq!(Error::config("x").status(), None);
    }
}
