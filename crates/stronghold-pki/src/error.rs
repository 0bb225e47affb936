//! Error types for PKI operations

use std::path::{Path, PathBuf};

use stronghold_common::FsError;
use thiserror::Error;

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// Invalid or contradictory configuration, detected before any I/O
    #[error("configuration error: {0}")]
    Config(String),

    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Certificate generation failed
    #[error("certificate generation failed: {0}")]
    CertificateGenerationFailed(String),

    /// Certificate or key parsing error
    #[error("certificate parsing error: {0}")]
    ParseError(String),

    /// Reading or preparing PKI files and directories failed
    #[error("filesystem error on {path}: {source}")]
    FileSystem {
        /// Path being accessed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Writing key material failed
    #[error(transparent)]
    Write(#[from] FsError),
}

impl PkiError {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_carry_the_offending_value() {
        let err = PkiError::config("unknown elliptic curve: \"192\"");
        assert!(err.to_string().starts_with("configuration error"));
        assert!(err.to_string().contains("192"));
    }

    #[test]
    fn filesystem_errors_name_the_path() {
        let err = PkiError::io(
            Path::new("/pki/EdgeXFoundryCA/EdgeXFoundryCA.pem"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert!(err.to_string().contains("EdgeXFoundryCA.pem"));
        assert!(err.to_string().contains("no such file"));
    }
}
