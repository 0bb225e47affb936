//! Permission-aware file writes
//!
//! Key material and secret-store responses must land on disk with exact
//! permissions. Contents go to a temporary file next to the target, which is
//! given the final mode and then renamed over the target. Readers see either
//! the old file or the complete new one.

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Owner read-only, for private keys
pub const PRIVATE_KEY_MODE: u32 = 0o400;

/// Owner read/write, for persisted secret-store responses and tokens
pub const SECRET_FILE_MODE: u32 = 0o600;

/// World readable, for certificates
pub const PUBLIC_FILE_MODE: u32 = 0o644;

/// File write failure with the offending path
#[derive(Debug, Error)]
#[error("failed to write {path}: {source}")]
pub struct FsError {
    /// Path being written
    pub path: PathBuf,
    /// Underlying I/O error
    pub source: std::io::Error,
}

/// Write `contents` to `path` with the given mode, atomically replacing any
/// existing file
pub fn write_with_mode(path: &Path, contents: &[u8], mode: u32) -> Result<(), FsError> {
    let wrap = |source| FsError {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = format!(
        ".{}.",
        path.file_name().unwrap_or_default().to_string_lossy()
    );

    // Removed on drop unless persisted
    let mut temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(wrap)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(mode))
            .map_err(wrap)?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    temp.write_all(contents).map_err(wrap)?;
    temp.as_file().sync_all().map_err(wrap)?;
    temp.persist(path).map_err(|e| wrap(e.error))?;

    Ok(())
}
