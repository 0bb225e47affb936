//! Shared building blocks for the stronghold binaries
//!
//! - [`telemetry`] - Logging subscriber construction and lifetime
//! - [`fs`] - Permission-aware writes for key material and secrets
//! - [`retry`] - Retry loops for operations the caller owns the retry policy of

pub mod fs;
pub mod retry;
pub mod telemetry;

pub use fs::{write_with_mode, FsError, PRIVATE_KEY_MODE, PUBLIC_FILE_MODE, SECRET_FILE_MODE};
pub use retry::{retry_with_backoff, RetryConfig};
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryError, TelemetryGuard};
