//! Retry loops for operations whose retry policy belongs to the caller.
//!
//! Single requests never retry internally; when a step must be repeated until
//! it succeeds (for example uploading TLS material once the store accepts
//! writes), the caller wraps it here with either a fixed interval or an
//! exponential backoff.
//!
//! # Example
//!
//! ```ignore
//! use stronghold_common::retry::{retry_with_backoff, RetryConfig};
//!
//! retry_with_backoff(
//!     &RetryConfig::fixed(Duration::from_secs(30)),
//!     "upload_tls_material",
//!     || async { uploader.upload(&material).await },
//! ).await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay between attempts
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failure
    pub backoff_multiplier: f64,
    /// Randomize each delay between 0.5x and 1.5x
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0, // infinite
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Retry forever, waiting exactly `interval` between attempts
    pub fn fixed(interval: Duration) -> Self {
        Self {
            max_attempts: 0,
            initial_delay: interval,
            max_delay: interval,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

/// Execute an async operation until it succeeds or `max_attempts` is reached.
///
/// Returns the last error once the attempt budget is exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if config.max_attempts > 0 && attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                let wait = if config.jitter {
                    let factor = rand::thread_rng().gen_range(0.5..1.5);
                    Duration::from_secs_f64(delay.as_secs_f64() * factor)
                } else {
                    delay
                };

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = wait.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(wait).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let config = RetryConfig::with_max_attempts(3);
        let result: Result<i32, &str> =
            retry_with_backoff(&config, "op", || async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_fixed_interval_retries_until_success() {
        let count = Cell::new(0u32);

        let result: Result<&str, &str> =
            retry_with_backoff(&RetryConfig::fixed(Duration::from_millis(1)), "upload", || {
                let n = count.get() + 1;
                count.set(n);
                async move {
                    if n < 4 {
                        Err("store not ready")
                    } else {
                        Ok("uploaded")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("uploaded"));
        assert_eq!(count.get(), 4);
    }

    #[tokio::test]
    async fn test_exhausts_max_attempts() {
        let count = Cell::new(0u32);
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter: true,
        };

        let result: Result<i32, &str> = retry_with_backoff(&config, "op", || {
            count.set(count.get() + 1);
            async { Err("always fails") }
        })
        .await;

        assert_eq!(result, Err("always fails"));
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn fixed_config_never_grows() {
        let config = RetryConfig::fixed(Duration::from_secs(30));
        assert_eq!(config.max_attempts, 0);
        assert_eq!(config.initial_delay, config.max_delay);
        assert!(!config.jitter);
    }
}
