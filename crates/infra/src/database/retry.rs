//! Bounded retry for transient storage contention.
//!
//! The shared file is co-written by the collector, so a commit can land on a
//! busy database. Only [`NoctuaError::is_transient`] failures are retried;
//! anything else (and exhaustion) returns the last error unchanged so the
//! pass can charge it to the user being processed.

use std::future::Future;
use std::time::Duration;

use noctua_domain::{DatabaseConfig, Result};
use tracing::{debug, warn};

const BACKOFF_BASE: f64 = 2.0;
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponential backoff schedule for transactional writes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), initial_delay }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(config.max_write_attempts, Duration::from_millis(config.retry_initial_delay_ms))
    }

    /// Delay before the retry following failed attempt `attempt` (0-based).
    fn delay(&self, attempt: u32) -> Duration {
        let millis = self.initial_delay.as_millis() as f64 * BACKOFF_BASE.powi(attempt as i32);
        Duration::from_millis(millis.min(MAX_DELAY.as_millis() as f64) as u64)
    }

    /// Run `operation` until it succeeds, fails non-transiently, or all
    /// attempts are spent.
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt = attempt + 1, "write succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if error.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "transient storage failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
