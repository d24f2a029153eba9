//! Bounded exponential-backoff retry for single remote calls.

use std::future::Future;
use std::time::Duration;

use enricher_shared::{Result, RetryConfig};
use tracing::warn;

/// Retry policy: up to `max_retries` extra attempts, waiting
/// `initial_delay * 2^(k-1)` before retry `k`. No jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(300),
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `retry` (1-indexed).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }

    /// Run `operation`, retrying retryable failures.
    ///
    /// The last error is returned unchanged once retries are exhausted.
    /// Non-retryable errors are returned after the first attempt.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    let delay = self.delay_for(retries);
                    warn!(
                        operation = label,
                        attempt = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
