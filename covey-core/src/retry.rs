//! Retry with bounded exponential backoff
//!
//! Used by the snapshot-sync path: a demoted node retries its full resync
//! a few times with doubling delays, then gives up until the next election
//! cycle picks it up again.

use crate::Result;
use std::time::Duration;
use tokio::time::sleep;

/// Bounded exponential backoff policy
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub multiplier: f64,
    /// Jitter factor (fraction of the delay) to avoid thundering herds
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32 - 1);
        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * base * self.jitter_factor;
        Duration::from_secs_f64((base + jitter).max(0.0))
    }
}

/// Execute an operation with retry and exponential backoff
///
/// Every error is treated as retryable; the caller decides which
/// operations deserve the wrapper. The last error is returned once the
/// attempt budget is exhausted.
pub async fn retry<F, Fut, T>(policy: BackoffPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if attempt >= policy.max_attempts {
                    return Err(error);
                }

                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt,
                    policy.max_attempts,
                    error,
                    delay
                );
                sleep(delay).await;
            }
        }
    }
}
