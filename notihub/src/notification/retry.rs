//! Retry executor with a fixed per-attempt delay schedule.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::{MAX_BACKOFF_SECS, RetryConfig};

/// Bounded retry around a single asynchronous operation.
///
/// Every failure is treated as retryable. The delay before retry `n` (zero-based)
/// is `backoff[n]`, reusing the last entry once the schedule runs out.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// `max_attempts` below 1 is treated as 1.
    pub fn new(max_attempts: u32, backoff: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// A single attempt, no delays.
    pub fn no_retry() -> Self {
        Self::new(1, Vec::new())
    }

    /// Delays are clamped to `[0, MAX_BACKOFF_SECS]`; NaN becomes zero.
    pub fn from_config(config: &RetryConfig) -> Self {
        if !config.enabled {
            return Self::no_retry();
        }
        Self::new(
            config.max_attempts,
            config
                .backoff_secs
                .iter()
                .map(|secs| {
                    Duration::try_from_secs_f64(secs.clamp(0.0, MAX_BACKOFF_SECS))
                        .unwrap_or(Duration::ZERO)
                })
                .collect(),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the failed zero-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff.len() {
            0 => Duration::ZERO,
            len => self.backoff[(attempt as usize).min(len - 1)],
        }
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// Returns the error of the last attempt on exhaustion.
    pub async fn execute<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt + 1 >= self.max_attempts {
                        warn!(
                            "All {} attempts failed for {}: {}",
                            self.max_attempts, label, err
                        );
                        return Err(err);
                    }

                    let delay = self.delay_for(attempt);
                    debug!(
                        "Attempt {}/{} failed for {}: {}. Retrying in {:?}",
                        attempt + 1,
                        self.max_attempts,
                        label,
                        err,
                        delay
                    );

                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
