//! Bounded retry with exponential backoff.
//!
//! Only playlist mutations are retried. Searches get a single attempt so
//! batch latency stays predictable.

use std::future::Future;
use std::time::Duration;

use super::domain::CatalogError;

/// How many times a mutation is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1)
    pub max_attempts: u32,
    /// Wait before the second attempt; doubles for each later one
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Wait after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << exponent)
    }

    /// Is there another attempt after `attempt` (1-based)?
    pub fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. Each attempt is bounded by `deadline`.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        deadline: Duration,
        mut op: F,
    ) -> Result<T, CatalogError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(deadline, op()).await {
                Ok(result) => result,
                Err(_) => Err(CatalogError::Timeout),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && self.allows_another(attempt) => {
                    let wait = self.backoff(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        error = %e,
                        "Retrying in {:?}",
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
