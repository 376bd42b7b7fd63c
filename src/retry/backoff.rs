//! Exponential backoff
//!
//! The delay before retry *n* (1-indexed) is `base_delay * 2^(n-1)`. An
//! operation gets `max_attempts` tries in total; any error triggers a retry,
//! and the last error is returned unchanged once attempts are exhausted.

use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use crate::metrics::Metrics;
use crate::utils::BusError;

/// Largest exponent applied to the base delay, keeping the multiplier in range.
const MAX_SHIFT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl BackoffPolicy {
    /// Create a policy. `max_attempts` is clamped to at least one try.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay to wait after failed attempt `attempt` before the next one.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(MAX_SHIFT);
        self.base_delay.saturating_mul(1u32 << shift)
    }

    /// Run `attempt_fn` against `state` until it succeeds or the policy is
    /// exhausted.
    ///
    /// The closure receives the state mutably on every try, which lets callers
    /// retry work that needs exclusive access (for example a locked
    /// connection) without giving up the lock between attempts. Each retry is
    /// logged and reported to `metrics` under `operation`.
    pub async fn run<S, T, F>(
        &self,
        operation: &str,
        metrics: &dyn Metrics,
        state: &mut S,
        mut attempt_fn: F,
    ) -> Result<T, BusError>
    where
        S: ?Sized + Send,
        F: for<'s> FnMut(&'s mut S) -> BoxFuture<'s, Result<T, BusError>>,
    {
        let mut attempt = 1;
        loop {
            match attempt_fn(state).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.max_attempts => return Err(err),
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    metrics.increment_retry_attempt(operation);
                    metrics.record_retry_delay(operation, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(4, Duration::from_secs(5))
    }
}
