//! Bounded retry with exponential backoff.
//!
//! One policy type serves both the LLM path and the remote client; each caller
//! carries its own instance from configuration.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Retry budget and backoff curve.
///
/// The delay before retry `n` (1-based) is `base_delay_ms * 2^(n-1)`, capped at
/// `max_delay_ms`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

/// Terminal failure of [`RetryPolicy::run`].
#[derive(Debug)]
pub struct RetryFailure<E> {
    /// The last error observed.
    pub error: E,
    /// Attempts actually made.
    pub attempts: u32,
    /// `true` when the budget ran out on a transient error; `false` when a
    /// permanent error stopped the loop early.
    pub exhausted: bool,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(32);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Sum of every backoff delay when the whole budget is spent.
    pub fn total_delay(&self) -> Duration {
        (1..=self.max_retries).map(|n| self.delay_for(n)).sum()
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// `op` receives the 1-based attempt number. `is_transient` decides whether
    /// an error is worth another attempt.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        label: &str,
        mut op: F,
        is_transient: P,
    ) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !is_transient(&e) => {
                    debug!(label, attempt, error = %e, "Permanent failure, not retrying");
                    return Err(RetryFailure {
                        error: e,
                        attempts: attempt,
                        exhausted: false,
                    });
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(label, attempts = attempt, error = %e, "Retry budget exhausted");
                    return Err(RetryFailure {
                        error: e,
                        attempts: attempt,
                        exhausted: true,
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
