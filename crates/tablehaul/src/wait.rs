// Copyright 2026 Tablehaul Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bounded waiting and retrying.

use crate::error::{Result, ScrapeError};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Poll `probe` every `interval` until it yields `Some`, or fail with
/// [`ScrapeError::Timeout`] once `timeout` has elapsed.
///
/// The probe is always run at least once, even with a zero timeout.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await {
            return Ok(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(ScrapeError::Timeout {
                what: what.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

/// Attempt budget for a retried operation.
///
/// Call sites keep their own loop so they can hold `&mut` borrows across
/// attempts:
///
/// ```ignore
/// let mut budget = RetryBudget::new("advance", 3, Duration::from_millis(500));
/// let page = loop {
///     match source.advance(&mut handle).await {
///         Ok(page) => break page,
///         Err(e) if budget.retry_after(&e).await => continue,
///         Err(e) => return Err(e),
///     }
/// };
/// ```
#[derive(Debug, Clone)]
pub struct RetryBudget {
    what: String,
    attempts: u32,
    failures: u32,
    base_delay: Duration,
}

impl RetryBudget {
    pub fn new(what: impl Into<String>, attempts: u32, base_delay: Duration) -> Self {
        Self {
            what: what.into(),
            attempts: attempts.max(1),
            failures: 0,
            base_delay,
        }
    }

    /// Record a failure. For a transient error with budget left, sleeps the
    /// backoff (`base · 2^n`) and returns `true`.
    pub async fn retry_after(&mut self, err: &ScrapeError) -> bool {
        self.failures += 1;
        if !err.is_transient() || self.failures >= self.attempts {
            return false;
        }
        let delay = self
            .base_delay
            .saturating_mul(1u32 << (self.failures - 1).min(8));
        tracing::warn!(
            "{} failed (attempt {}/{}): {err}; retrying in {}ms",
            self.what,
            self.failures,
            self.attempts,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
        true
    }

    /// Failures recorded so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
