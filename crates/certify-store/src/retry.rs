//! Retry policy for store calls that are safe to repeat.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::StoreResult;

/// Exponential backoff applied to transient store failures.
///
/// Only idempotent calls may be run through a policy: every retry re-sends
/// the same request, so the store must treat it as an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without waiting.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self::immediate(1)
    }

    /// Delay to wait after the given failed attempt (1-indexed).
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1 << exponent)
            .min(self.max_backoff)
    }

    /// Runs `call` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Non-transient errors are returned immediately.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Store call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Transient store failure, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{StoreError, StoreErrorKind};

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(30), Duration::from_millis(350));
    }

    #[test]
    fn run_retries_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = tokio_test::block_on(RetryPolicy::immediate(3).run("get_all", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StoreError::transient("connection reset"))
                } else {
                    Ok(n)
                }
            }
        }));

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn run_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: StoreResult<()> =
            tokio_test::block_on(RetryPolicy::immediate(2).run("delete", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StoreError::transient("502 bad gateway")) }
            }));

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn run_does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: StoreResult<()> =
            tokio_test::block_on(RetryPolicy::immediate(5).run("update", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StoreError::not_found("template 4")) }
            }));

        assert_eq!(result.unwrap_err().kind, StoreErrorKind::NotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_attempts_still_calls_once() {
        let calls = AtomicU32::new(0);
        let result = tokio_test::block_on(RetryPolicy::immediate(0).run("get_active", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, StoreError>(()) }
        }));

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
