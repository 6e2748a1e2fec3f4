//! Bounded exponential-backoff retry for remote calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{Result, TodoError};

/// Upper bound (exclusive) of the random jitter added to each delay.
const JITTER_MS: u64 = 100;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on any single delay (before jitter).
    pub max_delay: Duration,
    /// Whether to add up to 100ms of random jitter.
    pub jitter: bool,
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    /// A single attempt with no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay after the failed attempt with the given 0-based index, without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u128 << attempt.min(64);
        let millis = self.base_delay.as_millis().saturating_mul(factor);
        let capped = millis.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if self.jitter {
            delay + Duration::from_millis(rand::rng().random_range(0..JITTER_MS))
        } else {
            delay
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000), Duration::from_millis(10_000))
    }
}

/// Runs fallible async operations with classified retry.
///
/// Only errors whose kind is transient are retried; anything else is
/// returned from the attempt that produced it.
#[derive(Debug, Clone, Default)]
pub struct RetryOperator {
    config: RetryConfig,
}

impl RetryOperator {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent. `label` names the call in logs.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.config.max_retries.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(label, attempts = attempt + 1, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    attempt += 1;
                    if attempt >= attempts {
                        warn!(label, attempts, error = %err, "giving up");
                        return Err(TodoError::RetriesExhausted {
                            attempts,
                            last: Box::new(err),
                        });
                    }
                    let delay = self.config.jittered(attempt - 1);
                    warn!(
                        label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// One-off form of [`RetryOperator::execute`].
pub async fn execute<T, F, Fut>(
    operation: F,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    RetryOperator::new(RetryConfig::new(max_retries, base_delay, max_delay))
        .execute("operation", operation)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[test]
    fn test_delay_doubles_and_caps() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(10_000));
        assert_eq!(config.delay_for_attempt(200), Duration::from_millis(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_transient_runs_three_times() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let stamps = Mutex::new(Vec::new());

        let result: Result<()> = execute(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                stamps.lock().unwrap().push(started.elapsed());
                async { Err(TodoError::transient("connection refused")) }
            },
            3,
            Duration::from_millis(1000),
            Duration::from_millis(10_000),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert!(matches!(err, TodoError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);

        let stamps = stamps.lock().unwrap();
        let first_gap = stamps[1] - stamps[0];
        let second_gap = stamps[2] - stamps[1];
        assert!(first_gap >= Duration::from_millis(1000));
        assert!(first_gap < Duration::from_millis(1100));
        assert!(second_gap >= Duration::from_millis(2000));
        assert!(second_gap < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exact_delays_without_jitter() {
        let operator = RetryOperator::new(RetryConfig::default().without_jitter());
        let started = Instant::now();

        let result: Result<()> = operator
            .execute("test", || async { Err(TodoError::transient("timeout")) })
            .await;

        assert!(result.is_err());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3000));
        assert!(elapsed < Duration::from_millis(3010));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let operator = RetryOperator::default();

        let result: Result<()> = operator
            .execute("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TodoError::Auth("missing key".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Auth);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let operator = RetryOperator::default();

        let result = operator
            .execute("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(TodoError::transient("rate limited"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_makes_single_attempt() {
        let calls = AtomicU32::new(0);
        let operator = RetryOperator::new(RetryConfig::no_retry());

        let result: Result<()> = operator
            .execute("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TodoError::transient("timeout")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.unwrap_err(),
            TodoError::RetriesExhausted { attempts: 1, .. }
        ));
    }
}
