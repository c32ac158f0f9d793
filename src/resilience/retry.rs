//! Bounded exponential-backoff retries
//!
//! Retryable failures (see [`classify`]) are attempted again after
//! `min(initial_delay × multiplier^(attempt−1), max_delay)`, optionally perturbed
//! by ±10% jitter. Rate-limit failures carrying an upstream `retry_after` hint
//! wait for exactly that hint instead.

use crate::resilience::classifier::{classify, Classification, ErrorCode};
use crate::HarvestError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Un-jittered delay after the `attempt`-th failure (1-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let factor = self.backoff_multiplier.powi(exponent);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Delay before the next attempt, honoring an upstream hint for rate limits
    pub fn delay_for(&self, attempt: u32, classification: &Classification) -> Duration {
        if classification.code == ErrorCode::RateLimit {
            if let Some(retry_after) = classification.retry_after {
                return retry_after;
            }
        }

        let base = self.backoff_delay(attempt);
        if self.jitter {
            apply_jitter(base)
        } else {
            base
        }
    }
}

/// Perturbs `delay` uniformly within ±10%
fn apply_jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.9..=1.1);
    delay.mul_f64(factor)
}

/// Applies a `RetryConfig` around fallible async operations
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` until it succeeds, fails permanently, or attempts run out
    ///
    /// The closure receives the 1-based attempt number. The last failure is
    /// returned unchanged when no further attempt is made.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        mut attempt_fn: F,
    ) -> Result<T, HarvestError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, HarvestError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            match attempt_fn(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let classification = classify(&err);

                    if !classification.retryable {
                        return Err(err);
                    }

                    if attempt >= max_attempts {
                        tracing::error!(
                            operation,
                            attempts = attempt,
                            code = classification.code.as_str(),
                            error = %err,
                            "Retry budget exhausted"
                        );
                        return Err(err);
                    }

                    let delay = self.config.delay_for(attempt, &classification);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        code = classification.code.as_str(),
                        error = %err,
                        "Transient failure, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn config_without_jitter(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            jitter: false,
            ..RetryConfig::default()
        }
    }

    fn timeout_error() -> HarvestError {
        HarvestError::Timeout {
            url: "https://example.com/item".to_string(),
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let config = RetryConfig::default();
        assert_eq!(config.backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(4000));
        assert_eq!(config.backoff_delay(6), Duration::from_millis(30_000));
        assert_eq!(config.backoff_delay(60), Duration::from_millis(30_000));
    }

    #[test]
    fn test_backoff_is_monotonic() {
        let config = RetryConfig {
            backoff_multiplier: 1.5,
            ..RetryConfig::default()
        };
        let delays: Vec<Duration> = (1..=12).map(|a| config.backoff_delay(a)).collect();
        assert!(delays.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let config = RetryConfig::default();
        let classification = classify(&timeout_error());
        for _ in 0..100 {
            let delay = config.delay_for(2, &classification);
            assert!(delay >= Duration::from_millis(1799));
            assert!(delay <= Duration::from_millis(2201));
        }
    }

    #[test]
    fn test_rate_limit_hint_overrides_backoff() {
        let config = RetryConfig::default();
        let classification = classify(&HarvestError::RateLimited {
            url: "https://example.com".to_string(),
            retry_after: Some(Duration::from_secs(42)),
        });
        assert_eq!(config.delay_for(1, &classification), Duration::from_secs(42));

        let without_hint = classify(&HarvestError::RateLimited {
            url: "https://example.com".to_string(),
            retry_after: None,
        });
        let delay = config.delay_for(1, &without_hint);
        assert!(delay <= Duration::from_millis(1101));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_immediately_on_first_try() {
        let executor = RetryExecutor::new(config_without_jitter(3));
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);

        let result = executor
            .execute("test", |_| {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok::<u32, HarvestError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_makes_exactly_one_attempt() {
        let executor = RetryExecutor::new(config_without_jitter(5));
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);

        let result = executor
            .execute("test", |_| {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, HarvestError>(HarvestError::Validation("bad id".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(HarvestError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_kth_attempt_with_growing_delays() {
        let executor = RetryExecutor::new(config_without_jitter(3));
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let start = Instant::now();

        let result = executor
            .execute("test", |attempt| {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 {
                        Err(timeout_error())
                    } else {
                        Ok::<u32, HarvestError>(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1000ms after the first failure, 2000ms after the second
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3000));
        assert!(elapsed < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_propagates_last_error_when_exhausted() {
        let executor = RetryExecutor::new(config_without_jitter(2));
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);

        let result = executor
            .execute("test", |_| {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, HarvestError>(HarvestError::Status {
                        url: "https://example.com".to_string(),
                        status: 503,
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            result,
            Err(HarvestError::Status { status: 503, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_for_hint() {
        let executor = RetryExecutor::new(config_without_jitter(2));
        let start = Instant::now();

        let result = executor
            .execute("test", |attempt| async move {
                if attempt == 1 {
                    Err(HarvestError::RateLimited {
                        url: "https://example.com".to_string(),
                        retry_after: Some(Duration::from_secs(5)),
                    })
                } else {
                    Ok::<(), HarvestError>(())
                }
            })
            .await;

        assert!(result.is_ok());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_millis(5100));
    }
}
