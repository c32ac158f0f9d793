//! Error handler composing the resilience stack around one named operation
//!
//! Every attempt of a call goes through:
//!
//! 1. `RateLimiter::wait_if_needed` for the platform
//! 2. the circuit breaker of `<platform>:<operation>`; an open breaker fails the
//!    attempt with `CircuitOpen` without invoking the call
//! 3. the call itself, whose outcome is fed back into the breaker
//!
//! and the `RetryExecutor` decides whether another attempt follows.

use crate::model::Platform;
use crate::resilience::classifier::{classify, ErrorCode};
use crate::resilience::rate_limiter::RateLimiter;
use crate::resilience::registry::ResilienceRegistry;
use crate::resilience::retry::{RetryConfig, RetryExecutor};
use crate::HarvestError;
use std::future::Future;
use std::sync::Arc;

/// Resilience orchestrator for one platform
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    platform: Platform,
    registry: Arc<ResilienceRegistry>,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryExecutor,
}

impl ErrorHandler {
    pub fn new(
        platform: Platform,
        registry: Arc<ResilienceRegistry>,
        rate_limiter: Arc<RateLimiter>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            platform,
            registry,
            rate_limiter,
            retry: RetryExecutor::new(retry_config),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn registry(&self) -> &Arc<ResilienceRegistry> {
        &self.registry
    }

    /// Circuit breaker name for `operation` on this platform
    pub fn breaker_name(&self, operation: &str) -> String {
        format!("{}:{}", self.platform, operation)
    }

    /// Executes `call` under rate limiting, circuit breaking and retries
    pub async fn execute<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, HarvestError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, HarvestError>>,
    {
        let name = self.breaker_name(operation);
        let breaker = name.as_str();
        let registry = self.registry.as_ref();
        let limiter = self.rate_limiter.as_ref();
        let call = &call;

        let result = self
            .retry
            .execute(breaker, move |_attempt| async move {
                limiter.wait_if_needed().await;

                if !registry.can_execute(breaker) {
                    return Err(HarvestError::CircuitOpen {
                        name: breaker.to_string(),
                    });
                }

                let outcome = call().await;
                match &outcome {
                    Err(err) if classify(err).code.counts_against_circuit() => {
                        registry.record_failure(breaker)
                    }
                    // The upstream answered; a 404 or rejected input is not an outage
                    _ => registry.record_success(breaker),
                }
                outcome
            })
            .await;

        if let Err(err) = &result {
            match classify(err).code {
                code @ (ErrorCode::Permanent | ErrorCode::CircuitOpen) => {
                    tracing::warn!(operation = %name, code = code.as_str(), error = %err, "Operation failed");
                }
                // Exhausted retries are already reported by the executor
                code => {
                    tracing::debug!(operation = %name, code = code.as_str(), error = %err, "Operation failed");
                }
            }
        }

        result
    }

    /// Like `execute`, but degrades to `fallback` when it yields a value
    pub async fn execute_with_fallback<T, F, Fut, D>(
        &self,
        operation: &str,
        call: F,
        fallback: D,
    ) -> Result<T, HarvestError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, HarvestError>>,
        D: FnOnce(&HarvestError) -> Option<T>,
    {
        match self.execute(operation, call).await {
            Ok(value) => Ok(value),
            Err(err) => match fallback(&err) {
                Some(value) => {
                    tracing::warn!(
                        operation = %self.breaker_name(operation),
                        error = %err,
                        "Degrading to fallback value"
                    );
                    Ok(value)
                }
                None => Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{CircuitBreakerConfig, CircuitState, RateLimitConfig};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn create_handler(failure_threshold: u32, max_attempts: u32) -> ErrorHandler {
        let registry = Arc::new(ResilienceRegistry::new(CircuitBreakerConfig {
            failure_threshold,
            timeout: Duration::from_secs(60),
            ..CircuitBreakerConfig::default()
        }));
        let limiter = registry.limiter(
            "hackernews",
            RateLimitConfig {
                requests_per_second: 1000,
                requests_per_minute: 100_000,
            },
        );
        ErrorHandler::new(
            Platform::HackerNews,
            registry,
            limiter,
            RetryConfig {
                max_attempts,
                jitter: false,
                ..RetryConfig::default()
            },
        )
    }

    fn server_error() -> HarvestError {
        HarvestError::Status {
            url: "https://example.com".to_string(),
            status: 502,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_passes_through() {
        let handler = create_handler(5, 3);
        let result = handler
            .execute("item(1)", || async { Ok::<_, HarvestError>("ok") })
            .await;
        assert_eq!(result.unwrap(), "ok");

        let state = handler.registry().breaker_state("hackernews:item(1)").unwrap();
        assert_eq!(state.state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_skips_call() {
        let handler = create_handler(3, 3);
        let calls = AtomicU32::new(0);

        let result = handler
            .execute("flaky", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(server_error())
            })
            .await;
        assert!(matches!(result, Err(HarvestError::Status { status: 502, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let result = handler
            .execute("flaky", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<(), HarvestError>(())
            })
            .await;
        assert!(matches!(result, Err(HarvestError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_trips_mid_retry() {
        let handler = create_handler(2, 5);
        let calls = AtomicU32::new(0);

        let result = handler
            .execute("trip", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(server_error())
            })
            .await;

        // Two failures open the breaker; the third attempt is refused without a call
        assert!(matches!(result, Err(HarvestError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_does_not_trip_breaker() {
        let handler = create_handler(1, 3);

        for _ in 0..3 {
            let result = handler
                .execute("missing", || async {
                    Err::<(), _>(HarvestError::NotFound {
                        url: "https://example.com/item/1".to_string(),
                    })
                })
                .await;
            assert!(matches!(result, Err(HarvestError::NotFound { .. })));
        }

        let state = handler.registry().breaker_state("hackernews:missing").unwrap();
        assert_eq!(state.state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_recovers_after_timeout() {
        let handler = create_handler(1, 1);

        let _ = handler
            .execute("recover", || async { Err::<(), _>(server_error()) })
            .await;
        let refused = handler
            .execute("recover", || async { Ok::<_, HarvestError>(1) })
            .await;
        assert!(matches!(refused, Err(HarvestError::CircuitOpen { .. })));

        tokio::time::sleep(Duration::from_secs(61)).await;

        for _ in 0..2 {
            let probe = handler
                .execute("recover", || async { Ok::<_, HarvestError>(1) })
                .await;
            assert_eq!(probe.unwrap(), 1);
        }
        let state = handler.registry().breaker_state("hackernews:recover").unwrap();
        assert_eq!(state.state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_degrades() {
        let handler = create_handler(5, 1);

        let result = handler
            .execute_with_fallback(
                "degrade",
                || async { Err::<Vec<u32>, _>(server_error()) },
                |_| Some(Vec::new()),
            )
            .await;
        assert_eq!(result.unwrap(), Vec::<u32>::new());

        let result = handler
            .execute_with_fallback(
                "degrade",
                || async { Err::<Vec<u32>, _>(server_error()) },
                |_| None,
            )
            .await;
        assert!(result.is_err());
    }
}
