//! Explicitly owned registry of circuit breakers and rate limiters
//!
//! One registry is constructed per process and shared (behind an `Arc`) by
//! every error handler. Breakers are created lazily on first use and keyed by
//! resource name; limiters are keyed by platform name.

use crate::resilience::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState,
};
use crate::resilience::rate_limiter::{RateLimitConfig, RateLimiter};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

/// Shared resilience state keyed by resource name
#[derive(Debug, Default)]
pub struct ResilienceRegistry {
    breaker_config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl ResilienceRegistry {
    pub fn new(breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            breaker_config,
            breakers: Mutex::new(HashMap::new()),
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Gets the limiter registered under `name`, creating it on first use
    pub fn limiter(&self, name: &str, config: RateLimitConfig) -> Arc<RateLimiter> {
        let mut limiters = lock(&self.limiters);
        Arc::clone(
            limiters
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::new(name, config))),
        )
    }

    /// Checks (and lazily creates) the breaker for `name`
    pub fn can_execute(&self, name: &str) -> bool {
        self.with_breaker(name, |breaker| breaker.can_execute(Instant::now()))
    }

    pub fn record_success(&self, name: &str) {
        self.with_breaker(name, |breaker| breaker.record_success());
    }

    pub fn record_failure(&self, name: &str) {
        self.with_breaker(name, |breaker| breaker.record_failure(Instant::now()));
    }

    /// Forces the breaker for `name` back to CLOSED
    pub fn reset(&self, name: &str) {
        self.with_breaker(name, |breaker| breaker.reset());
    }

    pub fn breaker_state(&self, name: &str) -> Option<CircuitBreakerState> {
        lock(&self.breakers).get(name).map(CircuitBreaker::snapshot)
    }

    /// Snapshots of every breaker, sorted by name
    pub fn breaker_states(&self) -> Vec<CircuitBreakerState> {
        let mut states: Vec<CircuitBreakerState> = lock(&self.breakers)
            .values()
            .map(CircuitBreaker::snapshot)
            .collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }

    fn with_breaker<R>(&self, name: &str, f: impl FnOnce(&mut CircuitBreaker) -> R) -> R {
        let mut breakers = lock(&self.breakers);
        let breaker = breakers
            .entry(name.to_string())
            .or_insert_with(|| CircuitBreaker::new(name, self.breaker_config.clone()));
        f(breaker)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitState;

    #[test]
    fn test_breakers_created_lazily() {
        let registry = ResilienceRegistry::default();
        assert!(registry.breaker_state("reddit:op").is_none());

        assert!(registry.can_execute("reddit:op"));
        let state = registry.breaker_state("reddit:op").unwrap();
        assert_eq!(state.state, CircuitState::Closed);
    }

    #[test]
    fn test_breakers_scoped_by_name() {
        let config = CircuitBreakerConfig {
            failure_threshold: 2,
            ..CircuitBreakerConfig::default()
        };
        let registry = ResilienceRegistry::new(config);

        registry.record_failure("hackernews:a");
        registry.record_failure("hackernews:a");

        assert!(!registry.can_execute("hackernews:a"));
        assert!(registry.can_execute("hackernews:b"));

        registry.reset("hackernews:a");
        assert!(registry.can_execute("hackernews:a"));
    }

    #[test]
    fn test_breaker_states_sorted() {
        let registry = ResilienceRegistry::default();
        registry.record_success("b");
        registry.record_success("a");

        let names: Vec<String> = registry
            .breaker_states()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_limiter_shared_per_name() {
        let registry = ResilienceRegistry::default();
        let a = registry.limiter("reddit", RateLimitConfig::default());
        let b = registry.limiter("reddit", RateLimitConfig::default());
        let c = registry.limiter("hackernews", RateLimitConfig::default());

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
