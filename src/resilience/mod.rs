//! Resilience layer wrapped around every outbound network call
//!
//! Composes per-platform rate limiting, per-resource circuit breakers and
//! bounded retries, all driven by the failure taxonomy in [`classifier`].

pub mod circuit_breaker;
pub mod classifier;
pub mod handler;
pub mod rate_limiter;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, CircuitState};
pub use classifier::{classify, Classification, ErrorCode};
pub use handler::ErrorHandler;
pub use rate_limiter::{RateLimitConfig, RateLimiter, RequestWindow};
pub use registry::ResilienceRegistry;
pub use retry::{RetryConfig, RetryExecutor};
