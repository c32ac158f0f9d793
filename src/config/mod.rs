//! Configuration module for Forum Harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use forum_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvester.toml")).unwrap();
//! println!("Retry attempts: {}", config.client.retry_attempts);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CacheConfig, CircuitBreakerSettings, ClientConfig, Config, HackerNewsConfig, RedditConfig,
    RetrySettings, StorageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;

use crate::resilience::{CircuitBreakerConfig, RateLimitConfig, RetryConfig};
use crate::Platform;
use std::time::Duration;

impl Config {
    /// Retry policy combining `client.retry-attempts` with the `[retry]` section
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.client.retry_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff_multiplier: self.retry.backoff_multiplier,
            jitter: self.retry.jitter,
        }
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker.failure_threshold,
            success_threshold: self.circuit_breaker.success_threshold,
            timeout: Duration::from_secs(self.circuit_breaker.timeout_secs),
            half_open_max_attempts: self.circuit_breaker.half_open_max_attempts,
        }
    }

    /// Request pacing for `platform`
    pub fn rate_limit_config(&self, platform: Platform) -> RateLimitConfig {
        match platform {
            Platform::Reddit => RateLimitConfig {
                requests_per_second: self.reddit.requests_per_second,
                requests_per_minute: self.reddit.rate_limit_per_minute,
            },
            Platform::HackerNews => RateLimitConfig {
                requests_per_second: self.hackernews.requests_per_second,
                requests_per_minute: self.hackernews.rate_limit_per_minute,
            },
        }
    }
}
