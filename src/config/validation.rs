use crate::config::types::{
    CacheConfig, CircuitBreakerSettings, ClientConfig, Config, HackerNewsConfig, RedditConfig,
    RetrySettings,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_client_config(&config.client)?;
    validate_retry_settings(&config.retry)?;
    validate_circuit_breaker(&config.circuit_breaker)?;
    validate_cache_config(&config.cache)?;
    validate_reddit_config(&config.reddit)?;
    validate_hackernews_config(&config.hackernews)?;
    Ok(())
}

/// Validates shared client configuration
fn validate_client_config(config: &ClientConfig) -> Result<(), ConfigError> {
    if config.timeout == 0 {
        return Err(ConfigError::Validation(
            "timeout must be >= 1 second".to_string(),
        ));
    }

    if config.retry_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "retry_attempts must be >= 1, got {}",
            config.retry_attempts
        )));
    }

    if config.max_concurrent < 1 || config.max_concurrent > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent must be between 1 and 100, got {}",
            config.max_concurrent
        )));
    }

    if config.batch_size < 1 || config.batch_size > 100 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be between 1 and 100, got {}",
            config.batch_size
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry_settings(config: &RetrySettings) -> Result<(), ConfigError> {
    if config.backoff_multiplier < 1.0 || !config.backoff_multiplier.is_finite() {
        return Err(ConfigError::Validation(format!(
            "backoff_multiplier must be >= 1.0, got {}",
            config.backoff_multiplier
        )));
    }

    if config.max_delay_ms < config.initial_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max_delay_ms ({}) must be >= initial_delay_ms ({})",
            config.max_delay_ms, config.initial_delay_ms
        )));
    }

    Ok(())
}

fn validate_circuit_breaker(config: &CircuitBreakerSettings) -> Result<(), ConfigError> {
    for (name, value) in [
        ("failure_threshold", config.failure_threshold),
        ("success_threshold", config.success_threshold),
        ("half_open_max_attempts", config.half_open_max_attempts),
    ] {
        if value < 1 {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 1, got {}",
                name, value
            )));
        }
    }

    Ok(())
}

fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.enabled && config.max_size < 1 {
        return Err(ConfigError::Validation(
            "cache max_size must be >= 1 when the cache is enabled".to_string(),
        ));
    }

    Ok(())
}

fn validate_reddit_config(config: &RedditConfig) -> Result<(), ConfigError> {
    validate_url("reddit base_url", &config.base_url)?;
    validate_url("reddit auth_url", &config.auth_url)?;
    validate_rate(
        "reddit",
        config.requests_per_second,
        config.rate_limit_per_minute,
    )?;

    if config.username.is_some() != config.password.is_some() {
        return Err(ConfigError::Validation(
            "reddit username and password must be given together".to_string(),
        ));
    }

    Ok(())
}

fn validate_hackernews_config(config: &HackerNewsConfig) -> Result<(), ConfigError> {
    validate_url("hackernews base_url", &config.base_url)?;
    validate_url("hackernews search_url", &config.search_url)?;
    validate_rate(
        "hackernews",
        config.requests_per_second,
        config.rate_limit_per_minute,
    )
}

/// Both pacing windows must admit at least one request
fn validate_rate(platform: &str, per_second: u32, per_minute: u32) -> Result<(), ConfigError> {
    if per_second < 1 || per_minute < 1 {
        return Err(ConfigError::Validation(format!(
            "{} rate limits must be >= 1 (got {}/s, {}/min)",
            platform, per_second, per_minute
        )));
    }
    Ok(())
}

fn validate_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            name, value
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.client.max_concurrent = 0;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_shrinking_backoff() {
        let mut config = Config::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_inverted_delays() {
        let mut config = Config::default();
        config.retry.initial_delay_ms = 5000;
        config.retry.max_delay_ms = 1000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_thresholds() {
        let mut config = Config::default();
        config.circuit_breaker.success_threshold = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("x", "https://example.com/api").is_ok());
        assert!(validate_url("x", "http://127.0.0.1:8080").is_ok());

        assert!(validate_url("x", "").is_err());
        assert!(validate_url("x", "ftp://example.com").is_err());
        assert!(validate_url("x", "not a url").is_err());
    }

    #[test]
    fn test_reddit_password_requires_username() {
        let mut config = Config::default();
        config.reddit.password = Some("hunter2".to_string());
        assert!(validate(&config).is_err());

        config.reddit.username = Some("someone".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_rejects_zero_rate() {
        let mut config = Config::default();
        config.hackernews.rate_limit_per_minute = 0;
        assert!(validate(&config).is_err());
    }
}
