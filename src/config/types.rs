use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Forum Harvester
///
/// Every section and key is optional; missing values fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub client: ClientConfig,
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub cache: CacheConfig,
    pub reddit: RedditConfig,
    pub hackernews: HackerNewsConfig,
    pub storage: StorageConfig,
}

/// Shared HTTP client and concurrency settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClientConfig {
    /// Per-request timeout in seconds
    pub timeout: u64,

    /// Maximum attempts per network call (including the first)
    pub retry_attempts: u32,

    /// Maximum posts processed concurrently
    pub max_concurrent: usize,

    /// Maximum items fetched concurrently within one batch
    pub batch_size: usize,

    pub user_agent: String,
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            retry_attempts: 3,
            max_concurrent: 5,
            batch_size: 10,
            user_agent: format!("forum-harvester/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Backoff settings for retried calls
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetrySettings {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_secs: u64,
    pub half_open_max_attempts: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_secs: 60,
            half_open_max_attempts: 3,
        }
    }
}

/// Query cache settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_size: usize,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_size: 1000,
        }
    }
}

/// Reddit API settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RedditConfig {
    /// OAuth API root
    pub base_url: String,

    /// OAuth2 token endpoint
    pub auth_url: String,

    pub client_id: Option<String>,
    pub client_secret: Option<String>,

    /// Script-app credentials; when absent the client-credentials grant is used
    pub username: Option<String>,
    pub password: Option<String>,

    pub requests_per_second: u32,
    pub rate_limit_per_minute: u32,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            base_url: "https://oauth.reddit.com".to_string(),
            auth_url: "https://www.reddit.com/api/v1/access_token".to_string(),
            client_id: None,
            client_secret: None,
            username: None,
            password: None,
            requests_per_second: 1,
            rate_limit_per_minute: 60,
        }
    }
}

/// Hacker News API settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HackerNewsConfig {
    /// Firebase API root
    pub base_url: String,

    /// Algolia search API root
    pub search_url: String,

    pub requests_per_second: u32,
    pub rate_limit_per_minute: u32,
}

impl Default for HackerNewsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://hacker-news.firebaseio.com/v0".to_string(),
            search_url: "https://hn.algolia.com/api/v1".to_string(),
            requests_per_second: 10,
            rate_limit_per_minute: 600,
        }
    }
}

/// Persistence sink settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: Option<String>,
}
