//! Forum Harvester: a resilient multi-platform forum scraper
//!
//! This crate collects posts, comments and user profiles from heterogeneous forum
//! APIs (Reddit-style OAuth listings and the Hacker News Firebase API) under each
//! platform's rate limits, and normalizes them into a common entity model.

pub mod cache;
pub mod config;
pub mod harvester;
pub mod model;
pub mod pagination;
pub mod platforms;
pub mod resilience;
pub mod storage;
pub mod thread;

use std::time::Duration;
use thiserror::Error;

/// Main error type for Forum Harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Rate limited by {url}")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },

    #[error("Authentication failed for {platform}: {message}")]
    Auth { platform: String, message: String },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Resource not found: {url}")]
    NotFound { url: String },

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Circuit breaker open for {name}")]
    CircuitOpen { name: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Forum Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use harvester::Harvester;
pub use model::{Comment, ForumPost, Platform, ScrapeOptions, ScrapeResult, User};
pub use platforms::Scraper;
