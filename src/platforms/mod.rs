//! Platform scrapers
//!
//! Every supported platform is one variant of the closed [`Scraper`] enum,
//! which exposes the same contract regardless of the platform underneath.
//! Multi-item operations return a [`ScrapeResult`] with failures collected
//! into its error list. Single-item operations return `Ok(None)` when the
//! item is absent or unreachable, and `Err` for rejected input, failed
//! authentication and permanent failures.

pub mod hackernews;
pub mod http;
pub mod reddit;

pub use hackernews::HackerNewsScraper;
pub use reddit::RedditScraper;

use crate::config::Config;
use crate::model::{
    Capabilities, ForumPost, Platform, ScrapeOptions, ScrapeResult, ScrapeResultBuilder, User,
};
use crate::resilience::{classify, ErrorCode, ErrorHandler, ResilienceRegistry};
use crate::HarvestError;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;

/// A platform scraper, selected by platform tag
pub enum Scraper {
    Reddit(RedditScraper),
    HackerNews(HackerNewsScraper),
}

impl Scraper {
    /// Builds the scraper for `platform`, wiring it to the shared registry
    pub fn new(
        platform: Platform,
        config: &Config,
        registry: Arc<ResilienceRegistry>,
    ) -> Result<Self, HarvestError> {
        let limiter = registry.limiter(platform.as_str(), config.rate_limit_config(platform));
        let handler = ErrorHandler::new(platform, registry, limiter, config.retry_config());

        Ok(match platform {
            Platform::Reddit => Self::Reddit(RedditScraper::new(config, handler)?),
            Platform::HackerNews => Self::HackerNews(HackerNewsScraper::new(config, handler)?),
        })
    }

    pub fn platform(&self) -> Platform {
        match self {
            Self::Reddit(_) => Platform::Reddit,
            Self::HackerNews(_) => Platform::HackerNews,
        }
    }

    pub async fn initialize(&self) -> Result<(), HarvestError> {
        match self {
            Self::Reddit(s) => s.initialize().await,
            Self::HackerNews(s) => s.initialize().await,
        }
    }

    pub async fn authenticate(&self) -> bool {
        match self {
            Self::Reddit(s) => s.authenticate().await,
            Self::HackerNews(s) => s.authenticate().await,
        }
    }

    pub fn is_auth_valid(&self) -> bool {
        match self {
            Self::Reddit(s) => s.is_auth_valid(),
            Self::HackerNews(s) => s.is_auth_valid(),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Self::Reddit(s) => s.capabilities(),
            Self::HackerNews(s) => s.capabilities(),
        }
    }

    pub async fn scrape_category(&self, category: &str, options: &ScrapeOptions) -> ScrapeResult {
        match self {
            Self::Reddit(s) => s.scrape_category(category, options).await,
            Self::HackerNews(s) => s.scrape_category(category, options).await,
        }
    }

    pub async fn scrape_post(&self, id: &str) -> Result<Option<ForumPost>, HarvestError> {
        match self {
            Self::Reddit(s) => s.scrape_post(id).await,
            Self::HackerNews(s) => s.scrape_post(id).await,
        }
    }

    pub async fn scrape_comments(&self, post_id: &str, options: &ScrapeOptions) -> ScrapeResult {
        match self {
            Self::Reddit(s) => s.scrape_comments(post_id, options).await,
            Self::HackerNews(s) => s.scrape_comments(post_id, options).await,
        }
    }

    pub async fn scrape_user(&self, username: &str) -> Result<Option<User>, HarvestError> {
        match self {
            Self::Reddit(s) => s.scrape_user(username).await,
            Self::HackerNews(s) => s.scrape_user(username).await,
        }
    }

    pub async fn search(&self, query: &str, options: &ScrapeOptions) -> ScrapeResult {
        match self {
            Self::Reddit(s) => s.search(query, options).await,
            Self::HackerNews(s) => s.search(query, options).await,
        }
    }

    pub async fn get_trending(&self, options: &ScrapeOptions) -> ScrapeResult {
        match self {
            Self::Reddit(s) => s.get_trending(options).await,
            Self::HackerNews(s) => s.get_trending(options).await,
        }
    }

    pub async fn test_connection(&self) -> bool {
        match self {
            Self::Reddit(s) => s.test_connection().await,
            Self::HackerNews(s) => s.test_connection().await,
        }
    }
}

/// Applies the single-item failure policy
///
/// Absent, unreachable, throttled and circuit-refused items become `Ok(None)`;
/// everything else is returned as an error.
pub(crate) fn soften<T>(
    platform: Platform,
    context: &str,
    result: Result<Option<T>, HarvestError>,
) -> Result<Option<T>, HarvestError> {
    match result {
        Ok(value) => Ok(value),
        Err(err) => match classify(&err).code {
            ErrorCode::NotFound => {
                tracing::debug!(%platform, "{} not found", context);
                Ok(None)
            }
            ErrorCode::Network
            | ErrorCode::RateLimit
            | ErrorCode::CircuitOpen
            | ErrorCode::Cancelled => {
                tracing::warn!(%platform, error = %err, "{} unavailable", context);
                Ok(None)
            }
            _ => Err(err),
        },
    }
}

/// Scrapes the comment threads of `post_ids`, at most `max_concurrent` at a time,
/// and merges them into `result`
pub(crate) async fn attach_comments<F, Fut>(
    result: &mut ScrapeResultBuilder,
    post_ids: Vec<String>,
    max_concurrent: usize,
    scrape_comments: F,
) where
    F: Fn(String) -> Fut,
    Fut: Future<Output = ScrapeResult>,
{
    let threads: Vec<ScrapeResult> = stream::iter(post_ids)
        .map(scrape_comments)
        .buffered(max_concurrent.max(1))
        .collect()
        .await;

    for thread in threads {
        result.merge(thread);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found() -> HarvestError {
        HarvestError::NotFound {
            url: "https://example.com/item/1".to_string(),
        }
    }

    #[test]
    fn test_soften_absent_results() {
        let result: Result<Option<u32>, _> = soften(Platform::HackerNews, "item 1", Err(not_found()));
        assert_eq!(result.unwrap(), None);

        let result: Result<Option<u32>, _> = soften(
            Platform::HackerNews,
            "item 1",
            Err(HarvestError::Timeout {
                url: "https://example.com".to_string(),
            }),
        );
        assert_eq!(result.unwrap(), None);
    }

    #[test]
    fn test_soften_keeps_hard_failures() {
        let result: Result<Option<u32>, _> = soften(
            Platform::Reddit,
            "post x",
            Err(HarvestError::Validation("bad".to_string())),
        );
        assert!(matches!(result, Err(HarvestError::Validation(_))));

        let result: Result<Option<u32>, _> = soften(
            Platform::Reddit,
            "post x",
            Err(HarvestError::Auth {
                platform: "reddit".to_string(),
                message: "denied".to_string(),
            }),
        );
        assert!(matches!(result, Err(HarvestError::Auth { .. })));
    }

    #[test]
    fn test_scrapers_dispatch_by_platform() {
        let registry = Arc::new(ResilienceRegistry::default());
        let config = Config::default();

        for platform in Platform::ALL {
            let scraper = Scraper::new(platform, &config, Arc::clone(&registry)).unwrap();
            assert_eq!(scraper.platform(), platform);
        }

        let hn = Scraper::new(Platform::HackerNews, &config, registry).unwrap();
        assert!(!hn.capabilities().supports_pagination);
        assert!(hn.is_auth_valid());
    }
}
