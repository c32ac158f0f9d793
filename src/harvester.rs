//! Harvester: the entry point tying scrapers, cache and storage together
//!
//! The harvester owns one scraper per platform, all sharing a single
//! resilience registry so circuit breakers and rate limiters are process-wide.
//! Listing queries are served through a read-through cache; results that
//! carry errors or were cut short by cancellation are never cached.

use crate::cache::{CacheManager, CacheStats};
use crate::config::Config;
use crate::model::{
    Capabilities, ForumPost, Platform, ScrapeOptions, ScrapeResult, ScrapeResultBuilder, User,
};
use crate::platforms::Scraper;
use crate::resilience::{CircuitBreakerState, ResilienceRegistry};
use crate::storage::ResultSink;
use crate::HarvestError;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Orchestrates scrape operations across platforms
pub struct Harvester {
    config: Config,
    config_hash: String,
    registry: Arc<ResilienceRegistry>,
    reddit: Scraper,
    hackernews: Scraper,
    cache: CacheManager<ScrapeResult>,
    sink: Option<Mutex<Box<dyn ResultSink + Send>>>,
}

impl Harvester {
    /// Creates a harvester with one scraper per platform
    pub fn new(config: Config) -> Result<Self, HarvestError> {
        let registry = Arc::new(ResilienceRegistry::new(config.circuit_breaker_config()));
        let reddit = Scraper::new(Platform::Reddit, &config, Arc::clone(&registry))?;
        let hackernews = Scraper::new(Platform::HackerNews, &config, Arc::clone(&registry))?;
        let cache = CacheManager::from_config(&config.cache);

        Ok(Self {
            config,
            config_hash: String::new(),
            registry,
            reddit,
            hackernews,
            cache,
            sink: None,
        })
    }

    /// Records `hash` with every run handed to the sink
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    /// Attaches a persistence sink
    pub fn with_sink(mut self, sink: Box<dyn ResultSink + Send>) -> Self {
        self.sink = Some(Mutex::new(sink));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ResilienceRegistry> {
        &self.registry
    }

    pub fn scraper(&self, platform: Platform) -> &Scraper {
        match platform {
            Platform::Reddit => &self.reddit,
            Platform::HackerNews => &self.hackernews,
        }
    }

    pub fn capabilities(&self, platform: Platform) -> Capabilities {
        self.scraper(platform).capabilities()
    }

    pub async fn initialize(&self, platform: Platform) -> Result<(), HarvestError> {
        self.scraper(platform).initialize().await
    }

    pub async fn test_connection(&self, platform: Platform) -> bool {
        self.scraper(platform).test_connection().await
    }

    fn cache_key(platform: Platform, operation: &str, argument: &str, options: &ScrapeOptions) -> String {
        format!("{}:{}:{}:{}", platform, operation, argument, options.cache_fragment())
    }

    fn is_cacheable(result: &ScrapeResult) -> bool {
        !result.is_partial() && !result.metadata().cancelled
    }

    pub async fn scrape_category(
        &self,
        platform: Platform,
        category: &str,
        options: &ScrapeOptions,
    ) -> ScrapeResult {
        let key = Self::cache_key(platform, "category", category, options);
        self.cache
            .fetch_if(
                &key,
                None,
                || self.scraper(platform).scrape_category(category, options),
                Self::is_cacheable,
            )
            .await
    }

    pub async fn get_trending(&self, platform: Platform, options: &ScrapeOptions) -> ScrapeResult {
        let key = Self::cache_key(platform, "trending", "", options);
        self.cache
            .fetch_if(
                &key,
                None,
                || self.scraper(platform).get_trending(options),
                Self::is_cacheable,
            )
            .await
    }

    pub async fn search(&self, platform: Platform, query: &str, options: &ScrapeOptions) -> ScrapeResult {
        let key = Self::cache_key(platform, "search", query.trim(), options);
        self.cache
            .fetch_if(
                &key,
                None,
                || self.scraper(platform).search(query, options),
                Self::is_cacheable,
            )
            .await
    }

    pub async fn scrape_post(&self, platform: Platform, id: &str) -> Result<Option<ForumPost>, HarvestError> {
        self.scraper(platform).scrape_post(id).await
    }

    pub async fn scrape_comments(
        &self,
        platform: Platform,
        post_id: &str,
        options: &ScrapeOptions,
    ) -> ScrapeResult {
        self.scraper(platform).scrape_comments(post_id, options).await
    }

    pub async fn scrape_user(&self, platform: Platform, username: &str) -> Result<Option<User>, HarvestError> {
        self.scraper(platform).scrape_user(username).await
    }

    /// Fetches several profiles, at most `max-concurrent` at a time
    ///
    /// Repeated names are requested once; users in the result are unique by
    /// `(platform, username)`.
    pub async fn scrape_users(
        &self,
        platform: Platform,
        usernames: &[String],
        options: &ScrapeOptions,
    ) -> ScrapeResult {
        let scraper = self.scraper(platform);
        let mut result = ScrapeResultBuilder::new(platform);

        let mut requested = HashSet::new();
        let names: Vec<&str> = usernames
            .iter()
            .map(|name| name.trim())
            .filter(|name| requested.insert(*name))
            .collect();

        let outcomes: Vec<_> = stream::iter(names)
            .map(|name| async move {
                if options.is_cancelled() {
                    return (name, None);
                }
                (name, Some(scraper.scrape_user(name).await))
            })
            .buffered(self.config.client.max_concurrent.max(1))
            .collect()
            .await;

        for (name, outcome) in outcomes {
            match outcome {
                Some(Ok(Some(user))) => {
                    result.push_user(user);
                }
                Some(Ok(None)) => tracing::debug!(platform = %platform, user = name, "User not available"),
                Some(Err(err)) => result.record_error(&format!("user {}", name), &err),
                None => result.mark_cancelled(),
            }
        }
        result.finish()
    }

    /// Hands `result` to the persistence sink
    ///
    /// Returns the stored run id, or `None` when no sink is attached.
    pub fn persist(&self, command: &str, result: &ScrapeResult) -> Result<Option<i64>, HarvestError> {
        let Some(sink) = &self.sink else {
            return Ok(None);
        };

        let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
        let run_id = sink.persist(command, &self.config_hash, result)?;
        tracing::info!(
            run_id,
            platform = %result.platform(),
            posts = result.posts().len(),
            comments = result.comments().len(),
            users = result.users().len(),
            errors = result.errors().len(),
            "Persisted scrape result"
        );
        Ok(Some(run_id))
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    pub fn breaker_states(&self) -> Vec<CircuitBreakerState> {
        self.registry.breaker_states()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drops cache entries not read since the previous prune
    pub fn prune_cache(&self) -> usize {
        self.cache.prune()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
