//! Reddit scraper over the OAuth2 API
//!
//! Listings are paged with Reddit's opaque `after` cursors (at most 100 items
//! per request). Comment threads come back pre-nested in a single response
//! and are flattened into the common thread order.

mod client;
mod parse;

pub use client::RedditClient;
pub use parse::{validate_post_id, validate_subreddit, validate_username};

use crate::config::Config;
use crate::model::{
    Capabilities, ForumPost, Platform, ScrapeOptions, ScrapeResult, ScrapeResultBuilder, SortBy,
    User,
};
use crate::pagination::{Page, PaginationController};
use crate::platforms::http::build_http_client;
use crate::platforms::{attach_comments, soften};
use crate::resilience::ErrorHandler;
use crate::HarvestError;
use parse::{RawListing, Thing};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Mutex;

/// Listing page size ceiling
const MAX_PER_REQUEST: usize = 100;

/// Replies fetched per comment request
const COMMENT_LIMIT: usize = 500;

pub struct RedditScraper {
    client: RedditClient,
    handler: ErrorHandler,
    /// Serializes re-authentication between concurrent calls
    auth_lock: tokio::sync::Mutex<()>,
    max_concurrent: usize,
}

impl RedditScraper {
    pub fn new(config: &Config, handler: ErrorHandler) -> Result<Self, HarvestError> {
        let http = build_http_client(&config.client)?;
        Ok(Self {
            client: RedditClient::new(http, config.reddit.clone()),
            handler,
            auth_lock: tokio::sync::Mutex::new(()),
            max_concurrent: config.client.max_concurrent.max(1),
        })
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_comment_threads: true,
            supports_user_profiles: true,
            supports_search: true,
            supports_categories: true,
            supports_pagination: true,
            supports_realtime: false,
            max_comment_depth: 10,
            max_items_per_request: MAX_PER_REQUEST,
        }
    }

    /// Authenticates eagerly when credentials are configured
    pub async fn initialize(&self) -> Result<(), HarvestError> {
        if !self.client.has_credentials() {
            tracing::warn!("Reddit credentials not configured; API calls will fail");
            return Ok(());
        }
        self.ensure_authenticated().await
    }

    pub async fn authenticate(&self) -> bool {
        match self
            .handler
            .execute("authenticate", || self.client.request_token())
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "Reddit authentication failed");
                false
            }
        }
    }

    pub fn is_auth_valid(&self) -> bool {
        self.client.is_auth_valid()
    }

    /// Re-authenticates only when the current token is missing or expired
    async fn ensure_authenticated(&self) -> Result<(), HarvestError> {
        if self.client.is_auth_valid() {
            return Ok(());
        }

        let _guard = self.auth_lock.lock().await;
        // Another caller may have refreshed the token while we waited
        if self.client.is_auth_valid() {
            return Ok(());
        }
        self.handler
            .execute("authenticate", || self.client.request_token())
            .await
    }

    /// Authenticated GET through the resilience stack
    ///
    /// A 401 invalidates the token and triggers exactly one re-authentication
    /// and retry of the call.
    async fn api_get<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, HarvestError> {
        self.ensure_authenticated().await?;
        let call = || self.client.get_json::<T>(path, query);

        match self.handler.execute(operation, call).await {
            Err(HarvestError::Status { status: 401, .. }) => {
                tracing::info!(operation, "Access token rejected, re-authenticating");
                self.client.invalidate();
                self.ensure_authenticated().await?;
                self.handler.execute(operation, call).await
            }
            other => other,
        }
    }

    pub async fn scrape_category(&self, category: &str, options: &ScrapeOptions) -> ScrapeResult {
        let subreddit = match validate_subreddit(category) {
            Ok(name) => name,
            Err(err) => return self.rejected(&format!("category {}", category), &err),
        };

        let (sort, with_time) = listing_sort(options.sort_by);
        let mut query = Vec::new();
        if with_time {
            query.push(("t", options.time_range.as_str().to_string()));
        }

        self.listing_result(
            &format!("scrape_category({})", subreddit),
            &format!("/r/{}/{}", subreddit, sort),
            query,
            options,
        )
        .await
    }

    pub async fn get_trending(&self, options: &ScrapeOptions) -> ScrapeResult {
        let (sort, with_time) = listing_sort(options.sort_by);
        let mut query = Vec::new();
        if with_time {
            query.push(("t", options.time_range.as_str().to_string()));
        }

        self.listing_result("get_trending", &format!("/r/popular/{}", sort), query, options)
            .await
    }

    pub async fn search(&self, query: &str, options: &ScrapeOptions) -> ScrapeResult {
        let query = query.trim();
        if query.is_empty() {
            return self.rejected("search", &HarvestError::Validation("empty search query".to_string()));
        }

        let sort = match options.sort_by {
            SortBy::Hot => "hot",
            SortBy::New => "new",
            SortBy::Top => "top",
            _ => "relevance",
        };
        let params = vec![
            ("q", query.to_string()),
            ("sort", sort.to_string()),
            ("t", options.time_range.as_str().to_string()),
            ("type", "link".to_string()),
        ];

        self.listing_result("search", "/search", params, options).await
    }

    pub async fn scrape_post(&self, id: &str) -> Result<Option<ForumPost>, HarvestError> {
        let id = validate_post_id(id)?;
        let path = format!("/by_id/t3_{}", id);

        let result = self
            .api_get::<RawListing>(&format!("scrape_post({})", id), &path, &[])
            .await
            .and_then(|listing| parse::single_post(listing, &path));
        soften(Platform::Reddit, &format!("post {}", id), result)
    }

    pub async fn scrape_comments(&self, post_id: &str, options: &ScrapeOptions) -> ScrapeResult {
        let context = format!("comments of {}", post_id);
        let id = match validate_post_id(post_id) {
            Ok(id) => id,
            Err(err) => return self.rejected(&context, &err),
        };

        let mut result = ScrapeResultBuilder::new(Platform::Reddit);
        if options.is_cancelled() {
            result.mark_cancelled();
            return result.finish();
        }

        let path = format!("/comments/{}", id);
        let query = [
            ("depth", (options.max_depth + 1).to_string()),
            ("limit", COMMENT_LIMIT.to_string()),
            ("threaded", "true".to_string()),
        ];

        let response = self
            .api_get::<Vec<RawListing>>(&format!("scrape_comments({})", id), &path, &query)
            .await
            .and_then(|listings| parse::thread_comments(listings, &id, options.max_depth, &path));

        match response {
            Ok((comments, failures)) => {
                tracing::debug!(post = %id, comments = comments.len(), "Fetched comment thread");
                result.extend_comments(comments);
                for failure in &failures {
                    result.record_error(&context, failure);
                }
            }
            Err(err) => result.record_error(&context, &err),
        }
        result.finish()
    }

    pub async fn scrape_user(&self, username: &str) -> Result<Option<User>, HarvestError> {
        let name = validate_username(username)?;
        let path = format!("/user/{}/about", name);

        let result = self
            .api_get::<Thing<Value>>(&format!("scrape_user({})", name), &path, &[])
            .await
            .and_then(|thing| parse::user_about(thing, &path))
            .map(Some);
        soften(Platform::Reddit, &format!("user {}", name), result)
    }

    pub async fn test_connection(&self) -> bool {
        let query = [("limit", "1".to_string())];
        match self
            .api_get::<RawListing>("test_connection", "/r/popular/hot", &query)
            .await
        {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, "Reddit connection test failed");
                false
            }
        }
    }

    /// Pages through a post listing and optionally attaches comment threads
    async fn listing_result(
        &self,
        operation: &str,
        path: &str,
        base_query: Vec<(&'static str, String)>,
        options: &ScrapeOptions,
    ) -> ScrapeResult {
        let mut result = ScrapeResultBuilder::new(Platform::Reddit);
        let skipped = Mutex::new(Vec::new());
        let controller = PaginationController::new(options.limit, MAX_PER_REQUEST, options.max_pages);

        let collected = controller
            .collect(options.cursor.clone(), &options.cancel, |request| {
                let mut query = base_query.clone();
                query.push(("limit", request.page_size.to_string()));
                if let Some(after) = request.after {
                    query.push(("after", after));
                }
                let skipped = &skipped;

                async move {
                    let listing: RawListing = self.api_get(operation, path, &query).await?;
                    let after = listing.data.after.clone();
                    let before = listing.data.before.clone();
                    let received = listing.data.children.len();
                    let (items, failures) = parse::listing_posts(listing, path);
                    if !failures.is_empty() {
                        skipped
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner)
                            .extend(failures);
                    }
                    Ok(Page::new(items, after, before).with_received(received))
                }
            })
            .await;

        for failure in skipped.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner) {
            result.record_error(operation, &failure);
        }
        if let Some(err) = &collected.error {
            result.record_error(operation, err);
        }
        if collected.cancelled {
            result.mark_cancelled();
        }

        let has_more = collected.state.has_more;
        result.set_pagination(collected.state.after.filter(|_| has_more), has_more);

        let post_ids: Vec<String> = collected.items.iter().map(|p| p.id.clone()).collect();
        result.extend_posts(collected.items);

        if options.include_comments && !post_ids.is_empty() {
            attach_comments(&mut result, post_ids, self.max_concurrent, |id| async move {
                self.scrape_comments(&id, options).await
            })
            .await;
        }

        result.finish()
    }

    fn rejected(&self, context: &str, err: &HarvestError) -> ScrapeResult {
        let mut result = ScrapeResultBuilder::new(Platform::Reddit);
        result.record_error(context, err);
        result.finish()
    }
}

/// Listing path segment for `sort`, and whether it takes a `t=` range
fn listing_sort(sort: SortBy) -> (&'static str, bool) {
    match sort {
        SortBy::Hot | SortBy::Relevance => ("hot", false),
        SortBy::New => ("new", false),
        SortBy::Rising => ("rising", false),
        SortBy::Top => ("top", true),
        SortBy::Controversial => ("controversial", true),
    }
}
