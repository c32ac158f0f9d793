//! Hacker News scraper over the Firebase API, with search through Algolia
//!
//! The API has no pagination: story lists return every id at once, so queries
//! are satisfied by a single synthetic page with `has_more = false`. Items are
//! fetched one request each, in batches of `batch_size` concurrent calls.

mod client;
mod parse;

pub use client::HackerNewsClient;
pub use parse::{html_to_text, story_list, validate_item_id, validate_username};

use crate::config::Config;
use crate::model::{
    Capabilities, ForumPost, Platform, ScrapeOptions, ScrapeResult, ScrapeResultBuilder, SortBy,
    User,
};
use crate::pagination::single_page;
use crate::platforms::http::build_http_client;
use crate::platforms::{attach_comments, soften};
use crate::resilience::ErrorHandler;
use crate::thread::{FetchedComment, ThreadTraversal};
use crate::HarvestError;
use futures::future::join_all;
use parse::{HnUser, Item, SearchResponse};
use std::collections::HashMap;

/// Ids returned by a story list endpoint
const MAX_PER_REQUEST: usize = 500;

/// Algolia's `hitsPerPage` ceiling
const MAX_SEARCH_HITS: usize = 1000;

pub struct HackerNewsScraper {
    client: HackerNewsClient,
    handler: ErrorHandler,
    batch_size: usize,
    max_concurrent: usize,
}

impl HackerNewsScraper {
    pub fn new(config: &Config, handler: ErrorHandler) -> Result<Self, HarvestError> {
        let http = build_http_client(&config.client)?;
        Ok(Self {
            client: HackerNewsClient::new(http, &config.hackernews),
            handler,
            batch_size: config.client.batch_size.max(1),
            max_concurrent: config.client.max_concurrent.max(1),
        })
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_comment_threads: true,
            supports_user_profiles: true,
            supports_search: true,
            supports_categories: true,
            supports_pagination: false,
            supports_realtime: false,
            // Threads are unbounded upstream
            max_comment_depth: u32::MAX,
            max_items_per_request: MAX_PER_REQUEST,
        }
    }

    pub async fn initialize(&self) -> Result<(), HarvestError> {
        Ok(())
    }

    /// The API is public; there is nothing to authenticate
    pub async fn authenticate(&self) -> bool {
        true
    }

    pub fn is_auth_valid(&self) -> bool {
        true
    }

    async fn fetch_item(&self, id: u64) -> Result<Option<Item>, HarvestError> {
        let path = format!("item/{}", id);
        self.handler
            .execute("get_item", || self.client.get_json::<Option<Item>>(&path))
            .await
    }

    pub async fn scrape_category(&self, category: &str, options: &ScrapeOptions) -> ScrapeResult {
        let mut result = ScrapeResultBuilder::new(Platform::HackerNews);
        let list = match story_list(category) {
            Ok(list) => list,
            Err(err) => {
                result.record_error(&format!("category {}", category), &err);
                return result.finish();
            }
        };

        let operation = format!("scrape_category({})", list);
        let ids = match self
            .handler
            .execute(&operation, || self.client.get_json::<Vec<u64>>(list))
            .await
        {
            Ok(ids) => ids,
            Err(err) => {
                result.record_error(&operation, &err);
                return result.finish();
            }
        };

        let label = list.trim_end_matches("stories");
        let page = single_page(ids, options.limit);
        self.fill_posts(&mut result, page.items, Some(label), options)
            .await;
        result.finish()
    }

    pub async fn get_trending(&self, options: &ScrapeOptions) -> ScrapeResult {
        self.scrape_category("top", options).await
    }

    /// Fetches `ids` as posts and, when requested, their comment threads
    async fn fill_posts(
        &self,
        result: &mut ScrapeResultBuilder,
        ids: Vec<u64>,
        category: Option<&str>,
        options: &ScrapeOptions,
    ) {
        let mut kids_by_post: HashMap<String, Vec<String>> = HashMap::new();

        for batch in ids.chunks(self.batch_size) {
            if options.is_cancelled() {
                result.mark_cancelled();
                break;
            }

            let items = join_all(batch.iter().map(|id| self.fetch_item(*id))).await;
            for (id, item) in batch.iter().zip(items) {
                match item {
                    Ok(Some(item)) => {
                        let kids = item.kid_ids();
                        match parse::item_to_post(item, category) {
                            Some(post) => {
                                kids_by_post.insert(post.id.clone(), kids);
                                result.push_post(post);
                            }
                            None => tracing::debug!(id, "Skipping deleted, dead or non-story item"),
                        }
                    }
                    Ok(None) => tracing::debug!(id, "Item does not exist"),
                    Err(err) => result.record_error(&format!("item {}", id), &err),
                }
            }
        }

        if options.include_comments && !kids_by_post.is_empty() && !options.is_cancelled() {
            let post_ids: Vec<String> = ids
                .iter()
                .map(u64::to_string)
                .filter(|id| kids_by_post.contains_key(id))
                .collect();
            let kids_by_post = &kids_by_post;

            attach_comments(result, post_ids, self.max_concurrent, |id| async move {
                let kids = kids_by_post.get(&id).cloned().unwrap_or_default();
                self.thread_result(&id, kids, options).await
            })
            .await;
        }
    }

    pub async fn scrape_post(&self, id: &str) -> Result<Option<ForumPost>, HarvestError> {
        let id = validate_item_id(id)?;
        let result = self
            .fetch_item(id)
            .await
            .map(|item| item.and_then(|item| parse::item_to_post(item, None)));
        soften(Platform::HackerNews, &format!("item {}", id), result)
    }

    pub async fn scrape_comments(&self, post_id: &str, options: &ScrapeOptions) -> ScrapeResult {
        let mut result = ScrapeResultBuilder::new(Platform::HackerNews);
        let context = format!("comments of {}", post_id);

        let id = match validate_item_id(post_id) {
            Ok(id) => id,
            Err(err) => {
                result.record_error(&context, &err);
                return result.finish();
            }
        };
        if options.is_cancelled() {
            result.mark_cancelled();
            return result.finish();
        }

        match self.fetch_item(id).await {
            Ok(Some(item)) if item.is_visible() => {
                let thread = self.thread_result(&id.to_string(), item.kid_ids(), options).await;
                result.merge(thread);
            }
            Ok(_) => tracing::debug!(id, "No visible item, no comments"),
            Err(err) => result.record_error(&context, &err),
        }
        result.finish()
    }

    /// Breadth-first fetch of the thread below `post_id`
    async fn thread_result(&self, post_id: &str, kids: Vec<String>, options: &ScrapeOptions) -> ScrapeResult {
        let mut result = ScrapeResultBuilder::new(Platform::HackerNews);
        let traversal = ThreadTraversal::new(options.max_depth, self.batch_size);

        let fetch = traversal
            .fetch(kids, &options.cancel, |id| self.fetch_comment(id, post_id))
            .await;

        tracing::debug!(
            post = post_id,
            comments = fetch.comments.len(),
            requests = fetch.requests,
            "Fetched comment thread"
        );

        result.extend_comments(fetch.comments);
        for (id, err) in &fetch.failures {
            result.record_error(&format!("comment {}", id), err);
        }
        if fetch.cancelled {
            result.mark_cancelled();
        }
        result.finish()
    }

    async fn fetch_comment(&self, id: String, post_id: &str) -> Result<Option<FetchedComment>, HarvestError> {
        let id = validate_item_id(&id)?;
        let item = match self.fetch_item(id).await? {
            Some(item) => item,
            None => return Ok(None),
        };

        Ok(Some(FetchedComment {
            comment: parse::item_to_comment(&item, post_id),
            kids: item.kid_ids(),
        }))
    }

    pub async fn scrape_user(&self, username: &str) -> Result<Option<User>, HarvestError> {
        let name = validate_username(username)?;
        let path = format!("user/{}", name);

        let result = self
            .handler
            .execute(&format!("scrape_user({})", name), || {
                self.client.get_json::<Option<HnUser>>(&path)
            })
            .await
            .map(|user| user.map(parse::hn_user));
        soften(Platform::HackerNews, &format!("user {}", name), result)
    }

    /// Full-text search through Algolia, as a single page
    pub async fn search(&self, query: &str, options: &ScrapeOptions) -> ScrapeResult {
        let mut result = ScrapeResultBuilder::new(Platform::HackerNews);
        let query = query.trim();
        if query.is_empty() {
            result.record_error("search", &HarvestError::Validation("empty search query".to_string()));
            return result.finish();
        }

        let endpoint = match options.sort_by {
            SortBy::New => "search_by_date",
            _ => "search",
        };
        let params = [
            ("query", query.to_string()),
            ("tags", "story".to_string()),
            ("hitsPerPage", options.limit.min(MAX_SEARCH_HITS).to_string()),
        ];

        let response = self
            .handler
            .execute("search", || {
                self.client.search_json::<SearchResponse>(endpoint, &params)
            })
            .await;

        match response {
            Ok(response) => {
                let posts: Vec<ForumPost> = response.hits.into_iter().map(parse::hit_to_post).collect();
                let page = single_page(posts, options.limit);
                let post_ids: Vec<String> = page.items.iter().map(|p| p.id.clone()).collect();
                result.extend_posts(page.items);

                if options.include_comments && !post_ids.is_empty() {
                    attach_comments(&mut result, post_ids, self.max_concurrent, |id| async move {
                        self.scrape_comments(&id, options).await
                    })
                    .await;
                }
            }
            Err(err) => result.record_error("search", &err),
        }
        result.finish()
    }

    pub async fn test_connection(&self) -> bool {
        match self
            .handler
            .execute("test_connection", || self.client.get_json::<u64>("maxitem"))
            .await
        {
            Ok(max_item) => {
                tracing::debug!(max_item, "Hacker News reachable");
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "Hacker News connection test failed");
                false
            }
        }
    }
}
