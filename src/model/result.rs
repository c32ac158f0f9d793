//! Aggregated scrape results and collected errors

use crate::model::{Comment, ForumPost, Platform, User};
use crate::resilience::{classify, ErrorCode};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

/// A failure collected into a `ScrapeResult` instead of aborting the operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeError {
    pub code: ErrorCode,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub platform: Platform,
    pub retryable: bool,
    pub details: Option<serde_json::Value>,
}

impl ScrapeError {
    pub fn new(code: ErrorCode, platform: Platform, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            timestamp: Utc::now(),
            platform,
            retryable: code.is_retryable(),
            details: None,
        }
    }

    /// Classifies `error` and records it with a context prefix
    pub fn from_error(platform: Platform, context: &str, error: &HarvestError) -> Self {
        let classification = classify(error);
        Self {
            code: classification.code,
            message: format!("{}: {}", context, error),
            timestamp: Utc::now(),
            platform,
            retryable: classification.retryable,
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Per-entity counts of a result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultCounts {
    pub posts: usize,
    pub comments: usize,
    pub users: usize,
    pub errors: usize,
}

/// Metadata describing how a result was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub platform: Platform,
    pub scraped_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub counts: ResultCounts,
    /// Cursor to continue a paginated query, if the upstream has more
    pub next_cursor: Option<String>,
    pub has_more: bool,
    /// Set when the abort signal stopped the operation early
    pub cancelled: bool,
}

/// The immutable outcome of a scrape operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult {
    posts: Vec<ForumPost>,
    comments: Vec<Comment>,
    users: Vec<User>,
    errors: Vec<ScrapeError>,
    metadata: ResultMetadata,
}

impl ScrapeResult {
    /// An empty result for `platform`
    pub fn empty(platform: Platform) -> Self {
        ScrapeResultBuilder::new(platform).finish()
    }

    pub fn posts(&self) -> &[ForumPost] {
        &self.posts
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn errors(&self) -> &[ScrapeError] {
        &self.errors
    }

    pub fn metadata(&self) -> &ResultMetadata {
        &self.metadata
    }

    pub fn platform(&self) -> Platform {
        self.metadata.platform
    }

    /// True when at least one error was collected
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn into_parts(self) -> (Vec<ForumPost>, Vec<Comment>, Vec<User>, Vec<ScrapeError>) {
        (self.posts, self.comments, self.users, self.errors)
    }
}

/// Accumulates entities and errors while an operation runs
#[derive(Debug)]
pub struct ScrapeResultBuilder {
    platform: Platform,
    started: Instant,
    scraped_at: DateTime<Utc>,
    posts: Vec<ForumPost>,
    comments: Vec<Comment>,
    users: Vec<User>,
    seen_users: HashSet<(Platform, String)>,
    errors: Vec<ScrapeError>,
    next_cursor: Option<String>,
    has_more: bool,
    cancelled: bool,
}

impl ScrapeResultBuilder {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            started: Instant::now(),
            scraped_at: Utc::now(),
            posts: Vec::new(),
            comments: Vec::new(),
            users: Vec::new(),
            seen_users: HashSet::new(),
            errors: Vec::new(),
            next_cursor: None,
            has_more: false,
            cancelled: false,
        }
    }

    pub fn push_post(&mut self, post: ForumPost) {
        self.posts.push(post);
    }

    pub fn extend_posts(&mut self, posts: impl IntoIterator<Item = ForumPost>) {
        self.posts.extend(posts);
    }

    pub fn extend_comments(&mut self, comments: impl IntoIterator<Item = Comment>) {
        self.comments.extend(comments);
    }

    /// Adds a user unless one with the same `(platform, username)` is present
    ///
    /// Returns `true` if the user was added.
    pub fn push_user(&mut self, user: User) -> bool {
        if self.seen_users.insert((user.platform, user.username.clone())) {
            self.users.push(user);
            true
        } else {
            false
        }
    }

    pub fn push_error(&mut self, error: ScrapeError) {
        self.errors.push(error);
    }

    /// Classifies and collects `error`
    pub fn record_error(&mut self, context: &str, error: &HarvestError) {
        let scrape_error = ScrapeError::from_error(self.platform, context, error);
        tracing::warn!(
            platform = %self.platform,
            code = ?scrape_error.code,
            "{}",
            scrape_error.message
        );
        self.errors.push(scrape_error);
    }

    pub fn set_pagination(&mut self, next_cursor: Option<String>, has_more: bool) {
        self.next_cursor = next_cursor;
        self.has_more = has_more;
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Merges the entities and errors of a nested result
    pub fn merge(&mut self, other: ScrapeResult) {
        let cancelled = other.metadata.cancelled;
        let (posts, comments, users, errors) = other.into_parts();
        self.posts.extend(posts);
        self.comments.extend(comments);
        for user in users {
            self.push_user(user);
        }
        self.errors.extend(errors);
        self.cancelled |= cancelled;
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    pub fn finish(self) -> ScrapeResult {
        let counts = ResultCounts {
            posts: self.posts.len(),
            comments: self.comments.len(),
            users: self.users.len(),
            errors: self.errors.len(),
        };

        ScrapeResult {
            posts: self.posts,
            comments: self.comments,
            users: self.users,
            errors: self.errors,
            metadata: ResultMetadata {
                platform: self.platform,
                scraped_at: self.scraped_at,
                duration_ms: self.started.elapsed().as_millis() as u64,
                counts,
                next_cursor: self.next_cursor,
                has_more: self.has_more,
                cancelled: self.cancelled,
            },
        }
    }
}
