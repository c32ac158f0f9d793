//! Common entity model shared by every platform
//!
//! Platform parsers normalize their native payloads into these types:
//!
//! - `ForumPost`: a submission / story
//! - `Comment`: a node of a reconstructed comment thread
//! - `User`: a platform-scoped user profile
//! - `ScrapeResult`: the aggregated, immutable outcome of one scrape operation

mod comment;
mod post;
mod result;
mod user;

pub use comment::Comment;
pub use post::ForumPost;
pub use result::{ResultCounts, ResultMetadata, ScrapeError, ScrapeResult, ScrapeResultBuilder};
pub use user::User;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

/// Opaque key/value bag carried by posts and users
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Platforms supported by the harvester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Reddit,
    HackerNews,
}

impl Platform {
    /// All platforms, in a stable order
    pub const ALL: [Platform; 2] = [Platform::Reddit, Platform::HackerNews];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reddit => "reddit",
            Self::HackerNews => "hackernews",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reddit" => Ok(Self::Reddit),
            "hackernews" | "hacker-news" | "hn" => Ok(Self::HackerNews),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

/// Listing sort order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Hot,
    New,
    Top,
    Rising,
    Controversial,
    Relevance,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::New => "new",
            Self::Top => "top",
            Self::Rising => "rising",
            Self::Controversial => "controversial",
            Self::Relevance => "relevance",
        }
    }
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hot" => Ok(Self::Hot),
            "new" => Ok(Self::New),
            "top" => Ok(Self::Top),
            "rising" => Ok(Self::Rising),
            "controversial" => Ok(Self::Controversial),
            "relevance" => Ok(Self::Relevance),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

/// Time window for `top`/`controversial` listings and search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::All => "all",
        }
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "all" => Ok(Self::All),
            other => Err(format!("unknown time range '{}'", other)),
        }
    }
}

/// Options recognized by every scrape operation
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Total number of items requested
    pub limit: usize,

    pub sort_by: SortBy,

    pub time_range: TimeRange,

    /// Fetch comment threads for every scraped post
    pub include_comments: bool,

    /// Maximum comment depth (top-level comments are depth 0)
    pub max_depth: u32,

    /// Opaque cursor to resume a previous multi-page query
    pub cursor: Option<String>,

    /// Upper bound on pages issued by a single query
    pub max_pages: usize,

    /// Abort signal checked between pages and batches
    pub cancel: CancellationToken,
}

impl ScrapeOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Key fragment identifying the query shape (used for caching)
    pub fn cache_fragment(&self) -> String {
        format!(
            "limit={}&sort={}&t={}&comments={}&depth={}&pages={}&cursor={}",
            self.limit,
            self.sort_by.as_str(),
            self.time_range.as_str(),
            self.include_comments,
            self.max_depth,
            self.max_pages,
            self.cursor.as_deref().unwrap_or("")
        )
    }
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            limit: 25,
            sort_by: SortBy::default(),
            time_range: TimeRange::default(),
            include_comments: false,
            max_depth: 10,
            cursor: None,
            max_pages: 10,
            cancel: CancellationToken::new(),
        }
    }
}

/// Capability declaration of a platform scraper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub supports_comment_threads: bool,
    pub supports_user_profiles: bool,
    pub supports_search: bool,
    pub supports_categories: bool,
    pub supports_pagination: bool,
    pub supports_realtime: bool,
    pub max_comment_depth: u32,
    pub max_items_per_request: usize,
}
