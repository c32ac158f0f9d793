use crate::model::{Metadata, Platform};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized forum post (Reddit submission, HN story/job/poll)
///
/// Identity is the pair `(platform, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumPost {
    pub id: String,
    pub platform: Platform,
    pub title: String,
    pub content: Option<String>,
    pub author: String,
    pub author_id: Option<String>,
    pub url: String,
    pub score: i64,
    pub comment_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ForumPost {
    /// Returns the `(platform, id)` identity key
    pub fn key(&self) -> (Platform, &str) {
        (self.platform, self.id.as_str())
    }
}
