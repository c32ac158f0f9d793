use crate::model::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A comment within a reconstructed thread
///
/// `parent_id` is `None` for top-level comments. `depth` is 0 for top-level
/// comments and for orphans whose declared parent is missing from the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub parent_id: Option<String>,
    pub depth: u32,
    pub author: String,
    pub author_id: Option<String>,
    pub content: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub platform: Platform,
}

impl Comment {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}
