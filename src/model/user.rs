use crate::model::{Metadata, Platform};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A platform-scoped user profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Platform user id (equal to the username on Hacker News)
    pub id: String,
    pub username: String,
    pub karma: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub platform: Platform,
    #[serde(default)]
    pub metadata: Metadata,
}
