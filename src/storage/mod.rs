//! Storage module for persisting scrape results
//!
//! Results are recorded per run:
//! - SQLite database initialization and schema management
//! - Upserts of posts, comments and users keyed by platform identity
//! - Collected errors appended to the run that produced them

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{ResultSink, StorageError, StorageResult};

use crate::model::{Platform, ResultCounts, ScrapeResult};
use crate::HarvestError;

use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// Represents a stored scrape run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub platform: Platform,
    pub command: String,
    pub config_hash: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: RunStatus,
    pub counts: ResultCounts,
}

/// Status of a scrape run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    /// Finished with collected errors
    Partial,
    Cancelled,
}

impl RunStatus {
    /// Final status for a run that stored `result`
    pub fn for_result(result: &ScrapeResult) -> Self {
        if result.metadata().cancelled {
            Self::Cancelled
        } else if result.is_partial() {
            Self::Partial
        } else {
            Self::Completed
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "partial" => Some(Self::Partial),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}
