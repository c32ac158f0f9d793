//! Persistence sink trait and error types

use crate::model::{Comment, ForumPost, Platform, ScrapeError, ScrapeResult, User};
use crate::storage::{RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable destination for scrape results
///
/// Writes are upserts keyed by `(platform, id)` for posts and comments and
/// `(platform, username)` for users; collected errors are appended per run.
pub trait ResultSink {
    // ===== Run Management =====

    /// Opens a run for one scrape operation and returns its id
    fn create_run(&mut self, platform: Platform, command: &str, config_hash: &str)
        -> StorageResult<i64>;

    /// Records the entities and errors of `result` under `run_id`
    fn store_result(&mut self, run_id: i64, result: &ScrapeResult) -> StorageResult<()>;

    /// Closes a run with its final status
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Stores `result` as a complete run
    fn persist(&mut self, command: &str, config_hash: &str, result: &ScrapeResult) -> StorageResult<i64> {
        let run_id = self.create_run(result.platform(), command, config_hash)?;
        self.store_result(run_id, result)?;
        self.finish_run(run_id, RunStatus::for_result(result))?;
        Ok(run_id)
    }

    // ===== Queries =====

    fn get_post(&self, platform: Platform, id: &str) -> StorageResult<Option<ForumPost>>;

    /// Most recent posts, optionally restricted to one category
    fn get_posts(
        &self,
        platform: Platform,
        category: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<ForumPost>>;

    /// Comments of a post in stored thread order
    fn get_comments(&self, platform: Platform, post_id: &str) -> StorageResult<Vec<Comment>>;

    fn get_user(&self, platform: Platform, username: &str) -> StorageResult<Option<User>>;

    fn get_errors(&self, run_id: i64) -> StorageResult<Vec<ScrapeError>>;

    fn count_posts(&self, platform: Platform) -> StorageResult<u64>;

    fn count_comments(&self, platform: Platform) -> StorageResult<u64>;
}
