//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ResultSink trait.

use crate::model::{Comment, ForumPost, Metadata, Platform, ResultCounts, ScrapeError, ScrapeResult, User};
use crate::resilience::ErrorCode;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ResultSink, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

// ===== Column conversions =====

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn optional_time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn optional_json_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn platform_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Platform> {
    let raw: String = row.get(idx)?;
    raw.parse::<Platform>().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("unknown platform '{}'", raw).into())
    })
}

fn to_db_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339()
}

const POST_COLUMNS: &str = "id, platform, title, content, author, author_id, url, score, \
     comment_count, created_at, updated_at, category, tags, metadata";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<ForumPost> {
    Ok(ForumPost {
        id: row.get(0)?,
        platform: platform_column(row, 1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        author: row.get(4)?,
        author_id: row.get(5)?,
        url: row.get(6)?,
        score: row.get(7)?,
        comment_count: row.get::<_, i64>(8)?.max(0) as u64,
        created_at: time_column(row, 9)?,
        updated_at: optional_time_column(row, 10)?,
        category: row.get(11)?,
        tags: optional_json_column(row, 12)?,
        metadata: json_column::<Metadata>(row, 13)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        platform: platform_column(row, 1)?,
        post_id: row.get(2)?,
        parent_id: row.get(3)?,
        depth: row.get(4)?,
        author: row.get(5)?,
        author_id: row.get(6)?,
        content: row.get(7)?,
        score: row.get(8)?,
        created_at: time_column(row, 9)?,
        updated_at: optional_time_column(row, 10)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: String = row.get(6)?;
    let count = |idx: usize| -> rusqlite::Result<usize> { Ok(row.get::<_, i64>(idx)?.max(0) as usize) };

    Ok(RunRecord {
        id: row.get(0)?,
        platform: platform_column(row, 1)?,
        command: row.get(2)?,
        config_hash: row.get(3)?,
        started_at: row.get(4)?,
        finished_at: row.get(5)?,
        status: RunStatus::from_db_string(&status).unwrap_or(RunStatus::Running),
        counts: ResultCounts {
            posts: count(7)?,
            comments: count(8)?,
            users: count(9)?,
            errors: count(10)?,
        },
    })
}

// ===== Upserts =====

fn upsert_post(tx: &Transaction<'_>, run_id: i64, post: &ForumPost) -> StorageResult<()> {
    let tags = post.tags.as_ref().map(serde_json::to_string).transpose()?;
    let metadata = serde_json::to_string(&post.metadata)?;

    tx.execute(
        "INSERT INTO posts (platform, id, title, content, author, author_id, url, score,
             comment_count, created_at, updated_at, category, tags, metadata, first_run, last_run)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)
         ON CONFLICT(platform, id) DO UPDATE SET
             title = excluded.title,
             content = excluded.content,
             author = excluded.author,
             author_id = excluded.author_id,
             url = excluded.url,
             score = excluded.score,
             comment_count = excluded.comment_count,
             updated_at = excluded.updated_at,
             category = COALESCE(excluded.category, posts.category),
             tags = excluded.tags,
             metadata = excluded.metadata,
             last_run = excluded.last_run",
        params![
            post.platform.as_str(),
            post.id,
            post.title,
            post.content,
            post.author,
            post.author_id,
            post.url,
            post.score,
            post.comment_count as i64,
            to_db_time(&post.created_at),
            post.updated_at.as_ref().map(to_db_time),
            post.category,
            tags,
            metadata,
            run_id,
        ],
    )?;
    Ok(())
}

fn upsert_comment(tx: &Transaction<'_>, run_id: i64, position: usize, comment: &Comment) -> StorageResult<()> {
    tx.execute(
        "INSERT INTO comments (platform, id, post_id, parent_id, depth, position, author,
             author_id, content, score, created_at, updated_at, last_run)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(platform, id) DO UPDATE SET
             parent_id = excluded.parent_id,
             depth = excluded.depth,
             position = excluded.position,
             author = excluded.author,
             author_id = excluded.author_id,
             content = excluded.content,
             score = excluded.score,
             updated_at = excluded.updated_at,
             last_run = excluded.last_run",
        params![
            comment.platform.as_str(),
            comment.id,
            comment.post_id,
            comment.parent_id,
            comment.depth,
            position as i64,
            comment.author,
            comment.author_id,
            comment.content,
            comment.score,
            to_db_time(&comment.created_at),
            comment.updated_at.as_ref().map(to_db_time),
            run_id,
        ],
    )?;
    Ok(())
}

fn upsert_user(tx: &Transaction<'_>, run_id: i64, user: &User) -> StorageResult<()> {
    tx.execute(
        "INSERT INTO users (platform, username, id, karma, created_at, metadata, last_run)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(platform, username) DO UPDATE SET
             id = excluded.id,
             karma = excluded.karma,
             created_at = excluded.created_at,
             metadata = excluded.metadata,
             last_run = excluded.last_run",
        params![
            user.platform.as_str(),
            user.username,
            user.id,
            user.karma,
            user.created_at.as_ref().map(to_db_time),
            serde_json::to_string(&user.metadata)?,
            run_id,
        ],
    )?;
    Ok(())
}

fn insert_error(tx: &Transaction<'_>, run_id: i64, error: &ScrapeError) -> StorageResult<()> {
    let details = error.details.as_ref().map(serde_json::to_string).transpose()?;
    tx.execute(
        "INSERT INTO scrape_errors (run_id, platform, code, message, retryable, details, occurred_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            run_id,
            error.platform.as_str(),
            error.code.as_str(),
            error.message,
            error.retryable,
            details,
            to_db_time(&error.timestamp),
        ],
    )?;
    Ok(())
}

impl ResultSink for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, platform: Platform, command: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO scrape_runs (platform, command, config_hash, started_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                platform.as_str(),
                command,
                config_hash,
                now,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn store_result(&mut self, run_id: i64, result: &ScrapeResult) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row("SELECT id FROM scrape_runs WHERE id = ?1", params![run_id], |row| row.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(StorageError::RunNotFound(run_id));
        }

        for post in result.posts() {
            upsert_post(&tx, run_id, post)?;
        }
        for (position, comment) in result.comments().iter().enumerate() {
            upsert_comment(&tx, run_id, position, comment)?;
        }
        for user in result.users() {
            upsert_user(&tx, run_id, user)?;
        }
        for error in result.errors() {
            insert_error(&tx, run_id, error)?;
        }

        let counts = result.metadata().counts;
        tx.execute(
            "UPDATE scrape_runs SET
                 post_count = post_count + ?1,
                 comment_count = comment_count + ?2,
                 user_count = user_count + ?3,
                 error_count = error_count + ?4
             WHERE id = ?5",
            params![
                counts.posts as i64,
                counts.comments as i64,
                counts.users as i64,
                counts.errors as i64,
                run_id
            ],
        )?;

        tx.commit()?;

        tracing::debug!(
            run_id,
            posts = counts.posts,
            comments = counts.comments,
            users = counts.users,
            errors = counts.errors,
            "Stored scrape result"
        );
        Ok(())
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE scrape_runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;

        if rows == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, platform, command, config_hash, started_at, finished_at, status,
                        post_count, comment_count, user_count, error_count
                 FROM scrape_runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, platform, command, config_hash, started_at, finished_at, status,
                        post_count, comment_count, user_count, error_count
                 FROM scrape_runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    // ===== Queries =====

    fn get_post(&self, platform: Platform, id: &str) -> StorageResult<Option<ForumPost>> {
        let sql = format!("SELECT {} FROM posts WHERE platform = ?1 AND id = ?2", POST_COLUMNS);
        let post = self
            .conn
            .query_row(&sql, params![platform.as_str(), id], post_from_row)
            .optional()?;
        Ok(post)
    }

    fn get_posts(
        &self,
        platform: Platform,
        category: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<ForumPost>> {
        let sql = format!(
            "SELECT {} FROM posts
             WHERE platform = ?1 AND (?2 IS NULL OR category = ?2)
             ORDER BY created_at DESC, id
             LIMIT ?3",
            POST_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let posts = stmt
            .query_map(params![platform.as_str(), category, limit as i64], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    fn get_comments(&self, platform: Platform, post_id: &str) -> StorageResult<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, platform, post_id, parent_id, depth, author, author_id, content, score,
                    created_at, updated_at
             FROM comments WHERE platform = ?1 AND post_id = ?2
             ORDER BY position",
        )?;
        let comments = stmt
            .query_map(params![platform.as_str(), post_id], comment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    fn get_user(&self, platform: Platform, username: &str) -> StorageResult<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, karma, created_at, platform, metadata
                 FROM users WHERE platform = ?1 AND username = ?2",
                params![platform.as_str(), username],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        karma: row.get(2)?,
                        created_at: optional_time_column(row, 3)?,
                        platform: platform_column(row, 4)?,
                        metadata: json_column::<Metadata>(row, 5)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    fn get_errors(&self, run_id: i64) -> StorageResult<Vec<ScrapeError>> {
        let mut stmt = self.conn.prepare(
            "SELECT platform, code, message, retryable, details, occurred_at
             FROM scrape_errors WHERE run_id = ?1 ORDER BY id",
        )?;
        let errors = stmt
            .query_map(params![run_id], |row| {
                let code: String = row.get(1)?;
                Ok(ScrapeError {
                    platform: platform_column(row, 0)?,
                    code: ErrorCode::from_db_string(&code).unwrap_or(ErrorCode::Permanent),
                    message: row.get(2)?,
                    retryable: row.get(3)?,
                    details: optional_json_column(row, 4)?,
                    timestamp: time_column(row, 5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(errors)
    }

    fn count_posts(&self, platform: Platform) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE platform = ?1",
            params![platform.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_comments(&self, platform: Platform) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE platform = ?1",
            params![platform.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
