//! Database schema definitions
//!
//! All timestamps are RFC 3339 text. Entities are keyed by their platform
//! identity so re-scraping the same content updates rows in place.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per stored scrape operation
CREATE TABLE IF NOT EXISTS scrape_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    platform TEXT NOT NULL,
    command TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    status TEXT NOT NULL,
    post_count INTEGER NOT NULL DEFAULT 0,
    comment_count INTEGER NOT NULL DEFAULT 0,
    user_count INTEGER NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS posts (
    platform TEXT NOT NULL,
    id TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT,
    author TEXT NOT NULL,
    author_id TEXT,
    url TEXT NOT NULL,
    score INTEGER NOT NULL,
    comment_count INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT,
    category TEXT,
    tags TEXT,
    metadata TEXT NOT NULL,
    first_run INTEGER NOT NULL REFERENCES scrape_runs(id),
    last_run INTEGER NOT NULL REFERENCES scrape_runs(id),
    PRIMARY KEY (platform, id)
);

CREATE INDEX IF NOT EXISTS idx_posts_category ON posts(platform, category);

-- `position` preserves thread order within a post
CREATE TABLE IF NOT EXISTS comments (
    platform TEXT NOT NULL,
    id TEXT NOT NULL,
    post_id TEXT NOT NULL,
    parent_id TEXT,
    depth INTEGER NOT NULL,
    position INTEGER NOT NULL,
    author TEXT NOT NULL,
    author_id TEXT,
    content TEXT NOT NULL,
    score INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT,
    last_run INTEGER NOT NULL REFERENCES scrape_runs(id),
    PRIMARY KEY (platform, id)
);

CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(platform, post_id, position);

CREATE TABLE IF NOT EXISTS users (
    platform TEXT NOT NULL,
    username TEXT NOT NULL,
    id TEXT NOT NULL,
    karma INTEGER NOT NULL,
    created_at TEXT,
    metadata TEXT NOT NULL,
    last_run INTEGER NOT NULL REFERENCES scrape_runs(id),
    PRIMARY KEY (platform, username)
);

CREATE TABLE IF NOT EXISTS scrape_errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES scrape_runs(id),
    platform TEXT NOT NULL,
    code TEXT NOT NULL,
    message TEXT NOT NULL,
    retryable INTEGER NOT NULL,
    details TEXT,
    occurred_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scrape_errors_run ON scrape_errors(run_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
        assert_eq!(get_schema_version(), 1);
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["scrape_runs", "posts", "comments", "users", "scrape_errors"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
