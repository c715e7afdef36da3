//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the QA crawler database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mode TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    attempted INTEGER NOT NULL DEFAULT 0,
    succeeded INTEGER NOT NULL DEFAULT 0,
    still_failed INTEGER NOT NULL DEFAULT 0,
    recovered INTEGER NOT NULL DEFAULT 0
);

-- Failure ledger; id gives the retry order
CREATE TABLE IF NOT EXISTS failures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    environment TEXT NOT NULL,
    error_message TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 1,
    first_failed_at TEXT NOT NULL,
    last_failed_at TEXT NOT NULL,
    UNIQUE(url, environment)
);

CREATE INDEX IF NOT EXISTS idx_failures_environment ON failures(environment);

-- URLs with at least one successful crawl
CREATE TABLE IF NOT EXISTS crawled_pages (
    url TEXT PRIMARY KEY,
    last_success_at TEXT NOT NULL
);

-- Source files per URL (set semantics)
CREATE TABLE IF NOT EXISTS source_files (
    url TEXT NOT NULL REFERENCES crawled_pages(url) ON DELETE CASCADE,
    file TEXT NOT NULL,
    PRIMARY KEY (url, file)
);

-- Block map: content hash -> class names
CREATE TABLE IF NOT EXISTS blocks (
    hash TEXT PRIMARY KEY,
    class_names TEXT NOT NULL DEFAULT ''
);

-- Block map: content hash -> urls (set semantics)
CREATE TABLE IF NOT EXISTS block_urls (
    hash TEXT NOT NULL REFERENCES blocks(hash) ON DELETE CASCADE,
    url TEXT NOT NULL,
    PRIMARY KEY (hash, url)
);

CREATE INDEX IF NOT EXISTS idx_block_urls_url ON block_urls(url);

-- A hash never outlives its last url
CREATE TRIGGER IF NOT EXISTS prune_empty_blocks
AFTER DELETE ON block_urls
BEGIN
    DELETE FROM blocks
    WHERE hash = OLD.hash
      AND NOT EXISTS (SELECT 1 FROM block_urls WHERE hash = OLD.hash);
END;
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        let result = initialize_schema(&conn);

        assert!(result.is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let tables = vec![
            "runs",
            "failures",
            "crawled_pages",
            "source_files",
            "blocks",
            "block_urls",
        ];

        for table in tables {
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

    #[test]
    fn test_trigger_drops_orphaned_block() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO blocks (hash, class_names) VALUES ('h1', 'hero');
             INSERT INTO block_urls (hash, url) VALUES ('h1', 'https://a.example/');
             DELETE FROM block_urls WHERE hash = 'h1';",
        )
        .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
