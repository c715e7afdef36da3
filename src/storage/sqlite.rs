//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.
//! Standalone calls on `SqliteStorage` run in autocommit mode and are durable
//! when they return; calls on a `SqliteBatch` share one IMMEDIATE transaction
//! that either commits as a whole or rolls back when dropped.

use crate::model::{ContentBlock, Environment, FailureRecord};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{FailureLedger, LogStore, Storage, StorageError, StorageResult};
use crate::storage::{RunMode, RunRecord, RunStatus, RunTotals};
use crate::QaError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// The parent directory of `path` is created if it does not exist.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(QaError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, QaError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // FULL sync: a ledger write must survive a crash once the call returns
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for tests and dry runs)
    pub fn new_in_memory() -> Result<Self, QaError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Starts a batch transaction
    ///
    /// The transaction takes the database write lock immediately, so only one
    /// batch merge can be in flight against the same database at a time.
    pub fn begin_batch(&mut self) -> StorageResult<SqliteBatch<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(SqliteBatch { tx })
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// A batch of ledger and log store writes applied all-or-nothing
pub struct SqliteBatch<'conn> {
    tx: Transaction<'conn>,
}

impl SqliteBatch<'_> {
    /// Commits every write made through this batch
    pub fn commit(self) -> StorageResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    fn connection(&self) -> &Connection {
        &self.tx
    }
}

// ===== Failure Ledger Queries =====

fn record_failure(conn: &Connection, failure: &FailureRecord) -> StorageResult<()> {
    let failed_at = failure.last_failed_at.unwrap_or_else(Utc::now).to_rfc3339();
    conn.execute(
        "INSERT INTO failures (url, environment, error_message, attempts, first_failed_at, last_failed_at)
         VALUES (?1, ?2, ?3, 1, ?4, ?4)
         ON CONFLICT(url, environment) DO UPDATE SET
             error_message = excluded.error_message,
             attempts = failures.attempts + 1,
             last_failed_at = excluded.last_failed_at",
        params![
            failure.url,
            failure.environment.to_db_string(),
            failure.error_message,
            failed_at
        ],
    )?;
    Ok(())
}

fn clear_failure(conn: &Connection, url: &str, environment: Environment) -> StorageResult<bool> {
    let removed = conn.execute(
        "DELETE FROM failures WHERE url = ?1 AND environment = ?2",
        params![url, environment.to_db_string()],
    )?;
    Ok(removed > 0)
}

fn pending_failures(
    conn: &Connection,
    environment: Option<Environment>,
) -> StorageResult<Vec<FailureRecord>> {
    let mut stmt = conn.prepare(
        "SELECT url, environment, error_message, attempts, last_failed_at
         FROM failures
         WHERE ?1 IS NULL OR environment = ?1
         ORDER BY id ASC",
    )?;

    let rows = stmt
        .query_map(params![environment.map(|e| e.to_db_string())], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(url, env, error_message, attempts, failed_at)| {
            let environment = Environment::from_db_string(&env)
                .ok_or_else(|| StorageError::UnknownEnvironment(env.clone()))?;
            Ok(FailureRecord {
                url,
                environment,
                error_message,
                attempts,
                last_failed_at: failed_at.parse::<DateTime<Utc>>().ok(),
            })
        })
        .collect()
}

fn count_failures(conn: &Connection, environment: Option<Environment>) -> StorageResult<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM failures WHERE ?1 IS NULL OR environment = ?1",
        params![environment.map(|e| e.to_db_string())],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

// ===== Log Store Queries =====

fn union_source_files(conn: &Connection, url: &str, files: &BTreeSet<String>) -> StorageResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO crawled_pages (url, last_success_at) VALUES (?1, ?2)
         ON CONFLICT(url) DO UPDATE SET last_success_at = excluded.last_success_at",
        params![url, now],
    )?;

    let mut stmt =
        conn.prepare_cached("INSERT OR IGNORE INTO source_files (url, file) VALUES (?1, ?2)")?;
    for file in files {
        stmt.execute(params![url, file])?;
    }

    Ok(())
}

fn union_block(conn: &Connection, hash: &str, block: &ContentBlock) -> StorageResult<()> {
    if block.urls.is_empty() {
        return Ok(());
    }

    // Latest non-empty class list wins
    conn.execute(
        "INSERT INTO blocks (hash, class_names) VALUES (?1, ?2)
         ON CONFLICT(hash) DO UPDATE SET class_names =
             CASE WHEN excluded.class_names = '' THEN blocks.class_names
                  ELSE excluded.class_names END",
        params![hash, block.class_names.join(" ")],
    )?;

    let mut stmt =
        conn.prepare_cached("INSERT OR IGNORE INTO block_urls (hash, url) VALUES (?1, ?2)")?;
    for url in &block.urls {
        stmt.execute(params![hash, url])?;
    }

    Ok(())
}

fn source_files_for(conn: &Connection, url: &str) -> StorageResult<Option<BTreeSet<String>>> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM crawled_pages WHERE url = ?1",
            params![url],
            |row| row.get(0),
        )
        .optional()?;

    if exists.is_none() {
        return Ok(None);
    }

    let mut stmt = conn.prepare("SELECT file FROM source_files WHERE url = ?1")?;
    let files = stmt
        .query_map(params![url], |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;

    Ok(Some(files))
}

fn block_for(conn: &Connection, hash: &str) -> StorageResult<Option<ContentBlock>> {
    let class_names: Option<String> = conn
        .query_row(
            "SELECT class_names FROM blocks WHERE hash = ?1",
            params![hash],
            |row| row.get(0),
        )
        .optional()?;

    let Some(class_names) = class_names else {
        return Ok(None);
    };

    let mut stmt = conn.prepare("SELECT url FROM block_urls WHERE hash = ?1")?;
    let urls = stmt
        .query_map(params![hash], |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;

    Ok(Some(ContentBlock {
        class_names: split_class_names(&class_names),
        urls,
    }))
}

fn prune_block_url(conn: &Connection, hash: &str, url: &str) -> StorageResult<bool> {
    // The prune_empty_blocks trigger drops the hash with its last url
    let removed = conn.execute(
        "DELETE FROM block_urls WHERE hash = ?1 AND url = ?2",
        params![hash, url],
    )?;
    Ok(removed > 0)
}

fn prune_url(conn: &Connection, url: &str) -> StorageResult<usize> {
    let removed = conn.execute("DELETE FROM block_urls WHERE url = ?1", params![url])?;
    conn.execute("DELETE FROM crawled_pages WHERE url = ?1", params![url])?;
    Ok(removed)
}

fn all_source_files(conn: &Connection) -> StorageResult<BTreeMap<String, BTreeSet<String>>> {
    let mut stmt = conn.prepare(
        "SELECT p.url, s.file
         FROM crawled_pages p
         LEFT JOIN source_files s ON s.url = p.url
         ORDER BY p.url",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
    })?;

    let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for row in rows {
        let (url, file) = row?;
        let files = map.entry(url).or_default();
        if let Some(file) = file {
            files.insert(file);
        }
    }

    Ok(map)
}

fn block_map(conn: &Connection) -> StorageResult<BTreeMap<String, ContentBlock>> {
    let mut stmt = conn.prepare(
        "SELECT b.hash, b.class_names, u.url
         FROM blocks b
         JOIN block_urls u ON u.hash = b.hash
         ORDER BY b.hash",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut map: BTreeMap<String, ContentBlock> = BTreeMap::new();
    for row in rows {
        let (hash, class_names, url) = row?;
        map.entry(hash)
            .or_insert_with(|| ContentBlock {
                class_names: split_class_names(&class_names),
                urls: BTreeSet::new(),
            })
            .urls
            .insert(url);
    }

    Ok(map)
}

fn split_class_names(joined: &str) -> Vec<String> {
    joined.split_whitespace().map(str::to_string).collect()
}

// Both handles expose the same ledger and log store; only the transaction
// scope differs.
macro_rules! impl_stores {
    ($ty:ty) => {
        impl FailureLedger for $ty {
            fn record(&mut self, failure: &FailureRecord) -> StorageResult<()> {
                record_failure(self.connection(), failure)
            }

            fn clear(&mut self, url: &str, environment: Environment) -> StorageResult<bool> {
                clear_failure(self.connection(), url, environment)
            }

            fn pending(
                &self,
                environment: Option<Environment>,
            ) -> StorageResult<Vec<FailureRecord>> {
                pending_failures(self.connection(), environment)
            }
        }

        impl LogStore for $ty {
            fn union_source_files(
                &mut self,
                url: &str,
                files: &BTreeSet<String>,
            ) -> StorageResult<()> {
                union_source_files(self.connection(), url, files)
            }

            fn union_block(&mut self, hash: &str, block: &ContentBlock) -> StorageResult<()> {
                union_block(self.connection(), hash, block)
            }

            fn source_files(&self, url: &str) -> StorageResult<Option<BTreeSet<String>>> {
                source_files_for(self.connection(), url)
            }

            fn block(&self, hash: &str) -> StorageResult<Option<ContentBlock>> {
                block_for(self.connection(), hash)
            }

            fn prune_block_url(&mut self, hash: &str, url: &str) -> StorageResult<bool> {
                prune_block_url(self.connection(), hash, url)
            }

            fn prune_url(&mut self, url: &str) -> StorageResult<usize> {
                prune_url(self.connection(), url)
            }

            fn all_source_files(&self) -> StorageResult<BTreeMap<String, BTreeSet<String>>> {
                all_source_files(self.connection())
            }

            fn block_map(&self) -> StorageResult<BTreeMap<String, ContentBlock>> {
                block_map(self.connection())
            }
        }
    };
}

impl_stores!(SqliteStorage);
impl_stores!(SqliteBatch<'_>);

// ===== Run Management =====

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        mode: RunMode::from_db_string(&row.get::<_, String>(1)?).unwrap_or(RunMode::Crawl),
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Running),
        totals: RunTotals {
            attempted: row.get::<_, i64>(6)? as u64,
            succeeded: row.get::<_, i64>(7)? as u64,
            still_failed: row.get::<_, i64>(8)? as u64,
            recovered: row.get::<_, i64>(9)? as u64,
        },
    })
}

const RUN_COLUMNS: &str = "id, mode, started_at, finished_at, config_hash, status,
     attempted, succeeded, still_failed, recovered";

impl Storage for SqliteStorage {
    fn create_run(&mut self, mode: RunMode, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (mode, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                mode.to_db_string(),
                now,
                config_hash,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
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
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, attempted = ?3, succeeded = ?4,
             still_failed = ?5, recovered = ?6 WHERE id = ?7",
            params![
                status.to_db_string(),
                now,
                totals.attempted as i64,
                totals.succeeded as i64,
                totals.still_failed as i64,
                totals.recovered as i64,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn count_crawled_pages(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM crawled_pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_blocks(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_failures(&self, environment: Option<Environment>) -> StorageResult<u64> {
        count_failures(&self.conn, environment)
    }
}
