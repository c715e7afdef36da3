//! Storage traits and error types
//!
//! This module defines the contracts of the failure ledger and the log store,
//! and the storage backend trait that bundles them with run bookkeeping.

use crate::model::{ContentBlock, Environment, FailureRecord};
use crate::storage::{RunMode, RunRecord, RunStatus, RunTotals};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Errors that can occur during storage operations
///
/// Any storage error is a persistence failure: it is fatal for the current run.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Unknown environment in storage: {0}")]
    UnknownEnvironment(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable record of URLs that failed a crawl attempt
///
/// Records are unique per (url, environment). Every mutating call is persisted
/// before it returns, unless it runs inside a batch transaction, in which case
/// it becomes visible when the batch commits.
pub trait FailureLedger {
    /// Upserts a failure by (url, environment)
    ///
    /// An existing record keeps its position in the ledger; its error message is
    /// replaced and its attempt count incremented.
    fn record(&mut self, failure: &FailureRecord) -> StorageResult<()>;

    /// Removes the failure for (url, environment)
    ///
    /// Returns true if a record was removed.
    fn clear(&mut self, url: &str, environment: Environment) -> StorageResult<bool>;

    /// Returns pending failures in insertion order, optionally for one environment
    fn pending(&self, environment: Option<Environment>) -> StorageResult<Vec<FailureRecord>>;
}

/// Per-URL artifacts of successful crawls
///
/// Both artifact kinds have set semantics: merging the same data twice leaves
/// the store unchanged.
pub trait LogStore {
    /// Unions source files into the entry for `url`, creating the entry if absent
    fn union_source_files(&mut self, url: &str, files: &BTreeSet<String>) -> StorageResult<()>;

    /// Unions the block's urls into the block map entry for `hash`
    ///
    /// A block with no urls is ignored, so no hash is ever stored with an empty
    /// url set.
    fn union_block(&mut self, hash: &str, block: &ContentBlock) -> StorageResult<()>;

    /// Gets the source files recorded for a URL (None if the URL never succeeded)
    fn source_files(&self, url: &str) -> StorageResult<Option<BTreeSet<String>>>;

    /// Gets the block map entry for a hash
    fn block(&self, hash: &str) -> StorageResult<Option<ContentBlock>>;

    /// Removes `url` from the entry for `hash`, dropping the hash if no url remains
    ///
    /// Returns true if a reference was removed.
    fn prune_block_url(&mut self, hash: &str, url: &str) -> StorageResult<bool>;

    /// Removes every artifact recorded for `url`
    ///
    /// Returns the number of block references removed.
    fn prune_url(&mut self, url: &str) -> StorageResult<usize>;

    /// Loads the full source file map
    fn all_source_files(&self) -> StorageResult<BTreeMap<String, BTreeSet<String>>>;

    /// Loads the full block map
    fn block_map(&self) -> StorageResult<BTreeMap<String, ContentBlock>>;
}

/// Trait for storage backend implementations
pub trait Storage: FailureLedger + LogStore {
    // ===== Run Management =====

    /// Creates a new run in the `Running` state and returns its ID
    fn create_run(&mut self, mode: RunMode, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run finished with its final status and totals
    fn finish_run(&mut self, run_id: i64, status: RunStatus, totals: &RunTotals)
        -> StorageResult<()>;

    // ===== Statistics =====

    /// Counts URLs with at least one successful crawl
    fn count_crawled_pages(&self) -> StorageResult<u64>;

    /// Counts distinct content hashes in the block map
    fn count_blocks(&self) -> StorageResult<u64>;

    /// Counts pending failures, optionally for one environment
    fn count_failures(&self, environment: Option<Environment>) -> StorageResult<u64>;
}
