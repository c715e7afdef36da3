//! Storage module for persisting crawl logs
//!
//! This module handles all persistence for the crawler, including:
//! - The failure ledger that drives retries
//! - The log store of source files and content block maps
//! - Atomic per-batch transactions used by the merge engine
//! - Run tracking
//! - JSON import/export in the legacy on-disk layout
//! - Per-page HTML snapshots

mod json;
mod schema;
mod snapshot;
mod sqlite;
mod traits;

pub use json::{export_logs, load_failed_urls, ExportSummary};
pub use snapshot::{snapshot_file_name, write_dom_snapshot};
pub use sqlite::{SqliteBatch, SqliteStorage};
pub use traits::{FailureLedger, LogStore, Storage, StorageError, StorageResult};

use crate::QaError;
use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, QaError> {
    SqliteStorage::new(path)
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub mode: RunMode,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub totals: RunTotals,
}

/// Aggregate counts stored with a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub attempted: u64,
    pub succeeded: u64,
    pub still_failed: u64,
    pub recovered: u64,
}

/// Where a run drew its targets from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Configured target list
    Crawl,
    /// Previously failed URLs
    Retry,
}

impl RunMode {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Crawl => "crawl",
            Self::Retry => "retry",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "crawl" => Some(Self::Crawl),
            "retry" => Some(Self::Retry),
            _ => None,
        }
    }
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
