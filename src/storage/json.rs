//! JSON interchange in the legacy on-disk layout
//!
//! `source_files.json`, `block_map.json` and `failed_urls.json` are what
//! downstream diff tooling reads, and `failed_urls.json` doubles as a retry
//! target list.

use crate::model::{ContentBlock, Environment, FailureRecord};
use crate::storage::Storage;
use crate::QaError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const SOURCE_FILES_FILE: &str = "source_files.json";
pub const BLOCK_MAP_FILE: &str = "block_map.json";
pub const FAILED_URLS_FILE: &str = "failed_urls.json";

/// One entry of `failed_urls.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FailedUrlEntry {
    url: String,
    environment: Environment,
    #[serde(alias = "error_message")]
    error: String,
    #[serde(default)]
    attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_failed_at: Option<DateTime<Utc>>,
}

impl From<&FailureRecord> for FailedUrlEntry {
    fn from(record: &FailureRecord) -> Self {
        Self {
            url: record.url.clone(),
            environment: record.environment,
            error: record.error_message.clone(),
            attempts: record.attempts,
            last_failed_at: record.last_failed_at,
        }
    }
}

impl From<FailedUrlEntry> for FailureRecord {
    fn from(entry: FailedUrlEntry) -> Self {
        Self {
            url: entry.url,
            environment: entry.environment,
            error_message: entry.error,
            attempts: entry.attempts,
            last_failed_at: entry.last_failed_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct BlockEntry<'a> {
    class_names: &'a [String],
    urls: &'a BTreeSet<String>,
}

/// Counts of what an export wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub source_file_urls: usize,
    pub blocks: usize,
    pub failures: usize,
}

/// Exports the log store and failure ledger to `dir`
///
/// Each file is written to a temporary sibling first and renamed into place,
/// so a reader sees either the previous export or the new one.
pub fn export_logs<S: Storage + ?Sized>(storage: &S, dir: &Path) -> Result<ExportSummary, QaError> {
    fs::create_dir_all(dir)?;

    let source_files = storage.all_source_files()?;
    let block_map: BTreeMap<String, ContentBlock> = storage.block_map()?;
    let failures = storage.pending(None)?;

    write_json_atomic(&dir.join(SOURCE_FILES_FILE), &source_files)?;

    let blocks: BTreeMap<&str, BlockEntry<'_>> = block_map
        .iter()
        .map(|(hash, block)| {
            (
                hash.as_str(),
                BlockEntry {
                    class_names: &block.class_names,
                    urls: &block.urls,
                },
            )
        })
        .collect();
    write_json_atomic(&dir.join(BLOCK_MAP_FILE), &blocks)?;

    let entries: Vec<FailedUrlEntry> = failures.iter().map(FailedUrlEntry::from).collect();
    write_json_atomic(&dir.join(FAILED_URLS_FILE), &entries)?;

    let summary = ExportSummary {
        source_file_urls: source_files.len(),
        blocks: block_map.len(),
        failures: entries.len(),
    };

    info!(
        "Exported {} urls, {} blocks, {} failures to {}",
        summary.source_file_urls,
        summary.blocks,
        summary.failures,
        dir.display()
    );

    Ok(summary)
}

/// Loads a `failed_urls.json` list as retry targets
///
/// Duplicate (url, environment) entries collapse to the first occurrence.
pub fn load_failed_urls(path: &Path) -> Result<Vec<FailureRecord>, QaError> {
    let content = fs::read_to_string(path)?;
    let entries: Vec<FailedUrlEntry> = serde_json::from_str(&content)?;

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert((entry.url.clone(), entry.environment)) {
            debug!("Skipping duplicate failed url {} ({})", entry.url, entry.environment);
            continue;
        }
        records.push(FailureRecord::from(entry));
    }

    debug!("Loaded {} failed urls from {}", records.len(), path.display());
    Ok(records)
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), QaError> {
    write_atomic(path, |file| {
        serde_json::to_writer_pretty(&mut *file, value)?;
        file.write_all(b"\n")?;
        Ok(())
    })
}

/// Writes `path` through a temporary sibling that is renamed into place
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> Result<(), QaError>
where
    F: FnOnce(&mut fs::File) -> Result<(), QaError>,
{
    let temp_path = temp_path_for(path);

    let result = (|| -> Result<(), QaError> {
        let mut file = fs::File::create(&temp_path)?;
        write(&mut file)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)?;
        Ok(())
    })();

    if result.is_err() && temp_path.exists() {
        if let Err(e) = fs::remove_file(&temp_path) {
            warn!("Failed to remove {}: {}", temp_path.display(), e);
        }
    }

    result
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
