//! Merge engine
//!
//! Folds one batch of crawl results into the log store and the failure
//! ledger. Successes union their artifacts and clear any stale failure for
//! the same (url, environment); failures upsert a ledger record and leave the
//! log store untouched.

use crate::model::{CrawlOutcome, CrawlResult, Environment, FailureRecord};
use crate::storage::{FailureLedger, LogStore, SqliteStorage, StorageResult};
use std::collections::HashSet;
use tracing::{debug, warn};

/// What a merge did with each result of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Successful results folded into the log store
    pub succeeded: usize,

    /// Failed results recorded in the ledger
    pub failed: usize,

    /// Results skipped as structurally invalid
    pub malformed: usize,

    /// Ledger records removed by a success
    pub cleared: usize,

    /// Failures ignored because the same key already succeeded in this batch
    pub superseded: usize,
}

impl MergeReport {
    /// Adds another report's counts to this one
    pub fn absorb(&mut self, other: &MergeReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.malformed += other.malformed;
        self.cleared += other.cleared;
        self.superseded += other.superseded;
    }
}

/// Merges `results` into `store`, in input order
///
/// Within one call a success for a key dominates: a failure for a key that
/// already succeeded earlier in `results` is not recorded. Malformed results
/// are logged and skipped. A storage error aborts the merge and is returned;
/// callers that need all-or-nothing semantics run this inside a batch
/// transaction (see [`merge_batch`]).
pub fn merge<T>(results: &[CrawlResult], store: &mut T) -> StorageResult<MergeReport>
where
    T: FailureLedger + LogStore + ?Sized,
{
    let mut report = MergeReport::default();
    let mut succeeded: HashSet<(&str, Environment)> = HashSet::new();

    for result in results {
        if let Err(e) = result.validate() {
            warn!("Skipping result: {}", e);
            report.malformed += 1;
            continue;
        }

        match &result.outcome {
            CrawlOutcome::Success {
                source_files,
                blocks,
            } => {
                store.union_source_files(&result.url, source_files)?;
                for (hash, block) in blocks {
                    store.union_block(hash, block)?;
                }

                if store.clear(&result.url, result.environment)? {
                    debug!("Cleared failure for {} ({})", result.url, result.environment);
                    report.cleared += 1;
                }

                succeeded.insert(result.key());
                report.succeeded += 1;
            }
            CrawlOutcome::Failure { error_message } => {
                if succeeded.contains(&result.key()) {
                    debug!(
                        "Ignoring failure for {} ({}) after a success in the same batch: {}",
                        result.url, result.environment, error_message
                    );
                    report.superseded += 1;
                    continue;
                }

                store.record(&FailureRecord::new(
                    result.url.clone(),
                    result.environment,
                    error_message.clone(),
                ))?;
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Merges one batch atomically
///
/// Every write goes through a single transaction. On any storage error the
/// transaction is rolled back and the previously persisted state is left
/// exactly as it was.
pub fn merge_batch(
    storage: &mut SqliteStorage,
    results: &[CrawlResult],
) -> StorageResult<MergeReport> {
    let mut batch = storage.begin_batch()?;
    let report = merge(results, &mut batch)?;
    batch.commit()?;
    Ok(report)
}
