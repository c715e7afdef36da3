//! Crawler coordinator - run orchestration logic
//!
//! This module drives one run through its phases:
//! - Loading targets from the chosen source
//! - Partitioning them into batches
//! - Executing each batch with bounded concurrency
//! - Merging each batch atomically into the log store and failure ledger
//! - Summarizing the run from the ledger before and after
//!
//! Cancellation is checked after every batch's merge, so an interrupted run
//! loses no merged work and the next run resumes from the persisted ledger.

use crate::config::CrawlerConfig;
use crate::crawler::executor::{execute_batch, CrawlExecutor};
use crate::crawler::merge::{merge_batch, MergeReport};
use crate::crawler::scheduler::partition;
use crate::crawler::targets::TargetSource;
use crate::model::Environment;
use crate::storage::{FailureLedger, RunMode, RunStatus, RunTotals, SqliteStorage, Storage};
use crate::QaError;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Shared flag used to stop a run between batches
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the run stop after the current batch
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Phases of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    LoadTargets,
    Schedule,
    ExecuteBatch,
    Merge,
    Done,
}

/// Per-environment outcome of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvironmentSummary {
    /// Distinct (url, environment) keys crawled this run
    pub attempted: usize,

    /// Attempted keys with no ledger record after the run
    pub succeeded: usize,

    /// Attempted keys still in the ledger after the run
    pub still_failed: usize,

    /// Attempted keys that were in the ledger before the run and are gone now
    pub recovered: usize,
}

/// Outcome of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub environments: BTreeMap<Environment, EnvironmentSummary>,

    /// Results skipped as malformed
    pub malformed: usize,

    /// Batches merged
    pub batches: usize,

    /// True if the run was cancelled before its last batch
    pub interrupted: bool,
}

impl RunSummary {
    /// Counts for one environment (zero if nothing was attempted there)
    pub fn environment(&self, environment: Environment) -> EnvironmentSummary {
        self.environments
            .get(&environment)
            .copied()
            .unwrap_or_default()
    }

    /// Totals across both environments, as stored with the run
    pub fn totals(&self) -> RunTotals {
        self.environments
            .values()
            .fold(RunTotals::default(), |mut totals, env| {
                totals.attempted += env.attempted as u64;
                totals.succeeded += env.succeeded as u64;
                totals.still_failed += env.still_failed as u64;
                totals.recovered += env.recovered as u64;
                totals
            })
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.interrupted {
            "interrupted"
        } else {
            "completed"
        };
        writeln!(f, "Run {} ({} batches)", status, self.batches)?;

        for environment in Environment::ALL {
            let env = self.environment(environment);
            writeln!(
                f,
                "  {:<13} attempted {:>5}  succeeded {:>5}  still failing {:>5}  recovered {:>5}",
                format!("{}:", environment),
                env.attempted,
                env.succeeded,
                env.still_failed,
                env.recovered
            )?;
        }

        if self.malformed > 0 {
            writeln!(f, "  malformed results skipped: {}", self.malformed)?;
        }

        Ok(())
    }
}

/// Main coordinator structure
pub struct Coordinator {
    storage: SqliteStorage,
    executor: Arc<dyn CrawlExecutor>,
    batch_size: usize,
    concurrency: usize,
    batch_delay: Duration,
    config_hash: String,
    cancel: CancellationFlag,
    phase: RunPhase,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `storage` - The log store and failure ledger
    /// * `executor` - Crawls individual targets
    /// * `config` - Batch size, concurrency and delay between batches
    pub fn new(
        storage: SqliteStorage,
        executor: Arc<dyn CrawlExecutor>,
        config: &CrawlerConfig,
    ) -> Self {
        Self {
            storage,
            executor,
            batch_size: config.batch_size as usize,
            concurrency: config.max_concurrent_pages_open as usize,
            batch_delay: Duration::from_millis(config.batch_delay),
            config_hash: String::new(),
            cancel: CancellationFlag::new(),
            phase: RunPhase::Done,
        }
    }

    /// Sets the configuration hash recorded with each run
    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = config_hash.into();
        self
    }

    /// Uses `cancel` to stop runs between batches
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub fn into_storage(self) -> SqliteStorage {
        self.storage
    }

    /// The phase the coordinator is in (Done when idle)
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Runs one crawl or retry pass over the targets of `source`
    ///
    /// The run is recorded in the runs table. A storage error marks the run
    /// failed and is returned; every batch merged before it stays persisted.
    pub async fn run(
        &mut self,
        mode: RunMode,
        source: &dyn TargetSource,
    ) -> Result<RunSummary, QaError> {
        let run_id = self.storage.create_run(mode, &self.config_hash)?;
        info!(
            "Starting {} run {} from {}",
            mode.to_db_string(),
            run_id,
            source.describe()
        );

        match self.execute(source).await {
            Ok(summary) => {
                let status = if summary.interrupted {
                    RunStatus::Interrupted
                } else {
                    RunStatus::Completed
                };
                self.storage.finish_run(run_id, status, &summary.totals())?;
                Ok(summary)
            }
            Err(e) => {
                self.phase = RunPhase::Done;
                if let Err(finish_err) =
                    self.storage
                        .finish_run(run_id, RunStatus::Failed, &RunTotals::default())
                {
                    warn!("Could not mark run {} as failed: {}", run_id, finish_err);
                }
                Err(e)
            }
        }
    }

    async fn execute(&mut self, source: &dyn TargetSource) -> Result<RunSummary, QaError> {
        let start_time = Instant::now();

        self.enter(RunPhase::LoadTargets);
        let targets = source.load(&self.storage)?;
        let failing_before = ledger_keys(&self.storage)?;

        if targets.is_empty() {
            info!("No targets to crawl");
            self.enter(RunPhase::Done);
            return Ok(RunSummary::default());
        }

        self.enter(RunPhase::Schedule);
        let batches = partition(&targets, self.batch_size);
        info!("Scheduled {} targets in {} batches", targets.len(), batches.len());

        let mut summary = RunSummary::default();
        let mut report = MergeReport::default();
        let mut attempted: Vec<(String, Environment)> = Vec::new();

        for (index, batch) in batches.iter().enumerate() {
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            self.enter(RunPhase::ExecuteBatch);
            info!(
                "Batch {}/{}: {} {} urls",
                index + 1,
                batches.len(),
                batch.len(),
                batch.environment
            );
            let results = execute_batch(self.executor.as_ref(), batch, self.concurrency).await;

            self.enter(RunPhase::Merge);
            let batch_report = merge_batch(&mut self.storage, &results)?;
            debug!(
                "Merged batch {}: {} succeeded, {} failed, {} malformed",
                index + 1,
                batch_report.succeeded,
                batch_report.failed,
                batch_report.malformed
            );
            report.absorb(&batch_report);
            summary.batches += 1;
            attempted.extend(
                batch
                    .urls
                    .iter()
                    .map(|url| (url.clone(), batch.environment)),
            );

            if self.cancel.is_cancelled() && index + 1 < batches.len() {
                warn!(
                    "Run cancelled after batch {}/{}; {} batches left for the next run",
                    index + 1,
                    batches.len(),
                    batches.len() - index - 1
                );
                summary.interrupted = true;
                break;
            }
        }

        self.enter(RunPhase::Done);

        let failing_after = ledger_keys(&self.storage)?;
        let mut seen = HashSet::new();
        for key in attempted {
            if !seen.insert(key.clone()) {
                continue;
            }

            let env = summary.environments.entry(key.1).or_default();
            env.attempted += 1;
            if failing_after.contains(&key) {
                env.still_failed += 1;
            } else {
                env.succeeded += 1;
                if failing_before.contains(&key) {
                    env.recovered += 1;
                }
            }
        }
        summary.malformed = report.malformed;

        info!(
            "Run finished in {:?}: {} batches, {} results merged",
            start_time.elapsed(),
            summary.batches,
            report.succeeded + report.failed
        );

        Ok(summary)
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!("Run phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }
}

fn ledger_keys(ledger: &dyn FailureLedger) -> Result<HashSet<(String, Environment)>, QaError> {
    Ok(ledger
        .pending(None)?
        .into_iter()
        .map(|record| (record.url, record.environment))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::targets::{ConfiguredTargets, LedgerTargets};
    use crate::config::EnvironmentsConfig;
    use crate::model::{CrawlResult, FailureRecord, Target};
    use crate::storage::LogStore;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Fails every URL containing one of `failing`, succeeds otherwise
    struct ScriptedExecutor {
        failing: Mutex<Vec<String>>,
        calls: Mutex<usize>,
        cancel_after: Option<(usize, CancellationFlag)>,
    }

    impl ScriptedExecutor {
        fn new(failing: &[&str]) -> Self {
            Self {
                failing: Mutex::new(failing.iter().map(|s| s.to_string()).collect()),
                calls: Mutex::new(0),
                cancel_after: None,
            }
        }

        fn heal(&self) {
            self.failing.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl CrawlExecutor for ScriptedExecutor {
        async fn crawl(&self, target: &Target) -> CrawlResult {
            {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                if let Some((limit, flag)) = &self.cancel_after {
                    if *calls >= *limit {
                        flag.cancel();
                    }
                }
            }

            let fails = self
                .failing
                .lock()
                .unwrap()
                .iter()
                .any(|needle| target.url.contains(needle.as_str()));
            if fails {
                CrawlResult::failure(target, "timeout")
            } else {
                CrawlResult::success(target, ["https://cdn.example/hero.js"], BTreeMap::new())
            }
        }
    }

    fn crawler_config(batch_size: u32) -> CrawlerConfig {
        CrawlerConfig {
            batch_size,
            max_concurrent_pages_open: 4,
            batch_delay: 0,
            request_timeout: 1000,
            limit: 0,
        }
    }

    fn source(paths: &[&str]) -> ConfiguredTargets {
        ConfiguredTargets::new(
            paths.iter().map(|s| s.to_string()).collect(),
            EnvironmentsConfig {
                control_host: "https://control.example".to_string(),
                experimental_host: "https://experimental.example".to_string(),
            },
            0,
        )
    }

    #[tokio::test]
    async fn test_crawl_records_failures_and_artifacts() {
        let executor = Arc::new(ScriptedExecutor::new(&["/broken"]));
        let mut coordinator = Coordinator::new(
            SqliteStorage::new_in_memory().unwrap(),
            executor,
            &crawler_config(10),
        );

        let summary = coordinator
            .run(RunMode::Crawl, &source(&["/ok", "/broken"]))
            .await
            .unwrap();

        assert!(!summary.interrupted);
        assert_eq!(summary.batches, 2);
        let control = summary.environment(Environment::Control);
        assert_eq!(control.attempted, 2);
        assert_eq!(control.succeeded, 1);
        assert_eq!(control.still_failed, 1);
        assert_eq!(control.recovered, 0);

        let storage = coordinator.storage();
        assert_eq!(storage.pending(None).unwrap().len(), 2);
        assert!(storage
            .source_files("https://control.example/ok")
            .unwrap()
            .is_some());
        assert!(storage
            .source_files("https://control.example/broken")
            .unwrap()
            .is_none());

        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.totals.attempted, 4);
        assert_eq!(run.totals.still_failed, 2);
        assert_eq!(coordinator.phase(), RunPhase::Done);
    }

    #[tokio::test]
    async fn test_retry_run_recovers_failures() {
        let executor = Arc::new(ScriptedExecutor::new(&["/broken"]));
        let mut coordinator = Coordinator::new(
            SqliteStorage::new_in_memory().unwrap(),
            executor.clone(),
            &crawler_config(10),
        );
        coordinator
            .run(RunMode::Crawl, &source(&["/ok", "/broken"]))
            .await
            .unwrap();

        executor.heal();
        let summary = coordinator.run(RunMode::Retry, &LedgerTargets).await.unwrap();

        for environment in Environment::ALL {
            let env = summary.environment(environment);
            assert_eq!(env.attempted, 1);
            assert_eq!(env.succeeded, 1);
            assert_eq!(env.recovered, 1);
            assert_eq!(env.still_failed, 0);
        }
        assert!(coordinator.storage().pending(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_with_empty_ledger_is_not_an_error() {
        let executor = Arc::new(ScriptedExecutor::new(&[]));
        let mut coordinator = Coordinator::new(
            SqliteStorage::new_in_memory().unwrap(),
            executor,
            &crawler_config(10),
        );

        let summary = coordinator.run(RunMode::Retry, &LedgerTargets).await.unwrap();

        assert_eq!(summary, RunSummary::default());
        let run = coordinator.storage().get_latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancellation_stops_after_current_batch() {
        let cancel = CancellationFlag::new();
        let mut executor = ScriptedExecutor::new(&["/"]);
        executor.cancel_after = Some((1, cancel.clone()));

        let mut coordinator = Coordinator::new(
            SqliteStorage::new_in_memory().unwrap(),
            Arc::new(executor),
            &crawler_config(2),
        )
        .with_cancellation(cancel);

        let summary = coordinator
            .run(RunMode::Crawl, &source(&["/a", "/b", "/c", "/d"]))
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.environment(Environment::Control).attempted, 2);
        assert_eq!(summary.environment(Environment::Experimental).attempted, 0);

        // The first batch was merged and persisted
        assert_eq!(coordinator.storage().pending(None).unwrap().len(), 2);
        let run = coordinator.storage().get_latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Interrupted);
    }

    #[tokio::test]
    async fn test_persistence_failure_fails_run_and_keeps_earlier_batches() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .connection()
            .execute_batch(
                "CREATE TRIGGER reject_c BEFORE INSERT ON failures
                 WHEN NEW.url LIKE '%/c'
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let executor = Arc::new(ScriptedExecutor::new(&["/"]));
        let mut coordinator = Coordinator::new(storage, executor, &crawler_config(2));

        let result = coordinator
            .run(RunMode::Crawl, &source(&["/a", "/b", "/c"]))
            .await;

        assert!(matches!(result, Err(QaError::Storage(_))));
        let storage = coordinator.storage();
        let pending = storage.pending(None).unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|r| r.environment == Environment::Control));
        assert!(pending.iter().all(|r| !r.url.ends_with("/c")));

        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_summary_counts_unrelated_ledger_entries_as_untouched() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .record(&FailureRecord::new(
                "https://control.example/other",
                Environment::Control,
                "timeout",
            ))
            .unwrap();

        let executor = Arc::new(ScriptedExecutor::new(&[]));
        let mut coordinator = Coordinator::new(storage, executor, &crawler_config(10));

        let summary = coordinator
            .run(RunMode::Crawl, &source(&["/ok"]))
            .await
            .unwrap();

        assert_eq!(summary.environment(Environment::Control).recovered, 0);
        assert_eq!(coordinator.storage().pending(None).unwrap().len(), 1);
    }

    #[test]
    fn test_summary_display() {
        let mut summary = RunSummary::default();
        summary.environments.insert(
            Environment::Control,
            EnvironmentSummary {
                attempted: 3,
                succeeded: 2,
                still_failed: 1,
                recovered: 1,
            },
        );
        summary.batches = 1;

        let text = summary.to_string();
        assert!(text.contains("Run completed"));
        assert!(text.contains("control:"));
        assert!(text.contains("experimental:"));
        assert_eq!(summary.totals().attempted, 3);
    }
}
