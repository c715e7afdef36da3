//! Crawler module for batch crawling and merging
//!
//! This module contains the core crawling logic, including:
//! - Target loading from configuration, the failure ledger or a file
//! - Batch partitioning per environment
//! - HTTP fetching and artifact extraction
//! - Atomic per-batch merging into the log store and failure ledger
//! - Overall run coordination

mod coordinator;
mod executor;
mod fetcher;
mod merge;
mod parser;
mod scheduler;
mod targets;

pub use coordinator::{CancellationFlag, Coordinator, EnvironmentSummary, RunPhase, RunSummary};
pub use executor::{execute_batch, CrawlExecutor};
pub use fetcher::{build_http_client, HttpExecutor, USER_AGENT};
pub use merge::{merge, merge_batch, MergeReport};
pub use parser::{block_hash, extract_artifacts, PageArtifacts};
pub use scheduler::{partition, Batch, DEFAULT_BATCH_SIZE};
pub use targets::{ConfiguredTargets, FailedUrlsFile, LedgerTargets, TargetSource};

use crate::config::Config;
use crate::storage::{export_logs, open_storage, RunMode};
use crate::QaError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a single invocation should crawl
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub mode: RunMode,

    /// Retry target list that overrides the ledger (retry mode only)
    pub failed_urls: Option<PathBuf>,

    /// Hash of the configuration file, recorded with the run
    pub config_hash: String,
}

/// Picks the target source for a request
///
/// Retry mode reads `failed_urls` when given and the failure ledger otherwise;
/// crawl mode uses the configured URLs.
pub fn target_source(config: &Config, request: &RunRequest) -> Box<dyn TargetSource> {
    match (request.mode, &request.failed_urls) {
        (RunMode::Retry, Some(path)) => Box::new(FailedUrlsFile::new(path.clone())),
        (RunMode::Retry, None) => Box::new(LedgerTargets),
        (RunMode::Crawl, _) => Box::new(ConfiguredTargets::from_config(config)),
    }
}

/// Runs a complete crawl or retry operation
///
/// This is the main entry point for a run. It will:
/// 1. Open the storage database
/// 2. Build the HTTP executor
/// 3. Pick the target source for the mode
/// 4. Crawl and merge batch by batch
/// 5. Export the JSON logs if an export directory is configured
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `request` - Mode, optional override file and config hash
/// * `cancel` - Flag that stops the run between batches
///
/// # Returns
///
/// * `Ok(RunSummary)` - The run completed or was interrupted cleanly
/// * `Err(QaError)` - The run failed (storage errors are fatal)
pub async fn run_crawl(
    config: Config,
    request: RunRequest,
    cancel: CancellationFlag,
) -> Result<RunSummary, QaError> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    let executor = Arc::new(HttpExecutor::from_config(&config)?);

    let source = target_source(&config, &request);

    let mut coordinator = Coordinator::new(storage, executor, &config.crawler)
        .with_config_hash(request.config_hash)
        .with_cancellation(cancel);

    let summary = coordinator.run(request.mode, source.as_ref()).await?;

    if let Some(dir) = &config.output.export_dir {
        export_logs(coordinator.storage(), Path::new(dir))?;
    }

    Ok(summary)
}
