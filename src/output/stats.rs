//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! ledger and log store statistics from the storage layer.

use crate::model::Environment;
use crate::storage::{RunRecord, Storage};
use crate::QaError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Log store and ledger statistics
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// URLs with at least one successful crawl
    pub crawled_pages: u64,

    /// Distinct content hashes in the block map
    pub blocks: u64,

    /// Pending failures per environment
    pub failures_by_environment: BTreeMap<Environment, u64>,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,
}

impl CrawlStatistics {
    /// Total pending failures across environments
    pub fn total_failures(&self) -> u64 {
        self.failures_by_environment.values().sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(QaError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, QaError> {
    let mut failures_by_environment = BTreeMap::new();
    for environment in Environment::ALL {
        failures_by_environment.insert(environment, storage.count_failures(Some(environment))?);
    }

    Ok(CrawlStatistics {
        crawled_pages: storage.count_crawled_pages()?,
        blocks: storage.count_blocks()?,
        failures_by_environment,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Log store:");
    println!("  Crawled pages: {}", stats.crawled_pages);
    println!("  Content blocks: {}", stats.blocks);
    println!();

    println!("Failure ledger ({} pending):", stats.total_failures());
    for (environment, count) in &stats.failures_by_environment {
        println!("  {}: {}", environment, count);
    }
    println!();

    match &stats.latest_run {
        Some(run) => {
            println!("Latest run:");
            println!("  Id: {}", run.id);
            println!("  Mode: {}", run.mode.to_db_string());
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(seconds) = run_duration_seconds(run) {
                println!("  Duration: {}s", seconds);
            }
            println!(
                "  Attempted: {}, succeeded: {}, still failing: {}, recovered: {}",
                run.totals.attempted,
                run.totals.succeeded,
                run.totals.still_failed,
                run.totals.recovered
            );
        }
        None => println!("No runs recorded yet."),
    }
}

/// Duration of a finished run in whole seconds
pub fn run_duration_seconds(run: &RunRecord) -> Option<i64> {
    let started = run.started_at.parse::<DateTime<Utc>>().ok()?;
    let finished = run.finished_at.as_ref()?.parse::<DateTime<Utc>>().ok()?;
    Some((finished - started).num_seconds())
}
