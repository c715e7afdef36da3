//! Output module for operator-facing reports
//!
//! This module handles:
//! - Loading ledger and log store statistics
//! - Printing statistics and run summaries

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};

use crate::crawler::RunSummary;
use crate::model::Environment;

/// Prints a run summary to stdout
///
/// The per-environment counts are the only required output of a run, so this
/// is printed for completed and interrupted runs alike.
pub fn print_run_summary(summary: &RunSummary) {
    println!("=== Run Summary ===\n");
    print!("{}", summary);

    let still_failing: usize = Environment::ALL
        .iter()
        .map(|env| summary.environment(*env).still_failed)
        .sum();
    if still_failing > 0 {
        println!();
        println!("{} URLs still failing; run again with --retry to retry them.", still_failing);
    }
    if summary.interrupted {
        println!("Run was interrupted; the next run resumes from the failure ledger.");
    }
}
