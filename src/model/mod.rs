//! Data model shared by the ledger, the log store and the merge engine
//!
//! # Components
//!
//! - `Environment`: which deployment a URL was crawled against
//! - `Target`: one URL to crawl in one environment
//! - `CrawlResult`: what the crawl executor produced for a target
//! - `FailureRecord`: a ledger entry for a failed (url, environment) pair

mod environment;
mod result;

// Re-export main types
pub use environment::Environment;
pub use result::{ContentBlock, CrawlOutcome, CrawlResult, FailureRecord, Target};
