//! Crawl executor seam
//!
//! The executor turns one target into one `CrawlResult`. It never returns an
//! error: anything that goes wrong for a single URL becomes a failure result
//! that the merge engine records in the ledger.

use crate::crawler::scheduler::Batch;
use crate::model::{CrawlResult, Target};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

/// Produces a crawl result for a single target
#[async_trait]
pub trait CrawlExecutor: Send + Sync {
    /// Crawls one target
    async fn crawl(&self, target: &Target) -> CrawlResult;
}

/// Crawls every target of a batch with at most `concurrency` crawls in flight
///
/// Results are returned in completion order, not batch order.
pub async fn execute_batch<E>(executor: &E, batch: &Batch, concurrency: usize) -> Vec<CrawlResult>
where
    E: CrawlExecutor + ?Sized,
{
    let targets = batch.targets();

    stream::iter(targets.iter().map(|target| executor.crawl(target)))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}
