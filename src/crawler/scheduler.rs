//! Batch scheduler
//!
//! Splits the run's targets into small single-environment batches. Batches
//! are processed one after another; only the URLs inside a batch are crawled
//! concurrently.

use crate::model::{Environment, Target};

/// Default number of URLs per batch
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// An ordered group of same-environment URLs processed together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// The environment every URL in this batch belongs to
    pub environment: Environment,

    /// URLs in scheduling order
    pub urls: Vec<String>,
}

impl Batch {
    /// Returns the batch as crawl targets
    pub fn targets(&self) -> Vec<Target> {
        self.urls
            .iter()
            .map(|url| Target::new(url.clone(), self.environment))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Partitions targets into batches of at most `batch_size` URLs
///
/// Targets are grouped by environment in order of first appearance, keeping
/// their relative order, and each group is sliced into chunks. A batch never
/// mixes environments. A `batch_size` of zero is treated as one.
pub fn partition(targets: &[Target], batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);

    let mut groups: Vec<(Environment, Vec<String>)> = Vec::new();
    for target in targets {
        match groups.iter_mut().find(|(env, _)| *env == target.environment) {
            Some((_, urls)) => urls.push(target.url.clone()),
            None => groups.push((target.environment, vec![target.url.clone()])),
        }
    }

    let batches: Vec<Batch> = groups
        .into_iter()
        .flat_map(|(environment, urls)| {
            urls.chunks(batch_size)
                .map(|chunk| Batch {
                    environment,
                    urls: chunk.to_vec(),
                })
                .collect::<Vec<_>>()
        })
        .collect();

    tracing::debug!(
        "Partitioned {} targets into {} batches of at most {}",
        targets.len(),
        batches.len(),
        batch_size
    );

    batches
}
