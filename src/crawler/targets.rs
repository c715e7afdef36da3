//! Target sources
//!
//! A run's targets come from exactly one source: the configured URL list, the
//! failure ledger, or a `failed_urls.json` override file. The source is chosen
//! by the caller and handed to the coordinator, so the merge path never knows
//! where its targets came from.

use crate::config::{Config, EnvironmentsConfig};
use crate::model::{Environment, Target};
use crate::storage::{load_failed_urls, FailureLedger};
use crate::url::to_environment_url;
use crate::QaError;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

/// Supplies the targets of a run
pub trait TargetSource {
    /// Short human readable description for logs
    fn describe(&self) -> String;

    /// Loads the targets, in scheduling order
    ///
    /// `ledger` is the run's failure ledger; sources that do not read it
    /// ignore it.
    fn load(&self, ledger: &dyn FailureLedger) -> Result<Vec<Target>, QaError>;
}

/// Canonical URLs from the configuration, crawled on both hosts
#[derive(Debug, Clone)]
pub struct ConfiguredTargets {
    urls: Vec<String>,
    environments: EnvironmentsConfig,
    limit: usize,
}

impl ConfiguredTargets {
    /// Creates a source over `urls`; a `limit` of zero means unlimited
    pub fn new(urls: Vec<String>, environments: EnvironmentsConfig, limit: usize) -> Self {
        Self {
            urls,
            environments,
            limit,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.targets.urls.clone(),
            config.environments.clone(),
            config.crawler.limit,
        )
    }

    /// Canonical URLs after trimming, deduplication and the limit
    pub fn canonical_urls(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let deduped = self
            .urls
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .filter(|url| seen.insert(*url));

        if self.limit > 0 {
            deduped.take(self.limit).collect()
        } else {
            deduped.collect()
        }
    }
}

impl TargetSource for ConfiguredTargets {
    fn describe(&self) -> String {
        format!("{} configured urls", self.urls.len())
    }

    fn load(&self, _ledger: &dyn FailureLedger) -> Result<Vec<Target>, QaError> {
        let canonical = self.canonical_urls();
        let mut targets = Vec::with_capacity(canonical.len() * Environment::ALL.len());

        for url in canonical {
            for environment in Environment::ALL {
                let rewritten = to_environment_url(url, self.environments.host(environment))?;
                targets.push(Target::new(rewritten, environment));
            }
        }

        debug!("Resolved {} targets from configuration", targets.len());
        Ok(targets)
    }
}

/// Every pending failure in the ledger, in ledger order
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerTargets;

impl TargetSource for LedgerTargets {
    fn describe(&self) -> String {
        "failure ledger".to_string()
    }

    fn load(&self, ledger: &dyn FailureLedger) -> Result<Vec<Target>, QaError> {
        let pending = ledger.pending(None)?;
        Ok(pending.iter().map(|record| record.target()).collect())
    }
}

/// Failures listed in a `failed_urls.json` file
#[derive(Debug, Clone)]
pub struct FailedUrlsFile {
    path: PathBuf,
}

impl FailedUrlsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TargetSource for FailedUrlsFile {
    fn describe(&self) -> String {
        format!("failed urls file {}", self.path.display())
    }

    fn load(&self, _ledger: &dyn FailureLedger) -> Result<Vec<Target>, QaError> {
        let records = load_failed_urls(&self.path).map_err(|e| {
            QaError::Targets(format!("Cannot read {}: {}", self.path.display(), e))
        })?;
        Ok(records.iter().map(|record| record.target()).collect())
    }
}
