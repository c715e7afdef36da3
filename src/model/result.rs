//! Crawl results and failure records
//!
//! A `CrawlResult` is produced once per target by the crawl executor and consumed
//! exactly once by the merge engine.

use crate::model::Environment;
use crate::QaError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use url::Url;

/// A single URL to crawl in a single environment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub url: String,
    pub environment: Environment,
}

impl Target {
    pub fn new(url: impl Into<String>, environment: Environment) -> Self {
        Self {
            url: url.into(),
            environment,
        }
    }
}

/// A content block found on one or more pages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentBlock {
    /// Class names of the block element, in document order
    pub class_names: Vec<String>,

    /// URLs whose rendered page contains this block
    pub urls: BTreeSet<String>,
}

impl ContentBlock {
    pub fn new<I, S>(class_names: Vec<String>, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            class_names,
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }
}

/// Outcome of crawling one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// The page rendered and its artifacts were extracted
    Success {
        /// Source files the page loaded
        source_files: BTreeSet<String>,

        /// Content blocks keyed by content hash
        blocks: BTreeMap<String, ContentBlock>,
    },

    /// The crawl failed (network, timeout, parse, ...)
    Failure {
        /// Human readable failure reason
        error_message: String,
    },
}

/// Result of crawling one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlResult {
    pub url: String,
    pub environment: Environment,
    pub outcome: CrawlOutcome,
}

impl CrawlResult {
    /// Builds a successful result
    pub fn success<I, S>(
        target: &Target,
        source_files: I,
        blocks: BTreeMap<String, ContentBlock>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            url: target.url.clone(),
            environment: target.environment,
            outcome: CrawlOutcome::Success {
                source_files: source_files.into_iter().map(Into::into).collect(),
                blocks,
            },
        }
    }

    /// Builds a failed result
    pub fn failure(target: &Target, error_message: impl Into<String>) -> Self {
        Self {
            url: target.url.clone(),
            environment: target.environment,
            outcome: CrawlOutcome::Failure {
                error_message: error_message.into(),
            },
        }
    }

    /// Returns true if the crawl succeeded
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, CrawlOutcome::Success { .. })
    }

    /// The ledger key of this result
    pub fn key(&self) -> (&str, Environment) {
        (&self.url, self.environment)
    }

    /// Checks that the result is structurally usable
    ///
    /// A malformed result is reported and skipped by the merge engine; it never
    /// aborts the batch.
    pub fn validate(&self) -> Result<(), QaError> {
        let malformed = |reason: &str| QaError::MalformedResult {
            url: self.url.clone(),
            reason: reason.to_string(),
        };

        let parsed = Url::parse(&self.url).map_err(|e| malformed(&format!("invalid url: {}", e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(malformed("url must use http or https"));
        }

        match &self.outcome {
            CrawlOutcome::Success {
                source_files,
                blocks,
            } => {
                if source_files.iter().any(|f| f.trim().is_empty()) {
                    return Err(malformed("empty source file identifier"));
                }
                for hash in blocks.keys() {
                    if hash.is_empty() || hash.chars().any(char::is_whitespace) {
                        return Err(malformed("invalid content hash"));
                    }
                }
            }
            CrawlOutcome::Failure { error_message } => {
                if error_message.trim().is_empty() {
                    return Err(malformed("failure without an error message"));
                }
            }
        }

        Ok(())
    }
}

/// A ledger entry for a failed (url, environment) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub url: String,
    pub environment: Environment,
    pub error_message: String,

    /// Number of failures recorded for this key
    pub attempts: u32,

    /// When the most recent failure was recorded
    pub last_failed_at: Option<DateTime<Utc>>,
}

impl FailureRecord {
    pub fn new(
        url: impl Into<String>,
        environment: Environment,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            environment,
            error_message: error_message.into(),
            attempts: 0,
            last_failed_at: None,
        }
    }

    /// The target this failure should be retried as
    pub fn target(&self) -> Target {
        Target::new(self.url.clone(), self.environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target::new("https://example.com/page", Environment::Control)
    }

    #[test]
    fn test_success_result_is_valid() {
        let mut blocks = BTreeMap::new();
        blocks.insert(
            "abc123".to_string(),
            ContentBlock::new(vec!["hero".to_string()], ["https://example.com/page"]),
        );
        let result = CrawlResult::success(&target(), ["https://cdn.example.com/hero.js"], blocks);

        assert!(result.is_success());
        assert!(result.validate().is_ok());
    }

    #[test]
    fn test_invalid_url_is_malformed() {
        let bad = Target::new("not a url", Environment::Control);
        let result = CrawlResult::failure(&bad, "timeout");

        assert!(matches!(
            result.validate(),
            Err(QaError::MalformedResult { .. })
        ));
    }

    #[test]
    fn test_non_http_scheme_is_malformed() {
        let bad = Target::new("ftp://example.com/file", Environment::Control);
        assert!(CrawlResult::failure(&bad, "timeout").validate().is_err());
    }

    #[test]
    fn test_blank_error_message_is_malformed() {
        let result = CrawlResult::failure(&target(), "   ");
        assert!(result.validate().is_err());
    }

    #[test]
    fn test_blank_hash_is_malformed() {
        let mut blocks = BTreeMap::new();
        blocks.insert(String::new(), ContentBlock::default());
        let result = CrawlResult::success(&target(), Vec::<String>::new(), blocks);

        assert!(result.validate().is_err());
    }

    #[test]
    fn test_source_files_are_deduplicated() {
        let result = CrawlResult::success(
            &target(),
            ["a.js", "b.js", "a.js"],
            BTreeMap::new(),
        );

        match result.outcome {
            CrawlOutcome::Success { source_files, .. } => assert_eq!(source_files.len(), 2),
            CrawlOutcome::Failure { .. } => panic!("expected success"),
        }
    }
}
