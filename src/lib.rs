//! QA Crawler: control/experimental page snapshots with a durable retry ledger
//!
//! This crate crawls the same set of pages on two deployments ("control" and
//! "experimental"), records the source files and content blocks each page uses,
//! and keeps a ledger of failed URLs so later runs can retry exactly what failed.

pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod search;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for QA crawler operations
#[derive(Debug, Error)]
pub enum QaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed crawl result for {url}: {reason}")]
    MalformedResult { url: String, reason: String },

    #[error("Target loading error: {0}")]
    Targets(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for QA crawler operations
pub type Result<T> = std::result::Result<T, QaError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use model::{CrawlOutcome, CrawlResult, Environment, FailureRecord, Target};
