use crate::model::Environment;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration structure for the QA crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub environments: EnvironmentsConfig,
    #[serde(default)]
    pub targets: TargetsConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of URLs in one batch
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: u32,

    /// Maximum number of concurrent page fetches within a batch
    #[serde(
        rename = "max-concurrent-pages-open",
        default = "default_max_concurrent_pages_open"
    )]
    pub max_concurrent_pages_open: u32,

    /// Pause between batches (milliseconds)
    #[serde(rename = "batch-delay", default = "default_batch_delay")]
    pub batch_delay: u64,

    /// Per-page request timeout (milliseconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Maximum number of canonical URLs per run (0 = unlimited)
    #[serde(default)]
    pub limit: usize,
}

fn default_batch_size() -> u32 {
    10
}

fn default_max_concurrent_pages_open() -> u32 {
    20
}

fn default_batch_delay() -> u64 {
    3000
}

fn default_request_timeout() -> u64 {
    60_000
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrent_pages_open: default_max_concurrent_pages_open(),
            batch_delay: default_batch_delay(),
            request_timeout: default_request_timeout(),
            limit: 0,
        }
    }
}

/// Hosts of the two deployments being compared
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentsConfig {
    #[serde(rename = "control-host")]
    pub control_host: String,

    #[serde(rename = "experimental-host")]
    pub experimental_host: String,
}

impl EnvironmentsConfig {
    /// Returns the host configured for an environment
    pub fn host(&self, environment: Environment) -> &str {
        match environment {
            Environment::Control => &self.control_host,
            Environment::Experimental => &self.experimental_host,
        }
    }
}

/// Canonical URLs to crawl in normal mode
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetsConfig {
    /// Absolute URLs or site-relative paths
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Page artifact extraction settings
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Substring a script URL must contain to count as a source file
    #[serde(rename = "source-file-pattern", default = "default_source_file_pattern")]
    pub source_file_pattern: String,

    /// Query parameters added to every navigation URL
    #[serde(rename = "query-params", default = "default_query_params")]
    pub query_params: BTreeMap<String, String>,
}

fn default_source_file_pattern() -> String {
    "/express/code/blocks/".to_string()
}

fn default_query_params() -> BTreeMap<String, String> {
    BTreeMap::from([("martech".to_string(), "off".to_string())])
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            source_file_pattern: default_source_file_pattern(),
            query_params: default_query_params(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory for the JSON log export
    #[serde(rename = "export-dir", default)]
    pub export_dir: Option<String>,

    /// Directory for per-page HTML snapshots (default: `<export-dir>/dom_snapshots`)
    #[serde(rename = "snapshot-dir", default)]
    pub snapshot_dir: Option<String>,
}

impl OutputConfig {
    /// Where page snapshots go, if anywhere
    pub fn snapshot_location(&self) -> Option<PathBuf> {
        match (&self.snapshot_dir, &self.export_dir) {
            (Some(dir), _) => Some(PathBuf::from(dir)),
            (None, Some(export_dir)) => Some(Path::new(export_dir).join(DOM_SNAPSHOT_DIR)),
            (None, None) => None,
        }
    }
}

/// Snapshot subdirectory used when only an export directory is configured
pub const DOM_SNAPSHOT_DIR: &str = "dom_snapshots";
