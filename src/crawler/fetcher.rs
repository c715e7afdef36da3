//! HTTP fetcher implementation
//!
//! This module provides the default crawl executor. It fetches each page over
//! plain HTTP and extracts artifacts from the returned HTML, including:
//! - Building HTTP clients with the crawler's user agent and timeouts
//! - Adding the configured query parameters to every navigation URL
//! - Classifying HTTP, network and content-type errors into failure messages
//! - Saving a snapshot of each crawled page's HTML

use crate::config::{Config, CrawlerConfig, ExtractionConfig};
use crate::crawler::executor::CrawlExecutor;
use crate::crawler::parser::extract_artifacts;
use crate::model::{CrawlResult, Target};
use crate::storage::write_dom_snapshot;
use crate::url::with_query_params;
use crate::QaError;
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("qa-crawler/", env!("CARGO_PKG_VERSION"));

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The crawler configuration (request timeout)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &CrawlerConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_millis(config.request_timeout))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Crawl executor that fetches pages over HTTP
pub struct HttpExecutor {
    client: Client,
    extraction: ExtractionConfig,
    snapshot_dir: Option<PathBuf>,
}

impl HttpExecutor {
    pub fn new(client: Client, extraction: ExtractionConfig) -> Self {
        Self {
            client,
            extraction,
            snapshot_dir: None,
        }
    }

    /// Saves the HTML of every successfully crawled page into `dir`
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    /// Builds an executor from the crawler configuration
    pub fn from_config(config: &Config) -> Result<Self, QaError> {
        let client = build_http_client(&config.crawler)?;
        let executor = Self::new(client, config.extraction.clone());
        Ok(match config.output.snapshot_location() {
            Some(dir) => executor.with_snapshot_dir(dir),
            None => executor,
        })
    }

    /// Writes the page snapshot off the async runtime
    ///
    /// A snapshot that cannot be written is logged; the crawl result stands.
    async fn save_snapshot(&self, target: &Target, body: String) {
        let Some(dir) = self.snapshot_dir.clone() else {
            return;
        };

        let url = target.url.clone();
        let written =
            tokio::task::spawn_blocking(move || write_dom_snapshot(&dir, &url, &body)).await;

        match written {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Error writing snapshot for {}: {}", target.url, e),
            Err(e) => warn!("Snapshot task for {} did not finish: {}", target.url, e),
        }
    }

    /// Fetches the page for a target
    ///
    /// Returns the final URL after redirects and the HTML body, or a failure
    /// message suitable for the failure ledger.
    async fn fetch_page(&self, target: &Target) -> Result<(Url, String), String> {
        let navigation_url = with_query_params(&target.url, &self.extraction.query_params)
            .map_err(|e| format!("Invalid URL: {}", e))?;

        debug!("Fetching {} ({})", navigation_url, target.environment);

        let response = self
            .client
            .get(navigation_url)
            .send()
            .await
            .map_err(|e| describe_request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.contains("text/html") {
            return Err(format!("Expected HTML, got '{}'", content_type));
        }

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read body: {}", e))?;

        Ok((final_url, body))
    }
}

#[async_trait]
impl CrawlExecutor for HttpExecutor {
    async fn crawl(&self, target: &Target) -> CrawlResult {
        match self.fetch_page(target).await {
            Ok((final_url, body)) => {
                let artifacts = extract_artifacts(
                    &body,
                    &final_url,
                    &target.url,
                    &self.extraction.source_file_pattern,
                );
                debug!(
                    "{} ({}): {} source files, {} blocks",
                    target.url,
                    target.environment,
                    artifacts.source_files.len(),
                    artifacts.blocks.len()
                );
                self.save_snapshot(target, body).await;
                CrawlResult::success(target, artifacts.source_files, artifacts.blocks)
            }
            Err(message) => {
                warn!("Failed to crawl {} ({}): {}", target.url, target.environment, message);
                CrawlResult::failure(target, message)
            }
        }
    }
}

/// Classifies a reqwest error into a ledger message
fn describe_request_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        format!("Connection refused: {}", error)
    } else if error.is_redirect() {
        format!("Redirect error: {}", error)
    } else {
        error.to_string()
    }
}
