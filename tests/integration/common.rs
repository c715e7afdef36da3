//! Shared fixtures for the integration tests

use qa_crawler::config::{
    Config, CrawlerConfig, EnvironmentsConfig, ExtractionConfig, OutputConfig, TargetsConfig,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Page with two block scripts, one unrelated script and three blocks
pub const BLOCK_PAGE: &str = r#"<html>
<head>
  <script src="/blocks/hero/hero.js"></script>
  <script src="/scripts/analytics.js"></script>
  <link rel="modulepreload" href="/blocks/columns/columns.js">
</head>
<body>
  <main>
    <div class="section">
      <div class="hero dark"></div>
      <div class="columns-wrapper"><div class="columns two"></div></div>
    </div>
  </main>
</body>
</html>"#;

/// Page with a single block and no block scripts
pub const PLAIN_PAGE: &str =
    r#"<html><body><main><div class="section"><div class="cards"></div></div></main></body></html>"#;

pub fn extraction() -> ExtractionConfig {
    ExtractionConfig {
        source_file_pattern: "/blocks/".to_string(),
        query_params: BTreeMap::from([("martech".to_string(), "off".to_string())]),
    }
}

/// Creates a test configuration crawling `paths` on both hosts
pub fn create_test_config(
    control_host: &str,
    experimental_host: &str,
    paths: &[&str],
    dir: &Path,
) -> Config {
    Config {
        crawler: CrawlerConfig {
            batch_size: 2,
            max_concurrent_pages_open: 4,
            batch_delay: 0,
            request_timeout: 5_000,
            limit: 0,
        },
        environments: EnvironmentsConfig {
            control_host: control_host.to_string(),
            experimental_host: experimental_host.to_string(),
        },
        targets: TargetsConfig {
            urls: paths.iter().map(|p| format!("https://www.example.com{}", p)).collect(),
        },
        extraction: extraction(),
        output: OutputConfig {
            database_path: dir.join("crawl.db").to_string_lossy().into_owned(),
            export_dir: Some(dir.join("logs").to_string_lossy().into_owned()),
            snapshot_dir: None,
        },
    }
}
