//! End-to-end crawl and retry tests
//!
//! The control and experimental hosts are two mock servers. Pages that fail on
//! the first request and succeed afterwards model a flaky deployment.

use crate::common::{create_test_config, BLOCK_PAGE, PLAIN_PAGE};
use qa_crawler::crawler::{
    block_hash, run_crawl, CancellationFlag, ConfiguredTargets, Coordinator, HttpExecutor,
    RunRequest,
};
use qa_crawler::storage::{
    load_failed_urls, open_storage, snapshot_file_name, FailureLedger, LogStore, RunMode,
    RunStatus, Storage,
};
use qa_crawler::Environment;
use std::path::Path;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
}

async fn mount_page(server: &MockServer, page_path: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(html(body))
        .mount(server)
        .await;
}

/// Mounts a page that answers 500 `failures` times before serving `body`
async fn mount_flaky_page(server: &MockServer, page_path: &str, body: &str, failures: u64) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(failures)
        .mount(server)
        .await;
    mount_page(server, page_path, body).await;
}

fn request(mode: RunMode) -> RunRequest {
    RunRequest {
        mode,
        failed_urls: None,
        config_hash: "test-hash".to_string(),
    }
}

#[tokio::test]
async fn test_crawl_then_retry_recovers_failures() {
    let control = MockServer::start().await;
    let experimental = MockServer::start().await;

    mount_page(&control, "/express/", BLOCK_PAGE).await;
    mount_page(&control, "/express/pricing", PLAIN_PAGE).await;
    mount_page(&experimental, "/express/", BLOCK_PAGE).await;
    mount_flaky_page(&experimental, "/express/pricing", PLAIN_PAGE, 1).await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = create_test_config(
        &control.uri(),
        &experimental.uri(),
        &["/express/", "/express/pricing"],
        dir.path(),
    );
    let flaky_url = format!("{}/express/pricing", experimental.uri());

    // First pass: one experimental page fails
    let summary = run_crawl(config.clone(), request(RunMode::Crawl), CancellationFlag::new())
        .await
        .expect("Crawl failed");

    assert!(!summary.interrupted);
    assert_eq!(summary.batches, 2);
    let control_counts = summary.environment(Environment::Control);
    assert_eq!(control_counts.attempted, 2);
    assert_eq!(control_counts.succeeded, 2);
    let experimental_counts = summary.environment(Environment::Experimental);
    assert_eq!(experimental_counts.attempted, 2);
    assert_eq!(experimental_counts.succeeded, 1);
    assert_eq!(experimental_counts.still_failed, 1);

    {
        let storage = open_storage(Path::new(&config.output.database_path))
            .expect("Failed to open DB");
        let pending = storage.pending(None).expect("Failed to read ledger");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, flaky_url);
        assert_eq!(pending[0].environment, Environment::Experimental);
        assert_eq!(pending[0].error_message, "HTTP 500");
        assert_eq!(pending[0].attempts, 1);

        // The failed page contributes nothing to the log store
        assert!(storage.source_files(&flaky_url).unwrap().is_none());
        let hero = storage
            .block(&block_hash(&["hero".to_string(), "dark".to_string()]))
            .unwrap()
            .expect("Missing hero block");
        assert_eq!(hero.urls.len(), 2);
    }

    let exported = load_failed_urls(&dir.path().join("logs").join("failed_urls.json"))
        .expect("Failed to read export");
    assert_eq!(exported.len(), 1);
    assert_eq!(exported[0].url, flaky_url);

    // Snapshots land under the export directory
    let snapshots = dir.path().join("logs").join("dom_snapshots");
    let control_home = format!("{}/express/", control.uri());
    assert!(snapshots.join(snapshot_file_name(&control_home)).exists());
    assert!(!snapshots.join(snapshot_file_name(&flaky_url)).exists());

    // Retry pass: only the failed key is crawled, and it recovers
    let summary = run_crawl(config.clone(), request(RunMode::Retry), CancellationFlag::new())
        .await
        .expect("Retry failed");

    assert_eq!(summary.batches, 1);
    assert_eq!(summary.environment(Environment::Control).attempted, 0);
    let experimental_counts = summary.environment(Environment::Experimental);
    assert_eq!(experimental_counts.attempted, 1);
    assert_eq!(experimental_counts.succeeded, 1);
    assert_eq!(experimental_counts.recovered, 1);
    assert_eq!(experimental_counts.still_failed, 0);

    let storage =
        open_storage(Path::new(&config.output.database_path)).expect("Failed to open DB");
    assert_eq!(storage.count_failures(None).unwrap(), 0);
    let cards = storage
        .block(&block_hash(&["cards".to_string()]))
        .unwrap()
        .expect("Missing cards block");
    assert!(cards.urls.contains(&flaky_url));
    assert!(dir
        .path()
        .join("logs")
        .join("dom_snapshots")
        .join(snapshot_file_name(&flaky_url))
        .exists());

    let run = storage.get_latest_run().unwrap().expect("Missing run");
    assert_eq!(run.mode, RunMode::Retry);
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.totals.recovered, 1);

    let exported = load_failed_urls(&dir.path().join("logs").join("failed_urls.json"))
        .expect("Failed to read export");
    assert!(exported.is_empty());
}

#[tokio::test]
async fn test_retry_from_failed_urls_file() {
    let experimental = MockServer::start().await;
    mount_page(&experimental, "/express/", BLOCK_PAGE).await;
    Mock::given(method("GET"))
        .and(path("/express/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&experimental)
        .await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = create_test_config("http://127.0.0.1:9", &experimental.uri(), &[], dir.path());

    let failed_urls = dir.path().join("failed_urls.json");
    std::fs::write(
        &failed_urls,
        format!(
            r#"[
  {{"url": "{base}/express/", "environment": "experimental", "error": "timeout"}},
  {{"url": "{base}/express/gone", "environment": "experimental", "error": "timeout"}}
]"#,
            base = experimental.uri()
        ),
    )
    .unwrap();

    let request = RunRequest {
        mode: RunMode::Retry,
        failed_urls: Some(failed_urls),
        config_hash: "test-hash".to_string(),
    };
    let summary = run_crawl(config.clone(), request, CancellationFlag::new())
        .await
        .expect("Retry failed");

    let experimental_counts = summary.environment(Environment::Experimental);
    assert_eq!(experimental_counts.attempted, 2);
    assert_eq!(experimental_counts.succeeded, 1);
    assert_eq!(experimental_counts.still_failed, 1);

    let storage =
        open_storage(Path::new(&config.output.database_path)).expect("Failed to open DB");
    let pending = storage.pending(None).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].url, format!("{}/express/gone", experimental.uri()));
    assert_eq!(pending[0].error_message, "HTTP 404");
}

#[tokio::test]
async fn test_recrawl_keeps_log_store_stable() {
    let control = MockServer::start().await;
    let experimental = MockServer::start().await;
    mount_page(&control, "/express/", BLOCK_PAGE).await;
    mount_page(&experimental, "/express/", BLOCK_PAGE).await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = create_test_config(&control.uri(), &experimental.uri(), &["/express/"], dir.path());

    run_crawl(config.clone(), request(RunMode::Crawl), CancellationFlag::new())
        .await
        .expect("First crawl failed");
    let (files_before, blocks_before) = {
        let storage = open_storage(Path::new(&config.output.database_path)).unwrap();
        (storage.all_source_files().unwrap(), storage.block_map().unwrap())
    };

    run_crawl(config.clone(), request(RunMode::Crawl), CancellationFlag::new())
        .await
        .expect("Second crawl failed");
    let storage = open_storage(Path::new(&config.output.database_path)).unwrap();

    assert_eq!(storage.all_source_files().unwrap(), files_before);
    assert_eq!(storage.block_map().unwrap(), blocks_before);
    assert_eq!(blocks_before.len(), 3);
    assert_eq!(files_before.len(), 2);
}

#[tokio::test]
async fn test_cancelled_run_stops_between_batches() {
    let control = MockServer::start().await;
    let experimental = MockServer::start().await;
    mount_page(&control, "/express/", BLOCK_PAGE).await;
    mount_page(&experimental, "/express/", BLOCK_PAGE).await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = create_test_config(&control.uri(), &experimental.uri(), &["/express/"], dir.path());

    let storage = open_storage(Path::new(&config.output.database_path)).unwrap();
    let executor = Arc::new(HttpExecutor::from_config(&config).unwrap());
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let mut coordinator = Coordinator::new(storage, executor, &config.crawler)
        .with_config_hash("test-hash")
        .with_cancellation(cancel);
    let summary = coordinator
        .run(RunMode::Crawl, &ConfiguredTargets::from_config(&config))
        .await
        .expect("Run failed");

    assert!(summary.interrupted);
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.environment(Environment::Control).succeeded, 1);
    assert_eq!(summary.environment(Environment::Experimental).attempted, 0);

    let storage = coordinator.into_storage();
    let run = storage.get_latest_run().unwrap().expect("Missing run");
    assert_eq!(run.status, RunStatus::Interrupted);
    assert_eq!(
        storage.count_crawled_pages().unwrap(),
        1,
        "Only the control batch should be merged"
    );
}
