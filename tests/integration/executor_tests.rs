//! HTTP executor tests against a mock host

use crate::common::{extraction, BLOCK_PAGE};
use qa_crawler::config::CrawlerConfig;
use qa_crawler::crawler::{block_hash, build_http_client, CrawlExecutor, HttpExecutor};
use qa_crawler::storage::snapshot_file_name;
use qa_crawler::{CrawlOutcome, Environment, Target};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn executor() -> HttpExecutor {
    let client = build_http_client(&CrawlerConfig::default()).expect("Failed to build client");
    HttpExecutor::new(client, extraction())
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
}

fn classes(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_success_extracts_source_files_and_blocks() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/express/"))
        .respond_with(html(BLOCK_PAGE))
        .mount(&mock_server)
        .await;

    let target = Target::new(format!("{}/express/", base_url), Environment::Control);
    let result = executor().crawl(&target).await;

    assert_eq!(result.url, target.url);
    assert_eq!(result.environment, Environment::Control);

    let CrawlOutcome::Success {
        source_files,
        blocks,
    } = result.outcome
    else {
        panic!("Expected a successful crawl, got {:?}", result.outcome);
    };

    let files: Vec<String> = source_files.into_iter().collect();
    assert_eq!(
        files,
        vec![
            format!("{}/blocks/columns/columns.js", base_url),
            format!("{}/blocks/hero/hero.js", base_url),
        ]
    );

    assert_eq!(blocks.len(), 3);
    for names in [
        classes(&["hero", "dark"]),
        classes(&["columns-wrapper"]),
        classes(&["columns", "two"]),
    ] {
        let block = blocks
            .get(&block_hash(&names))
            .unwrap_or_else(|| panic!("Missing block {:?}", names));
        assert!(block.urls.contains(&target.url));
    }
}

#[tokio::test]
async fn test_query_params_are_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/express/"))
        .and(query_param("martech", "off"))
        .respond_with(html(BLOCK_PAGE))
        .expect(1)
        .mount(&mock_server)
        .await;

    let target = Target::new(
        format!("{}/express/", mock_server.uri()),
        Environment::Experimental,
    );
    let result = executor().crawl(&target).await;

    assert!(result.is_success(), "Unexpected outcome {:?}", result.outcome);
    mock_server.verify().await;
}

#[tokio::test]
async fn test_server_error_becomes_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let target = Target::new(format!("{}/broken", mock_server.uri()), Environment::Control);
    let result = executor().crawl(&target).await;

    match result.outcome {
        CrawlOutcome::Failure { error_message } => assert_eq!(error_message, "HTTP 500"),
        other => panic!("Expected a failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_non_html_response_becomes_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("{}", "application/json"),
        )
        .mount(&mock_server)
        .await;

    let target = Target::new(format!("{}/api", mock_server.uri()), Environment::Control);
    let result = executor().crawl(&target).await;

    match result.outcome {
        CrawlOutcome::Failure { error_message } => {
            assert!(
                error_message.starts_with("Expected HTML"),
                "Unexpected message {}",
                error_message
            );
        }
        other => panic!("Expected a failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_host_becomes_failure() {
    // Nothing listens on the discard port
    let target = Target::new("http://127.0.0.1:9/express/", Environment::Control);
    let result = executor().crawl(&target).await;

    assert!(!result.is_success());
}

#[tokio::test]
async fn test_successful_crawl_writes_dom_snapshot() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/express/"))
        .respond_with(html(BLOCK_PAGE))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let snapshots = dir.path().join("dom_snapshots");
    let executor = executor().with_snapshot_dir(&snapshots);

    let page = Target::new(format!("{}/express/", mock_server.uri()), Environment::Control);
    let broken = Target::new(format!("{}/broken", mock_server.uri()), Environment::Control);
    assert!(executor.crawl(&page).await.is_success());
    assert!(!executor.crawl(&broken).await.is_success());

    let saved = std::fs::read_to_string(snapshots.join(snapshot_file_name(&page.url)))
        .expect("Missing snapshot");
    assert_eq!(saved, BLOCK_PAGE);
    assert!(!snapshots.join(snapshot_file_name(&broken.url)).exists());
}
