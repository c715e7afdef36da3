//! QA crawler main entry point
//!
//! This is the command-line interface for the control/experimental QA crawler.

use anyhow::{Context, Result};
use clap::Parser;
use qa_crawler::config::{load_config_with_hash, Config};
use qa_crawler::crawler::{run_crawl, target_source, CancellationFlag, RunRequest};
use qa_crawler::output::{load_statistics, print_run_summary, print_statistics};
use qa_crawler::search::{search, DEFAULT_TOP_K};
use qa_crawler::storage::{export_logs, open_storage, LogStore, RunMode, SqliteStorage};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Maximum exact-match URLs printed by --search
const SEARCH_URL_LIMIT: usize = 10;

/// QA crawler: snapshot pages on a control and an experimental deployment
///
/// Crawls the configured pages on both hosts, records the block scripts and
/// content blocks each page uses, and keeps a ledger of failed URLs so that
/// `--retry` crawls exactly what failed last time.
#[derive(Parser, Debug)]
#[command(name = "qa-crawler")]
#[command(version)]
#[command(about = "Control/experimental QA crawler with a retry ledger", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Retry previously failed URLs instead of the configured targets
    #[arg(long)]
    retry: bool,

    /// Retry the URLs listed in this failed_urls.json instead of the ledger
    #[arg(long, value_name = "PATH", requires = "retry")]
    failed_urls: Option<PathBuf>,

    /// Crawl at most N configured URLs (overrides crawler.limit)
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export", "search"])]
    dry_run: bool,

    /// Show ledger and log store statistics and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export", "search"])]
    stats: bool,

    /// Export the JSON logs to output.export-dir and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "search"])]
    export: bool,

    /// Search the block map for class names and exit
    #[arg(long, value_name = "QUERY", conflicts_with_all = ["dry_run", "stats", "export"])]
    search: Option<String>,
}

impl Cli {
    fn run_request(&self, config_hash: String) -> RunRequest {
        RunRequest {
            mode: if self.retry {
                RunMode::Retry
            } else {
                RunMode::Crawl
            },
            failed_urls: self.failed_urls.clone(),
            config_hash,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(limit) = cli.limit {
        config.crawler.limit = limit;
    }

    let request = cli.run_request(config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, &request)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export {
        handle_export(&config)?;
    } else if let Some(query) = &cli.search {
        handle_search(&config, query)?;
    } else {
        handle_crawl(config, request).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("qa_crawler=info,warn"),
            1 => EnvFilter::new("qa_crawler=debug,info"),
            2 => EnvFilter::new("qa_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_database(config: &Config) -> Result<SqliteStorage> {
    open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("Failed to open database {}", config.output.database_path))
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, request: &RunRequest) -> Result<()> {
    println!("=== QA Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Batch size: {}", config.crawler.batch_size);
    println!(
        "  Max concurrent pages: {}",
        config.crawler.max_concurrent_pages_open
    );
    println!("  Batch delay: {}ms", config.crawler.batch_delay);
    println!("  Request timeout: {}ms", config.crawler.request_timeout);
    if config.crawler.limit > 0 {
        println!("  Limit: {} urls", config.crawler.limit);
    }

    println!("\nEnvironments:");
    println!("  Control: {}", config.environments.control_host);
    println!("  Experimental: {}", config.environments.experimental_host);

    println!("\nExtraction:");
    println!("  Source file pattern: {}", config.extraction.source_file_pattern);
    for (key, value) in &config.extraction.query_params {
        println!("  Query param: {}={}", key, value);
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    if let Some(dir) = &config.output.export_dir {
        println!("  Export dir: {}", dir);
    }
    if let Some(dir) = config.output.snapshot_location() {
        println!("  Snapshot dir: {}", dir.display());
    }

    let source = target_source(config, request);

    // Only ledger retries read the real database
    let ledger = if request.mode == RunMode::Retry && request.failed_urls.is_none() {
        open_database(config)?
    } else {
        SqliteStorage::new_in_memory()?
    };

    let targets = source.load(&ledger)?;
    println!("\nTargets from {} ({}):", source.describe(), targets.len());
    for target in &targets {
        println!("  [{}] {}", target.environment, target.url);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would crawl {} targets in batches of {}",
        targets.len(),
        config.crawler.batch_size
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_database(config)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: writes the JSON logs
fn handle_export(config: &Config) -> Result<()> {
    let dir = config
        .output
        .export_dir
        .as_deref()
        .context("--export requires output.export-dir in the configuration")?;

    println!("=== Exporting Crawl Logs ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", dir);
    println!();

    let storage = open_database(config)?;
    let summary = export_logs(&storage, Path::new(dir))?;

    println!(
        "✓ Exported {} source file entries, {} blocks, {} failed urls",
        summary.source_file_urls, summary.blocks, summary.failures
    );

    Ok(())
}

/// Handles the --search mode: block map search
fn handle_search(config: &Config, query: &str) -> Result<()> {
    let storage = open_database(config)?;
    let block_map = storage.block_map()?;

    print!("{}", search(&block_map, query, SEARCH_URL_LIMIT, DEFAULT_TOP_K));

    Ok(())
}

/// Handles the main crawl or retry operation
async fn handle_crawl(config: Config, request: RunRequest) -> Result<()> {
    match (request.mode, &request.failed_urls) {
        (RunMode::Retry, Some(path)) => {
            tracing::info!("Retrying failed URLs from {}", path.display())
        }
        (RunMode::Retry, None) => tracing::info!("Retrying failed URLs from the ledger"),
        (RunMode::Crawl, _) => tracing::info!(
            "Crawling {} configured URLs on both environments",
            config.targets.urls.len()
        ),
    }

    // Stop between batches on Ctrl-C
    let cancel = CancellationFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received; stopping after the current batch");
                cancel.cancel();
            }
        });
    }

    match run_crawl(config, request, cancel).await {
        Ok(summary) => {
            print_run_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}
