//! Spider-Walker main entry point
//!
//! This is the command-line interface for the Spider-Walker crawler.

use clap::Parser;
use spider_walker::config::{load_config_with_hash, Config};
use spider_walker::crawler::Coordinator;
use spider_walker::embedding::{build_embedder, most_similar};
use spider_walker::output::{load_statistics, print_statistics, print_summary};
use spider_walker::storage::{backfill_embeddings, open_storage, Storage};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Spider-Walker: a depth-bounded content crawler
///
/// Spider-Walker walks web resources from a set of seed URLs, extracts
/// text, links, tables, forms and images from HTML, PDF, CSV and
/// spreadsheet content, and stores them with embeddings in SQLite.
#[derive(Parser, Debug)]
#[command(name = "spider-walker")]
#[command(version = "0.1.0")]
#[command(about = "A depth-bounded content crawler", long_about = None)]
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

    /// Start a fresh crawl, ignoring the resume log and pending frontier
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "backfill", "similar"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "backfill", "similar"])]
    stats: bool,

    /// Fill in embeddings that failed during earlier crawls and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "similar"])]
    backfill: bool,

    /// Print the stored document closest to QUERY and exit
    #[arg(long, value_name = "QUERY", conflicts_with_all = ["dry_run", "stats", "backfill"])]
    similar: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.backfill {
        handle_backfill(&config).await?;
    } else if let Some(query) = cli.similar.as_deref() {
        handle_similar(&config, query).await?;
    } else {
        handle_crawl(config, config_hash, cli.fresh).await?;
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
            0 => EnvFilter::new("spider_walker=info,warn"),
            1 => EnvFilter::new("spider_walker=debug,info"),
            2 => EnvFilter::new("spider_walker=trace,debug"),
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

/// Handles the --dry-run mode: shows the parsed configuration and seeds
fn handle_dry_run(config: &Config) {
    println!("=== Spider-Walker Dry Run ===\n");
    println!("{:#?}\n", config);

    println!("Seeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(config.output.database_path.as_ref())?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --backfill mode: embeds rows stored with null vectors
async fn handle_backfill(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let embedder = build_embedder(&config.embedding)?;
    let storage = Mutex::new(open_storage(config.output.database_path.as_ref())?);

    tracing::info!("Backfilling embeddings with the {} backend", embedder.name());
    let report = backfill_embeddings(embedder.as_ref(), &storage).await?;

    println!(
        "✓ Embedded {} rows ({} still failing)",
        report.embedded, report.failed
    );
    Ok(())
}

/// Handles the --similar mode: nearest stored document by cosine distance
async fn handle_similar(config: &Config, query: &str) -> Result<(), Box<dyn std::error::Error>> {
    let embedder = build_embedder(&config.embedding)?;
    let storage = open_storage(config.output.database_path.as_ref())?;

    let documents = storage.document_vectors()?;
    let corpus: Vec<Vec<f32>> = documents.iter().map(|(_, _, v)| v.clone()).collect();

    match most_similar(embedder.as_ref(), query, &corpus).await? {
        Some((index, distance)) => {
            let (url, fingerprint, _) = &documents[index];
            println!("{}", url);
            println!("  fingerprint: {}", fingerprint);
            println!("  cosine distance: {:.4}", distance);
        }
        None => println!("No embedded documents in {}", config.output.database_path),
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: String,
    fresh: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    } else {
        tracing::info!("Starting crawl (will resume if interrupted run exists)");
    }
    tracing::info!("Total seed URLs: {}", config.seeds.len());

    let mut coordinator = Coordinator::new(config, fresh)?.with_config_hash(config_hash);

    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight work");
            token.cancel();
        }
    });

    match coordinator.run().await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
