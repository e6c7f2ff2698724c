//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! store statistics and the last run summary.

use crate::output::RunSummary;
use crate::storage::{RunRecord, Storage, StoreStatistics};
use crate::WalkerError;

/// Store statistics plus the most recent run
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    pub store: StoreStatistics,

    /// Most recent run, if any
    pub last_run: Option<RunRecord>,

    /// Summary of the most recent run, when it finished and recorded one
    pub last_summary: Option<RunSummary>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(WalkerError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, WalkerError> {
    let store = storage.statistics()?;
    let last_run = storage.get_latest_run()?;

    let last_summary = match last_run.as_ref().and_then(|run| run.summary.as_deref()) {
        Some(json) => match serde_json::from_str::<RunSummary>(json) {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!("Ignoring unreadable run summary: {}", e);
                None
            }
        },
        None => None,
    };

    Ok(CrawlStatistics {
        store,
        last_run,
        last_summary,
    })
}

/// Prints a run summary to stdout
pub fn print_summary(summary: &RunSummary) {
    println!("Run {} ({}):", summary.run_id, summary.status);
    println!("  Targets visited: {}", summary.targets_visited);
    println!("  Documents stored: {}", summary.documents_stored);
    println!("  Duplicates: {}", summary.duplicates);
    println!("  Dropped: {}", summary.dropped);
    println!("  Rate-limit retries: {}", summary.retries);
    println!(
        "  Non-traversable links discovered: {}",
        summary.non_traversable_links
    );
    if summary.sink_failed > 0 {
        println!("  Sink failures: {}", summary.sink_failed);
    }
    println!("  Duration: {:.1}s", summary.duration_ms as f64 / 1000.0);

    if !summary.errors_by_kind.is_empty() {
        println!("  Errors by kind:");
        let mut errors: Vec<_> = summary.errors_by_kind.iter().collect();
        errors.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (kind, count) in errors {
            println!("    {}: {}", kind, count);
        }
    }

    println!(
        "  Success rate: {:.1}% of visited targets",
        summary.success_rate()
    );
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    let store = &stats.store;
    println!("=== Crawl Statistics ===\n");

    println!("Store:");
    println!("  Documents: {}", store.documents);
    println!("  Links: {}", store.links);
    println!("  Forms: {} ({} fields)", store.forms, store.form_fields);
    println!("  Tables: {}", store.tables);
    println!("  Images: {}", store.images);
    println!("  Non-HTML links: {}", store.non_html_links);
    println!("  Pending frontier: {}", store.pending_frontier);
    println!("  Missing embeddings: {}", store.missing_embeddings);
    println!();

    match (&stats.last_run, &stats.last_summary) {
        (_, Some(summary)) => print_summary(summary),
        (Some(run), None) => println!(
            "Last run {} started {} ({}), no summary recorded",
            run.id,
            run.started_at,
            run.status.to_db_string()
        ),
        (None, None) => println!("No crawl runs recorded"),
    }
}
