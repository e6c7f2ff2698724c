//! Crawler module for fetching and walking resources
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with rate-limit detection and backoff
//! - The depth-ordered frontier of pending targets
//! - Overall crawl coordination across a pool of workers

mod coordinator;
mod fetcher;
mod frontier;

pub use coordinator::{run_crawl, Coordinator};
pub use fetcher::{
    backoff_delay, build_http_client, parse_retry_after, FetchError, FetchedResource, Fetcher,
    HttpFetcher,
};
pub use frontier::{FetchTarget, Frontier, FrontierError, Next, PushOutcome};

use crate::config::Config;
use crate::output::RunSummary;
use crate::WalkerError;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the store and resume state
/// 2. Seed or restore the frontier
/// 3. Fetch, extract, embed and store every reachable target
/// 4. Record the run summary
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `fresh` - Ignore resume state from earlier runs
///
/// # Returns
///
/// * `Ok(RunSummary)` - Crawl finished
/// * `Err(WalkerError)` - Crawl failed
pub async fn crawl(config: Config, fresh: bool) -> Result<RunSummary, WalkerError> {
    run_crawl(config, fresh).await
}

/// Locks shared crawl state; worker panics never leave it half-updated
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
