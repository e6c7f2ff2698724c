//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Initializing storage, visited state and the frontier checkpoint
//! - Running a bounded pool of worker tasks over the shared frontier
//! - Fetching, dispatching to extractors, embedding and committing documents
//! - Requeueing rate-limited targets with backoff
//! - Time and step budgets, cancellation and the shutdown grace period
//! - Recording the run summary

use crate::config::Config;
use crate::crawler::fetcher::{backoff_delay, FetchError, Fetcher, HttpFetcher};
use crate::crawler::frontier::{FetchTarget, Frontier, Next, PushOutcome};
use crate::crawler::lock;
use crate::embedding::{build_embedder, Embedder};
use crate::extract::{ContentDispatcher, ExtractedDocument};
use crate::output::{build_sink, DocumentSink, RunSummary};
use crate::state::VisitedSet;
use crate::storage::{
    embed_and_store, lock_storage, CommitOutcome, FrontierRecord, RunStatus, SqliteStorage,
    Storage,
};
use crate::url::{normalize_url, DomainScope};
use crate::WalkerError;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Longest a waiting worker sleeps before re-checking the frontier
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Progress is logged every this many visited targets
const PROGRESS_EVERY: u64 = 10;

/// Referrer stored for non-HTML links that came from the seed list
const SEED_REFERRER: &str = "";

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    config_hash: String,
    storage: Arc<Mutex<SqliteStorage>>,
    frontier: Arc<Mutex<Frontier>>,
    visited: Arc<Mutex<VisitedSet>>,
    fetcher: Arc<dyn Fetcher>,
    dispatcher: Arc<ContentDispatcher>,
    embedder: Arc<dyn Embedder>,
    sink: Option<Arc<dyn DocumentSink>>,
    /// Seeds recorded as non-HTML links instead of being queued
    seed_non_traversable: u64,
    cancel: CancellationToken,
}

/// Everything a worker task needs, shared by all workers
struct WorkerContext {
    config: Arc<Config>,
    storage: Arc<Mutex<SqliteStorage>>,
    frontier: Arc<Mutex<Frontier>>,
    visited: Arc<Mutex<VisitedSet>>,
    fetcher: Arc<dyn Fetcher>,
    dispatcher: Arc<ContentDispatcher>,
    embedder: Arc<dyn Embedder>,
    sink: Option<Arc<dyn DocumentSink>>,
    summary: Mutex<RunSummary>,
    notify: Notify,
    stop: CancellationToken,
    steps: AtomicU64,
    started: Instant,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `fresh` - Ignore the resume log and the pending frontier from earlier runs
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(WalkerError)` - Failed to initialize
    pub fn new(config: Config, fresh: bool) -> Result<Self, WalkerError> {
        let mut storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        if fresh {
            tracing::info!("Fresh crawl: clearing pending frontier and resume log");
            storage.clear_frontier()?;
        }

        let visited = VisitedSet::open(Path::new(&config.output.resume_log_path), fresh)?;

        let scope = DomainScope::from_config(&config.scope, &config.seeds)?;
        let mut frontier = Frontier::new(config.crawler.max_depth, scope);
        for url in visited.urls() {
            frontier.mark_visited(url);
        }

        // Pending targets from an interrupted run keep their order
        let pending = storage.load_frontier()?;
        let mut restored = 0;
        for record in pending {
            if visited.contains(&record.url) {
                storage.remove_frontier_entry(&record.url)?;
                continue;
            }
            let target = FetchTarget {
                url: record.url,
                depth: record.depth,
                originating_url: record.originating_url,
                attempt: 0,
            };
            if frontier.restore(target, record.seq) {
                restored += 1;
            }
        }
        if restored > 0 {
            tracing::info!("Restored {} pending targets from checkpoint", restored);
        }

        let mut seed_non_traversable = 0;
        for seed in &config.seeds {
            match frontier.push(seed, 0, None) {
                PushOutcome::Queued { url, seq } => {
                    storage.save_frontier_entry(&FrontierRecord {
                        url,
                        depth: 0,
                        originating_url: None,
                        seq,
                    })?;
                }
                PushOutcome::NonCrawlable => {
                    tracing::info!("Seed {} has a non-crawlable extension, recording it", seed);
                    let url = normalize_url(seed)?;
                    storage.record_non_html_link(url.as_str(), SEED_REFERRER)?;
                    seed_non_traversable += 1;
                }
                outcome => tracing::info!("Seed {} not queued: {:?}", seed, outcome),
            }
        }

        let fetcher: Arc<dyn Fetcher> =
            Arc::new(HttpFetcher::new(&config.user_agent, &config.crawler)?);
        let dispatcher = Arc::new(ContentDispatcher::new(&config.extraction));
        let embedder = build_embedder(&config.embedding)?;
        let sink = build_sink(&config.output.sink)?;
        let config_hash = hex::encode(Sha256::digest(format!("{:?}", config).as_bytes()));

        tracing::info!(
            "Coordinator ready: {} queued, {} visited, embedder {}, sink {}",
            frontier.len(),
            visited.len(),
            embedder.name(),
            sink.as_ref().map(|s| s.name()).unwrap_or("none")
        );

        Ok(Self {
            config: Arc::new(config),
            config_hash,
            storage: Arc::new(Mutex::new(storage)),
            frontier: Arc::new(Mutex::new(frontier)),
            visited: Arc::new(Mutex::new(visited)),
            fetcher,
            dispatcher,
            embedder,
            sink,
            seed_non_traversable,
            cancel: CancellationToken::new(),
        })
    }

    /// Records `hash` on the run row instead of a hash of the parsed config
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    /// Replaces the HTTP fetcher
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replaces the embedding backend
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Token that stops the crawl when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Shared handle to the store
    pub fn storage(&self) -> Arc<Mutex<SqliteStorage>> {
        Arc::clone(&self.storage)
    }

    /// Runs the crawl until the frontier drains, a budget runs out, or the
    /// cancellation token fires
    ///
    /// Per-target failures are counted in the summary; only a store that
    /// cannot record the run returns `Err`.
    pub async fn run(&mut self) -> Result<RunSummary, WalkerError> {
        let run_id = lock_storage(&self.storage).create_run(&self.config_hash)?;
        let crawler = &self.config.crawler;
        tracing::info!(
            "Starting crawl run {} with {} workers, max depth {}",
            run_id,
            crawler.workers,
            crawler.max_depth
        );

        let ctx = Arc::new(WorkerContext {
            config: Arc::clone(&self.config),
            storage: Arc::clone(&self.storage),
            frontier: Arc::clone(&self.frontier),
            visited: Arc::clone(&self.visited),
            fetcher: Arc::clone(&self.fetcher),
            dispatcher: Arc::clone(&self.dispatcher),
            embedder: Arc::clone(&self.embedder),
            sink: self.sink.clone(),
            summary: Mutex::new(RunSummary {
                non_traversable_links: self.seed_non_traversable,
                ..RunSummary::new(run_id)
            }),
            notify: Notify::new(),
            stop: self.cancel.child_token(),
            steps: AtomicU64::new(0),
            started: Instant::now(),
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..crawler.workers.max(1) {
            workers.spawn(worker_loop(Arc::clone(&ctx), worker_id));
        }

        let time_budget = crawler.time_budget_secs.map(Duration::from_secs);
        let budget_elapsed = async {
            match time_budget {
                Some(budget) => tokio::time::sleep(budget).await,
                None => std::future::pending::<()>().await,
            }
        };

        let drained = tokio::select! {
            _ = drain_workers(&mut workers) => true,
            _ = ctx.stop.cancelled() => false,
            _ = budget_elapsed => {
                tracing::info!("Time budget of {:?} exhausted", time_budget);
                false
            }
        };

        if !drained {
            ctx.stop.cancel();
            let grace = Duration::from_secs(crawler.shutdown_grace_secs);
            tracing::info!("Stopping crawl; waiting up to {:?} for in-flight work", grace);
            if tokio::time::timeout(grace, drain_workers(&mut workers))
                .await
                .is_err()
            {
                tracing::warn!("Grace period elapsed, aborting {} workers", workers.len());
                workers.abort_all();
                drain_workers(&mut workers).await;
            }
        }

        let status = if ctx.stop.is_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };

        let summary = {
            let mut summary = lock(&ctx.summary);
            summary.status = status.to_db_string().to_string();
            summary.duration_ms = ctx.started.elapsed().as_millis() as u64;
            summary.clone()
        };

        let summary_json = serde_json::to_string(&summary)
            .map_err(|e| WalkerError::Task(format!("cannot serialize run summary: {}", e)))?;
        lock_storage(&self.storage).finish_run(run_id, status, &summary_json)?;

        tracing::info!(
            "Crawl run {} {}: {} visited, {} stored, {} duplicates, {} dropped, {} errors in {:?}",
            run_id,
            summary.status,
            summary.targets_visited,
            summary.documents_stored,
            summary.duplicates,
            summary.dropped,
            summary.total_errors(),
            ctx.started.elapsed()
        );

        Ok(summary)
    }
}

async fn drain_workers(workers: &mut JoinSet<()>) {
    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            if e.is_panic() {
                tracing::error!("Worker panicked: {}", e);
            }
        }
    }
}

async fn worker_loop(ctx: Arc<WorkerContext>, worker_id: u32) {
    tracing::debug!("Worker {} started", worker_id);

    loop {
        if ctx.stop.is_cancelled() {
            break;
        }

        let next = lock(&ctx.frontier).next(Instant::now());
        match next {
            Next::Drained => {
                ctx.notify.notify_waiters();
                break;
            }
            Next::Wait(wake) => {
                let wait = wake
                    .map(|at| at.saturating_duration_since(Instant::now()))
                    .unwrap_or(IDLE_POLL)
                    .min(IDLE_POLL);
                tokio::select! {
                    _ = ctx.stop.cancelled() => break,
                    _ = ctx.notify.notified() => {}
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            Next::Target(target) => {
                if let Some(budget) = ctx.config.crawler.step_budget {
                    if ctx.steps.fetch_add(1, Ordering::SeqCst) >= budget {
                        tracing::info!("Step budget of {} exhausted", budget);
                        // The checkpoint entry stays, so a resumed run picks it up
                        lock(&ctx.frontier).complete();
                        ctx.stop.cancel();
                        break;
                    }
                }
                ctx.process(target).await;
                ctx.notify.notify_waiters();
            }
        }
    }

    tracing::debug!("Worker {} finished", worker_id);
}

impl WorkerContext {
    /// Fetches, extracts, stores and expands one target
    async fn process(&self, target: FetchTarget) {
        tracing::debug!("Fetching {} (depth {})", target.url, target.depth);

        match self.fetcher.fetch(&target).await {
            Ok(resource) => {
                lock(&self.frontier).mark_visited(&resource.final_url);

                let document = self.dispatcher.dispatch(&resource);
                self.expand(&target, &document);
                self.store(document).await;

                // Only a settled store outcome marks the URL visited; an abort
                // before this point leaves the checkpoint row for the next run
                if let Err(e) = lock(&self.visited).record(&target.url) {
                    tracing::warn!("Could not append {} to resume log: {}", target.url, e);
                }
                self.finish(&target);
            }
            Err(FetchError::TooManyRequests { retry_after }) => {
                self.handle_rate_limited(target, retry_after);
            }
            Err(e) => {
                tracing::warn!("Dropping {}: {}", target.url, e);
                lock(&self.summary).record_error(e.kind());
                self.finish(&target);
            }
        }
    }

    fn handle_rate_limited(&self, target: FetchTarget, retry_after: Option<Duration>) {
        let crawler = &self.config.crawler;

        if target.attempt >= crawler.max_retries {
            tracing::warn!(
                "Dropping {} after {} rate-limit retries",
                target.url,
                target.attempt
            );
            lock(&self.summary).record_error(
                FetchError::TooManyRequests { retry_after }.kind(),
            );
            self.finish(&target);
            return;
        }

        let delay = backoff_delay(
            target.attempt,
            Duration::from_millis(crawler.retry_base_delay_ms),
            Duration::from_millis(crawler.max_retry_delay_ms),
            retry_after,
        );
        tracing::warn!(
            "Rate limited on {}, retry {} in {:?}",
            target.url,
            target.attempt + 1,
            delay
        );

        lock(&self.summary).retries += 1;
        lock(&self.frontier).defer(target, Instant::now() + delay);
    }

    /// Offers the document's traversable links to the frontier
    fn expand(&self, target: &FetchTarget, document: &ExtractedDocument) {
        let depth = target.depth + 1;
        let mut accepted = Vec::new();

        {
            let mut frontier = lock(&self.frontier);
            for link in document.links.traversable() {
                match frontier.push(&link.target_url, depth, Some(&target.url)) {
                    PushOutcome::Queued { url, seq } => accepted.push(FrontierRecord {
                        url,
                        depth,
                        originating_url: Some(target.url.clone()),
                        seq,
                    }),
                    PushOutcome::AlreadySeen => {}
                    outcome => {
                        tracing::debug!("Not queueing {}: {:?}", link.target_url, outcome)
                    }
                }
            }
        }

        if !accepted.is_empty() {
            let mut storage = lock_storage(&self.storage);
            for record in &accepted {
                if let Err(e) = storage.save_frontier_entry(record) {
                    tracing::warn!("Could not checkpoint {}: {}", record.url, e);
                }
            }
        }

        let non_traversable = (document.links.api.len() + document.links.non_html.len()) as u64;
        lock(&self.summary).non_traversable_links += non_traversable;

        tracing::debug!(
            "{}: {} links, {} queued",
            target.url,
            document.links.len(),
            accepted.len()
        );
    }

    async fn store(&self, document: ExtractedDocument) {
        let source_url = document.source_url.clone();
        let sink_copy = self.sink.as_ref().map(|_| document.clone());

        match embed_and_store(self.embedder.as_ref(), &self.storage, document).await {
            Ok(CommitOutcome::Stored { document_id }) => {
                tracing::debug!("Stored {} as document {}", source_url, document_id);
                lock(&self.summary).documents_stored += 1;

                if let (Some(sink), Some(document)) = (&self.sink, sink_copy) {
                    if let Err(e) = sink.write(&document).await {
                        tracing::warn!("{} sink failed for {}: {}", sink.name(), source_url, e);
                        lock(&self.summary).sink_failed += 1;
                    }
                }
            }
            Ok(CommitOutcome::AlreadyStored { document_id }) => {
                tracing::debug!(
                    "{} duplicates stored document {}",
                    source_url,
                    document_id
                );
                lock(&self.summary).duplicates += 1;
            }
            Err(e) => {
                tracing::error!("Dropping document from {}: {}", source_url, e);
                let mut summary = lock(&self.summary);
                summary.dropped += 1;
                summary.record_error("write_failed");
            }
        }
    }

    /// Releases the target from the frontier and the checkpoint, and logs progress
    fn finish(&self, target: &FetchTarget) {
        if let Err(e) = lock_storage(&self.storage).remove_frontier_entry(&target.url) {
            tracing::warn!("Could not clear checkpoint for {}: {}", target.url, e);
        }

        let (queued, in_flight) = {
            let mut frontier = lock(&self.frontier);
            frontier.complete();
            (frontier.len(), frontier.in_flight())
        };

        let visited = {
            let mut summary = lock(&self.summary);
            summary.targets_visited += 1;
            summary.targets_visited
        };

        if visited % PROGRESS_EVERY == 0 {
            let elapsed = self.started.elapsed();
            tracing::info!(
                "Progress: {} targets visited, {} queued, {} in flight, {:.2} targets/sec",
                visited,
                queued,
                in_flight,
                visited as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
            );
        }
    }
}

/// Runs a complete crawl operation
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `fresh` - Ignore resume state from earlier runs
///
/// # Returns
///
/// * `Ok(RunSummary)` - Crawl finished (completed or cancelled)
/// * `Err(WalkerError)` - Crawl failed with an error
///
/// # Example
///
/// ```no_run
/// use spider_walker::config::load_config;
/// use spider_walker::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("config.toml"))?;
/// let summary = run_crawl(config, false).await?;
/// println!("{} documents stored", summary.documents_stored);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, fresh: bool) -> Result<RunSummary, WalkerError> {
    let mut coordinator = Coordinator::new(config, fresh)?;
    coordinator.run().await
}
