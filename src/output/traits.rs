//! Output sink traits and run summary types
//!
//! This module defines the trait interface for document sinks and the
//! summary recorded for every crawl run.

use crate::extract::ExtractedDocument;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur while writing a document to a sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upload to {url} failed with status {status}")]
    Upload { url: String, status: u16 },
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Destination for a serialized copy of every newly stored document
///
/// Documents are keyed by content fingerprint. Writes happen after the
/// database commit and never undo it.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Writes one document
    async fn write(&self, document: &ExtractedDocument) -> SinkResult<()>;

    /// Short sink name for logs
    fn name(&self) -> &'static str;
}

/// Summary statistics for a crawl run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    // Run metadata
    pub run_id: i64,
    pub status: String,
    pub duration_ms: u64,

    // Per-target outcomes
    pub targets_visited: u64,
    pub documents_stored: u64,
    pub duplicates: u64,
    /// Documents lost to a write failure that persisted after one retry
    pub dropped: u64,
    /// Rate-limited targets put back on the frontier
    pub retries: u64,

    /// Error label -> count
    pub errors_by_kind: BTreeMap<String, u64>,

    /// API and non-HTML links seen on fetched documents
    pub non_traversable_links: u64,

    pub sink_failed: u64,
}

impl RunSummary {
    /// Creates a new empty run summary
    pub fn new(run_id: i64) -> Self {
        Self {
            run_id,
            ..Self::default()
        }
    }

    /// Counts one error under `kind`
    pub fn record_error(&mut self, kind: impl Into<String>) {
        *self.errors_by_kind.entry(kind.into()).or_insert(0) += 1;
    }

    pub fn total_errors(&self) -> u64 {
        self.errors_by_kind.values().sum()
    }

    /// Share of visited targets that produced a new or duplicate document, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.targets_visited == 0 {
            return 0.0;
        }
        ((self.documents_stored + self.duplicates) as f64 / self.targets_visited as f64) * 100.0
    }
}
