//! Storage traits and error types
//!
//! This module defines the trait interface for the persistence backend and
//! associated error types.

use crate::storage::{
    CommitOutcome, DocumentRecord, EmbeddingTarget, EmbeddingTargetKind, FrontierRecord,
    PreparedDocument, RunRecord, RunStatus, StoredLinkRecord, StoreStatistics,
};
use thiserror::Error;

/// Errors that can occur during persistence operations
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Write failed: {0}")]
    WriteFailed(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run not found: {0}")]
    RunNotFound(i64),
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Trait for persistence backend implementations
///
/// Writes of one document happen inside a single transaction: either every
/// row derived from the document lands, or none does.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run and returns its ID
    fn create_run(&mut self, config_hash: &str) -> PersistenceResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> PersistenceResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> PersistenceResult<Option<RunRecord>>;

    /// Closes a run with its final status and serialized summary
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        summary_json: &str,
    ) -> PersistenceResult<()>;

    // ===== Documents =====

    /// Stores a document and everything derived from it
    ///
    /// # Returns
    ///
    /// * `CommitOutcome::Stored` - The fingerprint was new and all rows were written
    /// * `CommitOutcome::AlreadyStored` - A document with this fingerprint exists; nothing changed
    fn commit(&mut self, prepared: &PreparedDocument) -> PersistenceResult<CommitOutcome>;

    /// Returns true if a document with this fingerprint is stored
    fn has_fingerprint(&self, fingerprint: &str) -> PersistenceResult<bool>;

    /// Gets a stored document by fingerprint
    fn get_document(&self, fingerprint: &str) -> PersistenceResult<Option<DocumentRecord>>;

    // ===== Link Records =====

    /// Gets the merged record for a link target
    fn get_link_record(&self, url: &str) -> PersistenceResult<Option<StoredLinkRecord>>;

    /// Records a non-traversable link outside a document commit
    fn record_non_html_link(&mut self, url: &str, referrer: &str) -> PersistenceResult<()>;

    // ===== Frontier Checkpoint =====

    /// Records an accepted fetch target
    fn save_frontier_entry(&mut self, entry: &FrontierRecord) -> PersistenceResult<()>;

    /// Removes a target once it has been handled
    fn remove_frontier_entry(&mut self, url: &str) -> PersistenceResult<()>;

    /// Loads pending targets in insertion order
    fn load_frontier(&self) -> PersistenceResult<Vec<FrontierRecord>>;

    /// Clears all pending targets
    fn clear_frontier(&mut self) -> PersistenceResult<()>;

    // ===== Embeddings =====

    /// Rows of one kind whose vector is still null, ordered by key
    ///
    /// Only rows with a key greater than `after` are returned, so callers can
    /// page through a table once even when some rows keep failing.
    fn missing_embeddings(
        &self,
        kind: EmbeddingTargetKind,
        after: Option<&str>,
        limit: usize,
    ) -> PersistenceResult<Vec<EmbeddingTarget>>;

    /// Fills in the vector of a row found by `missing_embeddings`
    fn set_embedding(&mut self, target: &EmbeddingTarget, vector: &[f32])
        -> PersistenceResult<()>;

    /// URL, fingerprint and vector of every embedded document
    fn document_vectors(&self) -> PersistenceResult<Vec<(String, String, Vec<f32>)>>;

    // ===== Statistics =====

    /// Row counts across the store
    fn statistics(&self) -> PersistenceResult<StoreStatistics>;
}
