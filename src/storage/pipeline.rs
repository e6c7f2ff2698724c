//! Embed-then-commit pipeline and embedding backfill
//!
//! Embedding calls are made before the store lock is taken, so the commit
//! itself never waits on the network.

use crate::embedding::Embedder;
use crate::extract::ExtractedDocument;
use crate::storage::traits::{PersistenceError, PersistenceResult, Storage};
use crate::storage::{
    form_embedding_text, link_embedding_text, CommitOutcome, EmbeddingTargetKind,
    PreparedDocument, SqliteStorage,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Rows fetched per backfill batch
const BACKFILL_BATCH: usize = 100;

/// Locks the shared store
///
/// A worker that panicked mid-commit leaves no partial rows behind (the
/// transaction rolls back on drop), so a poisoned lock is still usable.
pub fn lock_storage(storage: &Mutex<SqliteStorage>) -> MutexGuard<'_, SqliteStorage> {
    storage.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn embed_or_null(embedder: &dyn Embedder, text: &str, what: &str) -> Option<Vec<f32>> {
    if text.trim().is_empty() {
        return None;
    }

    match embedder.embed(text).await {
        Ok(vector) => Some(vector),
        Err(e) => {
            let err = PersistenceError::EmbeddingFailed(e.to_string());
            tracing::warn!("{} for {}; storing null vector", err, what);
            None
        }
    }
}

/// Computes every vector a document needs
///
/// Failed embeddings are left as `None` and can be filled in later by
/// [`backfill_embeddings`].
pub async fn prepare_document(
    embedder: &dyn Embedder,
    document: ExtractedDocument,
) -> PreparedDocument {
    let document_embedding = embed_or_null(embedder, &document.text, &document.source_url).await;

    let mut form_embeddings = Vec::with_capacity(document.forms.len());
    for form in &document.forms {
        let vector = match form_embedding_text(form) {
            Ok(text) => embed_or_null(embedder, &text, "form").await,
            Err(e) => {
                tracing::warn!("Could not serialize form on {}: {}", document.source_url, e);
                None
            }
        };
        form_embeddings.push(vector);
    }

    let mut link_embeddings = HashMap::new();
    for link in document.links.iter() {
        if link_embeddings.contains_key(&link.target_url) {
            continue;
        }
        let text = link_embedding_text(&link.target_url, [link.text.as_str()]);
        if let Some(vector) = embed_or_null(embedder, &text, &link.target_url).await {
            link_embeddings.insert(link.target_url.clone(), vector);
        }
    }

    PreparedDocument {
        document,
        document_embedding,
        form_embeddings,
        link_embeddings,
    }
}

/// Embeds a document and commits it
///
/// Documents whose fingerprint is already stored skip embedding entirely; the
/// commit still runs and reports `AlreadyStored`. A failed write is retried
/// once before the error is returned.
pub async fn embed_and_store(
    embedder: &dyn Embedder,
    storage: &Mutex<SqliteStorage>,
    document: ExtractedDocument,
) -> PersistenceResult<CommitOutcome> {
    let known = lock_storage(storage).has_fingerprint(&document.content_fingerprint)?;

    let prepared = if known {
        PreparedDocument::without_embeddings(document)
    } else {
        prepare_document(embedder, document).await
    };

    let mut store = lock_storage(storage);
    match store.commit(&prepared) {
        Err(PersistenceError::WriteFailed(e)) => {
            tracing::warn!(
                "Write failed for {}, retrying once: {}",
                prepared.document.source_url,
                e
            );
            store.commit(&prepared)
        }
        other => other,
    }
}

/// Counts from a backfill pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub embedded: usize,
    pub failed: usize,
}

/// Embeds every stored row whose vector is null
///
/// Each table is walked once in key order, so a row that keeps failing is
/// counted once and never blocks the rows after it.
pub async fn backfill_embeddings(
    embedder: &dyn Embedder,
    storage: &Mutex<SqliteStorage>,
) -> PersistenceResult<BackfillReport> {
    let mut report = BackfillReport::default();

    for kind in [
        EmbeddingTargetKind::Document,
        EmbeddingTargetKind::Form,
        EmbeddingTargetKind::Link,
    ] {
        let mut cursor: Option<String> = None;

        loop {
            let targets =
                lock_storage(storage).missing_embeddings(kind, cursor.as_deref(), BACKFILL_BATCH)?;
            let Some(last) = targets.last() else {
                break;
            };
            cursor = Some(last.key.clone());

            for target in &targets {
                match embedder.embed(&target.text).await {
                    Ok(vector) => {
                        lock_storage(storage).set_embedding(target, &vector)?;
                        report.embedded += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Backfill failed for {:?} {}: {}", target.kind, target.key, e);
                        report.failed += 1;
                    }
                }
            }
        }
    }

    tracing::info!(
        "Backfill complete: {} embedded, {} failed",
        report.embedded,
        report.failed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingError, EmbeddingResult, HashingEmbedder};
    use crate::extract::{Link, LinkSet};
    use crate::url::LinkClass;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeMap;

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> EmbeddingResult<Vec<f32>> {
            Err(EmbeddingError::Response("unavailable".to_string()))
        }

        fn dimensions(&self) -> usize {
            8
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn document(fingerprint: &str) -> ExtractedDocument {
        let mut links = LinkSet::default();
        links.push(Link {
            text: "Budget".to_string(),
            target_url: "https://example.gov/budget".to_string(),
            classification: LinkClass::Internal,
        });

        ExtractedDocument {
            source_url: "https://example.gov/".to_string(),
            final_url: "https://example.gov/".to_string(),
            content_type: "text/html".to_string(),
            content_fingerprint: fingerprint.to_string(),
            text: "county budget documents".to_string(),
            sections: vec![],
            links,
            tables: vec![],
            forms: vec![],
            images: vec![],
            web_tools_detected: vec![],
            headers: BTreeMap::new(),
            unsupported_content_type: None,
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_embed_and_store_sets_vectors() {
        let storage = Mutex::new(SqliteStorage::new_in_memory().unwrap());
        let embedder = HashingEmbedder::new(16);

        let outcome = embed_and_store(&embedder, &storage, document("fp1"))
            .await
            .unwrap();
        assert!(matches!(outcome, CommitOutcome::Stored { .. }));

        let store = lock_storage(&storage);
        let doc = store.get_document("fp1").unwrap().unwrap();
        assert_eq!(doc.embedding.map(|v| v.len()), Some(16));
        let link = store
            .get_link_record("https://example.gov/budget")
            .unwrap()
            .unwrap();
        assert!(link.embedding.is_some());
    }

    #[tokio::test]
    async fn test_embedding_failure_stores_null_then_backfills() {
        let storage = Mutex::new(SqliteStorage::new_in_memory().unwrap());

        embed_and_store(&FailingEmbedder, &storage, document("fp1"))
            .await
            .unwrap();
        assert!(lock_storage(&storage)
            .get_document("fp1")
            .unwrap()
            .unwrap()
            .embedding
            .is_none());

        let failed = backfill_embeddings(&FailingEmbedder, &storage)
            .await
            .unwrap();
        assert_eq!(failed.embedded, 0);
        assert_eq!(failed.failed, 2);

        let report = backfill_embeddings(&HashingEmbedder::new(16), &storage)
            .await
            .unwrap();
        assert_eq!(report.embedded, 2);
        assert_eq!(
            lock_storage(&storage).statistics().unwrap().missing_embeddings,
            0
        );
    }

    #[tokio::test]
    async fn test_repeat_fingerprint_is_noop() {
        let storage = Mutex::new(SqliteStorage::new_in_memory().unwrap());
        let embedder = HashingEmbedder::new(16);

        embed_and_store(&embedder, &storage, document("fp1"))
            .await
            .unwrap();
        let outcome = embed_and_store(&embedder, &storage, document("fp1"))
            .await
            .unwrap();

        assert!(matches!(outcome, CommitOutcome::AlreadyStored { .. }));
        assert_eq!(lock_storage(&storage).statistics().unwrap().documents, 1);
    }

    /// Rejects any text longer than a few words
    struct ShortTextEmbedder;

    #[async_trait]
    impl Embedder for ShortTextEmbedder {
        async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
            if text.split_whitespace().count() > 10 {
                return Err(EmbeddingError::Response("input too long".to_string()));
            }
            HashingEmbedder::new(8).embed(text).await
        }

        fn dimensions(&self) -> usize {
            8
        }

        fn name(&self) -> &'static str {
            "short-text"
        }
    }

    #[tokio::test]
    async fn test_backfill_reaches_links_past_failing_documents() {
        let storage = Mutex::new(SqliteStorage::new_in_memory().unwrap());
        let long_text = vec!["minutes"; 50].join(" ");

        for i in 0..150 {
            let mut doc = document(&format!("fp{}", i));
            doc.source_url = format!("https://example.gov/meetings/{}", i);
            doc.text = format!("{} {}", long_text, i);
            doc.links.internal[0].target_url = format!("https://example.gov/agenda/{}", i);
            embed_and_store(&FailingEmbedder, &storage, doc)
                .await
                .unwrap();
        }
        assert_eq!(
            lock_storage(&storage).statistics().unwrap().missing_embeddings,
            300
        );

        let report = backfill_embeddings(&ShortTextEmbedder, &storage)
            .await
            .unwrap();

        assert_eq!(report.embedded, 150);
        assert_eq!(report.failed, 150);
        assert_eq!(
            lock_storage(&storage).statistics().unwrap().missing_embeddings,
            150
        );
        assert!(lock_storage(&storage)
            .get_link_record("https://example.gov/agenda/149")
            .unwrap()
            .unwrap()
            .embedding
            .is_some());
    }
}
