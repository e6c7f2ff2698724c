//! Storage module for persisting extracted documents
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Transactional, fingerprint-idempotent document commits
//! - Merge-on-write link records
//! - Pending frontier checkpointing for resumption
//! - Embedding storage and backfill
//! - Run tracking

mod pipeline;
mod schema;
mod sqlite;
mod traits;

pub use pipeline::{
    backfill_embeddings, embed_and_store, lock_storage, prepare_document, BackfillReport,
};
pub use sqlite::SqliteStorage;
pub use traits::{PersistenceError, PersistenceResult, Storage};

use crate::extract::{ExtractedDocument, Form, Link, Section, Table};
use crate::WalkerError;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, WalkerError> {
    SqliteStorage::new(path)
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    /// Serialized run summary, set when the run finishes
    pub summary: Option<String>,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A stored document row
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: i64,
    pub url: String,
    pub final_url: String,
    pub fingerprint: String,
    pub content_type: String,
    pub text: String,
    pub headers: BTreeMap<String, String>,
    pub sections: Vec<Section>,
    pub web_tools: Vec<String>,
    pub unsupported_content_type: Option<String>,
    pub fetched_at: String,
    pub embedding: Option<Vec<f32>>,
}

/// A link target merged across every page that references it
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLinkRecord {
    /// Hash of the target URL
    pub id: String,
    pub url: String,
    pub classification: String,
    /// Anchor texts seen for this target
    pub names: BTreeSet<String>,
    /// Pages that link to this target
    pub linked_from: BTreeSet<String>,
    pub embedding: Option<Vec<f32>>,
}

/// A pending fetch target persisted for resumption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierRecord {
    pub url: String,
    pub depth: u32,
    pub originating_url: Option<String>,
    pub seq: u64,
}

/// Which table a missing embedding belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTargetKind {
    Document,
    Form,
    Link,
}

/// A row whose vector is null, with the text it should be embedded from
#[derive(Debug, Clone)]
pub struct EmbeddingTarget {
    pub kind: EmbeddingTargetKind,
    /// Row key: numeric id for documents and forms, url hash for links
    pub key: String,
    pub text: String,
}

/// Row counts across the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStatistics {
    pub documents: u64,
    pub links: u64,
    pub forms: u64,
    pub form_fields: u64,
    pub images: u64,
    pub tables: u64,
    pub non_html_links: u64,
    pub pending_frontier: u64,
    pub missing_embeddings: u64,
}

/// Result of committing a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Stored { document_id: i64 },
    AlreadyStored { document_id: i64 },
}

/// A document together with the vectors computed for it before the write
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub document: ExtractedDocument,
    pub document_embedding: Option<Vec<f32>>,
    /// One entry per form, in document order
    pub form_embeddings: Vec<Option<Vec<f32>>>,
    /// Keyed by link target URL
    pub link_embeddings: HashMap<String, Vec<f32>>,
}

impl PreparedDocument {
    /// A document with every vector left null
    pub fn without_embeddings(document: ExtractedDocument) -> Self {
        let forms = document.forms.len();
        Self {
            document,
            document_embedding: None,
            form_embeddings: vec![None; forms],
            link_embeddings: HashMap::new(),
        }
    }

    /// The write operations this document expands into, in execution order
    pub fn actions(&self) -> Vec<StoreAction<'_>> {
        let doc = &self.document;
        let fingerprint = doc.content_fingerprint.as_str();
        let mut actions = vec![StoreAction::InsertDocument {
            document: doc,
            embedding: self.document_embedding.as_deref(),
        }];

        for (position, form) in doc.forms.iter().enumerate() {
            actions.push(StoreAction::InsertForm {
                fingerprint,
                position,
                form,
                embedding: self.form_embeddings.get(position).and_then(|e| e.as_deref()),
            });
        }

        for (position, table) in doc.tables.iter().enumerate() {
            actions.push(StoreAction::InsertTable {
                fingerprint,
                position,
                table,
            });
        }

        for src in &doc.images {
            actions.push(StoreAction::InsertImage { fingerprint, src });
        }

        for link in doc.links.iter() {
            actions.push(StoreAction::MergeLink {
                link,
                linked_from: &doc.source_url,
                embedding: self.link_embeddings.get(&link.target_url).map(Vec::as_slice),
            });
        }

        for link in &doc.links.non_html {
            actions.push(StoreAction::RecordNonHtmlLink {
                url: &link.target_url,
                referrer: &doc.source_url,
            });
        }

        actions
    }
}

/// One write operation, dispatched to its handler inside the commit transaction
#[derive(Debug, Clone, Copy)]
pub enum StoreAction<'a> {
    InsertDocument {
        document: &'a ExtractedDocument,
        embedding: Option<&'a [f32]>,
    },
    InsertForm {
        fingerprint: &'a str,
        position: usize,
        form: &'a Form,
        embedding: Option<&'a [f32]>,
    },
    InsertTable {
        fingerprint: &'a str,
        position: usize,
        table: &'a Table,
    },
    InsertImage {
        fingerprint: &'a str,
        src: &'a str,
    },
    MergeLink {
        link: &'a Link,
        linked_from: &'a str,
        embedding: Option<&'a [f32]>,
    },
    RecordNonHtmlLink {
        url: &'a str,
        referrer: &'a str,
    },
}

/// Text a link is embedded from: its URL followed by its anchor texts
pub fn link_embedding_text<'a>(url: &str, names: impl IntoIterator<Item = &'a str>) -> String {
    let mut text = url.to_string();
    for name in names {
        if !name.is_empty() {
            text.push(' ');
            text.push_str(name);
        }
    }
    text
}

/// Text a form is embedded from: its JSON serialization
pub fn form_embedding_text(form: &Form) -> Result<String, serde_json::Error> {
    serde_json::to_string(form)
}
