//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::extract::{ExtractedDocument, Form, Link, Table};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{PersistenceError, PersistenceResult, Storage};
use crate::storage::{
    link_embedding_text, CommitOutcome, DocumentRecord, EmbeddingTarget, EmbeddingTargetKind,
    FrontierRecord, PreparedDocument, RunRecord, RunStatus, StoreAction, StoreStatistics,
    StoredLinkRecord,
};
use crate::url::url_hash;
use crate::WalkerError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(WalkerError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, WalkerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, WalkerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn read_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
        summary: row.get(5)?,
    })
}

fn encode_vector(vector: &[f32]) -> PersistenceResult<String> {
    Ok(serde_json::to_string(vector)?)
}

fn decode_vector(raw: Option<String>) -> PersistenceResult<Option<Vec<f32>>> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(PersistenceError::from)
}

fn find_document_id(conn: &Connection, fingerprint: &str) -> PersistenceResult<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM documents WHERE fingerprint = ?1",
            params![fingerprint],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Executes one store action against the open transaction
///
/// Returns the row id of an inserted document.
fn apply_action(conn: &Connection, action: &StoreAction<'_>) -> PersistenceResult<Option<i64>> {
    match *action {
        StoreAction::InsertDocument {
            document,
            embedding,
        } => insert_document(conn, document, embedding).map(Some),
        StoreAction::InsertForm {
            fingerprint,
            position,
            form,
            embedding,
        } => insert_form(conn, fingerprint, position, form, embedding).map(|_| None),
        StoreAction::InsertTable {
            fingerprint,
            position,
            table,
        } => insert_table(conn, fingerprint, position, table).map(|_| None),
        StoreAction::InsertImage { fingerprint, src } => {
            conn.execute(
                "INSERT INTO images (document_fingerprint, src) VALUES (?1, ?2)",
                params![fingerprint, src],
            )?;
            Ok(None)
        }
        StoreAction::MergeLink {
            link,
            linked_from,
            embedding,
        } => merge_link(conn, link, linked_from, embedding).map(|_| None),
        StoreAction::RecordNonHtmlLink { url, referrer } => {
            conn.execute(
                "INSERT OR IGNORE INTO non_html_links (url, referrer, discovered_at) VALUES (?1, ?2, ?3)",
                params![url, referrer, Utc::now().to_rfc3339()],
            )?;
            Ok(None)
        }
    }
}

fn insert_document(
    conn: &Connection,
    document: &ExtractedDocument,
    embedding: Option<&[f32]>,
) -> PersistenceResult<i64> {
    let headers = serde_json::to_string(&document.headers)?;
    let sections = serde_json::to_string(&document.sections)?;
    let web_tools = serde_json::to_string(&document.web_tools_detected)?;
    let embedding = embedding.map(encode_vector).transpose()?;

    conn.execute(
        "INSERT INTO documents (fingerprint, url, final_url, content_type, text, headers, sections,
                                web_tools, unsupported_content_type, fetched_at, stored_at, embedding)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            document.content_fingerprint,
            document.source_url,
            document.final_url,
            document.content_type,
            document.text,
            headers,
            sections,
            web_tools,
            document.unsupported_content_type,
            document.fetched_at.to_rfc3339(),
            Utc::now().to_rfc3339(),
            embedding,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

fn insert_form(
    conn: &Connection,
    fingerprint: &str,
    position: usize,
    form: &Form,
    embedding: Option<&[f32]>,
) -> PersistenceResult<()> {
    let serialized = serde_json::to_string(form)?;
    let embedding = embedding.map(encode_vector).transpose()?;

    conn.execute(
        "INSERT INTO forms (document_fingerprint, position, action, method, serialized, embedding)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            fingerprint,
            position as i64,
            form.action,
            form.method,
            serialized,
            embedding
        ],
    )?;
    let form_id = conn.last_insert_rowid();

    for field in &form.fields {
        conn.execute(
            "INSERT INTO form_fields (form_id, name, field_type, value_or_options) VALUES (?1, ?2, ?3, ?4)",
            params![
                form_id,
                field.name,
                field.field_type,
                serde_json::to_string(&field.value_or_options)?
            ],
        )?;
    }

    Ok(())
}

fn insert_table(
    conn: &Connection,
    fingerprint: &str,
    position: usize,
    table: &Table,
) -> PersistenceResult<()> {
    conn.execute(
        "INSERT INTO tables (document_fingerprint, position, label, rows) VALUES (?1, ?2, ?3, ?4)",
        params![
            fingerprint,
            position as i64,
            table.label,
            serde_json::to_string(&table.rows)?
        ],
    )?;
    Ok(())
}

/// Creates the link record or unions the new name and referrer into it
fn merge_link(
    conn: &Connection,
    link: &Link,
    linked_from: &str,
    embedding: Option<&[f32]>,
) -> PersistenceResult<()> {
    let id = url_hash(&link.target_url);
    let now = Utc::now().to_rfc3339();

    let existing: Option<(String, String, Option<String>)> = conn
        .query_row(
            "SELECT names, linked_from, embedding FROM links WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    match existing {
        Some((names_json, from_json, stored_embedding)) => {
            let mut names: BTreeSet<String> = serde_json::from_str(&names_json)?;
            let mut from: BTreeSet<String> = serde_json::from_str(&from_json)?;
            if !link.text.is_empty() {
                names.insert(link.text.clone());
            }
            from.insert(linked_from.to_string());

            let embedding = match stored_embedding {
                Some(stored) => Some(stored),
                None => embedding.map(encode_vector).transpose()?,
            };

            conn.execute(
                "UPDATE links SET names = ?1, linked_from = ?2, embedding = ?3, updated_at = ?4 WHERE id = ?5",
                params![
                    serde_json::to_string(&names)?,
                    serde_json::to_string(&from)?,
                    embedding,
                    now,
                    id
                ],
            )?;
        }
        None => {
            let names: BTreeSet<&str> = Some(link.text.as_str())
                .filter(|t| !t.is_empty())
                .into_iter()
                .collect();
            let from: BTreeSet<&str> = [linked_from].into_iter().collect();

            conn.execute(
                "INSERT INTO links (id, url, classification, names, linked_from, embedding, first_seen, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    id,
                    link.target_url,
                    link.classification.as_str(),
                    serde_json::to_string(&names)?,
                    serde_json::to_string(&from)?,
                    embedding.map(encode_vector).transpose()?,
                    now
                ],
            )?;
        }
    }

    Ok(())
}

fn count(conn: &Connection, sql: &str) -> PersistenceResult<u64> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(n as u64)
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> PersistenceResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> PersistenceResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, summary FROM runs WHERE id = ?1",
                params![run_id],
                read_run,
            )
            .optional()?
            .ok_or(PersistenceError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> PersistenceResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, summary FROM runs ORDER BY id DESC LIMIT 1",
                [],
                read_run,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        summary_json: &str,
    ) -> PersistenceResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, summary = ?3 WHERE id = ?4",
            params![status.to_db_string(), now, summary_json, run_id],
        )?;
        if updated == 0 {
            return Err(PersistenceError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Documents =====

    fn commit(&mut self, prepared: &PreparedDocument) -> PersistenceResult<CommitOutcome> {
        let tx = self.conn.transaction()?;

        if let Some(document_id) = find_document_id(&tx, &prepared.document.content_fingerprint)? {
            return Ok(CommitOutcome::AlreadyStored { document_id });
        }

        let mut document_id = 0;
        for action in prepared.actions() {
            if let Some(id) = apply_action(&tx, &action)? {
                document_id = id;
            }
        }

        tx.commit()?;
        Ok(CommitOutcome::Stored { document_id })
    }

    fn has_fingerprint(&self, fingerprint: &str) -> PersistenceResult<bool> {
        Ok(find_document_id(&self.conn, fingerprint)?.is_some())
    }

    fn get_document(&self, fingerprint: &str) -> PersistenceResult<Option<DocumentRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, url, final_url, fingerprint, content_type, text, headers, sections,
                        web_tools, unsupported_content_type, fetched_at, embedding
                 FROM documents WHERE fingerprint = ?1",
                params![fingerprint],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, Option<String>>(9)?,
                        row.get::<_, String>(10)?,
                        row.get::<_, Option<String>>(11)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            id,
            url,
            final_url,
            fingerprint,
            content_type,
            text,
            headers,
            sections,
            web_tools,
            unsupported_content_type,
            fetched_at,
            embedding,
        )) = row
        else {
            return Ok(None);
        };

        Ok(Some(DocumentRecord {
            id,
            url,
            final_url,
            fingerprint,
            content_type,
            text,
            headers: serde_json::from_str(&headers)?,
            sections: serde_json::from_str(&sections)?,
            web_tools: serde_json::from_str(&web_tools)?,
            unsupported_content_type,
            fetched_at,
            embedding: decode_vector(embedding)?,
        }))
    }

    // ===== Link Records =====

    fn get_link_record(&self, url: &str) -> PersistenceResult<Option<StoredLinkRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, url, classification, names, linked_from, embedding FROM links WHERE id = ?1",
                params![url_hash(url)],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, url, classification, names, linked_from, embedding)) => {
                Ok(Some(StoredLinkRecord {
                    id,
                    url,
                    classification,
                    names: serde_json::from_str(&names)?,
                    linked_from: serde_json::from_str(&linked_from)?,
                    embedding: decode_vector(embedding)?,
                }))
            }
            None => Ok(None),
        }
    }

    fn record_non_html_link(&mut self, url: &str, referrer: &str) -> PersistenceResult<()> {
        apply_action(&self.conn, &StoreAction::RecordNonHtmlLink { url, referrer })?;
        Ok(())
    }

    // ===== Frontier Checkpoint =====

    fn save_frontier_entry(&mut self, entry: &FrontierRecord) -> PersistenceResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO frontier (url, depth, originating_url, seq) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.url,
                entry.depth,
                entry.originating_url,
                entry.seq as i64
            ],
        )?;
        Ok(())
    }

    fn remove_frontier_entry(&mut self, url: &str) -> PersistenceResult<()> {
        self.conn
            .execute("DELETE FROM frontier WHERE url = ?1", params![url])?;
        Ok(())
    }

    fn load_frontier(&self) -> PersistenceResult<Vec<FrontierRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url, depth, originating_url, seq FROM frontier ORDER BY seq")?;

        let entries = stmt
            .query_map([], |row| {
                Ok(FrontierRecord {
                    url: row.get(0)?,
                    depth: row.get(1)?,
                    originating_url: row.get(2)?,
                    seq: row.get::<_, i64>(3)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn clear_frontier(&mut self) -> PersistenceResult<()> {
        self.conn.execute("DELETE FROM frontier", [])?;
        Ok(())
    }

    // ===== Embeddings =====

    fn missing_embeddings(
        &self,
        kind: EmbeddingTargetKind,
        after: Option<&str>,
        limit: usize,
    ) -> PersistenceResult<Vec<EmbeddingTarget>> {
        let limit = limit as i64;

        match kind {
            EmbeddingTargetKind::Document | EmbeddingTargetKind::Form => {
                let sql = if kind == EmbeddingTargetKind::Document {
                    "SELECT id, text FROM documents WHERE embedding IS NULL AND text != '' AND id > ?1 ORDER BY id LIMIT ?2"
                } else {
                    "SELECT id, serialized FROM forms WHERE embedding IS NULL AND id > ?1 ORDER BY id LIMIT ?2"
                };
                let cursor = after.and_then(|key| key.parse::<i64>().ok()).unwrap_or(0);

                let mut stmt = self.conn.prepare(sql)?;
                let targets = stmt
                    .query_map(params![cursor, limit], |row| {
                        Ok(EmbeddingTarget {
                            kind,
                            key: row.get::<_, i64>(0)?.to_string(),
                            text: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(targets)
            }
            EmbeddingTargetKind::Link => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, url, names FROM links WHERE embedding IS NULL AND id > ?1 ORDER BY id LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![after.unwrap_or(""), limit], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(id, url, names)| {
                        let names: BTreeSet<String> = serde_json::from_str(&names)?;
                        Ok(EmbeddingTarget {
                            kind,
                            key: id,
                            text: link_embedding_text(&url, names.iter().map(String::as_str)),
                        })
                    })
                    .collect()
            }
        }
    }

    fn set_embedding(
        &mut self,
        target: &EmbeddingTarget,
        vector: &[f32],
    ) -> PersistenceResult<()> {
        let encoded = encode_vector(vector)?;
        match target.kind {
            EmbeddingTargetKind::Document => self.conn.execute(
                "UPDATE documents SET embedding = ?1 WHERE id = ?2",
                params![encoded, target.key],
            )?,
            EmbeddingTargetKind::Form => self.conn.execute(
                "UPDATE forms SET embedding = ?1 WHERE id = ?2",
                params![encoded, target.key],
            )?,
            EmbeddingTargetKind::Link => self.conn.execute(
                "UPDATE links SET embedding = ?1, updated_at = ?2 WHERE id = ?3",
                params![encoded, Utc::now().to_rfc3339(), target.key],
            )?,
        };
        Ok(())
    }

    fn document_vectors(&self) -> PersistenceResult<Vec<(String, String, Vec<f32>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, fingerprint, embedding FROM documents WHERE embedding IS NOT NULL ORDER BY id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(url, fingerprint, raw)| Ok((url, fingerprint, serde_json::from_str(&raw)?)))
            .collect()
    }

    // ===== Statistics =====

    fn statistics(&self) -> PersistenceResult<StoreStatistics> {
        let conn = &self.conn;
        Ok(StoreStatistics {
            documents: count(conn, "SELECT COUNT(*) FROM documents")?,
            links: count(conn, "SELECT COUNT(*) FROM links")?,
            forms: count(conn, "SELECT COUNT(*) FROM forms")?,
            form_fields: count(conn, "SELECT COUNT(*) FROM form_fields")?,
            images: count(conn, "SELECT COUNT(*) FROM images")?,
            tables: count(conn, "SELECT COUNT(*) FROM tables")?,
            non_html_links: count(conn, "SELECT COUNT(*) FROM non_html_links")?,
            pending_frontier: count(conn, "SELECT COUNT(*) FROM frontier")?,
            missing_embeddings: count(
                conn,
                "SELECT (SELECT COUNT(*) FROM documents WHERE embedding IS NULL AND text != '')
                      + (SELECT COUNT(*) FROM forms WHERE embedding IS NULL)
                      + (SELECT COUNT(*) FROM links WHERE embedding IS NULL)",
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{FieldValue, FormField, LinkSet};
    use crate::url::LinkClass;
    use std::collections::BTreeMap;

    fn document(source: &str, fingerprint: &str, links: Vec<(&str, &str, LinkClass)>) -> ExtractedDocument {
        let mut set = LinkSet::default();
        for (text, target, class) in links {
            set.push(Link {
                text: text.to_string(),
                target_url: target.to_string(),
                classification: class,
            });
        }

        ExtractedDocument {
            source_url: source.to_string(),
            final_url: source.to_string(),
            content_type: "text/html".to_string(),
            content_fingerprint: fingerprint.to_string(),
            text: "water quality readings".to_string(),
            sections: vec![],
            links: set,
            tables: vec![Table {
                label: None,
                rows: vec![
                    vec!["h1".to_string(), "h2".to_string()],
                    vec!["v1".to_string(), "v2".to_string()],
                ],
            }],
            forms: vec![Form {
                action: Some(format!("{}search", source)),
                method: Some("GET".to_string()),
                fields: vec![FormField {
                    name: Some("q".to_string()),
                    field_type: "text".to_string(),
                    value_or_options: FieldValue::Value(None),
                }],
            }],
            images: vec![format!("{}logo.png", source)],
            web_tools_detected: vec![],
            headers: BTreeMap::new(),
            unsupported_content_type: None,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteStorage::new_in_memory().is_ok());
    }

    #[test]
    fn test_run_lifecycle() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("test_hash").unwrap();
        assert!(run_id > 0);

        storage
            .finish_run(run_id, RunStatus::Completed, "{\"documents_stored\":1}")
            .unwrap();

        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());
        assert_eq!(run.summary.as_deref(), Some("{\"documents_stored\":1}"));
    }

    #[test]
    fn test_get_missing_run() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(matches!(
            storage.get_run(99),
            Err(PersistenceError::RunNotFound(99))
        ));
    }

    #[test]
    fn test_commit_stores_all_rows() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let doc = document(
            "https://example.gov/",
            "fp1",
            vec![("Next", "https://example.gov/next", LinkClass::Internal)],
        );

        let outcome = storage
            .commit(&PreparedDocument::without_embeddings(doc))
            .unwrap();
        assert!(matches!(outcome, CommitOutcome::Stored { .. }));

        let stats = storage.statistics().unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.forms, 1);
        assert_eq!(stats.form_fields, 1);
        assert_eq!(stats.images, 1);
        assert_eq!(stats.tables, 1);
        assert_eq!(stats.links, 1);

        let stored = storage.get_document("fp1").unwrap().unwrap();
        assert_eq!(stored.url, "https://example.gov/");
        assert!(stored.embedding.is_none());
    }

    #[test]
    fn test_commit_is_idempotent_on_fingerprint() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let first = document(
            "https://example.gov/a",
            "same",
            vec![("A", "https://example.gov/x", LinkClass::Internal)],
        );
        let second = document(
            "https://example.gov/b",
            "same",
            vec![("B", "https://example.gov/x", LinkClass::Internal)],
        );

        let CommitOutcome::Stored { document_id } = storage
            .commit(&PreparedDocument::without_embeddings(first))
            .unwrap()
        else {
            panic!("first commit should store");
        };
        let outcome = storage
            .commit(&PreparedDocument::without_embeddings(second))
            .unwrap();

        assert_eq!(outcome, CommitOutcome::AlreadyStored { document_id });
        let stats = storage.statistics().unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.forms, 1);

        let link = storage
            .get_link_record("https://example.gov/x")
            .unwrap()
            .unwrap();
        assert_eq!(link.names.len(), 1);
    }

    #[test]
    fn test_link_merge_unions_names_and_referrers() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let target = "https://example.gov/shared";

        storage
            .commit(&PreparedDocument::without_embeddings(document(
                "https://example.gov/one",
                "fp-one",
                vec![("A", target, LinkClass::Internal)],
            )))
            .unwrap();
        storage
            .commit(&PreparedDocument::without_embeddings(document(
                "https://example.gov/two",
                "fp-two",
                vec![("B", target, LinkClass::Internal), ("A", target, LinkClass::Internal)],
            )))
            .unwrap();

        let link = storage.get_link_record(target).unwrap().unwrap();
        assert_eq!(link.id, url_hash(target));
        assert_eq!(
            link.names,
            ["A", "B"].iter().map(|s| s.to_string()).collect()
        );
        assert_eq!(
            link.linked_from,
            ["https://example.gov/one", "https://example.gov/two"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        );
        assert_eq!(storage.statistics().unwrap().links, 1);
    }

    #[test]
    fn test_link_merge_keeps_existing_embedding() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let target = "https://example.gov/shared";

        let mut first = PreparedDocument::without_embeddings(document(
            "https://example.gov/one",
            "fp-one",
            vec![("A", target, LinkClass::Internal)],
        ));
        first
            .link_embeddings
            .insert(target.to_string(), vec![1.0, 0.0]);
        storage.commit(&first).unwrap();

        let mut second = PreparedDocument::without_embeddings(document(
            "https://example.gov/two",
            "fp-two",
            vec![("B", target, LinkClass::Internal)],
        ));
        second
            .link_embeddings
            .insert(target.to_string(), vec![0.0, 1.0]);
        storage.commit(&second).unwrap();

        let link = storage.get_link_record(target).unwrap().unwrap();
        assert_eq!(link.embedding, Some(vec![1.0, 0.0]));
    }

    #[test]
    fn test_failed_commit_leaves_no_rows() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .connection()
            .execute_batch("DROP TABLE images;")
            .unwrap();

        let doc = document(
            "https://example.gov/",
            "fp1",
            vec![("Next", "https://example.gov/next", LinkClass::Internal)],
        );
        let result = storage.commit(&PreparedDocument::without_embeddings(doc));
        assert!(matches!(result, Err(PersistenceError::WriteFailed(_))));

        let documents: i64 = storage
            .connection()
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .unwrap();
        let forms: i64 = storage
            .connection()
            .query_row("SELECT COUNT(*) FROM forms", [], |row| row.get(0))
            .unwrap();
        assert_eq!(documents, 0);
        assert_eq!(forms, 0);
        assert!(!storage.has_fingerprint("fp1").unwrap());
    }

    #[test]
    fn test_non_html_links_recorded_once_per_referrer() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let mut doc = document(
            "https://example.gov/",
            "fp1",
            vec![
                ("Report", "https://example.gov/r.pdf", LinkClass::NonHtml),
                ("Report again", "https://example.gov/r.pdf", LinkClass::NonHtml),
            ],
        );
        doc.forms.clear();

        storage
            .commit(&PreparedDocument::without_embeddings(doc))
            .unwrap();
        assert_eq!(storage.statistics().unwrap().non_html_links, 1);
    }

    #[test]
    fn test_frontier_checkpoint() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let entries = [
            FrontierRecord {
                url: "https://example.gov/b".to_string(),
                depth: 1,
                originating_url: Some("https://example.gov/".to_string()),
                seq: 2,
            },
            FrontierRecord {
                url: "https://example.gov/".to_string(),
                depth: 0,
                originating_url: None,
                seq: 1,
            },
        ];
        for entry in &entries {
            storage.save_frontier_entry(entry).unwrap();
        }

        let loaded = storage.load_frontier().unwrap();
        assert_eq!(loaded, vec![entries[1].clone(), entries[0].clone()]);

        storage.remove_frontier_entry("https://example.gov/").unwrap();
        assert_eq!(storage.load_frontier().unwrap().len(), 1);

        storage.clear_frontier().unwrap();
        assert!(storage.load_frontier().unwrap().is_empty());
    }

    #[test]
    fn test_missing_embeddings_and_set() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .commit(&PreparedDocument::without_embeddings(document(
                "https://example.gov/",
                "fp1",
                vec![("Next", "https://example.gov/next", LinkClass::Internal)],
            )))
            .unwrap();

        let kinds = [
            EmbeddingTargetKind::Document,
            EmbeddingTargetKind::Form,
            EmbeddingTargetKind::Link,
        ];
        let missing: Vec<_> = kinds
            .iter()
            .flat_map(|kind| storage.missing_embeddings(*kind, None, 100).unwrap())
            .collect();
        assert_eq!(missing.len(), 3);
        let link = missing
            .iter()
            .find(|t| t.kind == EmbeddingTargetKind::Link)
            .unwrap();
        assert_eq!(link.text, "https://example.gov/next Next");

        for target in &missing {
            storage.set_embedding(target, &[0.5, 0.5]).unwrap();
        }
        for kind in kinds {
            assert!(storage.missing_embeddings(kind, None, 100).unwrap().is_empty());
        }
        assert_eq!(storage.statistics().unwrap().missing_embeddings, 0);

        let vectors = storage.document_vectors().unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].1, "fp1");
        assert_eq!(vectors[0].2, vec![0.5, 0.5]);
    }

    #[test]
    fn test_missing_embeddings_pages_by_key() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        for i in 0..3 {
            let mut doc = document(&format!("https://example.gov/{}", i), &format!("fp{}", i), vec![]);
            doc.forms.clear();
            storage
                .commit(&PreparedDocument::without_embeddings(doc))
                .unwrap();
        }

        let first = storage
            .missing_embeddings(EmbeddingTargetKind::Document, None, 2)
            .unwrap();
        assert_eq!(first.len(), 2);

        // Rows left null are not returned again past the cursor
        let rest = storage
            .missing_embeddings(EmbeddingTargetKind::Document, Some(&first[1].key), 2)
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert!(rest[0].key.parse::<i64>().unwrap() > first[1].key.parse::<i64>().unwrap());

        let done = storage
            .missing_embeddings(EmbeddingTargetKind::Document, Some(&rest[0].key), 2)
            .unwrap();
        assert!(done.is_empty());
    }
}
