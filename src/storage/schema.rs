//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the spider-walker database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    summary TEXT
);

-- One row per distinct content fingerprint
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    final_url TEXT NOT NULL,
    content_type TEXT NOT NULL,
    text TEXT NOT NULL,
    headers TEXT NOT NULL,
    sections TEXT NOT NULL,
    web_tools TEXT NOT NULL,
    unsupported_content_type TEXT,
    fetched_at TEXT NOT NULL,
    stored_at TEXT NOT NULL,
    embedding TEXT
);

CREATE INDEX IF NOT EXISTS idx_documents_url ON documents(url);

-- Link targets merged across referencing pages
CREATE TABLE IF NOT EXISTS links (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    classification TEXT NOT NULL,
    names TEXT NOT NULL,
    linked_from TEXT NOT NULL,
    embedding TEXT,
    first_seen TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS forms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_fingerprint TEXT NOT NULL REFERENCES documents(fingerprint),
    position INTEGER NOT NULL,
    action TEXT,
    method TEXT,
    serialized TEXT NOT NULL,
    embedding TEXT,
    UNIQUE(document_fingerprint, position)
);

CREATE TABLE IF NOT EXISTS form_fields (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    form_id INTEGER NOT NULL REFERENCES forms(id),
    name TEXT,
    field_type TEXT NOT NULL,
    value_or_options TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_form_fields_form ON form_fields(form_id);

CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_fingerprint TEXT NOT NULL REFERENCES documents(fingerprint),
    src TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_images_document ON images(document_fingerprint);

CREATE TABLE IF NOT EXISTS tables (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_fingerprint TEXT NOT NULL REFERENCES documents(fingerprint),
    position INTEGER NOT NULL,
    label TEXT,
    rows TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tables_document ON tables(document_fingerprint);

-- Non-HTML resources and the pages that reference them
CREATE TABLE IF NOT EXISTS non_html_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    referrer TEXT NOT NULL,
    discovered_at TEXT NOT NULL,
    UNIQUE(url, referrer)
);

-- Pending fetch targets, for resumption
CREATE TABLE IF NOT EXISTS frontier (
    url TEXT PRIMARY KEY,
    depth INTEGER NOT NULL,
    originating_url TEXT,
    seq INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_frontier_seq ON frontier(seq);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
