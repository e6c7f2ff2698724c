//! Spider-Walker: a depth-bounded crawler that extracts and stores structured content
//!
//! This crate walks web resources from a set of seed URLs, extracts links, tables,
//! forms, images and text sections from every fetched resource, and persists them
//! into a normalized SQLite store alongside vector embeddings for similarity lookups.

pub mod config;
pub mod crawler;
pub mod embedding;
pub mod extract;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Spider-Walker operations
///
/// Per-target failures (fetch, extraction, persistence of a single document) are
/// recovered inside the crawl loop; this type covers failures that stop a run.
#[derive(Debug, Error)]
pub enum WalkerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Persistence error: {0}")]
    Persistence(#[from] storage::PersistenceError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] embedding::EmbeddingError),

    #[error("Sink error: {0}")]
    Sink(#[from] output::SinkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawl task failed: {0}")]
    Task(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Missing environment variable: {0}")]
    MissingEnv(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Spider-Walker operations
pub type Result<T> = std::result::Result<T, WalkerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use extract::ExtractedDocument;
pub use url::{classify_link, normalize_url, registrable_domain, url_hash, LinkClass};
