//! Content extraction
//!
//! A [`ContentDispatcher`] picks an [`Extractor`] from the declared content type
//! of a fetched resource and turns the result into one uniform
//! [`ExtractedDocument`]:
//! - `html` / `xhtml` → [`HtmlExtractor`]
//! - `pdf` → [`PdfExtractor`]
//! - `csv`, spreadsheet MIME families → [`TabularExtractor`]
//! - `text/plain` → [`TextExtractor`]
//! - anything else → pass-through, flagged as unsupported
//!
//! Dispatch never fails. Malformed content degrades to a document with empty
//! structured fields and the raw text preserved.

mod chunking;
mod html;
mod pdf;
mod tabular;
mod text;
mod types;

pub use chunking::{chunk_words, clean_text};
pub use html::HtmlExtractor;
pub use pdf::{detect_tables, PdfExtractor, TableDetectionError};
pub use tabular::TabularExtractor;
pub use text::{FallbackExtractor, TextExtractor};
pub use types::{
    ExtractedContent, ExtractedDocument, FieldValue, Form, FormField, Link, LinkSet, Section,
    Table,
};

use crate::config::ExtractionConfig;
use crate::crawler::FetchedResource;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Errors raised by an individual extractor
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Malformed content: {0}")]
    MalformedContent(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedType(String),
}

/// The extractor families a content type can map to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractorKind {
    Html,
    Pdf,
    Tabular,
    Text,
    Fallback,
}

impl ExtractorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Tabular => "tabular",
            Self::Text => "text",
            Self::Fallback => "fallback",
        }
    }

    /// Binary formats are fingerprinted on their raw bytes
    fn fingerprints_raw_body(&self) -> bool {
        matches!(self, Self::Pdf | Self::Tabular | Self::Fallback)
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns one fetched resource into extracted content
pub trait Extractor: Send + Sync {
    fn kind(&self) -> ExtractorKind;

    fn extract(&self, resource: &FetchedResource) -> Result<ExtractedContent, ExtractionError>;
}

/// Maps a declared content type to an extractor family
///
/// Matching is a case-insensitive substring test, checked in order.
///
/// # Examples
///
/// ```
/// use spider_walker::extract::{select_extractor, ExtractorKind};
///
/// assert_eq!(select_extractor("text/html; charset=utf-8"), ExtractorKind::Html);
/// assert_eq!(select_extractor("application/vnd.ms-excel"), ExtractorKind::Tabular);
/// assert_eq!(select_extractor("image/png"), ExtractorKind::Fallback);
/// ```
pub fn select_extractor(content_type: &str) -> ExtractorKind {
    let ct = content_type.to_ascii_lowercase();

    if ct.contains("html") {
        ExtractorKind::Html
    } else if ct.contains("pdf") {
        ExtractorKind::Pdf
    } else if ct.contains("csv")
        || ct.contains("spreadsheet")
        || ct.contains("excel")
        || ct.contains("opendocument.spreadsheet")
    {
        ExtractorKind::Tabular
    } else if ct.contains("text/plain") {
        ExtractorKind::Text
    } else {
        ExtractorKind::Fallback
    }
}

/// Hex SHA-256 of arbitrary bytes
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Routes fetched resources to extractors and assembles documents
pub struct ContentDispatcher {
    html: HtmlExtractor,
    pdf: PdfExtractor,
    tabular: TabularExtractor,
    text: TextExtractor,
    fallback: FallbackExtractor,
}

impl ContentDispatcher {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            html: HtmlExtractor::new(config.chunk_size, config.chunk_overlap),
            pdf: PdfExtractor::new(config.chunk_size, config.chunk_overlap),
            tabular: TabularExtractor::new(config.preview_rows),
            text: TextExtractor,
            fallback: FallbackExtractor,
        }
    }

    /// The extractor registered for a family
    pub fn extractor(&self, kind: ExtractorKind) -> &dyn Extractor {
        match kind {
            ExtractorKind::Html => &self.html,
            ExtractorKind::Pdf => &self.pdf,
            ExtractorKind::Tabular => &self.tabular,
            ExtractorKind::Text => &self.text,
            ExtractorKind::Fallback => &self.fallback,
        }
    }

    /// Extracts a resource into a document; never fails
    pub fn dispatch(&self, resource: &FetchedResource) -> ExtractedDocument {
        let kind = select_extractor(&resource.content_type);
        let mut unsupported = kind == ExtractorKind::Fallback;

        let content = match self.extractor(kind).extract(resource) {
            Ok(content) => content,
            Err(ExtractionError::UnsupportedType(ct)) => {
                tracing::warn!("{} extractor refused {} ({}), passing through", kind, resource.url, ct);
                unsupported = true;
                self.raw_content(resource)
            }
            Err(ExtractionError::MalformedContent(msg)) => {
                tracing::warn!("Malformed {} content at {}: {}", kind, resource.url, msg);
                self.raw_content(resource)
            }
        };

        let content_fingerprint = if kind.fingerprints_raw_body() || content.text.is_empty() {
            fingerprint(&resource.body)
        } else {
            fingerprint(content.text.as_bytes())
        };

        ExtractedDocument {
            source_url: resource.url.clone(),
            final_url: resource.final_url.clone(),
            content_type: resource.content_type.clone(),
            content_fingerprint,
            text: content.text,
            sections: content.sections,
            links: content.links,
            tables: content.tables,
            forms: content.forms,
            images: content.images,
            web_tools_detected: content.web_tools_detected,
            headers: resource.headers.clone(),
            unsupported_content_type: unsupported.then(|| resource.content_type.clone()),
            fetched_at: resource.fetched_at,
        }
    }

    fn raw_content(&self, resource: &FetchedResource) -> ExtractedContent {
        ExtractedContent {
            text: clean_text(&String::from_utf8_lossy(&resource.body)),
            ..Default::default()
        }
    }
}
