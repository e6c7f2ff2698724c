//! URL handling module for Spider-Walker
//!
//! This module provides:
//! - URL normalization (the traversal identity of a fetch target)
//! - Registrable-domain extraction and wildcard host matching
//! - The domain-scope predicate used by the frontier
//! - Link classification (internal, external, api, non-html)
//! - Stable URL hashing used as storage keys

mod domain;
mod matcher;
mod normalize;
mod scope;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

pub use domain::{extract_domain, registrable_domain, url_registrable_domain};
pub use matcher::matches_wildcard;
pub use normalize::normalize_url;
pub use scope::DomainScope;

/// File extensions that mark a resource as non-traversable
///
/// Links ending in one of these are recorded as non-HTML links and never
/// queued for fetching.
pub const NON_CRAWLABLE_EXTENSIONS: &[&str] = &[
    "pdf", "xls", "xlsx", "doc", "docx", "ppt", "pptx", "jpg", "jpeg", "png", "gif", "bmp",
    "tif", "tiff", "zip", "rar", "tar", "gz", "7z", "mp3", "mp4", "avi", "mov", "mkv", "csv",
    "json", "xml",
];

/// Classification of a discovered link relative to the page it was found on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkClass {
    /// Same registrable domain as the source page
    Internal,
    /// Different registrable domain
    External,
    /// Query-string or `/api/` endpoint; recorded, never followed
    Api,
    /// Points at a non-crawlable file type
    NonHtml,
}

impl LinkClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
            Self::Api => "api",
            Self::NonHtml => "non-html",
        }
    }

    /// Returns true if links of this class may be pushed to the frontier
    pub fn is_traversable(&self) -> bool {
        matches!(self, Self::Internal | Self::External)
    }
}

impl fmt::Display for LinkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true if the URL path ends in a non-crawlable file extension
pub fn has_non_crawlable_extension(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    let last_segment = path.rsplit('/').next().unwrap_or("");
    match last_segment.rsplit_once('.') {
        Some((_, ext)) => NON_CRAWLABLE_EXTENSIONS.contains(&ext),
        None => false,
    }
}

/// Classifies an absolute link found on `source`
///
/// API-style links are checked first, then non-crawlable extensions, then the
/// registrable-domain comparison.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use spider_walker::url::{classify_link, LinkClass};
///
/// let source = Url::parse("https://example.com/").unwrap();
/// let link = Url::parse("https://other.com/x").unwrap();
/// assert_eq!(classify_link(&link, &source), LinkClass::External);
/// ```
pub fn classify_link(link: &Url, source: &Url) -> LinkClass {
    if link.query().is_some() || link.path().contains("/api/") {
        return LinkClass::Api;
    }

    if has_non_crawlable_extension(link) {
        return LinkClass::NonHtml;
    }

    match (url_registrable_domain(link), url_registrable_domain(source)) {
        (Some(a), Some(b)) if a == b => LinkClass::Internal,
        _ => LinkClass::External,
    }
}

/// Stable SHA-256 hex digest of a URL string, used as a storage key
pub fn url_hash(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}
