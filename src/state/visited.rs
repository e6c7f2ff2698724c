use crate::state::ResumeLog;
use crate::url::{normalize_url, url_hash};
use std::collections::HashSet;
use std::io;
use std::path::Path;

/// URLs already fetched, keyed by hash of the normalized URL
///
/// Every `record` is appended to the resume log before it returns, so a crash
/// loses at most the fetch in progress.
#[derive(Debug)]
pub struct VisitedSet {
    hashes: HashSet<String>,
    urls: Vec<String>,
    log: ResumeLog,
}

fn key(url: &str) -> String {
    match normalize_url(url) {
        Ok(normalized) => url_hash(normalized.as_str()),
        Err(_) => url_hash(url),
    }
}

impl VisitedSet {
    /// Replays the resume log at `path` and opens it for appending
    ///
    /// With `fresh` set the log is truncated and the set starts empty.
    pub fn open(path: &Path, fresh: bool) -> io::Result<Self> {
        let entries = if fresh {
            Vec::new()
        } else {
            ResumeLog::load(path)?
        };
        let log = ResumeLog::open(path, fresh)?;

        let mut hashes = HashSet::new();
        let mut urls = Vec::new();
        for entry in entries {
            if hashes.insert(key(&entry.url)) {
                urls.push(entry.url);
            }
        }

        if !urls.is_empty() {
            tracing::info!(
                "Loaded {} visited URLs from {}",
                urls.len(),
                log.path().display()
            );
        }

        Ok(Self { hashes, urls, log })
    }

    pub fn contains(&self, url: &str) -> bool {
        self.hashes.contains(&key(url))
    }

    /// Marks a URL as fetched and appends it to the resume log
    ///
    /// Returns false if the URL was already recorded.
    pub fn record(&mut self, url: &str) -> io::Result<bool> {
        if !self.hashes.insert(key(url)) {
            return Ok(false);
        }
        self.log.append(url)?;
        self.urls.push(url.to_string());
        Ok(true)
    }

    /// Visited URLs in the order they were recorded
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}
