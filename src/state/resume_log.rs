use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One line of the resume log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeEntry {
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only log of fetched URLs, one JSON object per line
#[derive(Debug)]
pub struct ResumeLog {
    path: PathBuf,
    file: File,
}

impl ResumeLog {
    /// Opens the log for appending, creating it and its parent directory if needed
    ///
    /// With `truncate` set, any previous content is discarded.
    pub fn open(path: &Path, truncate: bool) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = if truncate {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?
        } else {
            OpenOptions::new().create(true).append(true).open(path)?
        };

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Reads every entry from a log file
    ///
    /// A missing file yields no entries. Lines that fail to parse, such as a
    /// final line cut short by a crash, are skipped with a warning.
    pub fn load(path: &Path) -> io::Result<Vec<ResumeEntry>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ResumeEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(
                    "Skipping malformed resume log line {} in {}: {}",
                    number + 1,
                    path.display(),
                    e
                ),
            }
        }

        Ok(entries)
    }

    /// Appends one entry and flushes it
    pub fn append(&mut self, url: &str) -> io::Result<ResumeEntry> {
        let entry = ResumeEntry {
            url: url.to_string(),
            timestamp: Utc::now(),
        };
        let line = serde_json::to_string(&entry)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(entry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
