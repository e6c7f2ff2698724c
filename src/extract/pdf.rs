//! PDF extraction
//!
//! Per-page text comes from pdf-extract. Table regions are detected on each
//! page's text layout: consecutive lines that split into two or more cells on
//! runs of spaces or tabs. A page whose region has ragged rows is treated as a
//! detection failure and contributes text only.

use crate::crawler::FetchedResource;
use crate::extract::chunking::{chunk_words, clean_text};
use crate::extract::types::{ExtractedContent, Section, Table};
use crate::extract::{ExtractionError, Extractor, ExtractorKind};
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

/// Minimum number of aligned lines that make up a table region
const MIN_TABLE_ROWS: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("inconsistent column count in table region: expected {expected}, found {found}")]
pub struct TableDetectionError {
    pub expected: usize,
    pub found: usize,
}

#[derive(Debug, Clone)]
pub struct PdfExtractor {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl PdfExtractor {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Builds the extracted content from already-split page texts
    pub fn extract_pages(&self, pages: &[String], url: &str) -> ExtractedContent {
        let mut content = ExtractedContent::default();
        let mut text = String::new();

        for (index, page) in pages.iter().enumerate() {
            let number = index + 1;
            let page_text = clean_text(page);

            text.push_str(&format!("Page {}:\n{}\n\n", number, page_text));
            content.sections.push(Section {
                header: format!("Page {}", number),
                chunks: chunk_words(&page_text, self.chunk_size, self.chunk_overlap),
            });

            match detect_tables(page) {
                Ok(rows_per_region) => {
                    content
                        .tables
                        .extend(rows_per_region.into_iter().map(|rows| Table {
                            label: Some(format!("page {}", number)),
                            rows,
                        }))
                }
                Err(e) => {
                    tracing::warn!(
                        "Table detection failed on page {} of {}: {}",
                        number,
                        url,
                        e
                    );
                }
            }
        }

        content.text = clean_text(&text);
        content
    }
}

impl Extractor for PdfExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Pdf
    }

    fn extract(&self, resource: &FetchedResource) -> Result<ExtractedContent, ExtractionError> {
        // pdf-extract panics on some malformed inputs instead of returning an error
        let pages = catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(&resource.body)
        }))
        .map_err(|_| ExtractionError::MalformedContent("PDF parser panicked".to_string()))?
        .map_err(|e| ExtractionError::MalformedContent(format!("unreadable PDF: {:?}", e)))?;

        Ok(self.extract_pages(&pages, &resource.final_url))
    }
}

/// Splits a layout line into cells on tabs or runs of two or more spaces
fn split_cells(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut spaces = 0;

    for c in line.trim().chars() {
        match c {
            '\t' => {
                spaces = 2;
            }
            ' ' => {
                spaces += 1;
            }
            _ => {
                if spaces >= 2 && !current.is_empty() {
                    cells.push(std::mem::take(&mut current));
                } else if spaces == 1 {
                    current.push(' ');
                }
                spaces = 0;
                current.push(c);
            }
        }
    }

    if !current.is_empty() {
        cells.push(current);
    }
    cells
}

/// Finds table regions in one page of text
///
/// Returns the rows of each region, or an error if any region mixes column
/// counts.
pub fn detect_tables(page: &str) -> Result<Vec<Vec<Vec<String>>>, TableDetectionError> {
    let mut regions = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();

    let mut close = |current: &mut Vec<Vec<String>>| -> Result<(), TableDetectionError> {
        if current.len() >= MIN_TABLE_ROWS {
            let expected = current[0].len();
            if let Some(row) = current.iter().find(|r| r.len() != expected) {
                return Err(TableDetectionError {
                    expected,
                    found: row.len(),
                });
            }
            regions.push(std::mem::take(current));
        }
        current.clear();
        Ok(())
    };

    for line in page.lines() {
        let cells = split_cells(line);
        if cells.len() >= 2 {
            current.push(cells);
        } else {
            close(&mut current)?;
        }
    }
    close(&mut current)?;

    Ok(regions)
}
