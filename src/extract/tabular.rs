//! Spreadsheet and CSV previews
//!
//! Only the header row plus the first `preview_rows` data rows of each sheet
//! (or of the CSV file) are kept.

use crate::crawler::FetchedResource;
use crate::extract::chunking::clean_text;
use crate::extract::types::{ExtractedContent, Table};
use crate::extract::{ExtractionError, Extractor, ExtractorKind};
use calamine::{open_workbook_auto_from_rs, Reader};
use std::io::Cursor;

#[derive(Debug, Clone)]
pub struct TabularExtractor {
    preview_rows: usize,
}

impl TabularExtractor {
    pub fn new(preview_rows: usize) -> Self {
        Self { preview_rows }
    }

    /// Header row plus `preview_rows` data rows of a CSV body
    pub fn preview_csv(&self, body: &[u8]) -> Result<Vec<Vec<String>>, ExtractionError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(body);

        let mut rows = Vec::new();
        for record in reader.records().take(self.preview_rows + 1) {
            let record = record
                .map_err(|e| ExtractionError::MalformedContent(format!("bad CSV: {}", e)))?;
            rows.push(record.iter().map(|cell| cell.trim().to_string()).collect());
        }
        Ok(rows)
    }

    /// One preview table per worksheet, labelled with the sheet name
    pub fn preview_workbook(&self, body: &[u8]) -> Result<Vec<Table>, ExtractionError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(body.to_vec()))
            .map_err(|e| ExtractionError::MalformedContent(format!("bad spreadsheet: {}", e)))?;

        let mut tables = Vec::new();
        for name in workbook.sheet_names() {
            let range = match workbook.worksheet_range(&name) {
                Ok(range) => range,
                Err(e) => {
                    tracing::warn!("Skipping unreadable sheet '{}': {}", name, e);
                    continue;
                }
            };

            let rows = range
                .rows()
                .take(self.preview_rows + 1)
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect();

            tables.push(Table {
                label: Some(name),
                rows,
            });
        }
        Ok(tables)
    }
}

impl Extractor for TabularExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Tabular
    }

    fn extract(&self, resource: &FetchedResource) -> Result<ExtractedContent, ExtractionError> {
        let tables = if resource.content_type.to_ascii_lowercase().contains("csv") {
            vec![Table {
                label: file_name(&resource.final_url),
                rows: self.preview_csv(&resource.body)?,
            }]
        } else {
            self.preview_workbook(&resource.body)?
        };

        let text = clean_text(
            &tables
                .iter()
                .flat_map(|t| t.rows.iter())
                .map(|row| row.join(" "))
                .collect::<Vec<_>>()
                .join(" "),
        );

        Ok(ExtractedContent {
            text,
            tables,
            ..Default::default()
        })
    }
}

/// Last path segment of a URL, if it has one
fn file_name(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .path_segments()?
        .last()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
