//! Plain-text and pass-through extractors

use crate::crawler::FetchedResource;
use crate::extract::chunking::clean_text;
use crate::extract::types::ExtractedContent;
use crate::extract::{ExtractionError, Extractor, ExtractorKind};

/// `text/plain` bodies: cleaned pass-through
#[derive(Debug, Clone, Default)]
pub struct TextExtractor;

impl Extractor for TextExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Text
    }

    fn extract(&self, resource: &FetchedResource) -> Result<ExtractedContent, ExtractionError> {
        Ok(ExtractedContent {
            text: clean_text(&String::from_utf8_lossy(&resource.body)),
            ..Default::default()
        })
    }
}

/// Anything no other extractor claims: raw text is kept, nothing else
#[derive(Debug, Clone, Default)]
pub struct FallbackExtractor;

impl Extractor for FallbackExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Fallback
    }

    fn extract(&self, resource: &FetchedResource) -> Result<ExtractedContent, ExtractionError> {
        TextExtractor.extract(resource)
    }
}
