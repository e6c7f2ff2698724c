use crate::url::LinkClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A hyperlink discovered in a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Anchor text (cleaned)
    pub text: String,
    /// Absolute target URL as written in the document, resolved against its base
    pub target_url: String,
    pub classification: LinkClass,
}

/// Discovered links grouped by classification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSet {
    pub internal: Vec<Link>,
    pub external: Vec<Link>,
    pub api: Vec<Link>,
    pub non_html: Vec<Link>,
}

impl LinkSet {
    /// Files a link under its classification
    pub fn push(&mut self, link: Link) {
        match link.classification {
            LinkClass::Internal => self.internal.push(link),
            LinkClass::External => self.external.push(link),
            LinkClass::Api => self.api.push(link),
            LinkClass::NonHtml => self.non_html.push(link),
        }
    }

    /// All links, in classification order
    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.internal
            .iter()
            .chain(&self.external)
            .chain(&self.api)
            .chain(&self.non_html)
    }

    /// Links the frontier may follow
    pub fn traversable(&self) -> impl Iterator<Item = &Link> {
        self.internal.iter().chain(&self.external)
    }

    pub fn len(&self) -> usize {
        self.internal.len() + self.external.len() + self.api.len() + self.non_html.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A table as ordered rows of cell text; the header row, when present, is row 0
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Sheet name, file name or `page N`, when the source has one
    pub label: Option<String>,
    pub rows: Vec<Vec<String>>,
}

/// Value of a form field: a plain value, or the option values of a `select`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Value(Option<String>),
    Options(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub field_type: String,
    pub value_or_options: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub action: Option<String>,
    pub method: Option<String>,
    pub fields: Vec<FormField>,
}

/// A header-delimited run of text split into overlapping word windows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Heading text; empty for content preceding the first heading
    pub header: String,
    pub chunks: Vec<String>,
}

/// What an extractor pulls out of one resource
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    pub text: String,
    pub sections: Vec<Section>,
    pub links: LinkSet,
    pub tables: Vec<Table>,
    pub forms: Vec<Form>,
    pub images: Vec<String>,
    pub web_tools_detected: Vec<String>,
}

/// Uniform output of every extractor, ready for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub source_url: String,
    pub final_url: String,
    pub content_type: String,
    /// Storage dedup key, stable under byte-identical input
    pub content_fingerprint: String,
    pub text: String,
    pub sections: Vec<Section>,
    pub links: LinkSet,
    pub tables: Vec<Table>,
    pub forms: Vec<Form>,
    pub images: Vec<String>,
    pub web_tools_detected: Vec<String>,
    /// Response headers, lowercase names
    pub headers: BTreeMap<String, String>,
    /// Set when no extractor handles the declared content type
    pub unsupported_content_type: Option<String>,
    pub fetched_at: DateTime<Utc>,
}
