//! HTML extractor
//!
//! A single parse of the document yields:
//! - Classified links (internal, external, api, non-html)
//! - Tables as ordered rows of cell text
//! - Forms with their input and select fields
//! - Absolute image sources
//! - Detected visualization tools
//! - Header-delimited sections chunked into overlapping word windows
//! - The visible text of the page

use crate::crawler::FetchedResource;
use crate::extract::chunking::{chunk_words, clean_text};
use crate::extract::types::{
    ExtractedContent, FieldValue, Form, FormField, Link, LinkSet, Section, Table,
};
use crate::extract::{ExtractionError, Extractor, ExtractorKind};
use crate::url::{classify_link, normalize_url};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Elements whose text is never part of the visible text
const INVISIBLE_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Visualization tool signatures matched against script, iframe and embed sources
const WEB_TOOL_SIGNATURES: &[(&[&str], &str)] = &[
    (&["chart.js", "chart.min.js", "chart.umd"], "Chart.js"),
    (&["d3.js", "d3.min.js", "d3js.org", "/d3@"], "D3.js"),
    (&["plotly"], "Plotly"),
    (&["highcharts"], "Highcharts"),
    (&["gstatic.com/charts", "google.com/jsapi"], "Google Charts"),
    (&["fusioncharts"], "FusionCharts"),
    (&["chartist"], "Chartist.js"),
    (&["echarts"], "ECharts"),
    (&["c3.js", "c3.min.js"], "C3.js"),
    (&["canvasjs"], "CanvasJS"),
    (&["tableau"], "Tableau"),
    (&["powerbi"], "Power BI"),
    (&["arcgis"], "ArcGIS"),
    (&["anychart"], "AnyChart"),
    (&["amcharts"], "amCharts"),
    (&["jquery.flot"], "Flot"),
    (&["dygraph"], "Dygraphs"),
];

/// Canonical HTML extractor
#[derive(Debug, Clone)]
pub struct HtmlExtractor {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl HtmlExtractor {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Parses an HTML string and extracts every structured shape
    ///
    /// # Arguments
    ///
    /// * `html` - The HTML content to parse
    /// * `base_url` - The URL relative links, images and form actions resolve against
    ///
    /// # Example
    ///
    /// ```
    /// use spider_walker::extract::HtmlExtractor;
    /// use url::Url;
    ///
    /// let html = r#"<html><body><h1>Title</h1><p>Hello</p><a href="/next">Next</a></body></html>"#;
    /// let base = Url::parse("https://example.gov/").unwrap();
    /// let content = HtmlExtractor::new(250, 50).parse_html(html, &base);
    /// assert_eq!(content.links.internal[0].target_url, "https://example.gov/next");
    /// assert_eq!(content.sections[0].header, "Title");
    /// ```
    pub fn parse_html(&self, html: &str, base_url: &Url) -> ExtractedContent {
        let document = Html::parse_document(html);

        ExtractedContent {
            text: visible_text(&document),
            sections: self.extract_sections(&document),
            links: extract_links(&document, base_url),
            tables: extract_tables(&document),
            forms: extract_forms(&document, base_url),
            images: extract_images(&document, base_url),
            web_tools_detected: detect_web_tools(&document),
        }
    }

    /// Groups `p` text under the nearest preceding `h1`-`h4`
    ///
    /// Paragraphs that appear before any heading form a leading section with an
    /// empty header.
    fn extract_sections(&self, document: &Html) -> Vec<Section> {
        let mut sections = Vec::new();

        let Ok(selector) = Selector::parse("h1, h2, h3, h4, p") else {
            return sections;
        };

        let mut header: Option<String> = None;
        let mut paragraphs: Vec<String> = Vec::new();

        for element in document.select(&selector) {
            let text = element_text(&element);
            if element.value().name() == "p" {
                if !text.is_empty() {
                    paragraphs.push(text);
                }
                continue;
            }

            if header.is_some() || !paragraphs.is_empty() {
                sections.push(self.make_section(header.take().unwrap_or_default(), &paragraphs));
            }
            header = Some(text);
            paragraphs.clear();
        }

        if header.is_some() || !paragraphs.is_empty() {
            sections.push(self.make_section(header.unwrap_or_default(), &paragraphs));
        }

        sections
    }

    fn make_section(&self, header: String, paragraphs: &[String]) -> Section {
        Section {
            header,
            chunks: chunk_words(&paragraphs.join(" "), self.chunk_size, self.chunk_overlap),
        }
    }
}

impl Extractor for HtmlExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Html
    }

    fn extract(&self, resource: &FetchedResource) -> Result<ExtractedContent, ExtractionError> {
        let base = Url::parse(&resource.final_url).map_err(|e| {
            ExtractionError::MalformedContent(format!("bad base URL {}: {}", resource.final_url, e))
        })?;
        let html = String::from_utf8_lossy(&resource.body);
        Ok(self.parse_html(&html, &base))
    }
}

/// Cleaned text of an element and all its descendants
fn element_text(element: &ElementRef) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

/// Text nodes outside script, style, noscript and template, cleaned
fn visible_text(document: &Html) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|e| INVISIBLE_ELEMENTS.contains(&e.name()))
                .unwrap_or(false)
        });

        if !hidden {
            parts.push(&**text);
        }
    }

    clean_text(&parts.join(" "))
}

/// Extracts and classifies every `a[href]`
fn extract_links(document: &Html, base_url: &Url) -> LinkSet {
    let mut links = LinkSet::default();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(target) = resolve_link(href, base_url) else {
                continue;
            };

            // classify before normalizing; tracking params still count as a query
            let classification = classify_link(&target, base_url);
            let target_url = normalize_url(target.as_str())
                .map(|u| u.to_string())
                .unwrap_or_else(|_| target.to_string());

            links.push(Link {
                text: element_text(&element),
                target_url,
                classification,
            });
        }
    }

    links
}

/// Resolves a link href to an absolute http(s) URL
///
/// Returns None for `javascript:`, `mailto:`, `tel:` and `data:` hrefs,
/// fragment-only anchors, and anything that does not resolve.
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}

/// Every `table` as rows of `td`/`th` text; the header row is kept as row 0
fn extract_tables(document: &Html) -> Vec<Table> {
    let (Ok(table_sel), Ok(row_sel), Ok(cell_sel)) = (
        Selector::parse("table"),
        Selector::parse("tr"),
        Selector::parse("td, th"),
    ) else {
        return Vec::new();
    };

    document
        .select(&table_sel)
        .map(|table| Table {
            label: None,
            rows: table
                .select(&row_sel)
                .map(|row| row.select(&cell_sel).map(|c| element_text(&c)).collect())
                .collect(),
        })
        .collect()
}

/// Forms with their `input`, `select` and `textarea` fields in document order
fn extract_forms(document: &Html, base_url: &Url) -> Vec<Form> {
    let (Ok(form_sel), Ok(field_sel), Ok(option_sel)) = (
        Selector::parse("form"),
        Selector::parse("input, select, textarea"),
        Selector::parse("option"),
    ) else {
        return Vec::new();
    };

    document
        .select(&form_sel)
        .map(|form| {
            let attrs = form.value();
            let action = attrs.attr("action").map(|a| {
                base_url
                    .join(a.trim())
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| a.to_string())
            });

            let fields = form
                .select(&field_sel)
                .map(|field| {
                    let el = field.value();
                    let name = el.attr("name").map(str::to_string);
                    match el.name() {
                        "select" => FormField {
                            name,
                            field_type: "select".to_string(),
                            value_or_options: FieldValue::Options(
                                field
                                    .select(&option_sel)
                                    .map(|o| {
                                        o.value()
                                            .attr("value")
                                            .map(str::to_string)
                                            .unwrap_or_else(|| element_text(&o))
                                    })
                                    .collect(),
                            ),
                        },
                        "textarea" => FormField {
                            name,
                            field_type: "textarea".to_string(),
                            value_or_options: FieldValue::Value(
                                Some(element_text(&field)).filter(|t| !t.is_empty()),
                            ),
                        },
                        _ => FormField {
                            name,
                            field_type: el.attr("type").unwrap_or("text").to_lowercase(),
                            value_or_options: FieldValue::Value(
                                el.attr("value").map(str::to_string),
                            ),
                        },
                    }
                })
                .collect();

            Form {
                action,
                method: attrs.attr("method").map(|m| m.to_uppercase()),
                fields,
            }
        })
        .collect()
}

/// `img[src]` resolved against the page URL
fn extract_images(document: &Html, base_url: &Url) -> Vec<String> {
    let Ok(selector) = Selector::parse("img[src]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .filter_map(|src| base_url.join(src.trim()).ok())
        .map(|u| u.to_string())
        .collect()
}

/// Names of the visualization tools a page embeds, in signature-table order
fn detect_web_tools(document: &Html) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();

    if let Ok(selector) = Selector::parse("script[src], iframe[src], embed[src]") {
        sources.extend(
            document
                .select(&selector)
                .filter_map(|e| e.value().attr("src"))
                .map(|s| s.to_lowercase()),
        );
    }

    // Tableau's web component carries its source in an attribute of its own tag
    if let Ok(selector) = Selector::parse("tableau-viz") {
        if document.select(&selector).next().is_some() {
            sources.push("tableau".to_string());
        }
    }

    WEB_TOOL_SIGNATURES
        .iter()
        .filter(|(needles, _)| {
            sources
                .iter()
                .any(|src| needles.iter().any(|needle| src.contains(needle)))
        })
        .map(|(_, name)| name.to_string())
        .collect()
}
