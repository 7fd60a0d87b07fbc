//! Extractor boundary and the catalogue detail-page extractor
//!
//! The pipeline only sees the [`Extract`] trait. [`HtmlExtractor`] reads the
//! catalogue detail layout, where each fact sits in a row holding an `<h4>`
//! heading and a `<p>` value:
//!
//! ```html
//! <div class="product-catalogue-training-calendar__row typ">
//!   <h4>Assessment length</h4>
//!   <p>Approximate Completion Time in minutes = 36</p>
//! </div>
//! ```

use crate::pipeline::RawContent;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use thiserror::Error;

const DETAIL_ROW_SELECTOR: &str = r#"div[class*="product-catalogue-training-calendar__row"]"#;

/// Fields pulled from a detail page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub description: String,
    pub language: String,
    /// First integer found in the duration text, if any
    pub duration_minutes: Option<u32>,
}

impl Extracted {
    /// Converts to the record field map; `duration` is omitted when absent
    pub fn into_fields(self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("description".to_string(), self.description);
        fields.insert("language".to_string(), self.language);
        if let Some(minutes) = self.duration_minutes {
            fields.insert("duration".to_string(), minutes.to_string());
        }
        fields
    }
}

/// Errors produced at the extractor boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("document is empty")]
    EmptyDocument,

    #[error("no catalogue detail rows found")]
    MissingDetails,

    #[error("invalid selector: {0}")]
    Selector(String),
}

/// Turns fetched content into structured fields
pub trait Extract: Send + Sync {
    fn extract(&self, raw: &RawContent) -> Result<Extracted, ExtractError>;
}

/// Extractor for catalogue detail pages
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extract for HtmlExtractor {
    fn extract(&self, raw: &RawContent) -> Result<Extracted, ExtractError> {
        if raw.body.trim().is_empty() {
            return Err(ExtractError::EmptyDocument);
        }

        let row_selector = parse_selector(DETAIL_ROW_SELECTOR)?;
        let heading_selector = parse_selector("h4")?;
        let value_selector = parse_selector("p")?;

        let document = Html::parse_document(&raw.body);
        let mut extracted = Extracted::default();
        let mut rows = 0;

        for row in document.select(&row_selector) {
            rows += 1;

            let Some(heading) = row.select(&heading_selector).next() else {
                continue;
            };
            let Some(value) = row.select(&value_selector).next() else {
                continue;
            };

            let key = element_text(heading).to_lowercase();
            let text = element_text(value);

            if key.contains("description") {
                extracted.description = text;
            } else if key.contains("languages") {
                extracted.language = text.trim_end_matches(',').trim_end().to_string();
            } else if key.contains("assessment") {
                extracted.duration_minutes = first_integer(&text);
            }
        }

        if rows == 0 {
            return Err(ExtractError::MissingDetails);
        }

        Ok(extracted)
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::Selector(e.to_string()))
}

/// Text content with whitespace runs collapsed
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns the first run of ASCII digits in `text` as a number
pub fn first_integer(text: &str) -> Option<u32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
