//! HTML content extraction and structural analysis.
//!
//! Grounded on `examples/original_source/app/scraping/extractor.py` and
//! `examples/original_source/app/scraping/structure.py`. Both modules parsed
//! with BeautifulSoup's `html.parser`; this crate uses `scraper` (itself
//! built on `html5ever`, the same parser family the teacher pulled in for
//! its own markdown pipeline) as a drop-in lenient HTML5 tree.

mod content;
mod structure;

pub use content::{ContentExtractor, ExtractedContent, Heading, ImageLink, PageLink};
pub use structure::{FormField, FormInfo, NavLink, OutlineEntry, PageSection, PageStructure, StructureAnalyzer};

use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("selector '{selector}' did not match any elements")]
    SelectorNotFound { selector: String },
    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("extraction failed: {message}")]
    ParseFailed { message: String },
    #[error("could not decode response body as text: {message}")]
    EncodingError { message: String },
}

impl ExtractError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SelectorNotFound { .. } => "SELECTOR_NOT_FOUND",
            Self::InvalidSelector { .. } => "INVALID_SELECTOR",
            Self::ParseFailed { .. } => "EXTRACTION_ERROR",
            Self::EncodingError { .. } => "ENCODING_ERROR",
        }
    }

    pub fn details(&self) -> Value {
        match self {
            Self::SelectorNotFound { selector } => json!({ "selector": selector }),
            Self::InvalidSelector { selector, message } => json!({ "selector": selector, "message": message }),
            Self::ParseFailed { message } => json!({ "message": message }),
            Self::EncodingError { message } => json!({ "message": message }),
        }
    }
}
