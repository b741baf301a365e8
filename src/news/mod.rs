//! Deterministic news parser.
//!
//! Grounded on `examples/original_source/app/processing/news_parser.py`
//! and `.../source_profiles.py`. Turns crawl output into a structured feed
//! without summarization or any external call — every transformation here
//! is a pure function of its input.

mod parser;
mod profiles;

pub use parser::{
    ContentType, Feed, FeedMeta, NewsPageInput, NewsParser, NewsParserInput, ParseQuality,
    ParseWarning, Provenance, SeenPage, Story,
};
pub use profiles::{get_source_profile, SourceProfile};

use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid crawl input: {message}")]
    CrawlInput { message: String },
    #[error("source profile error: {message}")]
    SourceProfile { message: String },
    #[error("parse error: {message}")]
    ParseFailed { message: String },
}

impl ParseError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CrawlInput { .. } => "CRAWL_INPUT",
            Self::SourceProfile { .. } => "SOURCE_PROFILE",
            Self::ParseFailed { .. } => "PARSE_ERROR",
        }
    }

    pub fn details(&self) -> Value {
        match self {
            Self::CrawlInput { message } => json!({ "message": message }),
            Self::SourceProfile { message } => json!({ "message": message }),
            Self::ParseFailed { message } => json!({ "message": message }),
        }
    }
}
