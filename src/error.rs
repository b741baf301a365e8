//! Tagged error kinds and the wire-facing error envelope.
//!
//! Every user-visible failure is reduced to one of these variants before it
//! crosses the MCP or HTTP boundary. `error_code`/`recovery_strategy` are
//! computed by exhaustive matching, never by inspecting a type name — the
//! equivalent Python used `type(err).__name__`, which this crate deliberately
//! does not reproduce.

use serde::Serialize;
use serde_json::{json, Value};

use crate::auth::AuthError;
use crate::extract::ExtractError;
use crate::fetch::FetchError;
use crate::news::ParseError;
use crate::session::SessionError;
use crate::validation::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum DigError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("robots.txt disallows this URL")]
    RobotsBlocked { url: String },
    #[error("rate limit exceeded: {limit} calls per window")]
    RateLimitExceeded { limit: u32, reset_seconds: u64 },
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
    #[error("invalid anti-detection profile: {profile}")]
    InvalidProfile { profile: String },
    #[error("invalid rate limit delay: {value}")]
    InvalidRateLimit { value: f64 },
    #[error("invalid max_response_chars: {value}")]
    InvalidMaxResponseChars { value: i64 },
    #[error("configuration error: {message}")]
    Configuration { message: String },
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DigError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.error_code(),
            Self::Fetch(e) => e.error_code(),
            Self::Extract(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Auth(e) => e.error_code(),
            Self::Parse(e) => e.error_code(),
            Self::RobotsBlocked { .. } => "ROBOTS_BLOCKED",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::InvalidProfile { .. } => "INVALID_PROFILE",
            Self::InvalidRateLimit { .. } => "INVALID_RATE_LIMIT",
            Self::InvalidMaxResponseChars { .. } => "INVALID_MAX_RESPONSE_CHARS",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::UnknownTool { .. } => "UNKNOWN_TOOL",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn recovery_strategy(&self) -> &'static str {
        match self.error_code() {
            "INVALID_URL" => "Check the URL format and try again.",
            "URL_NOT_FOUND" => "Verify the URL exists and is reachable.",
            "ACCESS_DENIED" => "The target refused the request; check credentials or permissions.",
            "RATE_LIMITED" => "Wait before retrying; the remote host is throttling requests.",
            "FETCH_ERROR" => "Check network connectivity and retry.",
            "TIMEOUT_ERROR" => "Increase the timeout or retry when the target is less loaded.",
            "CONNECTION_ERROR" => "Check network connectivity and DNS resolution.",
            "SSRF_BLOCKED" => "This host resolves to a private or reserved address and cannot be fetched.",
            "SELECTOR_NOT_FOUND" => "Adjust the CSS selector to match the page structure.",
            "INVALID_SELECTOR" => "Fix the CSS selector syntax.",
            "EXTRACTION_ERROR" => "The page could not be parsed; try without a selector.",
            "ENCODING_ERROR" => "The response body could not be decoded as text.",
            "ROBOTS_BLOCKED" => "robots.txt disallows this path for the current user agent.",
            "INVALID_PROFILE" => "Use one of: stealth, balanced, none, custom, browser_tls.",
            "INVALID_RATE_LIMIT" => "Provide a non-negative rate limit delay.",
            "INVALID_MAX_RESPONSE_CHARS" => "Provide a value between 4000 and 4000000.",
            "INVALID_ARGUMENT" => "Check the tool call arguments against the schema.",
            "CONFIGURATION_ERROR" => "Check process configuration and environment variables.",
            "MAX_DEPTH_EXCEEDED" => "Reduce the requested crawl depth.",
            "MAX_PAGES_EXCEEDED" => "Reduce max_pages_per_level.",
            "CONTENT_TOO_LARGE" => "Use session mode or fetch chunks individually.",
            "SESSION_NOT_FOUND" => "Verify the session_id; the session may have been pruned.",
            "INVALID_CHUNK_INDEX" => "Request a chunk_index within [0, total_chunks).",
            "SESSION_ERROR" => "Retry the session operation; if it persists, contact an operator.",
            "AUTH_ERROR" => "Provide a valid bearer token.",
            "PERMISSION_DENIED" => "The token's primary group does not own this session.",
            "RATE_LIMIT_EXCEEDED" => "Wait for the rate-limit window to reset.",
            "CRAWL_INPUT" => "Provide a valid start_url and pages list.",
            "SOURCE_PROFILE" => "Use a registered source profile name, or omit it for the generic profile.",
            "DATE_PARSE_FAILED" => "The story's date could not be parsed; published will be null.",
            "PARSE_ERROR" => "The page content did not match the expected news layout.",
            "UNKNOWN_TOOL" => "Check the tool name against the published tool list.",
            _ => "Contact an operator with the request details.",
        }
    }

    pub fn details(&self) -> Value {
        match self {
            Self::Validation(e) => e.details(),
            Self::Fetch(e) => e.details(),
            Self::Extract(e) => e.details(),
            Self::Session(e) => e.details(),
            Self::Auth(e) => e.details(),
            Self::Parse(e) => e.details(),
            Self::RobotsBlocked { url } => json!({ "url": url }),
            Self::RateLimitExceeded { limit, reset_seconds } => {
                json!({ "limit": limit, "reset_seconds": reset_seconds })
            }
            Self::InvalidArgument { message } => json!({ "message": message }),
            Self::InvalidProfile { profile } => json!({ "profile": profile }),
            Self::InvalidRateLimit { value } => json!({ "value": value }),
            Self::InvalidMaxResponseChars { value } => json!({ "value": value }),
            Self::Configuration { message } => json!({ "message": message }),
            Self::UnknownTool { name } => json!({ "tool_name": name }),
            Self::Internal { message } => json!({ "message": message }),
        }
    }

    /// The wire envelope used by both the MCP and HTTP surfaces.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            success: false,
            error_code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
            recovery_strategy: self.recovery_strategy().to_string(),
        }
    }

    /// HTTP status code for this error, per SPEC_FULL.md §6.2.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Auth(AuthError::PermissionDenied { .. }) => 403,
            Self::Auth(AuthError::InvalidToken { .. }) => 401,
            Self::Session(SessionError::NotFound { .. }) => 404,
            Self::Session(SessionError::InvalidChunkIndex { .. }) => 400,
            Self::Validation(_) => 400,
            Self::RateLimitExceeded { .. } => 429,
            Self::Internal { .. } => 500,
            _ => 400,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error_code: String,
    pub message: String,
    pub details: Value,
    pub recovery_strategy: String,
}
