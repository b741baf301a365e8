//! Tool-call RPC surface.
//!
//! Grounded on `examples/original_source/app/mcp_server/mcp_server.py`'s
//! tool set and response shapes. Implemented directly against `rmcp`'s
//! `ServerHandler` trait (the teacher's own MCP dependency) rather than
//! through its attribute-macro sugar, so the tool/argument dispatch table
//! stays a single readable `match`, mirroring `mapper.py`'s one-mapping-
//! table-per-transport design referenced in SPEC_FULL.md §7.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::{json, Value};

use crate::context::RuntimeContext;
use crate::error::DigError;

mod handlers;

/// Tool-call RPC frontend. Cheap to clone: all state lives behind the
/// `Arc`s inside `RuntimeContext`.
#[derive(Clone)]
pub struct DigMcpServer {
    ctx: RuntimeContext,
}

impl DigMcpServer {
    pub fn new(ctx: RuntimeContext) -> Self {
        Self { ctx }
    }
}

const TOOL_NAMES: &[&str] = &[
    "ping",
    "set_antidetection",
    "get_content",
    "get_structure",
    "get_session_info",
    "get_session_chunk",
    "get_session",
    "get_session_urls",
    "list_sessions",
];

fn object_schema(properties: Value, required: &[&str]) -> Arc<serde_json::Map<String, Value>> {
    let schema = json!({
        "type": "object",
        "properties": properties,
        "required": required,
    });
    match schema {
        Value::Object(map) => Arc::new(map),
        _ => unreachable!("object_schema always builds a JSON object"),
    }
}

fn tool_definitions() -> Vec<rmcp::model::Tool> {
    vec![
        rmcp::model::Tool {
            name: Cow::Borrowed("ping"),
            description: Some(Cow::Borrowed("Liveness and build identity check")),
            input_schema: object_schema(json!({}), &[]),
            annotations: None,
        },
        rmcp::model::Tool {
            name: Cow::Borrowed("set_antidetection"),
            description: Some(Cow::Borrowed("Configure the process-wide anti-detection profile")),
            input_schema: object_schema(
                json!({
                    "profile": {"type": "string", "enum": ["stealth", "balanced", "none", "custom", "browser_tls"]},
                    "custom_headers": {"type": "object"},
                    "custom_user_agent": {"type": "string"},
                    "rate_limit_delay": {"type": "number", "minimum": 0},
                    "max_response_chars": {"type": "integer", "minimum": 4000, "maximum": 4000000},
                }),
                &["profile"],
            ),
            annotations: None,
        },
        rmcp::model::Tool {
            name: Cow::Borrowed("get_content"),
            description: Some(Cow::Borrowed("Fetch and extract a page, optionally crawling linked pages")),
            input_schema: object_schema(
                json!({
                    "url": {"type": "string"},
                    "depth": {"type": "integer", "minimum": 1, "maximum": 3},
                    "max_pages_per_level": {"type": "integer", "minimum": 1, "maximum": 20},
                    "selector": {"type": "string"},
                    "include_links": {"type": "boolean"},
                    "include_images": {"type": "boolean"},
                    "include_meta": {"type": "boolean"},
                    "session": {"type": "boolean"},
                    "chunk_size": {"type": "integer"},
                    "filter_noise": {"type": "boolean"},
                    "max_bytes": {"type": "integer"},
                    "timeout_seconds": {"type": "number"},
                    "parse_results": {"type": "boolean"},
                    "source_profile_name": {"type": "string"},
                    "auth_token": {"type": "string"},
                }),
                &["url"],
            ),
            annotations: None,
        },
        rmcp::model::Tool {
            name: Cow::Borrowed("get_structure"),
            description: Some(Cow::Borrowed("Structural analysis of a page: headings, nav, forms")),
            input_schema: object_schema(
                json!({
                    "url": {"type": "string"},
                    "selector": {"type": "string"},
                    "timeout_seconds": {"type": "number"},
                    "auth_token": {"type": "string"},
                }),
                &["url"],
            ),
            annotations: None,
        },
        rmcp::model::Tool {
            name: Cow::Borrowed("get_session_info"),
            description: Some(Cow::Borrowed("Metadata for a stored session")),
            input_schema: object_schema(
                json!({"session_id": {"type": "string"}, "auth_token": {"type": "string"}}),
                &["session_id"],
            ),
            annotations: None,
        },
        rmcp::model::Tool {
            name: Cow::Borrowed("get_session_chunk"),
            description: Some(Cow::Borrowed("One character-chunk of a stored session")),
            input_schema: object_schema(
                json!({
                    "session_id": {"type": "string"},
                    "chunk_index": {"type": "integer"},
                    "auth_token": {"type": "string"},
                }),
                &["session_id", "chunk_index"],
            ),
            annotations: None,
        },
        rmcp::model::Tool {
            name: Cow::Borrowed("get_session"),
            description: Some(Cow::Borrowed("Full joined content of a stored session")),
            input_schema: object_schema(
                json!({
                    "session_id": {"type": "string"},
                    "max_bytes": {"type": "integer"},
                    "timeout_seconds": {"type": "number"},
                    "auth_token": {"type": "string"},
                }),
                &["session_id"],
            ),
            annotations: None,
        },
        rmcp::model::Tool {
            name: Cow::Borrowed("get_session_urls"),
            description: Some(Cow::Borrowed("Chunk reference list for a stored session")),
            input_schema: object_schema(
                json!({
                    "session_id": {"type": "string"},
                    "as_json": {"type": "boolean"},
                    "base_url": {"type": "string"},
                    "auth_token": {"type": "string"},
                }),
                &["session_id"],
            ),
            annotations: None,
        },
        rmcp::model::Tool {
            name: Cow::Borrowed("list_sessions"),
            description: Some(Cow::Borrowed("Enumerate sessions visible to the caller")),
            input_schema: object_schema(json!({"auth_token": {"type": "string"}}), &[]),
            annotations: None,
        },
    ]
}

fn error_envelope(err: &DigError) -> Value {
    serde_json::to_value(err.to_envelope()).unwrap_or_else(|_| json!({"success": false}))
}

fn success_json(value: Value) -> CallToolResult {
    let text = serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string());
    CallToolResult::success(vec![Content::text(text)])
}

impl ServerHandler for DigMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "dig-scraper".to_string(),
                version: self.ctx.config.build_number.clone(),
            },
            instructions: Some(
                "SSRF-safe web scraping with robots compliance, bounded crawl, a deterministic \
                 news parser, and chunked session storage."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: tool_definitions(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let name = request.name.as_ref();
        if !TOOL_NAMES.contains(&name) {
            let err = DigError::UnknownTool { name: name.to_string() };
            return Ok(success_json(error_envelope(&err)));
        }

        let args = Value::Object(request.arguments.unwrap_or_default());

        if name != "ping" {
            let auth_token = args.get("auth_token").and_then(Value::as_str);
            if let Err(err) = handlers::admit_rate_limit(&self.ctx, auth_token) {
                return Ok(success_json(error_envelope(&err)));
            }
        }

        let result = match name {
            "ping" => handlers::ping(&self.ctx),
            "set_antidetection" => handlers::set_antidetection(&self.ctx, &args),
            "get_content" => handlers::get_content(&self.ctx, &args).await,
            "get_structure" => handlers::get_structure(&self.ctx, &args).await,
            "get_session_info" => handlers::get_session_info(&self.ctx, &args),
            "get_session_chunk" => handlers::get_session_chunk(&self.ctx, &args),
            "get_session" => handlers::get_session(&self.ctx, &args),
            "get_session_urls" => handlers::get_session_urls(&self.ctx, &args),
            "list_sessions" => handlers::list_sessions(&self.ctx, &args),
            _ => unreachable!("validated against TOOL_NAMES above"),
        };

        match result {
            Ok(value) => Ok(success_json(value)),
            Err(err) => Ok(success_json(error_envelope(&err))),
        }
    }
}
