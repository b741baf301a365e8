//! Human/automation-facing HTTP surface.
//!
//! Grounded on `examples/original_source/app/mcp_server.py`'s Starlette
//! routes and `app/auth/middleware.py`'s bearer-token extraction; built on
//! `axum`/`tower-http` in place of `kodegen_server_http` (see DESIGN.md for
//! the substitution rationale — that crate is an unavailable path
//! dependency of the teacher's monorepo).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::context::RuntimeContext;
use crate::error::DigError;

pub fn router(ctx: RuntimeContext) -> Router {
    Router::new()
        .route("/", get(identity))
        .route("/ping", get(ping))
        .route("/health", get(health))
        .route("/sessions/{id}/info", get(session_info))
        .route("/sessions/{id}/chunks/{index}", get(session_chunk))
        .route("/sessions/{id}/urls", get(session_urls))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(ctx))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let (prefix, token) = value.split_once(' ')?;
    if prefix.eq_ignore_ascii_case("bearer") {
        Some(token)
    } else {
        None
    }
}

fn caller_group(ctx: &RuntimeContext, headers: &HeaderMap) -> Result<Option<String>, DigError> {
    if !ctx.config.auth_enabled {
        return Ok(None);
    }
    match bearer_token(headers) {
        None => Ok(None),
        Some(token) => {
            let info = ctx.token_verifier.verify(token)?;
            Ok(info.primary_group().map(str::to_string))
        }
    }
}

fn error_response(err: DigError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(err.to_envelope())).into_response()
}

async fn identity(State(ctx): State<Arc<RuntimeContext>>) -> impl IntoResponse {
    Json(json!({
        "service": "dig-scraper",
        "build": ctx.config.build_number,
    }))
}

async fn ping() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn health(State(ctx): State<Arc<RuntimeContext>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "storage_dir": ctx.config.storage_dir,
    }))
}

async fn session_info(State(ctx): State<Arc<RuntimeContext>>, Path(id): Path<String>, headers: HeaderMap) -> Response {
    let group = match caller_group(&ctx, &headers) {
        Ok(group) => group,
        Err(err) => return error_response(err),
    };
    match ctx.sessions.get_session_info(&id, group.as_deref(), ctx.config.auth_enabled) {
        Ok(info) => Json(json!({
            "session_id": info.guid,
            "url": info.url,
            "total_chunks": info.total_chunks,
            "total_size_bytes": info.size_bytes,
            "chunk_size": info.chunk_size,
            "created_at": info.created_at.to_rfc3339(),
            "group": info.group,
        }))
        .into_response(),
        Err(err) => error_response(err),
    }
}

async fn session_chunk(
    State(ctx): State<Arc<RuntimeContext>>,
    Path((id, index)): Path<(String, i64)>,
    headers: HeaderMap,
) -> Response {
    let group = match caller_group(&ctx, &headers) {
        Ok(group) => group,
        Err(err) => return error_response(err),
    };
    match ctx.sessions.get_chunk(&id, index, group.as_deref(), ctx.config.auth_enabled) {
        Ok(chunk) => ([("content-type", "text/plain; charset=utf-8")], chunk).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct UrlsQuery {
    base_url: Option<String>,
}

async fn session_urls(
    State(ctx): State<Arc<RuntimeContext>>,
    Path(id): Path<String>,
    Query(query): Query<UrlsQuery>,
    headers: HeaderMap,
) -> Response {
    let group = match caller_group(&ctx, &headers) {
        Ok(group) => group,
        Err(err) => return error_response(err),
    };
    match ctx.sessions.get_session_info(&id, group.as_deref(), ctx.config.auth_enabled) {
        Ok(info) => {
            let base_url = query.base_url.unwrap_or_default();
            let chunk_urls: Vec<String> = (0..info.total_chunks)
                .map(|i| format!("{base_url}/sessions/{id}/chunks/{i}"))
                .collect();
            Json(json!({ "chunk_urls": chunk_urls })).into_response()
        }
        Err(err) => error_response(err),
    }
}
