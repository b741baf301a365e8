//! Per-tool request handling. One function per RPC tool in §6.1; the HTTP
//! surface (`src/http.rs`) reuses the session-facing ones directly.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};

use crate::antidetect::AntiDetectionProfile;
use crate::context::RuntimeContext;
use crate::crawl::{clamp_depth, clamp_max_pages_per_level, shape_to_budget, Crawler, CrawlOptions};
use crate::error::DigError;
use crate::extract::{ContentExtractor, StructureAnalyzer};
use crate::news::{NewsParser, NewsParserInput, NewsPageInput};

const DEFAULT_MAX_RESPONSE_CHARS: i64 = 200_000;

fn get_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, DigError> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DigError::InvalidArgument {
            message: format!("missing required argument '{key}'"),
        })
}

fn get_opt_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn get_opt_u32(args: &Value, key: &str) -> Option<u32> {
    args.get(key).and_then(Value::as_u64).map(|v| v as u32)
}

fn get_opt_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

fn get_opt_i64(args: &Value, key: &str) -> Option<i64> {
    args.get(key).and_then(Value::as_i64)
}

fn get_opt_bool(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn get_opt_f64(args: &Value, key: &str) -> Option<f64> {
    args.get(key).and_then(Value::as_f64)
}

/// Resolves the caller's primary group from an `auth_token` argument,
/// honoring "auth disabled process-wide" (§4.J: ignore tokens, treat every
/// caller as anonymous).
fn resolve_caller_group(ctx: &RuntimeContext, args: &Value) -> Result<Option<String>, DigError> {
    if !ctx.config.auth_enabled {
        return Ok(None);
    }
    match get_opt_str(args, "auth_token") {
        None => Ok(None),
        Some(token) => {
            let info = ctx.token_verifier.verify(token)?;
            Ok(info.primary_group().map(str::to_string))
        }
    }
}

pub fn admit_rate_limit(ctx: &RuntimeContext, auth_token: Option<&str>) -> Result<(), DigError> {
    let identity = if !ctx.config.auth_enabled {
        None
    } else {
        auth_token.and_then(|token| ctx.token_verifier.verify(token).ok()).and_then(|info| info.primary_group().map(str::to_string))
    };
    let (allowed, info) = ctx.rate_limiter.check(identity.as_deref());
    if !allowed {
        return Err(DigError::RateLimitExceeded {
            limit: info.limit,
            reset_seconds: info.reset_seconds,
        });
    }
    Ok(())
}

pub fn ping(ctx: &RuntimeContext) -> Result<Value, DigError> {
    Ok(json!({
        "success": true,
        "status": "ok",
        "service": "dig-scraper",
        "build": ctx.config.build_number,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub fn set_antidetection(ctx: &RuntimeContext, args: &Value) -> Result<Value, DigError> {
    let profile_str = get_str(args, "profile")?;
    let profile = AntiDetectionProfile::parse(profile_str).ok_or_else(|| DigError::InvalidProfile {
        profile: profile_str.to_string(),
    })?;

    let rate_limit_delay = get_opt_f64(args, "rate_limit_delay").unwrap_or(1.0);
    if rate_limit_delay < 0.0 {
        return Err(DigError::InvalidRateLimit { value: rate_limit_delay });
    }

    let max_response_chars = get_opt_i64(args, "max_response_chars").unwrap_or(DEFAULT_MAX_RESPONSE_CHARS);
    if !(4000..=4_000_000).contains(&max_response_chars) {
        return Err(DigError::InvalidMaxResponseChars { value: max_response_chars });
    }

    let custom_user_agent = get_opt_str(args, "custom_user_agent").map(str::to_string);
    let custom_headers: HashMap<String, String> = args
        .get("custom_headers")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();

    {
        let mut state = ctx.antidetect.write();
        state.profile = profile;
        state.custom_user_agent = custom_user_agent;
        state.custom_headers = custom_headers;
    }
    ctx.fetcher.set_rate_limit_delay(Duration::from_secs_f64(rate_limit_delay));

    Ok(json!({
        "success": true,
        "profile": profile.as_str(),
        "rate_limit_delay": rate_limit_delay,
        "max_response_chars": max_response_chars,
        "respect_robots_txt": true,
    }))
}

pub async fn get_content(ctx: &RuntimeContext, args: &Value) -> Result<Value, DigError> {
    let url = get_str(args, "url")?;
    let antidetect = ctx.antidetect.read().clone();

    let options = CrawlOptions {
        depth: clamp_depth(get_opt_u32(args, "depth").unwrap_or(1)),
        max_pages_per_level: clamp_max_pages_per_level(get_opt_u32(args, "max_pages_per_level").unwrap_or(10)),
        selector: get_opt_str(args, "selector").map(str::to_string),
        include_links: get_opt_bool(args, "include_links", true),
        include_images: get_opt_bool(args, "include_images", true),
        include_meta: get_opt_bool(args, "include_meta", true),
        filter_noise: get_opt_bool(args, "filter_noise", false),
        check_robots: true,
        timeout: get_opt_f64(args, "timeout_seconds").map(Duration::from_secs_f64),
        antidetect,
        rotate_user_agent: false,
    };

    let crawler = Crawler::new(ctx.fetcher.clone(), ctx.robots_cache.clone());
    let mut result = match crawler.crawl(url, &options).await {
        Ok(result) => result,
        Err(failure) => {
            return Ok(json!({
                "success": false,
                "error_code": failure.error_code,
                "message": failure.message,
                "url": failure.url,
            }));
        }
    };

    let max_bytes = get_opt_u64(args, "max_bytes").unwrap_or(DEFAULT_MAX_RESPONSE_CHARS as u64);
    shape_to_budget(&mut result, max_bytes as usize);

    let parse_results = get_opt_bool(args, "parse_results", false);
    let mut payload = if parse_results {
        let pages: Vec<NewsPageInput> = std::iter::once(&result.root)
            .chain(result.pages.iter())
            .map(|page| NewsPageInput {
                url: page.url.clone(),
                depth: page.depth,
                text: page.text.clone(),
                language: page.language.clone(),
                meta: page.meta.clone().unwrap_or_default(),
            })
            .collect();
        let feed = NewsParser::new().parse(NewsParserInput {
            start_url: url.to_string(),
            pages,
            crawl_time_utc: None,
            parser_version: None,
            source_profile_name: get_opt_str(args, "source_profile_name").map(str::to_string),
        })?;
        serde_json::to_value(feed).map_err(|e| DigError::Internal { message: e.to_string() })?
    } else {
        serde_json::to_value(&result).map_err(|e| DigError::Internal { message: e.to_string() })?
    };

    if get_opt_bool(args, "session", false) {
        let text = serde_json::to_string(&payload).map_err(|e| DigError::Internal { message: e.to_string() })?;
        let caller_group = resolve_caller_group(ctx, args)?;
        let guid = ctx.sessions.create_session(&text, url, caller_group, get_opt_u64(args, "chunk_size").map(|v| v as usize))?;
        let info = ctx.sessions.get_session_info(&guid, None, false)?;
        return Ok(json!({
            "success": true,
            "session_id": guid,
            "total_chunks": info.total_chunks,
            "total_size": info.size_bytes,
            "chunk_size": info.chunk_size,
        }));
    }

    if let Value::Object(ref mut map) = payload {
        map.insert("success".to_string(), Value::Bool(true));
    }
    Ok(payload)
}

pub async fn get_structure(ctx: &RuntimeContext, args: &Value) -> Result<Value, DigError> {
    let url = get_str(args, "url")?;
    let antidetect = ctx.antidetect.read().clone();
    let timeout = get_opt_f64(args, "timeout_seconds").map(Duration::from_secs_f64);

    if !ctx.robots_cache.is_allowed(&url::Url::parse(url).map_err(|e| DigError::InvalidArgument { message: e.to_string() })?).await {
        return Err(DigError::RobotsBlocked { url: url.to_string() });
    }

    let result = ctx.fetcher.fetch(url, &antidetect, false, &[], timeout).await;
    if !result.success() {
        return Err(DigError::Fetch(crate::fetch::FetchError::Other {
            url: url.to_string(),
            message: result.error.unwrap_or_else(|| format!("HTTP {}", result.status)),
        }));
    }

    let analyzer = StructureAnalyzer::new();
    let structure = analyzer.analyze(&result.body, &result.final_url)?;
    let mut value = serde_json::to_value(structure).map_err(|e| DigError::Internal { message: e.to_string() })?;
    if let Value::Object(ref mut map) = value {
        map.insert("success".to_string(), Value::Bool(true));
    }
    Ok(value)
}

pub fn get_session_info(ctx: &RuntimeContext, args: &Value) -> Result<Value, DigError> {
    let session_id = get_str(args, "session_id")?;
    let caller_group = resolve_caller_group(ctx, args)?;
    let info = ctx.sessions.get_session_info(session_id, caller_group.as_deref(), ctx.config.auth_enabled)?;
    Ok(json!({
        "success": true,
        "session_id": info.guid,
        "url": info.url,
        "total_chunks": info.total_chunks,
        "total_size_bytes": info.size_bytes,
        "chunk_size": info.chunk_size,
        "created_at": info.created_at.to_rfc3339(),
        "group": info.group,
    }))
}

pub fn get_session_chunk(ctx: &RuntimeContext, args: &Value) -> Result<Value, DigError> {
    let session_id = get_str(args, "session_id")?;
    let chunk_index = args.get("chunk_index").and_then(Value::as_i64).ok_or_else(|| DigError::InvalidArgument {
        message: "missing required argument 'chunk_index'".to_string(),
    })?;
    let caller_group = resolve_caller_group(ctx, args)?;
    let chunk = ctx.sessions.get_chunk(session_id, chunk_index, caller_group.as_deref(), ctx.config.auth_enabled)?;
    Ok(json!({ "success": true, "session_id": session_id, "chunk_index": chunk_index, "content": chunk }))
}

pub fn get_session(ctx: &RuntimeContext, args: &Value) -> Result<Value, DigError> {
    let session_id = get_str(args, "session_id")?;
    let caller_group = resolve_caller_group(ctx, args)?;
    let max_bytes = get_opt_u64(args, "max_bytes");
    let content = ctx.sessions.get_session(session_id, max_bytes, caller_group.as_deref(), ctx.config.auth_enabled)?;
    let info = ctx.sessions.get_session_info(session_id, caller_group.as_deref(), ctx.config.auth_enabled)?;
    Ok(json!({
        "success": true,
        "content": content,
        "total_chunks": info.total_chunks,
        "total_size_bytes": info.size_bytes,
    }))
}

pub fn get_session_urls(ctx: &RuntimeContext, args: &Value) -> Result<Value, DigError> {
    let session_id = get_str(args, "session_id")?;
    let caller_group = resolve_caller_group(ctx, args)?;
    let info = ctx.sessions.get_session_info(session_id, caller_group.as_deref(), ctx.config.auth_enabled)?;

    if get_opt_bool(args, "as_json", true) {
        let chunks: Vec<Value> = (0..info.total_chunks)
            .map(|i| json!({ "session_id": session_id, "chunk_index": i }))
            .collect();
        Ok(json!({ "success": true, "chunks": chunks }))
    } else {
        let base_url = get_opt_str(args, "base_url").unwrap_or("");
        let chunk_urls: Vec<String> = (0..info.total_chunks)
            .map(|i| format!("{base_url}/sessions/{session_id}/chunks/{i}"))
            .collect();
        Ok(json!({ "success": true, "chunk_urls": chunk_urls }))
    }
}

pub fn list_sessions(ctx: &RuntimeContext, args: &Value) -> Result<Value, DigError> {
    let caller_group = resolve_caller_group(ctx, args)?;
    let sessions = ctx.sessions.list_sessions(caller_group.as_deref())?;
    let items: Vec<Value> = sessions
        .iter()
        .map(|info| {
            json!({
                "session_id": info.guid,
                "url": info.url,
                "total_chunks": info.total_chunks,
                "total_size_bytes": info.size_bytes,
                "chunk_size": info.chunk_size,
                "created_at": info.created_at.to_rfc3339(),
                "group": info.group,
            })
        })
        .collect();
    let total = items.len();
    Ok(json!({ "success": true, "sessions": items, "total": total }))
}

// ContentExtractor is used by the crawler internally; re-exported here so
// a direct (non-crawling) single-page extraction path is available if a
// future tool needs it without going through the BFS crawler.
#[allow(dead_code)]
fn extract_single_page(html: &str, url: &str) -> Result<Value, DigError> {
    let extracted = ContentExtractor::new().extract(html, url, None, true, true, true)?;
    serde_json::to_value(extracted).map_err(|e| DigError::Internal { message: e.to_string() })
}
