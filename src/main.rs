//! Process entry point: starts the MCP stdio server and the HTTP surface
//! side by side against one shared `RuntimeContext`.

use std::sync::Arc;

use anyhow::Result;
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::EnvFilter;

use dig_scraper::auth::{NullTokenVerifier, StaticTokenVerifier, TokenVerifier};
use dig_scraper::{http, DigConfig, DigMcpServer, RuntimeContext};

fn build_token_verifier(config: &DigConfig) -> Arc<dyn TokenVerifier> {
    if !config.auth_enabled {
        return Arc::new(NullTokenVerifier);
    }
    let groups = std::env::var("DIG_STATIC_GROUPS")
        .ok()
        .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    Arc::new(StaticTokenVerifier::new(groups))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = DigConfig::from_env();
    let token_verifier = build_token_verifier(&config);
    let web_port = config.web_port;
    let ctx = RuntimeContext::new(config, token_verifier)?;

    let mcp_server = DigMcpServer::new(ctx.clone());
    let mcp_task = tokio::spawn(async move {
        let service = mcp_server.serve(stdio()).await?;
        service.waiting().await?;
        Ok::<(), anyhow::Error>(())
    });

    let app = http::router(ctx);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", web_port)).await?;
    tracing::info!(event = "http.listening", port = web_port, "HTTP surface started");
    let http_task = tokio::spawn(async move {
        axum::serve(listener, app).await?;
        Ok::<(), anyhow::Error>(())
    });

    tokio::select! {
        result = mcp_task => result??,
        result = http_task => result??,
    }

    Ok(())
}
