//! Hand-rolled HTTP transport (spec §6): `POST /mcp` JSON-RPC, `GET
//! /sse/:session_id` for server-initiated streaming, and `GET /health`.
//!
//! rmcp's HTTP transport feature is not part of this workspace's dependency
//! set (see DESIGN.md) — this module implements exactly the MCP surface the
//! Tool Handler needs (`initialize`, `tools/list`, `tools/call`) directly on
//! axum + tower-http, grounded on `sven-gateway::http::ws` for the
//! streaming-handler shape.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use brutalist_config::Config;
use brutalist_stream::{sse_handler, SseState};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use uuid::Uuid;

use crate::handler::ToolHandler;
use crate::schema::tool_json;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const MCP_SESSION_HEADER: &str = "mcp-session-id";

#[derive(Clone)]
struct AppState {
    handler: Arc<ToolHandler>,
}

/// Build the full HTTP router: `/mcp`, `/health`, and the per-session SSE
/// stream, with CORS and a 10 MiB body cap applied (spec §6).
pub fn build_router(handler: Arc<ToolHandler>, config: Arc<Config>) -> Router {
    let sessions = handler.sessions();
    let shutdown = handler.shutdown_signal();
    let state = AppState { handler };

    let mcp_routes = Router::new()
        .route("/mcp", post(mcp_post).get(mcp_get))
        .route("/health", get(health))
        .with_state(state);

    let sse_routes = Router::new()
        .route("/sse/:session_id", get(sse_handler))
        .with_state(SseState {
            manager: sessions,
            shutdown,
        });

    let cors = {
        let config = config.clone();
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::HeaderName::from_static(MCP_SESSION_HEADER)])
            .allow_credentials(false)
            .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _parts| {
                origin.to_str().map(|o| config.origin_allowed(o)).unwrap_or(false)
            }))
    };

    mcp_routes
        .merge(sse_routes)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "transport": "http-streaming",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Server-initiated events are served per-session at `/sse/:session_id`
/// instead of via `GET /mcp` (see DESIGN.md); acknowledge rather than 404
/// so well-behaved Streamable HTTP clients degrade gracefully.
async fn mcp_get() -> impl IntoResponse {
    StatusCode::METHOD_NOT_ALLOWED
}

async fn mcp_post(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let session_id = headers
        .get(MCP_SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let id = body.get("id").cloned().unwrap_or(Value::Null);
    let method = body.get("method").and_then(Value::as_str).unwrap_or_default();

    let result = match method {
        "tools/list" => Ok(json!({ "tools": state.handler.catalog().map(tool_json).collect::<Vec<_>>() })),
        "tools/call" => {
            let params = body.get("params").cloned().unwrap_or(json!({}));
            let name = params.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
            let response = state.handler.handle(&name, arguments, session_id.clone()).await;
            Ok(json!({
                "content": [{"type": "text", "text": response.text}],
                "isError": response.is_error,
            }))
        }
        "initialize" => Ok(json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {"name": "brutalist-mcp-server", "version": env!("CARGO_PKG_VERSION")},
            "capabilities": {"tools": {}},
        })),
        other => Err(format!("method not found: {other}")),
    };

    let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut response_headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response_headers.insert(MCP_SESSION_HEADER, value);
    }

    let body = match result {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err(message) => json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": message}}),
    };

    (response_headers, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_builds_without_panicking() {
        let orchestrator = brutalist_orchestrator::Orchestrator::new(
            brutalist_cli::CliInvoker::new(std::time::Duration::from_secs(3600)).unwrap(),
        );
        let handler = Arc::new(ToolHandler::new(orchestrator));
        let _router = build_router(handler, Arc::new(Config::default()));
    }
}
