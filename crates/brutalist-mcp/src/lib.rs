//! `brutalist-mcp` — the MCP protocol surface: tool catalog schemas, the
//! Tool Handler composition (spec §4.10), and both the stdio and HTTP
//! transports (spec §4.11, §6).
//!
//! ```text
//! MCP client (stdio or HTTP)
//!       │
//!       ▼
//! BrutalistMcpServer (rmcp ServerHandler)
//!       │
//!       ▼
//! ToolHandler  ──►  Orchestrator ──► CliInvoker (fan-out)
//! ```

pub mod bridge;
pub mod handler;
pub mod http;
pub mod response;
pub mod schema;
pub mod server;

pub use handler::{ToolHandler, ToolResponse};
pub use server::BrutalistMcpServer;

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::ServiceExt;

/// Serve `server` on stdin/stdout until the client disconnects.
///
/// Grounded on `sven-mcp::serve_stdio`.
pub async fn serve_stdio(handler: Arc<ToolHandler>) -> Result<()> {
    let server = BrutalistMcpServer::new(handler);
    let running = server
        .serve((tokio::io::stdin(), tokio::io::stdout()))
        .await
        .context("MCP stdio server failed to initialize")?;
    running.waiting().await.context("MCP stdio server error")?;
    Ok(())
}
