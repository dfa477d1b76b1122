//! [`BrutalistMcpServer`] — the rmcp [`ServerHandler`] implementation.
//!
//! Wraps a [`ToolHandler`] and implements the MCP `tools/list` and
//! `tools/call` protocol methods; all other lifecycle methods (initialize,
//! ping, shutdown) use rmcp's defaults.
//!
//! Grounded on `sven-mcp::server::SvenMcpServer`.

use std::sync::Arc;

use rmcp::{
    handler::server::ServerHandler,
    model::{CallToolRequestParams, CallToolResult, ListToolsResult, PaginatedRequestParams, ServerCapabilities, ServerInfo},
    service::{RequestContext, RoleServer},
    ErrorData as McpError,
};

use crate::bridge::{response_to_call_result, tool_config_to_mcp_tool};
use crate::handler::ToolHandler;

/// MCP server for brutalist's tool catalog.
///
/// Stateless at the protocol layer: session/cache/conversation state all
/// lives inside [`ToolHandler`], keyed by a client-supplied `session_id`
/// argument rather than by MCP transport connection.
#[derive(Clone)]
pub struct BrutalistMcpServer {
    handler: Arc<ToolHandler>,
}

impl BrutalistMcpServer {
    pub fn new(handler: Arc<ToolHandler>) -> Self {
        BrutalistMcpServer { handler }
    }
}

impl ServerHandler for BrutalistMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..ServerInfo::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let handler = self.handler.clone();
        async move {
            let tools = handler.catalog().map(tool_config_to_mcp_tool).collect();
            Ok(ListToolsResult {
                tools,
                next_cursor: None,
                meta: None,
            })
        }
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let mut args: serde_json::Map<String, serde_json::Value> = request.arguments.unwrap_or_default();

        // `session_id` is plumbing for this server's cache/pagination
        // identity, not a declared tool parameter — strip it before the
        // remaining arguments reach the cache key.
        let session_id = args
            .remove("session_id")
            .and_then(|v| v.as_str().map(str::to_string));

        let response = self
            .handler
            .handle(&request.name, serde_json::Value::Object(args), session_id)
            .await;

        Ok(response_to_call_result(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_server() -> BrutalistMcpServer {
        let orchestrator = brutalist_orchestrator::Orchestrator::new(
            brutalist_cli::CliInvoker::new(std::time::Duration::from_secs(3600)).unwrap(),
        );
        BrutalistMcpServer::new(Arc::new(ToolHandler::new(orchestrator)))
    }

    #[test]
    fn get_info_enables_tools_capability() {
        let server = make_server();
        let info = server.get_info();
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn server_is_cloneable() {
        let server = make_server();
        let _clone = server.clone();
    }
}
