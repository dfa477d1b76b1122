//! Type conversions between this crate's tool types and rmcp's MCP model
//! types — the seam between the Tool Handler and the MCP wire protocol.

use std::borrow::Cow;
use std::sync::Arc;

use brutalist_types::ToolConfig;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool as McpTool};

use crate::handler::ToolResponse;
use crate::schema::{build_input_schema, tool_description};

/// Convert one [`ToolConfig`] into an rmcp [`Tool`] descriptor.
pub fn tool_config_to_mcp_tool(tool: &ToolConfig) -> McpTool {
    let input_schema: JsonObject = match build_input_schema(tool) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!("build_input_schema always returns an object"),
    };
    McpTool::new(
        Cow::Owned(tool.name.clone()),
        Cow::Owned(tool_description(tool.domain).to_string()),
        Arc::new(input_schema),
    )
}

/// Convert a [`ToolResponse`] into an rmcp [`CallToolResult`].
pub fn response_to_call_result(response: ToolResponse) -> CallToolResult {
    let content = vec![Content::text(response.text)];
    if response.is_error {
        CallToolResult {
            content,
            is_error: Some(true),
            structured_content: None,
            meta: None,
        }
    } else {
        CallToolResult::success(content)
    }
}
