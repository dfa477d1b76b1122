//! Shared data model for the brutalist MCP orchestrator.
//!
//! Every other crate in the workspace depends on this one for the types that
//! cross module boundaries: the CLI agent enum, the tool catalog, cache keys,
//! conversation history, streaming events, progress state, and the error
//! taxonomy exposed to MCP clients.

pub mod agent;
pub mod analysis_state;
pub mod conversation;
pub mod error;
pub mod request_params;
pub mod streaming_event;
pub mod tool_config;

pub use agent::CliAgent;
pub use analysis_state::{AgentProgress, AnalysisPhase, AnalysisState, AnalysisStatus};
pub use conversation::{ConversationMessage, Role};
pub use error::BrutalistError;
pub use request_params::RequestParams;
pub use streaming_event::{
    ContentType, EventBatch, EventMetadata, EventType, ParserPhase, Priority, Severity,
    StreamingEvent,
};
pub use tool_config::{build_catalog, Domain, ToolConfig};
