//! Tool Handler (spec §4.10): the 8-step composition wrapping the CLI
//! Orchestrator with recursion guarding, session/pagination handling,
//! context continuation, and the Response Cache.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use brutalist_cache::{ResponseCache, ANONYMOUS_SESSION};
use brutalist_cli::DEFAULT_WALL_CLOCK_TIMEOUT;
use brutalist_config::Config;
use brutalist_orchestrator::Orchestrator;
use brutalist_paginate::extract_pagination_params;
use brutalist_stream::{SessionChannelManager, ShutdownSignal};
use brutalist_types::{
    build_catalog, BrutalistError, CliAgent, ConversationMessage, RequestParams, Role, ToolConfig,
};
use brutalist_orchestrator::OrchestrationRequest;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, Notify};

use crate::response::format_response;

pub struct ToolResponse {
    pub text: String,
    pub is_error: bool,
}

pub struct ToolHandler {
    catalog: HashMap<String, ToolConfig>,
    cache: Mutex<ResponseCache>,
    orchestrator: Orchestrator,
    sessions: Arc<Mutex<SessionChannelManager>>,
    shutdown: ShutdownSignal,
}

impl ToolHandler {
    pub fn new(orchestrator: Orchestrator) -> Self {
        let catalog = build_catalog().into_iter().map(|tc| (tc.name.clone(), tc)).collect();
        ToolHandler {
            catalog,
            cache: Mutex::new(ResponseCache::new()),
            orchestrator,
            sessions: Arc::new(Mutex::new(SessionChannelManager::new())),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.catalog.keys().map(String::as_str)
    }

    pub fn tool_config(&self, name: &str) -> Option<&ToolConfig> {
        self.catalog.get(name)
    }

    pub fn catalog(&self) -> impl Iterator<Item = &ToolConfig> {
        self.catalog.values()
    }

    /// The session map backing this handler's streaming progress — shared
    /// with the HTTP transport's `/sse/:session_id` route so a client that
    /// opens a stream for the `session_id` it used in a tool call observes
    /// that call's progress live.
    pub fn sessions(&self) -> Arc<Mutex<SessionChannelManager>> {
        self.sessions.clone()
    }

    /// The signal broadcast to every open SSE connection on shutdown.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Graceful shutdown (spec §5): abort in-flight CLI invocations rather
    /// than waiting out their wall-clock timeout, close every open SSE
    /// connection with a `server_shutdown` reason, and drop the response
    /// cache (there is no persistence to preserve).
    pub async fn shutdown(&self) {
        self.orchestrator.invoker().abort_active();
        self.shutdown.notify_waiters();
        self.cache.lock().await.clear();
    }

    pub async fn handle(&self, tool_name: &str, raw_args: Value, client_session_id: Option<String>) -> ToolResponse {
        match self.handle_inner(tool_name, raw_args, client_session_id).await {
            Ok(text) => ToolResponse { text, is_error: false },
            Err(e) => ToolResponse { text: e.to_string(), is_error: true },
        }
    }

    async fn handle_inner(
        &self,
        tool_name: &str,
        raw_args: Value,
        client_session_id: Option<String>,
    ) -> Result<String, BrutalistError> {
        // 1. Recursion guard.
        if Config::is_subprocess() {
            return Err(BrutalistError::Recursion);
        }

        let tool = self.catalog.get(tool_name).ok_or(BrutalistError::Generic)?;
        let obj = raw_args.as_object().cloned().unwrap_or_default();

        // 2. Session and pagination extraction.
        let session_id = client_session_id.unwrap_or_else(|| ANONYMOUS_SESSION.to_string());
        let offset = obj.get("offset").and_then(Value::as_i64);
        let limit = obj.get("limit").and_then(Value::as_i64);
        let cursor = obj.get("cursor").and_then(Value::as_str);
        let context_id = obj.get("context_id").and_then(Value::as_str).map(str::to_string);
        let resume = obj.get("resume").and_then(Value::as_bool).unwrap_or(false);
        let force_refresh = obj.get("force_refresh").and_then(Value::as_bool).unwrap_or(false);
        let verbose = obj.get("verbose").and_then(Value::as_bool).unwrap_or(false);
        let pagination_params = extract_pagination_params(offset, limit, cursor);

        // 3. Resume validation.
        if resume && context_id.is_none() {
            return Err(BrutalistError::resume_requires_context_id());
        }

        let now = Utc::now();

        // 4. context_id path (two modes).
        if let Some(ctx) = &context_id {
            if !force_refresh {
                if resume {
                    return self.continue_context(tool, ctx, &obj, &session_id, &pagination_params, verbose, now).await;
                }
                let mut cache = self.cache.lock().await;
                let content = cache
                    .get_by_context_id(ctx, &session_id, now)
                    .ok_or_else(BrutalistError::context_id_not_found)?;
                drop(cache);
                return Ok(format_response(&content, &pagination_params, Some(ctx), verbose, None));
            }
        }

        // 5. Cache-key path.
        let primary_arg = obj
            .get(tool.primary_arg_field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(BrutalistError::Generic)?;
        let request_params = RequestParams::from_args(tool_name, &raw_args);
        let cache_key = request_params.cache_key();

        if !force_refresh {
            let mut cache = self.cache.lock().await;
            if let Some(content) = cache.get(&cache_key, &session_id, now) {
                let ctx = cache.find_context_id_for_key(&cache_key).map(str::to_string);
                drop(cache);
                return Ok(format_response(&content, &pagination_params, ctx.as_deref(), verbose, None));
            }
        }

        // 6. Execute.
        let context = obj.get("context").and_then(Value::as_str).map(str::to_string);
        let joined = self.execute(tool, &primary_arg, context, &obj, &session_id).await?;

        // 7. Write cache.
        let history = vec![
            ConversationMessage::user(primary_arg.clone(), now),
            ConversationMessage::assistant(joined.clone(), now),
        ];
        let mut cache = self.cache.lock().await;
        let ctx = cache.set(request_params, &joined, None, &session_id, history, now);
        drop(cache);

        // 8. Format response.
        let summary = execution_summary(tool, &joined);
        Ok(format_response(&joined, &pagination_params, Some(&ctx), verbose, Some(&summary)))
    }

    async fn continue_context(
        &self,
        tool: &ToolConfig,
        context_id: &str,
        obj: &Map<String, Value>,
        session_id: &str,
        pagination_params: &brutalist_paginate::PaginationParams,
        verbose: bool,
        now: chrono::DateTime<Utc>,
    ) -> Result<String, BrutalistError> {
        let mut cache = self.cache.lock().await;
        cache
            .get_by_context_id(context_id, session_id, now)
            .ok_or_else(BrutalistError::context_id_not_found)?;
        let prior_params = cache
            .request_params(context_id)
            .cloned()
            .ok_or_else(BrutalistError::context_id_not_found)?;
        let prior_history = cache
            .conversation_history(context_id)
            .map(<[_]>::to_vec)
            .unwrap_or_default();
        drop(cache);

        let new_prompt = obj
            .get(tool.primary_arg_field)
            .and_then(Value::as_str)
            .ok_or_else(|| BrutalistError::MissingContext(
                "A new prompt is required in the primary argument to continue this conversation.".to_string(),
            ))?;

        let primary_arg = prior_params
            .primary_arg(tool.primary_arg_field)
            .map(str::to_string)
            .ok_or_else(BrutalistError::context_id_not_found)?;

        let context = render_conversation(&prior_history, new_prompt);
        let joined = self.execute(tool, &primary_arg, Some(context), obj, session_id).await?;

        let mut history = prior_history;
        history.push(ConversationMessage::user(new_prompt, now));
        history.push(ConversationMessage::assistant(joined.clone(), now));

        let mut cache = self.cache.lock().await;
        cache
            .update_by_context_id(context_id, &joined, history, session_id, now)
            .map_err(|_| BrutalistError::context_id_not_found())?;
        drop(cache);

        let summary = execution_summary(tool, &joined);
        Ok(format_response(&joined, pagination_params, Some(context_id), verbose, Some(&summary)))
    }

    async fn execute(
        &self,
        tool: &ToolConfig,
        primary_arg: &str,
        context: Option<String>,
        obj: &Map<String, Value>,
        session_id: &str,
    ) -> Result<String, BrutalistError> {
        let system_prompt = system_prompt_for(tool);
        let working_directory = tool.domain.is_filesystem().then(|| PathBuf::from(primary_arg));

        let requested_clis = obj.get("clis").and_then(Value::as_array).map(|arr| {
            arr.iter().filter_map(Value::as_str).filter_map(CliAgent::parse).collect::<Vec<_>>()
        });
        let models = obj
            .get("models")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| CliAgent::parse(k).zip(v.as_str().map(str::to_string)))
                    .collect::<HashMap<_, _>>()
            })
            .unwrap_or_default();

        {
            let mut sessions = self.sessions.lock().await;
            if sessions.get_session(session_id, false, Utc::now()).is_none() {
                let _ = sessions.create_session(Some(session_id.to_string()), &CliAgent::all(), Utc::now());
            }
        }

        let request = OrchestrationRequest {
            analysis_type: tool.analysis_type.to_string(),
            primary_arg: primary_arg.to_string(),
            system_prompt,
            context,
            working_directory,
            requested_clis,
            models,
            timeout: DEFAULT_WALL_CLOCK_TIMEOUT,
            session_id: Some(session_id.to_string()),
        };

        let result = self.orchestrator.run(request, Some(self.sessions.clone())).await?;
        Ok(result.joined)
    }
}

fn render_conversation(history: &[ConversationMessage], new_prompt: &str) -> String {
    let mut out = String::new();
    for msg in history {
        let role = match msg.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        out.push_str(&format!("{role}: {}\n\n", msg.content));
    }
    out.push_str(&format!("User: {new_prompt}"));
    out
}

fn execution_summary(tool: &ToolConfig, joined: &str) -> String {
    let critics = joined.matches("## Critic ").count();
    format!("{} critic(s) responded for {}", critics, tool.name)
}

/// Brutalist system prompt, tailored by domain (shared across all elected
/// CLIs for one request).
fn system_prompt_for(tool: &ToolConfig) -> String {
    format!(
        "You are a brutally honest, adversarial technical critic performing a {} review. \
         Be specific, cite concrete evidence, and do not soften real problems to spare feelings.",
        tool.analysis_type.replace('_', " ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn handler() -> ToolHandler {
        let orchestrator = Orchestrator::new(brutalist_cli::CliInvoker::new(Duration::from_secs(3600)).unwrap());
        ToolHandler::new(orchestrator)
    }

    #[tokio::test]
    async fn unknown_tool_name_is_a_generic_error() {
        let h = handler();
        let response = h.handle("roast_nonexistent", serde_json::json!({}), None).await;
        assert!(response.is_error);
    }

    #[tokio::test]
    async fn resume_without_context_id_is_rejected() {
        let h = handler();
        let response = h
            .handle("roast_idea", serde_json::json!({"idea": "x", "resume": true}), None)
            .await;
        assert!(response.is_error);
        assert!(response.text.contains("context_id"));
    }

    #[tokio::test]
    async fn missing_context_id_is_reported_not_found() {
        let h = handler();
        let response = h
            .handle("roast_idea", serde_json::json!({"idea": "x", "context_id": "missing"}), None)
            .await;
        assert!(response.is_error);
        assert!(response.text.contains("Context ID not found"));
    }

    #[tokio::test]
    async fn recursion_guard_rejects_inside_subprocess() {
        std::env::set_var(brutalist_config::SUBPROCESS_MARKER_VAR, "1");
        let h = handler();
        let response = h.handle("roast_idea", serde_json::json!({"idea": "x"}), None).await;
        std::env::remove_var(brutalist_config::SUBPROCESS_MARKER_VAR);
        assert!(response.is_error);
        assert!(response.text.contains("subprocess"));
    }
}
