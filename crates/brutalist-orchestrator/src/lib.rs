//! CLI Orchestrator (spec §4.2): availability probing, election policy,
//! parallel fan-out over the CLI Invoker, and synthesis of the per-critic
//! outputs into one joined document.
//!
//! Grounded on `sven-core::task_tool::TaskTool` for the "fan a request out
//! to independent workers, await all of them, fold into one text result"
//! shape — adapted from spawning sub-agents to spawning CLI subprocesses.

mod availability;
mod election;
mod prompts;

pub use availability::AvailabilityProbe;
pub use election::{current_cli, elect};
pub use prompts::build_user_prompt;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use brutalist_cli::{CliInvoker, InvokeFailure, InvokeRequest};
use brutalist_config::SUBPROCESS_MARKER_VAR;
use brutalist_parser::AgentParser;
use brutalist_stream::SessionChannelManager;
use brutalist_types::{BrutalistError, CliAgent, EventType, StreamingEvent};
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::warn;

/// One request to fan out to the elected CLI agents.
pub struct OrchestrationRequest {
    pub analysis_type: String,
    pub primary_arg: String,
    pub system_prompt: String,
    pub context: Option<String>,
    pub working_directory: Option<PathBuf>,
    pub requested_clis: Option<Vec<CliAgent>>,
    pub models: HashMap<CliAgent, String>,
    pub timeout: Duration,
    pub session_id: Option<String>,
}

/// Result of one agent's invocation, after passing its stdout through the
/// Semantic Output Parser.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub agent: CliAgent,
    pub success: bool,
    pub output: String,
    pub execution_time: Duration,
    pub error: Option<String>,
    /// The same failure, classified into the MCP-facing error taxonomy
    /// (spec §7) — `None` on success.
    pub failure: Option<BrutalistError>,
}

pub struct OrchestrationResult {
    pub joined: String,
    pub outcomes: Vec<AgentOutcome>,
}

pub struct Orchestrator {
    invoker: Arc<CliInvoker>,
    availability: Arc<AvailabilityProbe>,
}

impl Orchestrator {
    pub fn new(invoker: CliInvoker) -> Self {
        Orchestrator {
            invoker: Arc::new(invoker),
            availability: Arc::new(AvailabilityProbe::new()),
        }
    }

    /// The CLI Invoker backing this orchestrator, shared so the server's
    /// shutdown path can abort in-flight subprocess invocations.
    pub fn invoker(&self) -> Arc<CliInvoker> {
        self.invoker.clone()
    }

    /// Run one analysis: elect agents, fan out, synthesize. If `sessions`
    /// and `request.session_id` are both present, per-agent lifecycle and
    /// parsed content events are emitted into that session as each
    /// invocation completes (spec §2 data flow: Orchestrator → per-invoker
    /// Semantic Parser → Session Manager → SSE subscribers).
    pub async fn run(
        &self,
        request: OrchestrationRequest,
        sessions: Option<Arc<Mutex<SessionChannelManager>>>,
    ) -> Result<OrchestrationResult, BrutalistError> {
        if std::env::var(SUBPROCESS_MARKER_VAR).map(|v| v == "1").unwrap_or(false) {
            return Err(BrutalistError::Recursion);
        }

        let available = self.availability.available_agents().await;
        let current = current_cli();
        let selected = elect(request.requested_clis.as_deref(), &available, current)?;

        let user_prompt =
            build_user_prompt(&request.analysis_type, &request.primary_arg, request.context.as_deref());

        let mut set = JoinSet::new();
        for agent in selected {
            let invoker = self.invoker.clone();
            let model = request.models.get(&agent).cloned();
            let system_prompt = request.system_prompt.clone();
            let user_prompt = user_prompt.clone();
            let working_directory = request.working_directory.clone();
            let timeout = request.timeout;
            let session_id = request.session_id.clone();
            let sessions = sessions.clone();

            set.spawn(async move {
                invoke_one(
                    invoker,
                    agent,
                    model,
                    system_prompt,
                    user_prompt,
                    working_directory,
                    timeout,
                    session_id,
                    sessions,
                )
                .await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "agent invocation task panicked"),
            }
        }

        if outcomes.iter().all(|o| !o.success) {
            return Err(dominant_failure(&outcomes));
        }

        let joined = synthesize(&outcomes);
        Ok(OrchestrationResult { joined, outcomes })
    }
}

#[allow(clippy::too_many_arguments)]
async fn invoke_one(
    invoker: Arc<CliInvoker>,
    agent: CliAgent,
    model: Option<String>,
    system_prompt: String,
    user_prompt: String,
    working_directory: Option<PathBuf>,
    timeout: Duration,
    session_id: Option<String>,
    sessions: Option<Arc<Mutex<SessionChannelManager>>>,
) -> AgentOutcome {
    emit(&session_id, &sessions, agent, EventType::AgentStart, format!("{agent} starting analysis")).await;

    let result = invoker
        .invoke(InvokeRequest {
            agent,
            system_prompt,
            user_prompt,
            working_directory,
            timeout,
            model,
        })
        .await;

    if let Some(sid) = &session_id {
        if let Some(mgr) = &sessions {
            let mut parser = AgentParser::new(agent, sid.clone());
            let mut events = parser.feed(&result.stdout);
            events.extend(parser.flush());
            let mut guard = mgr.lock().await;
            for event in events {
                let _ = guard.emit_to_session(sid, event, Instant::now(), Utc::now());
            }
        }
    }

    let (event_type, summary) = if result.success {
        (EventType::AgentComplete, format!("{agent} completed"))
    } else {
        let reason = result.error.as_ref().map(|e| e.to_string()).unwrap_or_default();
        (EventType::AgentError, format!("{agent} failed: {reason}"))
    };
    emit(&session_id, &sessions, agent, event_type, summary).await;

    AgentOutcome {
        agent,
        success: result.success,
        output: result.stdout,
        execution_time: result.execution_time,
        error: result.error.as_ref().map(|e| e.to_string()),
        failure: result.error.as_ref().map(InvokeFailure::classify),
    }
}

/// When every elected agent fails, surface the most specific shared cause
/// instead of collapsing straight to `Generic` (spec §7 error taxonomy).
/// Timeout and path/permission failures are more actionable than a bare exec
/// failure, so they win when agents disagree on cause.
fn dominant_failure(outcomes: &[AgentOutcome]) -> BrutalistError {
    outcomes
        .iter()
        .filter_map(|o| o.failure.clone())
        .max_by_key(failure_priority)
        .unwrap_or(BrutalistError::Generic)
}

fn failure_priority(error: &BrutalistError) -> u8 {
    match error {
        BrutalistError::Timeout => 2,
        BrutalistError::PathNotFound | BrutalistError::Permission => 1,
        _ => 0,
    }
}

async fn emit(
    session_id: &Option<String>,
    sessions: &Option<Arc<Mutex<SessionChannelManager>>>,
    agent: CliAgent,
    event_type: EventType,
    content: String,
) {
    let (Some(sid), Some(mgr)) = (session_id, sessions) else {
        return;
    };
    let event = StreamingEvent::new(event_type, agent, content, sid.clone(), Utc::now());
    let mut guard = mgr.lock().await;
    let _ = guard.emit_to_session(sid, event, Instant::now(), Utc::now());
}

/// Join successful outputs into one document with per-critic section
/// headers and a failure roll-up (spec §4.2).
fn synthesize(outcomes: &[AgentOutcome]) -> String {
    let mut doc = String::new();
    let successes: Vec<&AgentOutcome> = outcomes.iter().filter(|o| o.success).collect();

    for (i, outcome) in successes.iter().enumerate() {
        doc.push_str(&format!(
            "## Critic {}: {}\n_Execution time: {:.1}s_\n\n",
            i + 1,
            outcome.agent.to_string().to_uppercase(),
            outcome.execution_time.as_secs_f64()
        ));
        doc.push_str(outcome.output.trim());
        doc.push_str("\n\n---\n\n");
    }

    let failures: Vec<&AgentOutcome> = outcomes.iter().filter(|o| !o.success).collect();
    if !failures.is_empty() {
        doc.push_str("## Failures\n\n");
        for failure in &failures {
            doc.push_str(&format!(
                "- {}: {}\n",
                failure.agent,
                failure.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    doc.trim_end().to_string()
}
