use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::CliAgent;

/// Coarse, session-level progress phase (spec §4.5 Progress Tracker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisPhase {
    Initializing,
    CollectingData,
    Analyzing,
    ProcessingResults,
    Complete,
}

impl AnalysisPhase {
    pub fn milestone_label(&self) -> &'static str {
        match self {
            AnalysisPhase::Initializing => "Starting analysis",
            AnalysisPhase::CollectingData => "Collecting data",
            AnalysisPhase::Analyzing => "Analyzing",
            AnalysisPhase::ProcessingResults => "Processing results",
            AnalysisPhase::Complete => "Complete",
        }
    }

    /// Rough completion percentage associated with reaching this phase,
    /// used when no finer-grained milestone count is available.
    pub fn baseline_percent(&self) -> u8 {
        match self {
            AnalysisPhase::Initializing => 5,
            AnalysisPhase::CollectingData => 25,
            AnalysisPhase::Analyzing => 55,
            AnalysisPhase::ProcessingResults => 85,
            AnalysisPhase::Complete => 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Running,
    Complete,
    Failed,
    TimedOut,
}

/// Per-agent progress within a multi-CLI session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProgress {
    pub agent: CliAgent,
    pub phase: AnalysisPhase,
    pub percent: u8,
    pub last_update: DateTime<Utc>,
}

/// Session-wide progress snapshot (spec §3 `AnalysisState`).
///
/// `percent` only ever moves forward — a later, lower phase hint is ignored
/// (spec §4.5 invariant: progress is monotonic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisState {
    pub session_id: String,
    pub status: AnalysisStatus,
    pub agents: Vec<AgentProgress>,
    pub started_at: DateTime<Utc>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl AnalysisState {
    pub fn new(session_id: impl Into<String>, agents: &[CliAgent], started_at: DateTime<Utc>) -> Self {
        AnalysisState {
            session_id: session_id.into(),
            status: AnalysisStatus::Running,
            agents: agents
                .iter()
                .map(|&agent| AgentProgress {
                    agent,
                    phase: AnalysisPhase::Initializing,
                    percent: AnalysisPhase::Initializing.baseline_percent(),
                    last_update: started_at,
                })
                .collect(),
            started_at,
            estimated_completion: None,
        }
    }

    /// Advance one agent's phase, ignoring the hint if it would move
    /// progress backwards.
    pub fn advance(&mut self, agent: CliAgent, phase: AnalysisPhase, at: DateTime<Utc>) {
        if let Some(p) = self.agents.iter_mut().find(|p| p.agent == agent) {
            if phase > p.phase {
                p.phase = phase;
                p.percent = phase.baseline_percent();
            }
            p.last_update = at;
        }
        if self.agents.iter().all(|p| p.phase == AnalysisPhase::Complete) {
            self.status = AnalysisStatus::Complete;
        }
    }

    pub fn overall_percent(&self) -> u8 {
        if self.agents.is_empty() {
            return 0;
        }
        let sum: u32 = self.agents.iter().map(|p| p.percent as u32).sum();
        (sum / self.agents.len() as u32) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_ignores_backwards_phase_hints() {
        let now = Utc::now();
        let mut state = AnalysisState::new("s1", &[CliAgent::Claude], now);
        state.advance(CliAgent::Claude, AnalysisPhase::Analyzing, now);
        state.advance(CliAgent::Claude, AnalysisPhase::CollectingData, now);
        assert_eq!(state.agents[0].phase, AnalysisPhase::Analyzing);
    }

    #[test]
    fn status_completes_when_all_agents_complete() {
        let now = Utc::now();
        let mut state = AnalysisState::new("s1", &[CliAgent::Claude, CliAgent::Codex], now);
        state.advance(CliAgent::Claude, AnalysisPhase::Complete, now);
        assert_eq!(state.status, AnalysisStatus::Running);
        state.advance(CliAgent::Codex, AnalysisPhase::Complete, now);
        assert_eq!(state.status, AnalysisStatus::Complete);
    }

    #[test]
    fn overall_percent_averages_agents() {
        let now = Utc::now();
        let mut state = AnalysisState::new("s1", &[CliAgent::Claude, CliAgent::Codex], now);
        state.advance(CliAgent::Claude, AnalysisPhase::Complete, now);
        assert!(state.overall_percent() > AnalysisPhase::Initializing.baseline_percent());
    }
}
