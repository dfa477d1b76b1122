use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::CliAgent;

/// Phase of the per-agent semantic parser's state machine (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserPhase {
    Starting,
    Thinking,
    Analyzing,
    Outputting,
    Complete,
}

impl ParserPhase {
    /// Map onto the coarser session-level analysis phase (spec §4.5) used to
    /// advance `AnalysisState.progress` from a streamed hint.
    pub fn as_analysis_phase(&self) -> crate::analysis_state::AnalysisPhase {
        use crate::analysis_state::AnalysisPhase as AP;
        match self {
            ParserPhase::Starting => AP::Initializing,
            ParserPhase::Thinking => AP::CollectingData,
            ParserPhase::Analyzing => AP::Analyzing,
            ParserPhase::Outputting => AP::ProcessingResults,
            ParserPhase::Complete => AP::Complete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Finding,
    Progress,
    Debug,
    Error,
    Milestone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentStart,
    AgentProgress,
    AgentComplete,
    AgentError,
}

/// Classification metadata attached to a segmented chunk of CLI output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub phase: Option<ParserPhase>,
    pub severity: Option<Severity>,
    pub content_type: Option<ContentType>,
    /// Confidence in [0, 1] used for downstream filtering (e.g. dropping
    /// low-confidence debug events).
    pub confidence: f32,
    /// Set on events produced by coalescing near-duplicates (spec §4.4).
    pub coalesced_count: Option<u32>,
    pub timespan_ms: Option<u64>,
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self {
            phase: None,
            severity: None,
            content_type: None,
            confidence: 1.0,
            coalesced_count: None,
            timespan_ms: None,
        }
    }
}

/// A single classified unit of streamed output (spec §3 `StreamingEvent`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingEvent {
    pub event_type: EventType,
    pub agent: CliAgent,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub metadata: EventMetadata,
}

impl StreamingEvent {
    pub fn new(
        event_type: EventType,
        agent: CliAgent,
        content: impl Into<String>,
        session_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            agent,
            content: content.into(),
            timestamp,
            session_id: session_id.into(),
            metadata: EventMetadata::default(),
        }
    }

    /// Coalescence key: events with the same (agent, type, contentType)
    /// merge into one within a single flush (spec §4.4).
    pub fn coalesce_key(&self) -> (CliAgent, EventTypeDiscriminant, Option<ContentType>) {
        (self.agent, EventTypeDiscriminant::from(self.event_type), self.metadata.content_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTypeDiscriminant {
    AgentStart,
    AgentProgress,
    AgentComplete,
    AgentError,
}

impl From<EventType> for EventTypeDiscriminant {
    fn from(t: EventType) -> Self {
        match t {
            EventType::AgentStart => Self::AgentStart,
            EventType::AgentProgress => Self::AgentProgress,
            EventType::AgentComplete => Self::AgentComplete,
            EventType::AgentError => Self::AgentError,
        }
    }
}

/// Priority class assigned to a [`StreamingEvent`] by a `BufferingRule`
/// (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Normal,
    High,
    Immediate,
}

/// A flushed, possibly-coalesced group of events delivered together (spec §3
/// `EventBatch`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBatch {
    pub session_id: String,
    pub events: Vec<StreamingEvent>,
    pub priority: Priority,
    pub batch_id: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parser_phase_maps_monotonically_to_analysis_phase() {
        use crate::analysis_state::AnalysisPhase;
        assert_eq!(
            ParserPhase::Starting.as_analysis_phase(),
            AnalysisPhase::Initializing
        );
        assert_eq!(
            ParserPhase::Complete.as_analysis_phase(),
            AnalysisPhase::Complete
        );
    }

    #[test]
    fn coalesce_key_groups_by_agent_type_and_content_type() {
        let now = Utc::now();
        let mut e1 = StreamingEvent::new(EventType::AgentProgress, CliAgent::Claude, "a", "s", now);
        e1.metadata.content_type = Some(ContentType::Finding);
        let mut e2 = StreamingEvent::new(EventType::AgentProgress, CliAgent::Claude, "b", "s", now);
        e2.metadata.content_type = Some(ContentType::Finding);
        assert_eq!(e1.coalesce_key(), e2.coalesce_key());
    }

    #[test]
    fn priority_ordering_places_immediate_highest() {
        assert!(Priority::Immediate > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }
}
