//! Session Channel Manager — owns the `sessionId → Session` map, feeding
//! classified events through the Intelligent Buffer to subscribers and
//! driving per-session [`AnalysisState`] (spec §4.6).

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use brutalist_types::{AnalysisState, AnalysisStatus, CliAgent, ContentType, EventBatch, EventType, StreamingEvent};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::buffer::{IntelligentBuffer, PushOutcome};
use crate::progress::{default_milestones, ProgressTracker};

/// Per-session subscriber cap (spec §4.6).
pub const MAX_SUBSCRIBERS_PER_SESSION: usize = 5;

/// Default time-to-live before the maintenance sweep reclaims an idle
/// session.
pub const DEFAULT_SESSION_TTL: chrono::Duration = chrono::Duration::minutes(30);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} already exists")]
    DuplicateId(String),
    #[error("session {0} not found")]
    NotFound(String),
    #[error("session {0} has reached its subscriber cap")]
    SubscriberCapReached(String),
}

/// Bookkeeping the spec asks the Session Channel Manager to maintain beyond
/// the shared [`AnalysisState`] snapshot: which agents are in which set, and
/// the running findings/errors tallies (spec §4.6 "Updating analysis
/// state from events").
#[derive(Debug, Default)]
pub struct SessionBookkeeping {
    pub active_agents: HashSet<CliAgent>,
    pub completed_agents: HashSet<CliAgent>,
    pub failed_agents: HashSet<CliAgent>,
    pub errors_count: u32,
    pub findings: Vec<String>,
}

pub struct Session {
    pub id: String,
    pub buffer: IntelligentBuffer,
    pub tracker: ProgressTracker,
    pub analysis: AnalysisState,
    pub bookkeeping: SessionBookkeeping,
    pub last_activity: DateTime<Utc>,
    pub failed: bool,
    subscribers: Vec<(String, mpsc::UnboundedSender<EventBatch>)>,
}

impl Session {
    fn new(id: String, agents: &[CliAgent], now: DateTime<Utc>) -> Self {
        Session {
            id: id.clone(),
            buffer: IntelligentBuffer::new(id),
            tracker: ProgressTracker::new(default_milestones()),
            analysis: AnalysisState::new(String::new(), agents, now),
            bookkeeping: SessionBookkeeping::default(),
            last_activity: now,
            failed: false,
            subscribers: Vec::new(),
        }
    }
}

pub struct SessionChannelManager {
    sessions: HashMap<String, Session>,
}

impl SessionChannelManager {
    pub fn new() -> Self {
        SessionChannelManager {
            sessions: HashMap::new(),
        }
    }

    pub fn create_session(
        &mut self,
        id: Option<String>,
        agents: &[CliAgent],
        now: DateTime<Utc>,
    ) -> Result<String, SessionError> {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.sessions.contains_key(&id) {
            return Err(SessionError::DuplicateId(id));
        }
        self.sessions.insert(id.clone(), Session::new(id.clone(), agents, now));
        Ok(id)
    }

    pub fn get_session(&mut self, id: &str, require_active: bool, now: DateTime<Utc>) -> Option<&Session> {
        let session = self.sessions.get_mut(id)?;
        if require_active && session.failed {
            return None;
        }
        session.last_activity = now;
        Some(&*session)
    }

    pub fn get_session_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    /// Subscribe, replaying the backlog ahead of live events. Returns
    /// `None` if the session doesn't exist, and an error if the cap is
    /// reached.
    pub fn subscribe(
        &mut self,
        id: &str,
        subscriber_id: impl Into<String>,
    ) -> Result<mpsc::UnboundedReceiver<EventBatch>, SessionError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        if session.subscribers.len() >= MAX_SUBSCRIBERS_PER_SESSION {
            return Err(SessionError::SubscriberCapReached(id.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let backlog: Vec<StreamingEvent> = session.buffer.backlog().cloned().collect();
        if !backlog.is_empty() {
            let _ = tx.send(EventBatch {
                session_id: id.to_string(),
                events: backlog,
                priority: brutalist_types::Priority::Normal,
                batch_id: Uuid::new_v4().to_string(),
                created_at: Utc::now(),
            });
        }
        session.subscribers.push((subscriber_id.into(), tx));
        Ok(rx)
    }

    pub fn unsubscribe(&mut self, id: &str, subscriber_id: &str) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.subscribers.retain(|(sid, _)| sid != subscriber_id);
        }
    }

    /// Feed a classified event through bookkeeping + the Intelligent
    /// Buffer, fanning out any produced batches to all subscribers.
    pub fn emit_to_session(
        &mut self,
        id: &str,
        event: StreamingEvent,
        now_instant: Instant,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.last_activity = now;

        match event.event_type {
            EventType::AgentStart => {
                session.bookkeeping.active_agents.insert(event.agent);
            }
            EventType::AgentComplete => {
                session.bookkeeping.active_agents.remove(&event.agent);
                session.bookkeeping.completed_agents.insert(event.agent);
            }
            EventType::AgentError => {
                session.bookkeeping.active_agents.remove(&event.agent);
                session.bookkeeping.failed_agents.insert(event.agent);
                session.bookkeeping.errors_count += 1;
            }
            EventType::AgentProgress => {}
        }

        if event.metadata.content_type == Some(ContentType::Finding) {
            session.bookkeeping.findings.push(event.content.clone());
        }

        if let Some(phase) = event.metadata.phase {
            session.analysis.advance(event.agent, phase.as_analysis_phase(), now);
        }
        session.tracker.observe(&event.content);

        let outcome = session.buffer.push(event, now_instant);
        if let PushOutcome::Flushed(batches) = outcome {
            deliver(session, batches);
        }
        Ok(())
    }

    /// Drain any buffers whose delay timers have elapsed, across all
    /// sessions (called periodically by the SSE/maintenance loop).
    pub fn tick_all(&mut self, now_instant: Instant) {
        for session in self.sessions.values_mut() {
            let batches = session.buffer.tick(now_instant);
            if !batches.is_empty() {
                deliver(session, batches);
            }
        }
    }

    pub fn start_analysis(&mut self, id: &str) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.analysis.status = AnalysisStatus::Running;
        Ok(())
    }

    pub fn complete_analysis(&mut self, id: &str) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.analysis.status = AnalysisStatus::Complete;
        session.tracker.mark_complete();
        Ok(())
    }

    pub fn fail_analysis(&mut self, id: &str) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.analysis.status = AnalysisStatus::Failed;
        session.failed = true;
        session.tracker.mark_error();
        Ok(())
    }

    pub fn destroy_session(&mut self, id: &str) {
        self.sessions.remove(id);
    }

    /// Periodic TTL sweep (spec §4.6: "periodic sweep (5 min) destroys
    /// sessions whose lastActivity is older than TTL").
    pub fn sweep_expired(&mut self, now: DateTime<Utc>, ttl: chrono::Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, s)| now.signed_duration_since(s.last_activity) > ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.sessions.remove(id);
        }
        expired
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver(session: &mut Session, batches: Vec<EventBatch>) {
    for batch in batches {
        session.subscribers.retain(|(_, tx)| tx.send(batch.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brutalist_types::{CliAgent, EventMetadata};

    fn progress_event(session_id: &str) -> StreamingEvent {
        StreamingEvent {
            event_type: EventType::AgentProgress,
            agent: CliAgent::Claude,
            content: "Analyzing the codebase".to_string(),
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            metadata: EventMetadata::default(),
        }
    }

    #[test]
    fn create_session_rejects_duplicate_id() {
        let mut mgr = SessionChannelManager::new();
        let now = Utc::now();
        mgr.create_session(Some("s1".into()), &[CliAgent::Claude], now).unwrap();
        assert_eq!(
            mgr.create_session(Some("s1".into()), &[CliAgent::Claude], now),
            Err(SessionError::DuplicateId("s1".into()))
        );
    }

    #[test]
    fn subscribe_enforces_cap() {
        let mut mgr = SessionChannelManager::new();
        let now = Utc::now();
        mgr.create_session(Some("s1".into()), &[CliAgent::Claude], now).unwrap();
        for i in 0..MAX_SUBSCRIBERS_PER_SESSION {
            assert!(mgr.subscribe("s1", format!("sub{i}")).is_ok());
        }
        assert_eq!(
            mgr.subscribe("s1", "overflow"),
            Err(SessionError::SubscriberCapReached("s1".into()))
        );
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let mut mgr = SessionChannelManager::new();
        let now = Utc::now();
        mgr.create_session(Some("s1".into()), &[CliAgent::Claude], now).unwrap();
        mgr.subscribe("s1", "sub0").unwrap();
        mgr.unsubscribe("s1", "sub0");
        mgr.unsubscribe("s1", "sub0");
    }

    #[tokio::test]
    async fn emit_delivers_immediate_flush_to_subscribers() {
        let mut mgr = SessionChannelManager::new();
        let now = Utc::now();
        mgr.create_session(Some("s1".into()), &[CliAgent::Claude], now).unwrap();
        let mut rx = mgr.subscribe("s1", "sub0").unwrap();

        let mut event = progress_event("s1");
        event.event_type = EventType::AgentError;
        mgr.emit_to_session("s1", event, Instant::now(), now).unwrap();

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.events.len(), 1);
    }

    #[test]
    fn emit_updates_bookkeeping_sets() {
        let mut mgr = SessionChannelManager::new();
        let now = Utc::now();
        mgr.create_session(Some("s1".into()), &[CliAgent::Claude], now).unwrap();

        let mut start = progress_event("s1");
        start.event_type = EventType::AgentStart;
        mgr.emit_to_session("s1", start, Instant::now(), now).unwrap();

        let session = mgr.get_session_mut("s1").unwrap();
        assert!(session.bookkeeping.active_agents.contains(&CliAgent::Claude));
    }

    #[test]
    fn sweep_removes_expired_sessions() {
        let mut mgr = SessionChannelManager::new();
        let now = Utc::now();
        mgr.create_session(Some("s1".into()), &[CliAgent::Claude], now).unwrap();
        let later = now + chrono::Duration::hours(1);
        let expired = mgr.sweep_expired(later, DEFAULT_SESSION_TTL);
        assert_eq!(expired, vec!["s1".to_string()]);
        assert_eq!(mgr.session_count(), 0);
    }

    #[test]
    fn get_session_returns_none_for_failed_when_requiring_active() {
        let mut mgr = SessionChannelManager::new();
        let now = Utc::now();
        mgr.create_session(Some("s1".into()), &[CliAgent::Claude], now).unwrap();
        mgr.fail_analysis("s1").unwrap();
        assert!(mgr.get_session("s1", true, now).is_none());
        assert!(mgr.get_session("s1", false, now).is_some());
    }
}
