//! Intelligent Buffer — per-session priority queue with coalescing,
//! a circular backlog, and memory-based backpressure (spec §4.4).

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use brutalist_types::{ContentType, EventBatch, EventType, Priority, Severity, StreamingEvent};
use uuid::Uuid;

/// Default circular backlog size per session.
pub const DEFAULT_BACKLOG_SIZE: usize = 500;

/// Memory threshold that flips backpressure on.
pub const BACKPRESSURE_THRESHOLD_BYTES: usize = 50 * 1024 * 1024;

/// Crude per-event memory estimate used for the backpressure counter.
const BYTES_PER_EVENT: usize = 500;

/// How long low-priority inserts are rejected once backpressure trips.
const LOW_PRIORITY_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleClass {
    CriticalFinding,
    SecurityFinding,
    Finding,
    AgentProgress,
    AgentError,
    AgentComplete,
    DebugInfo,
    Milestone,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferingRule {
    pub delay_ms: u64,
    pub max_batch: usize,
    pub coalesce: bool,
    pub priority: Priority,
}

/// The content-class → buffering-rule table (spec §4.4).
///
/// The spec keys `critical_finding` / `security_finding` off a severity
/// judgment that in this implementation is carried on `StreamingEvent`
/// findings: `Critical` maps to `critical_finding`, `High` to
/// `security_finding` (the closest analogue this parser surfaces — there is
/// no separate "is this a security domain" signal at this layer).
pub fn rule_for(class: RuleClass) -> BufferingRule {
    match class {
        RuleClass::CriticalFinding => BufferingRule {
            delay_ms: 0,
            max_batch: 1,
            coalesce: false,
            priority: Priority::Immediate,
        },
        RuleClass::SecurityFinding => BufferingRule {
            delay_ms: 50,
            max_batch: 2,
            coalesce: false,
            priority: Priority::High,
        },
        RuleClass::Finding => BufferingRule {
            delay_ms: 200,
            max_batch: 5,
            coalesce: true,
            priority: Priority::Normal,
        },
        RuleClass::AgentProgress => BufferingRule {
            delay_ms: 200,
            max_batch: 10,
            coalesce: true,
            priority: Priority::Normal,
        },
        RuleClass::AgentError => BufferingRule {
            delay_ms: 0,
            max_batch: 1,
            coalesce: false,
            priority: Priority::Immediate,
        },
        RuleClass::AgentComplete => BufferingRule {
            delay_ms: 100,
            max_batch: 1,
            coalesce: false,
            priority: Priority::High,
        },
        RuleClass::DebugInfo => BufferingRule {
            delay_ms: 1000,
            max_batch: 20,
            coalesce: true,
            priority: Priority::Low,
        },
        RuleClass::Milestone => BufferingRule {
            delay_ms: 150,
            max_batch: 3,
            coalesce: false,
            priority: Priority::High,
        },
    }
}

pub fn classify(event: &StreamingEvent) -> RuleClass {
    match event.event_type {
        EventType::AgentError => RuleClass::AgentError,
        EventType::AgentComplete => RuleClass::AgentComplete,
        _ => match event.metadata.content_type {
            Some(ContentType::Finding) => match event.metadata.severity {
                Some(Severity::Critical) => RuleClass::CriticalFinding,
                Some(Severity::High) => RuleClass::SecurityFinding,
                _ => RuleClass::Finding,
            },
            Some(ContentType::Milestone) => RuleClass::Milestone,
            Some(ContentType::Debug) => RuleClass::DebugInfo,
            _ => RuleClass::AgentProgress,
        },
    }
}

struct PendingGroup {
    events: Vec<StreamingEvent>,
    queued_at: Instant,
}

pub struct IntelligentBuffer {
    session_id: String,
    groups: HashMap<RuleClass, PendingGroup>,
    backlog: VecDeque<StreamingEvent>,
    backlog_cap: usize,
    memory_bytes: usize,
    backpressure: bool,
    low_priority_blocked_until: Option<Instant>,
}

#[derive(Debug)]
pub enum PushOutcome {
    Buffered,
    Flushed(Vec<EventBatch>),
    Rejected,
}

impl IntelligentBuffer {
    pub fn new(session_id: impl Into<String>) -> Self {
        IntelligentBuffer {
            session_id: session_id.into(),
            groups: HashMap::new(),
            backlog: VecDeque::with_capacity(DEFAULT_BACKLOG_SIZE),
            backlog_cap: DEFAULT_BACKLOG_SIZE,
            memory_bytes: 0,
            backpressure: false,
            low_priority_blocked_until: None,
        }
    }

    pub fn backlog(&self) -> impl Iterator<Item = &StreamingEvent> {
        self.backlog.iter()
    }

    pub fn is_backpressured(&self) -> bool {
        self.backpressure
    }

    /// Insert an event, returning whatever batches its arrival immediately
    /// triggers (immediate-priority flush, or this class hitting its
    /// `maxBatch`).
    pub fn push(&mut self, event: StreamingEvent, now: Instant) -> PushOutcome {
        let class = classify(&event);
        let rule = rule_for(class);

        if rule.priority == Priority::Low {
            if let Some(blocked_until) = self.low_priority_blocked_until {
                if now < blocked_until {
                    return PushOutcome::Rejected;
                }
                self.low_priority_blocked_until = None;
            }
        }

        self.push_to_backlog(event.clone());
        self.memory_bytes += BYTES_PER_EVENT;

        let mut flushed = Vec::new();

        if self.memory_bytes > BACKPRESSURE_THRESHOLD_BYTES && !self.backpressure {
            self.backpressure = true;
            self.low_priority_blocked_until = Some(now + LOW_PRIORITY_BACKOFF);
            if let Some(batch) = self.force_flush_class(RuleClass::DebugInfo, now) {
                flushed.push(batch);
            }
        }

        let group = self.groups.entry(class).or_insert_with(|| PendingGroup {
            events: Vec::new(),
            queued_at: now,
        });
        group.events.push(event);

        if rule.priority == Priority::Immediate || group.events.len() >= rule.max_batch {
            if let Some(batch) = self.force_flush_class(class, now) {
                flushed.push(batch);
            }
        }

        if flushed.is_empty() {
            PushOutcome::Buffered
        } else {
            PushOutcome::Flushed(flushed)
        }
    }

    /// Drain any group whose delay timer has elapsed as of `now`.
    pub fn tick(&mut self, now: Instant) -> Vec<EventBatch> {
        let due: Vec<RuleClass> = self
            .groups
            .iter()
            .filter(|(class, group)| {
                let rule = rule_for(**class);
                now.duration_since(group.queued_at) >= Duration::from_millis(rule.delay_ms)
            })
            .map(|(class, _)| *class)
            .collect();

        due.into_iter()
            .filter_map(|class| self.force_flush_class(class, now))
            .collect()
    }

    fn force_flush_class(&mut self, class: RuleClass, now: Instant) -> Option<EventBatch> {
        let group = self.groups.remove(&class)?;
        if group.events.is_empty() {
            return None;
        }
        self.memory_bytes = self
            .memory_bytes
            .saturating_sub(group.events.len() * BYTES_PER_EVENT);
        let rule = rule_for(class);
        let events = if rule.coalesce {
            coalesce(group.events)
        } else {
            group.events
        };
        Some(EventBatch {
            session_id: self.session_id.clone(),
            events,
            priority: rule.priority,
            batch_id: Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now(),
        })
    }

    fn push_to_backlog(&mut self, event: StreamingEvent) {
        if self.backlog.len() >= self.backlog_cap {
            self.backlog.pop_front();
            self.memory_bytes = self.memory_bytes.saturating_sub(BYTES_PER_EVENT);
        }
        self.backlog.push_back(event);
    }
}

/// Merge events sharing a coalesce key into one representative event per
/// key (spec §4.4 "Coalescence").
fn coalesce(events: Vec<StreamingEvent>) -> Vec<StreamingEvent> {
    let mut groups: Vec<(
        (brutalist_types::CliAgent, brutalist_types::streaming_event::EventTypeDiscriminant, Option<ContentType>),
        Vec<StreamingEvent>,
    )> = Vec::new();

    for event in events {
        let key = event.coalesce_key();
        if let Some((_, bucket)) = groups.iter_mut().find(|(k, _)| *k == key) {
            bucket.push(event);
        } else {
            groups.push((key, vec![event]));
        }
    }

    groups
        .into_iter()
        .map(|(_, bucket)| merge_group(bucket))
        .collect()
}

fn merge_group(mut bucket: Vec<StreamingEvent>) -> StreamingEvent {
    if bucket.len() == 1 {
        return bucket.pop().unwrap();
    }

    let n = bucket.len();
    let first = bucket.first().unwrap().clone();
    let last = bucket.last().unwrap().clone();
    let timespan_ms = (last.timestamp - first.timestamp).num_milliseconds().max(0) as u64;

    let content = if n <= 3 {
        bucket
            .iter()
            .map(|e| e.content.as_str())
            .collect::<Vec<_>>()
            .join(" | ")
    } else {
        format!(
            "{} … [{} similar events] … {}",
            first.content,
            n - 2,
            last.content
        )
    };

    let mut merged = last;
    merged.content = content;
    merged.metadata.coalesced_count = Some(n as u32);
    merged.metadata.timespan_ms = Some(timespan_ms);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use brutalist_types::{CliAgent, EventMetadata};
    use chrono::Utc;

    fn event(event_type: EventType, content_type: Option<ContentType>, severity: Option<Severity>) -> StreamingEvent {
        StreamingEvent {
            event_type,
            agent: CliAgent::Claude,
            content: "x".to_string(),
            timestamp: Utc::now(),
            session_id: "s1".to_string(),
            metadata: EventMetadata {
                content_type,
                severity,
                ..EventMetadata::default()
            },
        }
    }

    #[test]
    fn critical_finding_flushes_immediately() {
        let mut buf = IntelligentBuffer::new("s1");
        let ev = event(EventType::AgentProgress, Some(ContentType::Finding), Some(Severity::Critical));
        match buf.push(ev, Instant::now()) {
            PushOutcome::Flushed(batches) => assert_eq!(batches.len(), 1),
            other => panic!("expected immediate flush, got {other:?}"),
        }
    }

    #[test]
    fn finding_batches_wait_for_max_batch_or_timer() {
        let mut buf = IntelligentBuffer::new("s1");
        let now = Instant::now();
        for _ in 0..4 {
            let ev = event(EventType::AgentProgress, Some(ContentType::Finding), Some(Severity::Medium));
            assert!(matches!(buf.push(ev, now), PushOutcome::Buffered));
        }
        let ev = event(EventType::AgentProgress, Some(ContentType::Finding), Some(Severity::Medium));
        match buf.push(ev, now) {
            PushOutcome::Flushed(batches) => assert_eq!(batches[0].events.len(), 5),
            other => panic!("expected maxBatch flush, got {other:?}"),
        }
    }

    #[test]
    fn tick_flushes_expired_delay_timers() {
        let mut buf = IntelligentBuffer::new("s1");
        let now = Instant::now();
        let ev = event(EventType::AgentProgress, None, None);
        buf.push(ev, now);
        assert!(buf.tick(now).is_empty());
        let later = now + Duration::from_millis(250);
        assert_eq!(buf.tick(later).len(), 1);
    }

    #[test]
    fn coalescing_merges_same_key_events() {
        let events = vec![
            event(EventType::AgentProgress, Some(ContentType::Progress), None),
            event(EventType::AgentProgress, Some(ContentType::Progress), None),
        ];
        let merged = coalesce(events);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].metadata.coalesced_count, Some(2));
    }

    #[test]
    fn coalescing_elides_large_groups() {
        let mut events = Vec::new();
        for i in 0..6 {
            let mut e = event(EventType::AgentProgress, Some(ContentType::Progress), None);
            e.content = format!("event-{i}");
            events.push(e);
        }
        let merged = coalesce(events);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].content.contains("similar events"));
    }

    #[test]
    fn memory_bytes_stays_bounded_under_sustained_load() {
        // Regression test: memory_bytes must track live queued+backlog
        // content, not a lifetime event counter. Pushing far more than the
        // backpressure threshold's event-equivalent must not permanently
        // trip backpressure once flushes and backlog eviction are both
        // decrementing correctly.
        let mut buf = IntelligentBuffer::new("s1");
        let now = Instant::now();
        let pushes = BACKPRESSURE_THRESHOLD_BYTES / BYTES_PER_EVENT + 1;
        for _ in 0..pushes {
            let ev = event(EventType::AgentProgress, Some(ContentType::Debug), None);
            buf.push(ev, now);
        }
        assert!(
            buf.memory_bytes <= DEFAULT_BACKLOG_SIZE * BYTES_PER_EVENT,
            "memory_bytes grew to {} bytes, expected it bounded by backlog capacity",
            buf.memory_bytes
        );
        assert!(!buf.is_backpressured());
    }

    #[test]
    fn force_flush_decrements_memory_bytes_for_flushed_events() {
        let mut buf = IntelligentBuffer::new("s1");
        let now = Instant::now();
        for _ in 0..3 {
            let ev = event(EventType::AgentProgress, Some(ContentType::Milestone), None);
            buf.push(ev, now);
        }
        // Milestone's maxBatch is 3, so the third push flushes the group.
        assert_eq!(buf.memory_bytes, 0);
    }

    #[test]
    fn backlog_eviction_decrements_memory_bytes() {
        let mut buf = IntelligentBuffer::new("s1");
        let now = Instant::now();
        for _ in 0..DEFAULT_BACKLOG_SIZE {
            let ev = event(EventType::AgentProgress, Some(ContentType::Progress), None);
            buf.push(ev, now);
        }
        let before = buf.memory_bytes;
        let ev = event(EventType::AgentProgress, Some(ContentType::Progress), None);
        buf.push(ev, now);
        // Backlog was already at capacity, so this push evicted one entry in
        // addition to adding one — net change in the backlog's contribution
        // is zero.
        assert_eq!(buf.memory_bytes, before);
    }

    #[test]
    fn backlog_overwrites_oldest_on_overflow() {
        let mut buf = IntelligentBuffer::new("s1");
        let now = Instant::now();
        for i in 0..(DEFAULT_BACKLOG_SIZE + 10) {
            let mut ev = event(EventType::AgentProgress, Some(ContentType::Progress), None);
            ev.content = format!("e{i}");
            buf.push(ev, now);
        }
        assert_eq!(buf.backlog().count(), DEFAULT_BACKLOG_SIZE);
        assert_eq!(buf.backlog().next().unwrap().content, "e10");
    }
}
