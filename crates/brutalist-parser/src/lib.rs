//! Per-agent stateful streaming tokenizer (spec §4.3).
//!
//! Raw stdout/stderr chunks come in; classified [`StreamingEvent`]s come out.
//! Each [`CliAgent`] gets its own preprocessing pass (stripping thinking
//! blocks, unwrapping SSE/NDJSON envelopes) ahead of a shared segmentation
//! and classification pipeline.

use brutalist_types::{CliAgent, ContentType, EventMetadata, EventType, ParserPhase, Severity, StreamingEvent};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Trailing incomplete fragment is held until it completes or this cap is
/// hit, at which point it is force-flushed (spec §4.3 boundary detection).
const MAX_TRAILING_BUFFER: usize = 8 * 1024;

const LOW_CONFIDENCE_THRESHOLD: f32 = 0.5;

static THINKING_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<thinking>.*?</thinking>").unwrap());
static GEMINI_THINKING: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[THINKING:[^\]]*\]").unwrap());
static SENTENCE_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?][ \t]+(?=[A-Z])").unwrap());

static PHASE_THINKING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(thinking|considering|let me)\b").unwrap());
static PHASE_ANALYZING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(analyzing|examining|inspecting)\b").unwrap());
static PHASE_OUTPUTTING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(found|result|conclusion)\b").unwrap());
static PHASE_COMPLETE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(complete|done|finished)\b").unwrap());

static ERROR_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(error|exception|failed|failure)\b").unwrap());
static FINDING_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(issue|bug|vulnerability|problem|smell|anti-pattern)\b").unwrap());
static MILESTONE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(milestone|stage \d+|phase \d+)\b").unwrap());

static SEVERITY_CRITICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(critical|severe|catastrophic)\b").unwrap());
static SEVERITY_HIGH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(high|serious|major)\b").unwrap());
static SEVERITY_MEDIUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(medium|moderate)\b").unwrap());
static SEVERITY_LOW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(minor|low|trivial)\b").unwrap());

/// Stateful parser owned per (session, agent) pair.
pub struct AgentParser {
    agent: CliAgent,
    session_id: String,
    phase: ParserPhase,
    buffer: String,
}

impl AgentParser {
    pub fn new(agent: CliAgent, session_id: impl Into<String>) -> Self {
        AgentParser {
            agent,
            session_id: session_id.into(),
            phase: ParserPhase::Starting,
            buffer: String::new(),
        }
    }

    pub fn phase(&self) -> ParserPhase {
        self.phase
    }

    /// Feed a raw chunk, returning every fully segmented and classified
    /// event that chunk completed. Partial trailing text is retained.
    pub fn feed(&mut self, raw: &str) -> Vec<StreamingEvent> {
        let preprocessed = preprocess(self.agent, raw);
        self.buffer.push_str(&preprocessed);

        let mut events = Vec::new();
        while let Some((segment, rest)) = take_next_segment(&self.buffer) {
            self.buffer = rest;
            if let Some(event) = self.classify(&segment) {
                events.push(event);
            }
        }

        if self.buffer.len() > MAX_TRAILING_BUFFER {
            warn!(
                agent = %self.agent,
                session_id = %self.session_id,
                bytes = self.buffer.len(),
                "parser trailing buffer exceeded cap, force-flushing"
            );
            let overflowed = std::mem::take(&mut self.buffer);
            if let Some(event) = self.classify_forced(&overflowed) {
                events.push(event);
            }
        }

        events
    }

    /// Force-flush any remaining partial segment (e.g. on process exit).
    pub fn flush(&mut self) -> Vec<StreamingEvent> {
        let remaining = std::mem::take(&mut self.buffer);
        if remaining.trim().is_empty() {
            return Vec::new();
        }
        self.classify_forced(&remaining).into_iter().collect()
    }

    fn classify(&mut self, segment: &str) -> Option<StreamingEvent> {
        self.classify_inner(segment, false)
    }

    /// Classify, but never drop for low confidence — used for explicit
    /// buffer-overflow and final flushes, which must surface *something*.
    fn classify_forced(&mut self, segment: &str) -> Option<StreamingEvent> {
        self.classify_inner(segment, true)
    }

    fn classify_inner(&mut self, segment: &str, force: bool) -> Option<StreamingEvent> {
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            return None;
        }

        self.advance_phase(trimmed);

        let (content_type, severity, confidence) = classify_content(trimmed);

        if !force && content_type == ContentType::Debug && confidence < LOW_CONFIDENCE_THRESHOLD {
            return None;
        }

        let event_type = match content_type {
            ContentType::Error => EventType::AgentError,
            _ if self.phase == ParserPhase::Complete => EventType::AgentComplete,
            _ => EventType::AgentProgress,
        };

        let mut event = StreamingEvent::new(
            event_type,
            self.agent,
            trimmed.to_string(),
            self.session_id.clone(),
            Utc::now(),
        );
        event.metadata.phase = Some(self.phase);
        event.metadata.content_type = Some(content_type);
        event.metadata.severity = severity;
        event.metadata.confidence = confidence;
        Some(event)
    }

    fn advance_phase(&mut self, text: &str) {
        let candidate = if PHASE_COMPLETE.is_match(text) {
            ParserPhase::Complete
        } else if PHASE_OUTPUTTING.is_match(text) {
            ParserPhase::Outputting
        } else if PHASE_ANALYZING.is_match(text) {
            ParserPhase::Analyzing
        } else if PHASE_THINKING.is_match(text) {
            ParserPhase::Thinking
        } else {
            return;
        };
        if candidate > self.phase {
            self.phase = candidate;
        }
    }
}

/// Per-agent preprocessing ahead of shared segmentation (spec §4.3
/// "Per-agent specializations").
fn preprocess(agent: CliAgent, raw: &str) -> String {
    match agent {
        CliAgent::Claude => {
            let stripped = THINKING_BLOCK.replace_all(raw, "");
            let mut out = String::new();
            for line in stripped.lines() {
                if let Some(rest) = line.strip_prefix("data: ") {
                    if let Ok(value) = serde_json::from_str::<serde_json::Value>(rest) {
                        if let Some(content) = value.get("content").and_then(|v| v.as_str()) {
                            out.push_str(content);
                            out.push('\n');
                            continue;
                        }
                    }
                }
                out.push_str(line);
                out.push('\n');
            }
            out
        }
        CliAgent::Codex => {
            let mut out = String::new();
            for line in raw.lines() {
                if line.trim().is_empty() {
                    out.push('\n');
                    continue;
                }
                match serde_json::from_str::<serde_json::Value>(line) {
                    Ok(value) if value.get("type").and_then(|v| v.as_str()) == Some("assistant") => {
                        if let Some(content) = value.get("content").and_then(|v| v.as_str()) {
                            out.push_str(content);
                            out.push('\n');
                        }
                    }
                    Ok(_) => {}
                    Err(_) => {
                        out.push_str(line);
                        out.push('\n');
                    }
                }
            }
            out
        }
        CliAgent::Gemini => GEMINI_THINKING.replace_all(raw, "").into_owned(),
    }
}

/// Pull the next complete segment off the front of `buffer`, in priority
/// order: fenced code blocks stay intact; otherwise split at the first
/// paragraph or sentence boundary. Returns `None` when no boundary has
/// arrived yet.
fn take_next_segment(buffer: &str) -> Option<(String, String)> {
    if let Some(fence_start) = buffer.find("```") {
        if let Some(fence_end) = buffer[fence_start + 3..].find("```") {
            let end = fence_start + 3 + fence_end + 3;
            // Extend to the next paragraph/sentence boundary after the fence
            // so the code block is never split mid-block.
            let rest = &buffer[end..];
            let boundary = paragraph_or_sentence_boundary(rest).unwrap_or(rest.len());
            let split_at = end + boundary;
            return Some((
                buffer[..split_at].to_string(),
                buffer[split_at..].to_string(),
            ));
        }
        // Unterminated fence: wait for more input.
        return None;
    }

    paragraph_or_sentence_boundary(buffer).map(|at| (buffer[..at].to_string(), buffer[at..].to_string()))
}

fn paragraph_or_sentence_boundary(text: &str) -> Option<usize> {
    if let Some(pos) = text.find("\n\n") {
        return Some(pos + 2);
    }
    SENTENCE_BOUNDARY.find(text).map(|m| m.end())
}

fn classify_content(text: &str) -> (ContentType, Option<Severity>, f32) {
    if ERROR_MARKER.is_match(text) {
        return (ContentType::Error, Some(Severity::High), 0.9);
    }
    if MILESTONE_MARKER.is_match(text) {
        return (ContentType::Milestone, None, 0.85);
    }
    if FINDING_MARKER.is_match(text) {
        let severity = classify_severity(text);
        return (ContentType::Finding, Some(severity), 0.8);
    }
    if PHASE_THINKING.is_match(text)
        || PHASE_ANALYZING.is_match(text)
        || PHASE_OUTPUTTING.is_match(text)
        || PHASE_COMPLETE.is_match(text)
    {
        return (ContentType::Progress, None, 0.7);
    }
    (ContentType::Debug, None, 0.3)
}

fn classify_severity(text: &str) -> Severity {
    if SEVERITY_CRITICAL.is_match(text) {
        Severity::Critical
    } else if SEVERITY_HIGH.is_match(text) {
        Severity::High
    } else if SEVERITY_MEDIUM.is_match(text) {
        Severity::Medium
    } else if SEVERITY_LOW.is_match(text) {
        Severity::Low
    } else {
        Severity::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_claude_thinking_blocks() {
        let out = preprocess(CliAgent::Claude, "before<thinking>secret</thinking>after");
        assert!(!out.contains("secret"));
        assert!(out.contains("before"));
        assert!(out.contains("after"));
    }

    #[test]
    fn strips_gemini_thinking_annotations() {
        let out = preprocess(CliAgent::Gemini, "hello [THINKING: pondering] world");
        assert!(!out.contains("THINKING"));
    }

    #[test]
    fn codex_keeps_only_assistant_lines() {
        let raw = "{\"type\":\"reasoning\",\"content\":\"skip\"}\n{\"type\":\"assistant\",\"content\":\"keep me\"}\n";
        let out = preprocess(CliAgent::Codex, raw);
        assert!(out.contains("keep me"));
        assert!(!out.contains("skip"));
    }

    #[test]
    fn codex_falls_back_to_raw_on_parse_failure() {
        let out = preprocess(CliAgent::Codex, "not json at all\n");
        assert!(out.contains("not json at all"));
    }

    #[test]
    fn fenced_code_blocks_are_never_split() {
        let text = "intro\n\n```\nfn main() {}\n```\n\nmore text here.";
        let (segment, _rest) = take_next_segment(text).unwrap();
        assert!(segment.contains("```\nfn main() {}\n```"));
    }

    #[test]
    fn low_confidence_debug_is_dropped() {
        let mut parser = AgentParser::new(CliAgent::Claude, "s1");
        let events = parser.feed("just some ambient filler text with no markers at all.\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn error_marker_produces_error_event() {
        let mut parser = AgentParser::new(CliAgent::Claude, "s1");
        let events = parser.feed("An error occurred while parsing the file.\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata.content_type, Some(ContentType::Error));
    }

    #[test]
    fn phase_advances_monotonically() {
        let mut parser = AgentParser::new(CliAgent::Claude, "s1");
        parser.feed("Analyzing the codebase now.\n\n");
        assert_eq!(parser.phase(), ParserPhase::Analyzing);
        parser.feed("Just thinking about something.\n\n");
        assert_eq!(parser.phase(), ParserPhase::Analyzing);
    }

    #[test]
    fn finding_severity_is_classified() {
        let mut parser = AgentParser::new(CliAgent::Claude, "s1");
        let events = parser.feed("Found a critical vulnerability in auth.\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata.severity, Some(Severity::Critical));
    }

    #[test]
    fn flush_emits_remaining_partial_segment() {
        let mut parser = AgentParser::new(CliAgent::Claude, "s1");
        parser.feed("Found an issue but no trailing boundary yet");
        let events = parser.flush();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn oversized_trailing_buffer_is_force_flushed() {
        let mut parser = AgentParser::new(CliAgent::Claude, "s1");
        let huge = "x".repeat(MAX_TRAILING_BUFFER + 100);
        let events = parser.feed(&huge);
        assert!(!events.is_empty());
    }
}
