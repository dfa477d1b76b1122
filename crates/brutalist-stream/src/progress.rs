//! Progress Tracker — per-session milestone state machine (spec §4.5).

use std::collections::HashSet;
use std::time::Duration;

use brutalist_types::AnalysisPhase;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerEvent {
    PhaseChanged,
    MilestoneCompleted,
    ProgressUpdated,
    AnalysisComplete,
    AnalysisError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrackerPhase {
    Initializing,
    CollectingData,
    Analyzing,
    ProcessingResults,
    Complete,
    Error,
}

impl From<AnalysisPhase> for TrackerPhase {
    fn from(p: AnalysisPhase) -> Self {
        match p {
            AnalysisPhase::Initializing => TrackerPhase::Initializing,
            AnalysisPhase::CollectingData => TrackerPhase::CollectingData,
            AnalysisPhase::Analyzing => TrackerPhase::Analyzing,
            AnalysisPhase::ProcessingResults => TrackerPhase::ProcessingResults,
            AnalysisPhase::Complete => TrackerPhase::Complete,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Milestone {
    pub id: &'static str,
    pub phase: TrackerPhase,
    pub keywords: Regex,
    pub weight: f64,
    pub dependencies: &'static [&'static str],
}

/// Build the default milestone list shared by every analysis type. A
/// real deployment could preconfigure a distinct list per `analysisType`;
/// this is the mechanical baseline every domain shares (spec §4.5 notes
/// the list is "preconfigured" per type but doesn't mandate divergence).
pub fn default_milestones() -> Vec<Milestone> {
    vec![
        Milestone {
            id: "started",
            phase: TrackerPhase::Initializing,
            keywords: Regex::new(r"(?i)\b(starting|begin|initializ)").unwrap(),
            weight: 1.0,
            dependencies: &[],
        },
        Milestone {
            id: "data_collected",
            phase: TrackerPhase::CollectingData,
            keywords: Regex::new(r"(?i)\b(reading|scanning|collecting|gathering)").unwrap(),
            weight: 2.0,
            dependencies: &["started"],
        },
        Milestone {
            id: "analysis_running",
            phase: TrackerPhase::Analyzing,
            keywords: Regex::new(r"(?i)\b(analyzing|examining|evaluating)").unwrap(),
            weight: 3.0,
            dependencies: &["data_collected"],
        },
        Milestone {
            id: "findings_produced",
            phase: TrackerPhase::ProcessingResults,
            keywords: Regex::new(r"(?i)\b(found|issue|result|conclusion)").unwrap(),
            weight: 3.0,
            dependencies: &["analysis_running"],
        },
        Milestone {
            id: "finished",
            phase: TrackerPhase::Complete,
            keywords: Regex::new(r"(?i)\b(complete|done|finished)").unwrap(),
            weight: 1.0,
            dependencies: &["findings_produced"],
        },
    ]
}

pub struct ProgressTracker {
    milestones: Vec<Milestone>,
    completed: HashSet<&'static str>,
    phase: TrackerPhase,
    started: std::time::Instant,
}

impl ProgressTracker {
    pub fn new(milestones: Vec<Milestone>) -> Self {
        ProgressTracker {
            milestones,
            completed: HashSet::new(),
            phase: TrackerPhase::Initializing,
            started: std::time::Instant::now(),
        }
    }

    pub fn phase(&self) -> TrackerPhase {
        self.phase
    }

    pub fn overall_progress(&self) -> f64 {
        let total: f64 = self.milestones.iter().map(|m| m.weight).sum();
        if total == 0.0 {
            return 0.0;
        }
        let done: f64 = self
            .milestones
            .iter()
            .filter(|m| self.completed.contains(m.id))
            .map(|m| m.weight)
            .sum();
        done / total
    }

    pub fn phase_progress(&self) -> f64 {
        let in_phase: Vec<&Milestone> = self.milestones.iter().filter(|m| m.phase == self.phase).collect();
        let total: f64 = in_phase.iter().map(|m| m.weight).sum();
        if total == 0.0 {
            return 0.0;
        }
        let done: f64 = in_phase
            .iter()
            .filter(|m| self.completed.contains(m.id))
            .map(|m| m.weight)
            .sum();
        done / total
    }

    pub fn eta(&self) -> Option<Duration> {
        let overall = self.overall_progress();
        if overall <= 0.0 {
            return None;
        }
        let elapsed = self.started.elapsed();
        let total_secs = elapsed.as_secs_f64() / overall;
        Some(Duration::from_secs_f64((total_secs - elapsed.as_secs_f64()).max(0.0)))
    }

    /// Feed a piece of classified content, returning the tracker events it
    /// produced. Phase only advances forward (spec §4.5 invariant).
    pub fn observe(&mut self, content: &str) -> Vec<TrackerEvent> {
        let mut out = Vec::new();
        let mut newly_completed = Vec::new();

        for milestone in &self.milestones {
            if self.completed.contains(milestone.id) {
                continue;
            }
            if !milestone.keywords.is_match(content) {
                continue;
            }
            let deps_met = milestone
                .dependencies
                .iter()
                .all(|dep| self.completed.contains(dep));
            if deps_met {
                newly_completed.push(milestone.id);
            }
        }

        for id in newly_completed {
            self.completed.insert(id);
            out.push(TrackerEvent::MilestoneCompleted);
        }

        let strongest_phase = self
            .milestones
            .iter()
            .filter(|m| self.completed.contains(m.id))
            .map(|m| m.phase)
            .max()
            .unwrap_or(TrackerPhase::Initializing);

        if strongest_phase > self.phase {
            self.phase = strongest_phase;
            out.push(TrackerEvent::PhaseChanged);
        }

        if !out.is_empty() {
            out.push(TrackerEvent::ProgressUpdated);
        }

        if self.phase == TrackerPhase::Complete {
            out.push(TrackerEvent::AnalysisComplete);
        }

        out
    }

    /// Force completion: both progress values become 1.0, phase becomes
    /// `Complete`, and any still-pending milestone is auto-marked (spec
    /// §4.5 `markComplete()`).
    pub fn mark_complete(&mut self) -> Vec<TrackerEvent> {
        for m in &self.milestones {
            self.completed.insert(m.id);
        }
        self.phase = TrackerPhase::Complete;
        vec![TrackerEvent::ProgressUpdated, TrackerEvent::AnalysisComplete]
    }

    pub fn mark_error(&mut self) -> Vec<TrackerEvent> {
        self.phase = TrackerPhase::Error;
        vec![TrackerEvent::AnalysisError]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milestone_completes_when_dependency_met() {
        let mut tracker = ProgressTracker::new(default_milestones());
        tracker.observe("Starting analysis now");
        let events = tracker.observe("Reading source files");
        assert!(events.contains(&TrackerEvent::MilestoneCompleted));
    }

    #[test]
    fn unmet_dependency_keeps_milestone_pending() {
        let mut tracker = ProgressTracker::new(default_milestones());
        // "analyzing" keyword matches but "data_collected" dependency unmet.
        tracker.observe("Analyzing the codebase");
        assert!(tracker.overall_progress() < 0.3);
    }

    #[test]
    fn phase_never_retracts() {
        let mut tracker = ProgressTracker::new(default_milestones());
        tracker.observe("Starting analysis now");
        tracker.observe("Reading source files");
        tracker.observe("Analyzing the codebase");
        assert_eq!(tracker.phase(), TrackerPhase::Analyzing);
        tracker.observe("Starting again");
        assert_eq!(tracker.phase(), TrackerPhase::Analyzing);
    }

    #[test]
    fn mark_complete_sets_full_progress() {
        let mut tracker = ProgressTracker::new(default_milestones());
        let events = tracker.mark_complete();
        assert_eq!(tracker.overall_progress(), 1.0);
        assert_eq!(tracker.phase(), TrackerPhase::Complete);
        assert!(events.contains(&TrackerEvent::AnalysisComplete));
    }

    #[test]
    fn eta_is_none_before_any_progress() {
        let tracker = ProgressTracker::new(default_milestones());
        assert!(tracker.eta().is_none());
    }
}
