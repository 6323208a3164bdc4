use std::collections::{HashSet, VecDeque};
use std::fmt;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StageStatus {
    #[default]
    NotAttempted,
    Attempting,
    Completed,
    Failed,
    SkippedExcluded,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotAttempted => "not-attempted",
            Self::Attempting => "attempting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::SkippedExcluded => "skipped",
        };
        f.write_str(s)
    }
}

/// Why a stage was visited during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitReason {
    Macro,
    Include,
    Dependency,
    Trigger,
    AlreadyDone,
}

impl VisitReason {
    /// Tree marker used by the dependency tree report.
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Macro => "*>",
            Self::Include => "+>",
            Self::Dependency => "└>",
            Self::Trigger => "->",
            Self::AlreadyDone => "└ ",
        }
    }

    pub fn is_top_level(&self) -> bool {
        matches!(self, Self::Macro | Self::Include | Self::Trigger)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub depth: usize,
    pub reason: VisitReason,
    pub stage: String,
    pub description: String,
}

/// Mutable bookkeeping for one run.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    run_id: Uuid,
    pub(crate) attempted: HashSet<String>,
    pub(crate) completed: HashSet<String>,
    pub(crate) completed_order: Vec<String>,
    /// Every stage whose body was invoked, in invocation order.
    pub(crate) ran: Vec<String>,
    /// Stages that finished, including macros and dry-run stages.
    pub(crate) done: Vec<String>,
    pub(crate) triggered: VecDeque<String>,
    pub(crate) trace: Vec<TraceEntry>,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            attempted: HashSet::new(),
            completed: HashSet::new(),
            completed_order: Vec::new(),
            ran: Vec::new(),
            done: Vec::new(),
            triggered: VecDeque::new(),
            trace: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn is_attempted(&self, name: &str) -> bool {
        self.attempted.contains(name)
    }

    pub fn is_completed(&self, name: &str) -> bool {
        self.completed.contains(name)
    }

    pub fn attempted(&self) -> &HashSet<String> {
        &self.attempted
    }

    pub fn completed(&self) -> &HashSet<String> {
        &self.completed
    }

    /// Completed names in the order they were marked, replaces included.
    pub fn completed_order(&self) -> &[String] {
        &self.completed_order
    }

    pub fn ran(&self) -> &[String] {
        &self.ran
    }

    pub fn done(&self) -> &[String] {
        &self.done
    }

    pub fn pending_triggers(&self) -> impl Iterator<Item = &str> {
        self.triggered.iter().map(String::as_str)
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn last_completed(&self) -> Option<&str> {
        self.done.last().map(String::as_str)
    }

    pub(crate) fn mark_completed(&mut self, name: &str) {
        if self.completed.insert(name.to_string()) {
            self.completed_order.push(name.to_string());
        }
    }

    pub(crate) fn enqueue_trigger(&mut self, name: &str) {
        if !self.triggered.iter().any(|t| t == name) {
            self.triggered.push_back(name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_completed_once() {
        let mut state = ExecutionState::new();
        state.mark_completed("a");
        state.mark_completed("b");
        state.mark_completed("a");
        assert_eq!(state.completed_order(), &["a".to_string(), "b".to_string()]);
        assert!(state.is_completed("b"));
        assert!(!state.is_attempted("b"));
    }

    #[test]
    fn test_trigger_queue_dedups() {
        let mut state = ExecutionState::new();
        state.enqueue_trigger("report");
        state.enqueue_trigger("report");
        state.enqueue_trigger("plot");
        assert_eq!(state.pending_triggers().collect::<Vec<_>>(), vec!["report", "plot"]);
    }

    #[test]
    fn test_markers() {
        assert_eq!(VisitReason::Macro.marker(), "*>");
        assert_eq!(VisitReason::Dependency.marker(), "└>");
        assert!(VisitReason::Trigger.is_top_level());
        assert!(!VisitReason::AlreadyDone.is_top_level());
        assert_eq!(StageStatus::default(), StageStatus::NotAttempted);
    }

    #[test]
    fn test_fresh_run_ids_differ() {
        assert_ne!(ExecutionState::new().run_id(), ExecutionState::new().run_id());
    }
}
