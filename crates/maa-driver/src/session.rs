use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

use crate::state::RunState;
use crate::types::{LogEvent, RunOutcome, RunReport, TaskFailure, TimedEvent};
use crate::{DriverError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: RunState,
    pub to: RunState,
    pub at: DateTime<Local>,
}

// ─── ExecutionSession ─────────────────────────────────────────────────────

/// Bookkeeping for one run: its state, attempts, and what the engine has
/// reported so far.
#[derive(Debug)]
pub struct ExecutionSession {
    run_id: Uuid,
    label: String,
    state: RunState,
    attempt: u32,
    started_at: DateTime<Local>,
    last_event: Option<TimedEvent>,
    tail: VecDeque<String>,
    tail_limit: usize,
    transitions: Vec<Transition>,
    /// Tasks finished during the current attempt.
    finished: BTreeSet<String>,
    /// Task failures during the current attempt.
    failed: Vec<TaskFailure>,
}

impl ExecutionSession {
    pub fn new(label: impl Into<String>, tail_limit: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            label: label.into(),
            state: RunState::Idle,
            attempt: 0,
            started_at: Local::now(),
            last_event: None,
            tail: VecDeque::with_capacity(tail_limit.min(1024)),
            tail_limit,
            transitions: Vec::new(),
            finished: BTreeSet::new(),
            failed: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn last_event(&self) -> Option<&TimedEvent> {
        self.last_event.as_ref()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Move to `to`, rejecting moves the state machine does not allow.
    pub fn transition(&mut self, to: RunState) -> Result<()> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(DriverError::InvalidTransition { from, to });
        }
        self.state = to;
        self.transitions.push(Transition {
            from,
            to,
            at: Local::now(),
        });
        tracing::info!(run_id = %self.run_id, %from, %to, attempt = self.attempt, "run state");
        Ok(())
    }

    /// Start counting a new launch. Per-attempt task progress is cleared.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.finished.clear();
        self.failed.clear();
        self.attempt
    }

    /// Keep a bounded tail of raw output for the final report.
    pub fn record_line(&mut self, line: impl Into<String>) {
        if self.tail_limit == 0 {
            return;
        }
        if self.tail.len() == self.tail_limit {
            self.tail.pop_front();
        }
        self.tail.push_back(line.into());
    }

    pub fn record_event(&mut self, event: &TimedEvent) {
        match &event.event {
            LogEvent::TaskFinished { task } => {
                self.finished.insert(task.clone());
            }
            LogEvent::TaskFailed { task, reason } => self.failed.push(TaskFailure {
                task: task.clone(),
                reason: reason.clone(),
            }),
            LogEvent::Unrecognized { line } => self.record_line(line.clone()),
            _ => {}
        }
        self.last_event = Some(event.clone());
    }

    /// Names in `expected` not yet reported finished in this attempt.
    pub fn unfinished(&self, expected: &BTreeSet<String>) -> Vec<String> {
        expected.difference(&self.finished).cloned().collect()
    }

    pub fn all_finished(&self, expected: &BTreeSet<String>) -> bool {
        expected.is_subset(&self.finished)
    }

    pub fn into_report(self, outcome: RunOutcome, restore_error: Option<String>) -> RunReport {
        RunReport {
            run_id: Some(self.run_id),
            label: self.label,
            outcome,
            attempts: self.attempt,
            started_at: Some(self.started_at),
            finished_at: Local::now(),
            tasks_finished: self.finished.into_iter().collect(),
            tasks_failed: self.failed,
            log_tail: self.tail.into_iter().collect(),
            transitions: self.transitions,
            restore_error,
        }
    }
}
