use serde::Serialize;
use std::fmt;

// ─── RunState ─────────────────────────────────────────────────────────────

/// Phase of the orchestrator's single run slot.
///
/// ```text
/// Idle → Preparing → EmulatorCheck → Launching → Running → Completed ─┐
///            │            │             │  ▲        │                 │
///            │            │             │  └ Retrying ◄┘              ▼
///            └────────────┴─────────────┴──────┴──► Failed ──► Restoring → Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Preparing,
    EmulatorCheck,
    Launching,
    Running,
    Retrying,
    Completed,
    Failed,
    Restoring,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Preparing => "preparing",
            RunState::EmulatorCheck => "emulator_check",
            RunState::Launching => "launching",
            RunState::Running => "running",
            RunState::Retrying => "retrying",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Restoring => "restoring",
        }
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Preparing)
                | (Preparing, EmulatorCheck)
                | (Preparing, Failed)
                | (EmulatorCheck, Launching)
                | (EmulatorCheck, Failed)
                | (Launching, Running)
                | (Launching, Failed)
                | (Running, Completed)
                | (Running, Retrying)
                | (Running, Failed)
                | (Retrying, Launching)
                | (Retrying, Failed)
                | (Completed, Restoring)
                | (Failed, Restoring)
                | (Failed, Idle)
                | (Restoring, Idle)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
