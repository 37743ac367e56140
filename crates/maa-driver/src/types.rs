use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::session::Transition;

// ─── Log events ───────────────────────────────────────────────────────────

/// Why the engine log says a session died.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashReason {
    /// The device connection dropped or could not be made.
    ConnectionLost,
    /// The engine found no emulator to attach to.
    NoEmulator,
    /// The engine was started with an empty queue.
    NoTaskSelected,
    /// The engine stopped on its own or was stopped by a user.
    Stopped,
    /// The engine's GUI reported that it exited.
    Exited,
}

impl CrashReason {
    /// Whether another attempt can reasonably succeed.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            CrashReason::ConnectionLost | CrashReason::NoEmulator | CrashReason::Exited
        )
    }
}

impl fmt::Display for CrashReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CrashReason::ConnectionLost => "device connection lost",
            CrashReason::NoEmulator => "no emulator detected",
            CrashReason::NoTaskSelected => "no task selected",
            CrashReason::Stopped => "engine stopped",
            CrashReason::Exited => "engine exited before finishing",
        })
    }
}

/// One classified line of the engine log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    TaskStarted { task: String },
    TaskFinished { task: String },
    TaskFailed { task: String, reason: String },
    /// The engine drained its queue.
    EngineIdle,
    EngineCrashed { reason: CrashReason },
    Unrecognized { line: String },
}

/// Marker the engine prints while it is stuck waiting; it is not progress.
pub const STALL_NOTICE: &str = "如果长时间无进一步日志更新";

impl LogEvent {
    /// Whether the line shows the engine is still making progress and so
    /// resets the idle timer.
    pub fn counts_as_activity(&self) -> bool {
        match self {
            LogEvent::Unrecognized { line } => !line.contains(STALL_NOTICE),
            _ => true,
        }
    }
}

/// A [`LogEvent`] with the timestamp the engine wrote on the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimedEvent {
    pub at: NaiveDateTime,
    #[serde(flatten)]
    pub event: LogEvent,
}

// ─── Process exit ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitInfo {
    /// `None` when the process was ended by a signal.
    pub code: Option<i32>,
    pub success: bool,
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}

// ─── Run outcome ──────────────────────────────────────────────────────────

/// Why a run ended without success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    ConfigIo { message: String },
    AddressUnresolved,
    EmulatorUnavailable { message: String },
    ProcessSpawn { message: String },
    EngineCrashed { message: String },
    EngineHang { message: String },
    /// A failure no retry can fix, such as the game failing to start.
    Fatal { message: String },
    /// The engine process survived termination.
    SupervisorLeak { pid: u32 },
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ConfigIo { message } => write!(f, "engine config I/O: {message}"),
            FailureReason::AddressUnresolved => f.write_str("no device address"),
            FailureReason::EmulatorUnavailable { message } => {
                write!(f, "emulator unavailable: {message}")
            }
            FailureReason::ProcessSpawn { message } => write!(f, "engine spawn: {message}"),
            FailureReason::EngineCrashed { message } => write!(f, "engine crashed: {message}"),
            FailureReason::EngineHang { message } => write!(f, "engine hung: {message}"),
            FailureReason::Fatal { message } => write!(f, "fatal: {message}"),
            FailureReason::SupervisorLeak { pid } => {
                write!(f, "engine process {pid} survived termination")
            }
            FailureReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed { reason: FailureReason },
    /// Another run held the slot; nothing was touched.
    Busy,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }
}

/// Everything a caller learns about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Option<Uuid>,
    pub label: String,
    pub outcome: RunOutcome,
    pub attempts: u32,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: DateTime<Local>,
    pub tasks_finished: Vec<String>,
    pub tasks_failed: Vec<TaskFailure>,
    pub log_tail: Vec<String>,
    pub transitions: Vec<Transition>,
    /// Set when the engine configuration could not be put back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_error: Option<String>,
}

impl RunReport {
    pub fn busy(label: impl Into<String>) -> Self {
        Self {
            run_id: None,
            label: label.into(),
            outcome: RunOutcome::Busy,
            attempts: 0,
            started_at: None,
            finished_at: Local::now(),
            tasks_finished: Vec::new(),
            tasks_failed: Vec::new(),
            log_tail: Vec::new(),
            transitions: Vec::new(),
            restore_error: None,
        }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at
            .and_then(|start| (self.finished_at - start).to_std().ok())
    }

    /// One-line human summary, used for notifications and CLI output.
    pub fn summary(&self) -> String {
        match &self.outcome {
            RunOutcome::Succeeded => format!(
                "{}: succeeded after {} attempt(s), {} task(s) finished",
                self.label,
                self.attempts,
                self.tasks_finished.len()
            ),
            RunOutcome::Failed { reason } => format!(
                "{}: failed after {} attempt(s): {reason}",
                self.label, self.attempts
            ),
            RunOutcome::Busy => format!("{}: skipped, another run is in progress", self.label),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub task: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stall_notice_is_not_activity() {
        let stalled = LogEvent::Unrecognized {
            line: format!("[2026-10-12 04:00:00][INF] {STALL_NOTICE}，请检查"),
        };
        assert!(!stalled.counts_as_activity());
        let other = LogEvent::Unrecognized {
            line: "识别结果: 1-7".into(),
        };
        assert!(other.counts_as_activity());
        assert!(LogEvent::EngineIdle.counts_as_activity());
    }

    #[test]
    fn only_connection_problems_are_transient() {
        assert!(CrashReason::ConnectionLost.is_transient());
        assert!(CrashReason::NoEmulator.is_transient());
        assert!(CrashReason::Exited.is_transient());
        assert!(!CrashReason::NoTaskSelected.is_transient());
        assert!(!CrashReason::Stopped.is_transient());
    }

    #[test]
    fn busy_report_has_no_run_id() {
        let report = RunReport::busy("daily");
        assert!(report.run_id.is_none());
        assert_eq!(report.outcome, RunOutcome::Busy);
        assert!(report.summary().contains("another run is in progress"));
    }

    #[test]
    fn failure_reason_serializes_with_kind_tag() {
        let outcome = RunOutcome::Failed {
            reason: FailureReason::SupervisorLeak { pid: 42 },
        };
        let v = serde_json::to_value(&outcome).unwrap();
        assert_eq!(v["status"], "failed");
        assert_eq!(v["reason"]["kind"], "supervisor_leak");
        assert_eq!(v["reason"]["pid"], 42);
    }
}
