use std::fmt;
use std::time::Duration;

use conductor_core::config::RetrySettings;

use crate::types::{CrashReason, ExitInfo, FailureReason};

// ─── AttemptFailure ───────────────────────────────────────────────────────

/// How one launch of the engine failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The log showed a crash signature.
    Crashed(CrashReason),
    /// The process exited before the queue finished.
    Exited(ExitInfo),
    /// No log activity for this long.
    Idle(Duration),
    /// The attempt ran past its wall-clock limit.
    Overran(Duration),
    /// The queue drained with these tasks unfinished.
    Incomplete(Vec<String>),
    /// A task failed in a way another launch cannot fix.
    TaskFatal { task: String, reason: String },
    Cancelled,
}

impl AttemptFailure {
    /// Terminal classification if this failure ends the run.
    pub fn reason(&self) -> FailureReason {
        let message = self.to_string();
        match self {
            AttemptFailure::Crashed(_) | AttemptFailure::Exited(_) => {
                FailureReason::EngineCrashed { message }
            }
            AttemptFailure::Idle(_) | AttemptFailure::Overran(_) => {
                FailureReason::EngineHang { message }
            }
            AttemptFailure::Incomplete(_) => FailureReason::EngineCrashed { message },
            AttemptFailure::TaskFatal { .. } => FailureReason::Fatal { message },
            AttemptFailure::Cancelled => FailureReason::Cancelled,
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Crashed(reason) => write!(f, "{reason}"),
            AttemptFailure::Exited(info) => write!(f, "engine exited early ({info})"),
            AttemptFailure::Idle(d) => write!(f, "no log activity for {}s", d.as_secs()),
            AttemptFailure::Overran(d) => write!(f, "attempt exceeded {}s", d.as_secs()),
            AttemptFailure::Incomplete(tasks) => {
                write!(f, "queue finished with unfinished tasks: {}", tasks.join(", "))
            }
            AttemptFailure::TaskFatal { task, reason } if reason.is_empty() => {
                write!(f, "task {task} failed")
            }
            AttemptFailure::TaskFatal { task, reason } => write!(f, "task {task} failed: {reason}"),
            AttemptFailure::Cancelled => f.write_str("cancelled"),
        }
    }
}

// ─── RetryPolicy ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Retry { delay: Duration },
    GiveUp,
}

/// Decides whether a failed attempt is followed by another launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total launches allowed, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
    pub retry_on_hang: bool,
    pub retry_on_partial: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        Self {
            max_attempts: s.max_attempts.max(1),
            delay: Duration::from_secs(s.delay_secs),
            retry_on_hang: s.retry_on_hang,
            retry_on_partial: s.retry_on_partial,
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable(&self, failure: &AttemptFailure) -> bool {
        match failure {
            AttemptFailure::Crashed(reason) => reason.is_transient(),
            AttemptFailure::Exited(_) => true,
            AttemptFailure::Idle(_) | AttemptFailure::Overran(_) => self.retry_on_hang,
            AttemptFailure::Incomplete(_) => self.retry_on_partial,
            AttemptFailure::TaskFatal { .. } | AttemptFailure::Cancelled => false,
        }
    }

    /// `attempt` is the 1-based number of the launch that just failed.
    pub fn verdict(&self, attempt: u32, failure: &AttemptFailure) -> Verdict {
        if !self.is_retryable(failure) || attempt >= self.max_attempts {
            Verdict::GiveUp
        } else {
            Verdict::Retry { delay: self.delay }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(5),
            retry_on_hang: true,
            retry_on_partial: true,
        }
    }

    #[test]
    fn retries_until_attempts_are_spent() {
        let p = policy(3);
        let f = AttemptFailure::Crashed(CrashReason::ConnectionLost);
        assert_eq!(
            p.verdict(1, &f),
            Verdict::Retry {
                delay: Duration::from_millis(5)
            }
        );
        assert!(matches!(p.verdict(2, &f), Verdict::Retry { .. }));
        assert_eq!(p.verdict(3, &f), Verdict::GiveUp);
    }

    #[test]
    fn fatal_failures_never_retry() {
        let p = policy(10);
        for f in [
            AttemptFailure::Crashed(CrashReason::NoTaskSelected),
            AttemptFailure::Crashed(CrashReason::Stopped),
            AttemptFailure::TaskFatal {
                task: "开始唤醒".into(),
                reason: String::new(),
            },
            AttemptFailure::Cancelled,
        ] {
            assert_eq!(p.verdict(1, &f), Verdict::GiveUp, "{f}");
        }
    }

    #[test]
    fn hang_and_partial_follow_flags() {
        let mut p = policy(5);
        let hang = AttemptFailure::Idle(Duration::from_secs(600));
        let partial = AttemptFailure::Incomplete(vec!["公招".into()]);
        assert!(p.is_retryable(&hang));
        assert!(p.is_retryable(&partial));

        p.retry_on_hang = false;
        p.retry_on_partial = false;
        assert!(!p.is_retryable(&hang));
        assert!(!p.is_retryable(&AttemptFailure::Overran(Duration::from_secs(1))));
        assert!(!p.is_retryable(&partial));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let settings = RetrySettings {
            max_attempts: 0,
            ..RetrySettings::default()
        };
        assert_eq!(RetryPolicy::from(&settings).max_attempts, 1);
    }

    #[test]
    fn failures_map_to_terminal_reasons() {
        assert!(matches!(
            AttemptFailure::Idle(Duration::from_secs(1)).reason(),
            FailureReason::EngineHang { .. }
        ));
        assert!(matches!(
            AttemptFailure::Exited(ExitInfo {
                code: Some(1),
                success: false
            })
            .reason(),
            FailureReason::EngineCrashed { .. }
        ));
        assert_eq!(AttemptFailure::Cancelled.reason(), FailureReason::Cancelled);
        let fatal = AttemptFailure::TaskFatal {
            task: "开始唤醒".into(),
            reason: "登录失败".into(),
        }
        .reason();
        assert_eq!(
            fatal,
            FailureReason::Fatal {
                message: "task 开始唤醒 failed: 登录失败".into()
            }
        );
    }

    #[test]
    fn default_policy_matches_settings_defaults() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 4);
        assert_eq!(p.delay, Duration::from_secs(3));
    }
}
