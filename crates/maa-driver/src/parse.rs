//! Classification of engine log lines.
//!
//! Lines look like `[2026-10-12 04:00:01.234][INF] 开始任务: 开始唤醒`. The
//! timestamp prefix is optional; lines without one are stamped with the
//! local time at which they were read.

use chrono::{Local, NaiveDateTime};
use conductor_core::TaskKind;
use regex::Regex;
use std::sync::OnceLock;

use crate::types::{CrashReason, LogEvent, TimedEvent};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

struct Patterns {
    timestamp: Regex,
    ansi: Regex,
    started: Regex,
    finished: Regex,
    failed: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        timestamp: Regex::new(r"^\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})(?:\.\d+)?\]")
            .unwrap(),
        ansi: Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap(),
        started: Regex::new(r"开始任务[:：]\s*(.+?)\s*$").unwrap(),
        finished: Regex::new(r"完成任务[:：]\s*(.+?)\s*$").unwrap(),
        failed: Regex::new(r"任务出错[:：]\s*(.+?)\s*$").unwrap(),
    })
}

/// Substring markers checked in order after the task markers.
const MARKERS: &[(&str, Marker)] = &[
    ("任务已全部完成", Marker::Idle),
    ("未选择任务", Marker::Crash(CrashReason::NoTaskSelected)),
    ("检查连接设置", Marker::Crash(CrashReason::ConnectionLost)),
    ("连接失败", Marker::Crash(CrashReason::ConnectionLost)),
    ("未检测到任何模拟器", Marker::Crash(CrashReason::NoEmulator)),
    ("MaaAssistantArknights GUI exited", Marker::Crash(CrashReason::Exited)),
    ("已停止", Marker::Crash(CrashReason::Stopped)),
];

#[derive(Clone, Copy)]
enum Marker {
    Idle,
    Crash(CrashReason),
}

/// Classify one log line.
pub fn parse_line(raw: &str) -> TimedEvent {
    let p = patterns();
    let cleaned = p.ansi.replace_all(raw, "");
    let line = cleaned.trim_end();

    let at = p
        .timestamp
        .captures(line)
        .and_then(|c| NaiveDateTime::parse_from_str(&c[1], TIMESTAMP_FORMAT).ok())
        .unwrap_or_else(|| Local::now().naive_local());

    TimedEvent {
        at,
        event: classify(line),
    }
}

fn classify(line: &str) -> LogEvent {
    let p = patterns();

    if let Some(c) = p.failed.captures(line) {
        let (task, reason) = split_reason(&c[1]);
        return LogEvent::TaskFailed {
            task: canonical_task_name(&task),
            reason,
        };
    }
    if let Some(c) = p.finished.captures(line) {
        return LogEvent::TaskFinished {
            task: canonical_task_name(&c[1]),
        };
    }
    if let Some(c) = p.started.captures(line) {
        return LogEvent::TaskStarted {
            task: canonical_task_name(&c[1]),
        };
    }

    for (needle, marker) in MARKERS {
        if line.contains(needle) {
            return match marker {
                Marker::Idle => LogEvent::EngineIdle,
                Marker::Crash(reason) => LogEvent::EngineCrashed { reason: *reason },
            };
        }
    }

    LogEvent::Unrecognized {
        line: line.to_string(),
    }
}

/// The engine logs either the zh-cn queue name or the engine task type;
/// both map to the queue name. Unknown names pass through.
pub fn canonical_task_name(name: &str) -> String {
    TaskKind::from_display_name(name)
        .or_else(|| TaskKind::parse(name))
        .map(|kind| kind.display_name().to_string())
        .unwrap_or_else(|| name.trim().to_string())
}

/// `刷理智 (体力不足)` → (`刷理智`, `体力不足`). The engine sometimes appends a
/// reason after the task name.
fn split_reason(text: &str) -> (String, String) {
    for (open, close) in [(" (", ')'), ("（", '）'), (", ", '\0')] {
        if let Some(idx) = text.find(open) {
            let task = text[..idx].trim().to_string();
            let rest = text[idx + open.len()..].trim_end_matches(close).trim();
            return (task, rest.to_string());
        }
    }
    (text.trim().to_string(), String::new())
}
