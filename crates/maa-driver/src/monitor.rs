use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::parse::parse_line;
use crate::types::TimedEvent;

// ─── LogTail ──────────────────────────────────────────────────────────────

#[cfg(unix)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

#[cfg(unix)]
fn identity(meta: &std::fs::Metadata) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;
    Some(FileIdentity {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

/// Creation time stands in for the file id, which stable Rust does not
/// expose here. A replacement shorter than the read offset is still caught
/// as truncation.
#[cfg(not(unix))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    created: std::time::SystemTime,
}

#[cfg(not(unix))]
fn identity(meta: &std::fs::Metadata) -> Option<FileIdentity> {
    meta.created().ok().map(|created| FileIdentity { created })
}

/// Incremental reader over a log file that the writer may rotate.
///
/// Each [`poll`](LogTail::poll) returns only the complete lines appended
/// since the previous call. The open handle is kept across polls, so when
/// the file is replaced the bytes written to the old file before the switch
/// are still read before continuing from the start of the new one.
#[derive(Debug)]
pub struct LogTail {
    path: PathBuf,
    file: Option<File>,
    /// Bytes consumed from the current file, including `partial`.
    offset: u64,
    identity: Option<FileIdentity>,
    partial: Vec<u8>,
}

impl LogTail {
    /// Start reading `path` at byte `offset`.
    pub fn new(path: impl Into<PathBuf>, offset: u64) -> Self {
        Self {
            path: path.into(),
            file: None,
            offset,
            identity: None,
            partial: Vec::new(),
        }
    }

    /// Start at the current end of `path`, so only new lines are seen. A
    /// missing file starts at 0.
    pub async fn at_end(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let offset = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e),
        };
        Ok(Self::new(path, offset))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset of the first byte not yet emitted as part of a line.
    pub fn position(&self) -> u64 {
        self.offset - self.partial.len() as u64
    }

    /// Read whatever complete lines are available now.
    pub async fn poll(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();

        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        let Some(meta) = meta else {
            if self.file.is_some() {
                self.drain_and_reset(&mut lines).await?;
            }
            return Ok(lines);
        };

        let current = identity(&meta);
        if self.file.is_some() {
            let replaced = current.is_some() && current != self.identity;
            let truncated = meta.len() < self.offset;
            if replaced || truncated {
                tracing::debug!(path = %self.path.display(), replaced, truncated, "log rotated");
                // Whatever reached the old handle is emitted before switching.
                self.drain_and_reset(&mut lines).await?;
            }
        }

        if self.file.is_none() {
            if meta.len() < self.offset {
                self.offset = 0;
            }
            let mut file = File::open(&self.path).await?;
            file.seek(SeekFrom::Start(self.offset)).await?;
            self.file = Some(file);
            self.identity = current;
        }

        self.read_available(&mut lines).await?;
        Ok(lines)
    }

    async fn read_available(&mut self, lines: &mut Vec<String>) -> io::Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let mut buf = Vec::new();
        let n = file.read_to_end(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        self.offset += n as u64;
        self.partial.extend_from_slice(&buf);
        split_lines(&mut self.partial, lines);
        Ok(())
    }

    /// Read the tail of the rotated-away file, then forget it. An
    /// unterminated fragment left at that point is dropped.
    async fn drain_and_reset(&mut self, lines: &mut Vec<String>) -> io::Result<()> {
        self.read_available(lines).await?;
        if !self.partial.is_empty() {
            tracing::debug!(bytes = self.partial.len(), "discarding unterminated line at rotation");
        }
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.file = None;
        self.identity = None;
        self.offset = 0;
        self.partial.clear();
    }
}

fn split_lines(partial: &mut Vec<u8>, lines: &mut Vec<String>) {
    let Some(last_newline) = partial.iter().rposition(|&b| b == b'\n') else {
        return;
    };
    let rest = partial.split_off(last_newline + 1);
    for raw in partial.split(|&b| b == b'\n') {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_end_matches('\r');
        if !text.trim().is_empty() {
            lines.push(text.to_string());
        }
    }
    *partial = rest;
}

// ─── LogMonitor ───────────────────────────────────────────────────────────

/// Background poller that turns a [`LogTail`] into a stream of events.
pub struct LogMonitor;

impl LogMonitor {
    /// Poll `tail` every `interval` until the returned stream is dropped.
    pub fn spawn(mut tail: LogTail, interval: Duration) -> LogEventStream {
        let (tx, rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        let position = Arc::new(AtomicU64::new(tail.position()));

        let token = cancel.clone();
        let shared = Arc::clone(&position);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match tail.poll().await {
                    Ok(lines) => {
                        for line in lines {
                            if tx.send(parse_line(&line)).await.is_err() {
                                return;
                            }
                        }
                        shared.store(tail.position(), Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::warn!(path = %tail.path().display(), error = %e, "log poll failed");
                    }
                }
            }
        });

        LogEventStream {
            rx,
            position,
            _guard: cancel.drop_guard(),
        }
    }
}

/// Events parsed from the engine log. Dropping the stream stops the poller.
pub struct LogEventStream {
    rx: mpsc::Receiver<TimedEvent>,
    position: Arc<AtomicU64>,
    _guard: DropGuard,
}

impl LogEventStream {
    /// Byte offset up to which lines have been emitted; a new [`LogTail`]
    /// created at this offset resumes without duplicates.
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }
}

impl Stream for LogEventStream {
    type Item = TimedEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
