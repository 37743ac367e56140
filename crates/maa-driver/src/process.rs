use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};

use crate::types::ExitInfo;
use crate::{DriverError, Result};

// ─── EngineCommand ────────────────────────────────────────────────────────

/// How to start the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl EngineCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

// ─── EngineHandle ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

/// A running engine process.
///
/// A background task owns the [`Child`] and publishes its exit status, so
/// the handle can be polled for exit without blocking and asked to stop.
/// Dropping the handle does not kill the process; the background task keeps
/// reaping it.
pub struct EngineHandle {
    pid: u32,
    output: Option<mpsc::Receiver<OutputLine>>,
    exit: watch::Receiver<Option<ExitInfo>>,
    control: mpsc::Sender<Signal>,
}

impl EngineHandle {
    pub fn spawn(command: &EngineCommand) -> Result<Self> {
        let mut cmd = command.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| DriverError::ProcessSpawn {
            program: command.program.display().to_string(),
            source,
        })?;
        let pid = child.id().unwrap_or_default();

        let (out_tx, out_rx) = mpsc::channel(256);
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, OutputStream::Stdout, out_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, OutputStream::Stderr, out_tx);
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let (control_tx, control_rx) = mpsc::channel(4);
        tokio::spawn(supervise(child, pid, control_rx, exit_tx));

        tracing::info!(pid, program = %command.program.display(), "engine started");
        Ok(Self {
            pid,
            output: Some(out_rx),
            exit: exit_rx,
            control: control_tx,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Take the merged stdout/stderr line channel. Returns `None` after the
    /// first call.
    pub fn take_output(&mut self) -> Option<mpsc::Receiver<OutputLine>> {
        self.output.take()
    }

    /// A receiver that turns `Some` once the process has exited.
    pub fn exit_watch(&self) -> watch::Receiver<Option<ExitInfo>> {
        self.exit.clone()
    }

    /// The exit status if the process has already exited.
    pub fn try_exit(&self) -> Option<ExitInfo> {
        self.exit.borrow().clone()
    }

    /// Wait for the process to exit.
    pub async fn wait(&self) -> Option<ExitInfo> {
        let mut rx = self.exit.clone();
        let info = match rx.wait_for(Option::is_some).await {
            Ok(info) => info.clone(),
            Err(_) => None,
        };
        info
    }

    /// Ask the process to stop, escalating to a kill after `grace`.
    ///
    /// Fails only if the process is still alive after the kill and a second
    /// grace period; the caller must treat that as a leaked process.
    pub async fn terminate(&self, grace: Duration) -> Result<ExitInfo> {
        if let Some(info) = self.try_exit() {
            return Ok(info);
        }

        let _ = self.control.send(Signal::Term).await;
        if let Ok(Some(info)) = tokio::time::timeout(grace, self.wait()).await {
            tracing::debug!(pid = self.pid, %info, "engine stopped after terminate");
            return Ok(info);
        }

        tracing::warn!(pid = self.pid, "engine ignored terminate, killing");
        let _ = self.control.send(Signal::Kill).await;
        if let Ok(Some(info)) = tokio::time::timeout(grace, self.wait()).await {
            return Ok(info);
        }

        tracing::error!(pid = self.pid, "engine survived kill");
        Err(DriverError::SupervisorTermination { pid: self.pid })
    }
}

fn forward_lines<R>(reader: R, stream: OutputStream, tx: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(OutputLine { stream, line }).await.is_err() {
                // Receiver gone; keep draining so the child never blocks on a full pipe.
                while let Ok(Some(_)) = lines.next_line().await {}
                break;
            }
        }
    });
}

async fn supervise(
    mut child: Child,
    pid: u32,
    mut control: mpsc::Receiver<Signal>,
    exit: watch::Sender<Option<ExitInfo>>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            signal = control.recv() => match signal {
                Some(Signal::Term) => send_term(&mut child, pid),
                Some(Signal::Kill) => {
                    if let Err(e) = child.start_kill() {
                        tracing::debug!(pid, error = %e, "kill failed");
                    }
                }
                None => break child.wait().await,
            },
        }
    };

    let info = match status {
        Ok(status) => ExitInfo {
            code: status.code(),
            success: status.success(),
        },
        Err(e) => {
            tracing::warn!(pid, error = %e, "failed to wait for engine");
            ExitInfo {
                code: None,
                success: false,
            }
        }
    };
    tracing::info!(pid, %info, "engine exited");
    let _ = exit.send(Some(info));
}

#[cfg(unix)]
fn send_term(_child: &mut Child, pid: u32) {
    // SAFETY: pid belongs to a child this task has not yet reaped.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        tracing::debug!(pid, error = %std::io::Error::last_os_error(), "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn send_term(child: &mut Child, pid: u32) {
    if let Err(e) = child.start_kill() {
        tracing::debug!(pid, error = %e, "terminate failed");
    }
}

// ─── EngineLauncher ───────────────────────────────────────────────────────

/// Starts engine processes. The orchestrator goes through this seam so a
/// run can be driven against something other than the real executable.
pub trait EngineLauncher: Send + Sync {
    fn launch(&self, command: &EngineCommand) -> Result<EngineHandle>;

    /// Kill instances of the engine that no handle owns, such as the GUI a
    /// launcher process handed off to. Returns how many were killed.
    fn reap(&self, _command: &EngineCommand) -> usize {
        0
    }
}

/// Spawns the command as a child process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl EngineLauncher for ProcessLauncher {
    fn launch(&self, command: &EngineCommand) -> Result<EngineHandle> {
        EngineHandle::spawn(command)
    }

    fn reap(&self, command: &EngineCommand) -> usize {
        kill_by_program(&command.program)
    }
}

/// Kill every process, other than this one, whose executable is `program`
/// or that was started with `program` as an argument (a script run through
/// its interpreter).
pub fn kill_by_program(program: &Path) -> usize {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing()
            .with_exe(UpdateKind::Always)
            .with_cmd(UpdateKind::Always),
    );
    let own = sysinfo::get_current_pid().ok();

    let mut killed = 0;
    for (pid, process) in system.processes() {
        if Some(*pid) == own {
            continue;
        }
        let runs_program = process.exe() == Some(program)
            || process.cmd().iter().any(|arg| Path::new(arg) == program);
        if runs_program && process.kill() {
            tracing::info!(pid = pid.as_u32(), program = %program.display(), "killed engine process");
            killed += 1;
        }
    }
    killed
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> EngineCommand {
        EngineCommand::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let mut handle = EngineHandle::spawn(&sh("echo out; echo err >&2; exit 3")).unwrap();
        let mut output = handle.take_output().unwrap();
        assert!(handle.take_output().is_none());

        let info = handle.wait().await.unwrap();
        assert_eq!(info.code, Some(3));
        assert!(!info.success);

        let mut lines = Vec::new();
        while let Some(line) = output.recv().await {
            lines.push(line);
        }
        assert!(lines.contains(&OutputLine {
            stream: OutputStream::Stdout,
            line: "out".into()
        }));
        assert!(lines.contains(&OutputLine {
            stream: OutputStream::Stderr,
            line: "err".into()
        }));
    }

    #[tokio::test]
    async fn try_exit_is_none_while_running() {
        let handle = EngineHandle::spawn(&sh("sleep 5")).unwrap();
        assert!(handle.try_exit().is_none());
        let info = handle.terminate(Duration::from_secs(2)).await.unwrap();
        assert!(info.code.is_none());
        assert!(handle.try_exit().is_some());
    }

    #[tokio::test]
    async fn terminate_escalates_to_kill() {
        let handle = EngineHandle::spawn(&sh("trap '' TERM; exec sleep 30")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let started = std::time::Instant::now();
        let info = handle
            .terminate(Duration::from_millis(300))
            .await
            .unwrap();
        assert!(info.code.is_none());
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn terminate_after_exit_returns_status() {
        let handle = EngineHandle::spawn(&sh("exit 0")).unwrap();
        handle.wait().await.unwrap();
        let info = handle.terminate(Duration::from_millis(10)).await.unwrap();
        assert!(info.success);
    }

    #[tokio::test]
    async fn wait_is_shared_between_callers() {
        let handle = EngineHandle::spawn(&sh("sleep 0.1; exit 4")).unwrap();
        let (a, b) = tokio::join!(handle.wait(), handle.wait());
        assert_eq!(a.as_ref().unwrap().code, Some(4));
        assert_eq!(b, a);
        assert_eq!(handle.wait().await, a);
    }

    #[tokio::test]
    async fn kill_by_program_stops_unowned_instances() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("MAA.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let command = EngineCommand::new(&script);
        let handle = ProcessLauncher.launch(&command).unwrap();
        assert_eq!(ProcessLauncher.reap(&command), 1);

        let info = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap()
            .unwrap();
        assert!(!info.success);
        assert_eq!(ProcessLauncher.reap(&command), 0);
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = ProcessLauncher
            .launch(&EngineCommand::new("/nonexistent/MAA.exe"))
            .err()
            .unwrap();
        assert!(matches!(err, DriverError::ProcessSpawn { .. }));
        assert!(err.to_string().contains("/nonexistent/MAA.exe"));
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut handle = EngineHandle::spawn(&sh("pwd").cwd(dir.path())).unwrap();
        let mut output = handle.take_output().unwrap();
        let line = output.recv().await.unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(&line.line).canonicalize().unwrap(),
            expected
        );
    }
}
