use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use conductor_core::config::{Config, MonitorSettings, TimeoutSettings};
use conductor_core::engine_config::EngineDocuments;
use conductor_core::paths::{self, EngineLayout, ENGINE_GUI_FILE, ENGINE_GUI_NEW_FILE};
use conductor_core::{CoreError, TaskConfig, TaskKind};
use futures::StreamExt;
use tokio::sync::{mpsc, watch, OwnedMutexGuard};
use tokio::time::{sleep, sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::backup::ConfigBackup;
use crate::emulator::{AddressDiscovery, EmulatorControl};
use crate::monitor::{LogMonitor, LogTail};
use crate::notify::{deliver, dispatch, Notification, Notifier};
use crate::policy::{AttemptFailure, RetryPolicy, Verdict};
use crate::process::{EngineCommand, EngineHandle, EngineLauncher, OutputLine};
use crate::session::ExecutionSession;
use crate::state::RunState;
use crate::types::{ExitInfo, FailureReason, LogEvent, RunOutcome, RunReport, TimedEvent};
use crate::DriverError;

// ─── RunRequest ───────────────────────────────────────────────────────────

/// One run to execute: what to run and where.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    /// Free-form name used in logs and reports, usually the profile name.
    pub label: String,
    pub config: TaskConfig,
    pub connect_address: Option<String>,
    /// Configured emulator to check (and start) before launching.
    pub emulator: Option<String>,
}

impl RunRequest {
    pub fn new(label: impl Into<String>, config: TaskConfig) -> Self {
        Self {
            label: label.into(),
            config,
            connect_address: None,
            emulator: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.connect_address = Some(address.into());
        self
    }

    pub fn with_emulator(mut self, id: impl Into<String>) -> Self {
        self.emulator = Some(id.into());
        self
    }

    /// Build the request for a named profile. The profile's own address wins;
    /// the configuration-wide address applies only when the profile names no
    /// emulator.
    pub fn from_profile(name: &str, config: &Config) -> conductor_core::Result<Self> {
        let profile = config.profile(name)?;
        let connect_address = profile.connect_address.clone().or_else(|| {
            if profile.emulator.is_none() {
                config.connect_address.clone()
            } else {
                None
            }
        });
        Ok(Self {
            label: name.to_string(),
            config: profile.task_config()?,
            connect_address,
            emulator: profile.emulator.clone(),
        })
    }
}

// ─── OrchestratorSettings ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub layout: EngineLayout,
    pub engine_args: Vec<String>,
    /// Directory under which per-run config backups are kept.
    pub backup_root: PathBuf,
    pub retry: RetryPolicy,
    pub emulator_ready_timeout: Duration,
    pub emulator_poll: Duration,
    pub attempt_timeout: Duration,
    pub idle_timeout: Duration,
    pub termination_grace: Duration,
    /// How long to keep reading the log after the engine exits.
    pub exit_drain: Duration,
    pub poll_interval: Duration,
    pub tail_lines: usize,
}

impl OrchestratorSettings {
    pub fn new(layout: EngineLayout, backup_root: impl Into<PathBuf>) -> Self {
        let timeouts = TimeoutSettings::default();
        let monitor = MonitorSettings::default();
        Self {
            layout,
            engine_args: Vec::new(),
            backup_root: backup_root.into(),
            retry: RetryPolicy::default(),
            emulator_ready_timeout: timeouts.emulator_ready(),
            emulator_poll: timeouts.emulator_poll(),
            attempt_timeout: timeouts.attempt(),
            idle_timeout: timeouts.idle(),
            termination_grace: timeouts.termination_grace(),
            exit_drain: timeouts.exit_drain(),
            poll_interval: monitor.poll_interval(),
            tail_lines: monitor.tail_lines,
        }
    }

    pub fn from_config(root: &Path, config: &Config) -> conductor_core::Result<Self> {
        let t = &config.timeouts;
        Ok(Self {
            layout: config.engine.layout()?,
            engine_args: config.engine.args.clone(),
            backup_root: paths::backups_dir(root),
            retry: RetryPolicy::from(&config.retry),
            emulator_ready_timeout: t.emulator_ready(),
            emulator_poll: t.emulator_poll(),
            attempt_timeout: t.attempt(),
            idle_timeout: t.idle(),
            termination_grace: t.termination_grace(),
            exit_drain: t.exit_drain(),
            poll_interval: config.monitor.poll_interval(),
            tail_lines: config.monitor.tail_lines,
        })
    }

    fn command(&self) -> EngineCommand {
        EngineCommand::new(self.layout.executable())
            .args(self.engine_args.iter().cloned())
            .cwd(self.layout.root())
    }
}

// ─── Orchestrator ─────────────────────────────────────────────────────────

/// Proof that the caller holds the single run slot. From the moment it is
/// handed out, [`Orchestrator::stop`] cancels the run it is used for.
pub struct RunPermit {
    cancel: CancellationToken,
    registered: Arc<Mutex<Option<CancellationToken>>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        if let Ok(mut current) = self.registered.lock() {
            *current = None;
        }
    }
}

/// How long a finished run waits for its final notification to go out.
const FINAL_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives the engine through complete runs, one at a time.
///
/// A second run requested while one is in progress gets
/// [`RunOutcome::Busy`] and touches nothing. Every run that starts ends with
/// the engine's configuration restored to what it was before.
pub struct Orchestrator {
    settings: OrchestratorSettings,
    launcher: Arc<dyn EngineLauncher>,
    emulator: Option<Arc<dyn EmulatorControl>>,
    discovery: Option<Arc<dyn AddressDiscovery>>,
    notifier: Option<Arc<dyn Notifier>>,
    slot: Arc<tokio::sync::Mutex<()>>,
    state: watch::Sender<RunState>,
    cancel: Arc<Mutex<Option<CancellationToken>>>,
}

impl Orchestrator {
    pub fn new(settings: OrchestratorSettings, launcher: Arc<dyn EngineLauncher>) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            settings,
            launcher,
            emulator: None,
            discovery: None,
            notifier: None,
            slot: Arc::new(tokio::sync::Mutex::new(())),
            state,
            cancel: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_emulator(mut self, emulator: Arc<dyn EmulatorControl>) -> Self {
        self.emulator = Some(emulator);
        self
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn AddressDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Follow state changes of the run slot.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Claim the run slot without waiting.
    pub fn try_acquire(&self) -> Result<RunPermit, DriverError> {
        let guard = Arc::clone(&self.slot)
            .try_lock_owned()
            .map_err(|_| DriverError::Busy)?;
        let cancel = CancellationToken::new();
        if let Ok(mut current) = self.cancel.lock() {
            *current = Some(cancel.clone());
        }
        Ok(RunPermit {
            cancel,
            registered: Arc::clone(&self.cancel),
            _guard: guard,
        })
    }

    /// Run `request` if the slot is free, otherwise report `Busy`.
    pub async fn run(&self, request: RunRequest) -> RunReport {
        match self.try_acquire() {
            Ok(permit) => self.run_with(permit, request).await,
            Err(_) => {
                tracing::info!(label = %request.label, "run rejected: busy");
                RunReport::busy(request.label)
            }
        }
    }

    /// Run `request` in a slot already claimed with
    /// [`try_acquire`](Orchestrator::try_acquire).
    pub async fn run_with(&self, permit: RunPermit, request: RunRequest) -> RunReport {
        let mut run = ActiveRun::new(self, request, permit.cancel.clone());
        tracing::info!(run_id = %run.session.run_id(), label = %run.session.label(), "run started");
        let outcome = run.drive().await;
        let report = run.finish(outcome);
        drop(permit);

        tracing::info!(
            run_id = ?report.run_id,
            attempts = report.attempts,
            outcome = ?report.outcome,
            "run finished"
        );
        deliver(
            self.notifier.as_ref(),
            Notification::new(run_id_text(&report), report.summary()),
            FINAL_NOTIFY_TIMEOUT,
        )
        .await;
        report
    }

    /// Cancel the run in progress. Returns false if there is none.
    pub fn stop(&self) -> bool {
        let Ok(guard) = self.cancel.lock() else {
            return false;
        };
        match guard.as_ref() {
            Some(token) => {
                tracing::info!("stop requested");
                token.cancel();
                true
            }
            None => false,
        }
    }
}

fn run_id_text(report: &RunReport) -> String {
    report
        .run_id
        .map(|id| id.to_string())
        .unwrap_or_default()
}

// ─── ActiveRun ────────────────────────────────────────────────────────────

enum RunSignal {
    Log(TimedEvent),
    Output(OutputLine),
    Exited(ExitInfo),
}

struct ActiveRun<'a> {
    orch: &'a Orchestrator,
    session: ExecutionSession,
    request: RunRequest,
    expected: BTreeSet<String>,
    backup: Option<ConfigBackup>,
    cancel: CancellationToken,
}

impl<'a> ActiveRun<'a> {
    fn new(orch: &'a Orchestrator, request: RunRequest, cancel: CancellationToken) -> Self {
        Self {
            orch,
            session: ExecutionSession::new(request.label.clone(), orch.settings.tail_lines),
            expected: request.config.completion_markers(),
            request,
            backup: None,
            cancel,
        }
    }

    fn enter(&mut self, to: RunState) {
        if let Err(e) = self.session.transition(to) {
            tracing::error!(run_id = %self.session.run_id(), error = %e, "state machine violation");
            return;
        }
        self.orch.state.send_replace(to);
    }

    fn fail(&mut self, reason: FailureReason) -> RunOutcome {
        tracing::warn!(run_id = %self.session.run_id(), %reason, "run failed");
        self.enter(RunState::Failed);
        RunOutcome::Failed { reason }
    }

    fn notify(&self, text: String) {
        dispatch(
            self.orch.notifier.as_ref(),
            Notification::new(self.session.run_id().to_string(), text),
        );
    }

    /// Everything from `Preparing` up to `Completed` or `Failed`.
    async fn drive(&mut self) -> RunOutcome {
        let orch = self.orch;
        let settings = &orch.settings;
        self.enter(RunState::Preparing);

        let mut address = match self.resolve_address().await {
            Ok(address) => address,
            Err(reason) => return self.fail(reason),
        };
        if let Err(e) = self.snapshot() {
            return self.fail(config_io("backup", e));
        }
        if let Err(e) = self.stage(address.as_deref()) {
            return self.fail(config_io("write", e));
        }

        self.enter(RunState::EmulatorCheck);
        if let Some(id) = self.request.emulator.clone() {
            match self.await_emulator(&id).await {
                Ok(found) => {
                    if address.as_deref() != Some(found.as_str()) {
                        address = Some(found);
                        if let Err(e) = self.stage(address.as_deref()) {
                            return self.fail(config_io("write", e));
                        }
                    }
                }
                Err(reason) => return self.fail(reason),
            }
        }

        let command = settings.command();
        loop {
            if self.cancel.is_cancelled() {
                return self.fail(FailureReason::Cancelled);
            }
            self.enter(RunState::Launching);
            let attempt = self.session.begin_attempt();
            if attempt > 1 {
                self.notify(format!(
                    "{}: attempt {attempt} of {}",
                    self.request.label, settings.retry.max_attempts
                ));
            }

            let log_path = settings.layout.log_file();
            let tail = match LogTail::at_end(&log_path).await {
                Ok(tail) => tail,
                Err(e) => {
                    return self.fail(FailureReason::ConfigIo {
                        message: format!("engine log {}: {e}", log_path.display()),
                    })
                }
            };
            self.reap(&command).await;
            let mut handle = match orch.launcher.launch(&command) {
                Ok(handle) => handle,
                Err(e) => {
                    return self.fail(FailureReason::ProcessSpawn {
                        message: e.to_string(),
                    })
                }
            };
            self.enter(RunState::Running);

            let result = self.supervise(&mut handle, tail).await;
            if handle.terminate(settings.termination_grace).await.is_err() {
                return self.fail(FailureReason::SupervisorLeak { pid: handle.pid() });
            }
            self.reap(&command).await;

            let failure = match result {
                Ok(()) => {
                    self.enter(RunState::Completed);
                    return RunOutcome::Succeeded;
                }
                Err(failure) => failure,
            };

            self.enter(RunState::Retrying);
            match settings.retry.verdict(attempt, &failure) {
                Verdict::GiveUp => return self.fail(failure.reason()),
                Verdict::Retry { delay } => {
                    tracing::warn!(
                        run_id = %self.session.run_id(),
                        attempt,
                        %failure,
                        "attempt failed, retrying"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return self.fail(FailureReason::Cancelled),
                        _ = sleep(delay) => {}
                    }
                    // The engine may have rewritten its config while running.
                    if let Err(e) = self.stage(address.as_deref()) {
                        return self.fail(config_io("write", e));
                    }
                }
            }
        }
    }

    /// Kill engine processes outside the attempt's handle.
    async fn reap(&self, command: &EngineCommand) {
        let launcher = Arc::clone(&self.orch.launcher);
        let command = command.clone();
        match tokio::task::spawn_blocking(move || launcher.reap(&command)).await {
            Ok(0) => {}
            Ok(killed) => tracing::warn!(
                run_id = %self.session.run_id(),
                killed,
                "killed leftover engine processes"
            ),
            Err(e) => tracing::warn!(error = %e, "leftover engine sweep failed"),
        }
    }

    /// Restore the engine config if it was touched and return to `Idle`.
    fn finish(mut self, outcome: RunOutcome) -> RunReport {
        let mut restore_error = None;
        if let Some(mut backup) = self.backup.take() {
            self.enter(RunState::Restoring);
            if let Err(e) = backup.restore() {
                tracing::error!(
                    run_id = %self.session.run_id(),
                    backup = %backup.store_dir().display(),
                    error = %e,
                    "failed to restore engine config"
                );
                restore_error = Some(e.to_string());
            }
        }
        self.enter(RunState::Idle);
        self.session.into_report(outcome, restore_error)
    }

    /// Request address first, then discovery, then whatever the engine is
    /// already configured with. A run bound to an emulator may defer the
    /// address to the emulator check.
    async fn resolve_address(&self) -> Result<Option<String>, FailureReason> {
        if let Some(address) = &self.request.connect_address {
            return Ok(Some(address.clone()));
        }
        if self.request.emulator.is_some() {
            return Ok(None);
        }
        if let Some(discovery) = &self.orch.discovery {
            match discovery.discover().await {
                Ok(Some(address)) => {
                    tracing::info!(%address, "discovered device address");
                    return Ok(Some(address));
                }
                Ok(None) => tracing::debug!("discovery found no device"),
                Err(e) => tracing::warn!(error = %e, "address discovery failed"),
            }
        }
        let existing = EngineDocuments::load(&self.orch.settings.layout)
            .ok()
            .and_then(|docs| docs.connect_address().map(str::to_string))
            .filter(|address| !address.is_empty());
        match existing {
            Some(address) => Ok(Some(address)),
            None => Err(FailureReason::AddressUnresolved),
        }
    }

    fn snapshot(&mut self) -> conductor_core::Result<()> {
        let layout = &self.orch.settings.layout;
        let store = self
            .orch
            .settings
            .backup_root
            .join(self.session.run_id().to_string());
        let staged = [
            PathBuf::from(ENGINE_GUI_FILE),
            PathBuf::from(ENGINE_GUI_NEW_FILE),
        ];
        self.backup = Some(ConfigBackup::snapshot(
            &layout.config_dir(),
            &store,
            &staged,
        )?);
        Ok(())
    }

    fn stage(&self, address: Option<&str>) -> conductor_core::Result<()> {
        let layout = &self.orch.settings.layout;
        let mut docs = EngineDocuments::load(layout)?;
        docs.apply(&self.request.config, address)?;
        docs.save(layout)?;
        tracing::debug!(address = ?address, "engine config staged");
        Ok(())
    }

    async fn await_emulator(&self, id: &str) -> Result<String, FailureReason> {
        let settings = &self.orch.settings;
        let Some(control) = self.orch.emulator.clone() else {
            return Err(FailureReason::EmulatorUnavailable {
                message: format!("no emulator control available for '{id}'"),
            });
        };
        let unavailable = |e: DriverError| FailureReason::EmulatorUnavailable {
            message: e.to_string(),
        };

        let not_ready = || FailureReason::EmulatorUnavailable {
            message: format!(
                "emulator '{id}' not ready after {:?}",
                settings.emulator_ready_timeout
            ),
        };

        // Every call into the control is bounded by the same deadline.
        let deadline = Instant::now() + settings.emulator_ready_timeout;
        let mut start_requested = false;
        loop {
            let running = tokio::select! {
                _ = self.cancel.cancelled() => return Err(FailureReason::Cancelled),
                checked = timeout_at(deadline, control.is_running(id)) => match checked {
                    Ok(running) => running.map_err(unavailable)?,
                    Err(_) => return Err(not_ready()),
                },
            };
            match running {
                Some(address) => {
                    tracing::info!(emulator = id, %address, "emulator ready");
                    return Ok(address);
                }
                None if !start_requested => {
                    tracing::info!(emulator = id, "emulator not running, starting");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(FailureReason::Cancelled),
                        started = timeout_at(deadline, control.start(id)) => match started {
                            Ok(started) => started.map_err(unavailable)?,
                            Err(_) => return Err(not_ready()),
                        },
                    }
                    start_requested = true;
                }
                None => {}
            }
            if Instant::now() >= deadline {
                return Err(not_ready());
            }
            let next_check = (Instant::now() + settings.emulator_poll).min(deadline);
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(FailureReason::Cancelled),
                _ = sleep_until(next_check) => {}
            }
        }
    }

    /// Watch one launched engine until it finishes its queue or fails.
    async fn supervise(
        &mut self,
        handle: &mut EngineHandle,
        tail: LogTail,
    ) -> Result<(), AttemptFailure> {
        let orch = self.orch;
        let settings = &orch.settings;
        let cancel = self.cancel.clone();
        let (tx, mut rx) = mpsc::channel::<RunSignal>(256);

        let mut events = LogMonitor::spawn(tail, settings.poll_interval);
        let log_tx = tx.clone();
        let log_forwarder = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if log_tx.send(RunSignal::Log(event)).await.is_err() {
                    break;
                }
            }
        });

        if let Some(mut output) = handle.take_output() {
            let out_tx = tx.clone();
            tokio::spawn(async move {
                while let Some(line) = output.recv().await {
                    if out_tx.send(RunSignal::Output(line)).await.is_err() {
                        break;
                    }
                }
            });
        }

        let mut exit = handle.exit_watch();
        tokio::spawn(async move {
            let info = match exit.wait_for(Option::is_some).await {
                Ok(info) => info.clone(),
                Err(_) => None,
            };
            if let Some(info) = info {
                let _ = tx.send(RunSignal::Exited(info)).await;
            }
        });

        let started = Instant::now();
        let attempt_deadline = started + settings.attempt_timeout;
        let mut idle_deadline = started + settings.idle_timeout;
        let mut exited: Option<(ExitInfo, Instant)> = None;

        let result = loop {
            let drain_deadline = exited.as_ref().map(|(_, at)| *at);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(AttemptFailure::Cancelled),
                signal = rx.recv() => match signal {
                    Some(RunSignal::Log(event)) => {
                        if event.event.counts_as_activity() {
                            idle_deadline = Instant::now() + settings.idle_timeout;
                        }
                        if let Some(done) = self.observe(&event) {
                            break done;
                        }
                    }
                    Some(RunSignal::Output(line)) => {
                        self.session
                            .record_line(format!("[{}] {}", line.stream.as_str(), line.line));
                    }
                    Some(RunSignal::Exited(info)) if info.success => {
                        // The executable may only be a launcher for the GUI
                        // that writes the log; keep following the log.
                        tracing::info!(%info, "engine launcher exited, following log");
                    }
                    Some(RunSignal::Exited(info)) => {
                        tracing::debug!(%info, "engine exited, draining log");
                        exited = Some((info, Instant::now() + settings.exit_drain));
                    }
                    None => break Err(early_exit(exited.take())),
                },
                _ = sleep_until(idle_deadline) => {
                    break Err(AttemptFailure::Idle(settings.idle_timeout));
                }
                _ = sleep_until(attempt_deadline) => {
                    break Err(AttemptFailure::Overran(settings.attempt_timeout));
                }
                _ = sleep_until(drain_deadline.unwrap_or(attempt_deadline)), if drain_deadline.is_some() => {
                    break Err(early_exit(exited.take()));
                }
            }
        };

        log_forwarder.abort();
        result
    }

    /// Apply one log event. Returns the attempt result once it is decided.
    fn observe(&mut self, event: &TimedEvent) -> Option<Result<(), AttemptFailure>> {
        self.session.record_event(event);
        let run_id = self.session.run_id();
        match &event.event {
            LogEvent::TaskStarted { task } => {
                tracing::debug!(%run_id, task = %task, "task started");
                None
            }
            LogEvent::TaskFinished { task } => {
                tracing::info!(%run_id, task = %task, "task finished");
                self.session.all_finished(&self.expected).then_some(Ok(()))
            }
            LogEvent::TaskFailed { task, reason } => {
                tracing::warn!(%run_id, task = %task, reason = %reason, "task failed");
                (task == TaskKind::StartUp.display_name()).then(|| {
                    Err(AttemptFailure::TaskFatal {
                        task: task.clone(),
                        reason: reason.clone(),
                    })
                })
            }
            LogEvent::EngineIdle => {
                let missing = self.session.unfinished(&self.expected);
                if missing.is_empty() {
                    Some(Ok(()))
                } else {
                    Some(Err(AttemptFailure::Incomplete(missing)))
                }
            }
            LogEvent::EngineCrashed { reason } => Some(Err(AttemptFailure::Crashed(*reason))),
            LogEvent::Unrecognized { .. } => None,
        }
    }
}

fn early_exit(exited: Option<(ExitInfo, Instant)>) -> AttemptFailure {
    AttemptFailure::Exited(exited.map(|(info, _)| info).unwrap_or(ExitInfo {
        code: None,
        success: false,
    }))
}

fn config_io(action: &'static str, source: CoreError) -> FailureReason {
    FailureReason::ConfigIo {
        message: DriverError::ConfigIo { action, source }.to_string(),
    }
}
