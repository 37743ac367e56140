use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use conductor_core::config::Config;
use conductor_core::schedule::ScheduleEntry;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{Orchestrator, RunRequest};
use crate::types::RunReport;

// ─── Scheduler ────────────────────────────────────────────────────────────

/// What happened to one due schedule entry on a tick.
#[derive(Debug)]
pub enum FireOutcome {
    /// The run was started in the background.
    Started {
        entry: String,
        run: JoinHandle<RunReport>,
    },
    /// Another run held the slot; this fire is dropped.
    Missed { entry: String },
    /// The entry's profile could not be turned into a run.
    Invalid { entry: String, error: String },
}

impl FireOutcome {
    pub fn entry(&self) -> &str {
        match self {
            FireOutcome::Started { entry, .. }
            | FireOutcome::Missed { entry }
            | FireOutcome::Invalid { entry, .. } => entry,
        }
    }
}

/// Fires schedule entries at their wall-clock minute, at most once per entry
/// per day. Fires never queue: if a run is in progress the fire is dropped.
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    entries: Vec<ScheduleEntry>,
    /// Requests keyed by profile name, or the reason a profile is unusable.
    targets: BTreeMap<String, Result<RunRequest, String>>,
    last_fired: HashMap<String, NaiveDate>,
}

impl Scheduler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        entries: Vec<ScheduleEntry>,
        targets: BTreeMap<String, Result<RunRequest, String>>,
    ) -> Self {
        Self {
            orchestrator,
            entries,
            targets,
            last_fired: HashMap::new(),
        }
    }

    /// Scheduler over the configuration's schedules and profiles.
    pub fn from_config(orchestrator: Arc<Orchestrator>, config: &Config) -> Self {
        let targets = config
            .schedules
            .iter()
            .map(|entry| {
                let request = RunRequest::from_profile(&entry.profile, config)
                    .map_err(|e| e.to_string());
                (entry.profile.clone(), request)
            })
            .collect();
        Self::new(orchestrator, config.schedules.clone(), targets)
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Fire every entry due at `now`.
    pub fn tick(&mut self, now: NaiveDateTime) -> Vec<FireOutcome> {
        let today = now.date();
        let mut outcomes = Vec::new();

        for entry in &self.entries {
            if !entry.matches(now) || self.last_fired.get(&entry.name) == Some(&today) {
                continue;
            }
            self.last_fired.insert(entry.name.clone(), today);

            let request = match self.targets.get(&entry.profile) {
                Some(Ok(request)) => request.clone(),
                Some(Err(error)) => {
                    tracing::error!(
                        entry = %entry.name,
                        profile = %entry.profile,
                        %error,
                        "schedule target invalid"
                    );
                    outcomes.push(FireOutcome::Invalid {
                        entry: entry.name.clone(),
                        error: error.clone(),
                    });
                    continue;
                }
                None => {
                    let error = format!("profile not found: {}", entry.profile);
                    tracing::error!(entry = %entry.name, %error, "schedule target missing");
                    outcomes.push(FireOutcome::Invalid {
                        entry: entry.name.clone(),
                        error,
                    });
                    continue;
                }
            };

            match self.orchestrator.try_acquire() {
                Ok(permit) => {
                    tracing::info!(entry = %entry.name, profile = %entry.profile, "schedule fired");
                    let orchestrator = Arc::clone(&self.orchestrator);
                    let run =
                        tokio::spawn(async move { orchestrator.run_with(permit, request).await });
                    outcomes.push(FireOutcome::Started {
                        entry: entry.name.clone(),
                        run,
                    });
                }
                Err(_) => {
                    tracing::warn!(
                        entry = %entry.name,
                        "schedule fire missed: a run is in progress"
                    );
                    outcomes.push(FireOutcome::Missed {
                        entry: entry.name.clone(),
                    });
                }
            }
        }
        outcomes
    }

    /// Tick now and then at the start of every minute until `cancel` fires.
    ///
    /// On cancel the run in progress, if any, is stopped and awaited, so its
    /// engine is terminated and its configuration restored before this
    /// returns.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(entries = self.entries.len(), "scheduler started");
        let mut runs: JoinSet<(String, Result<RunReport, JoinError>)> = JoinSet::new();
        loop {
            for outcome in self.tick(Local::now().naive_local()) {
                if let FireOutcome::Started { entry, run } = outcome {
                    runs.spawn(async move { (entry, run.await) });
                }
            }
            let next_minute = tokio::time::sleep(until_next_minute(Local::now().naive_local()));
            tokio::pin!(next_minute);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.shutdown(runs).await;
                        tracing::info!("scheduler stopped");
                        return;
                    }
                    Some(joined) = runs.join_next(), if !runs.is_empty() => log_finished(joined),
                    _ = &mut next_minute => break,
                }
            }
        }
    }

    async fn shutdown(&self, mut runs: JoinSet<(String, Result<RunReport, JoinError>)>) {
        if runs.is_empty() {
            return;
        }
        tracing::info!(runs = runs.len(), "stopping scheduled runs");
        self.orchestrator.stop();
        while let Some(joined) = runs.join_next().await {
            log_finished(joined);
        }
    }
}

fn log_finished(joined: Result<(String, Result<RunReport, JoinError>), JoinError>) {
    match joined {
        Ok((entry, Ok(report))) => tracing::info!(entry = %entry, "{}", report.summary()),
        Ok((entry, Err(e))) => {
            tracing::error!(entry = %entry, error = %e, "scheduled run panicked")
        }
        Err(e) => tracing::error!(error = %e, "scheduled run lost"),
    }
}

/// Time until just past the next minute boundary.
fn until_next_minute(now: NaiveDateTime) -> Duration {
    let into_minute = Duration::from_secs(u64::from(now.second()))
        + Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));
    Duration::from_secs(60).saturating_sub(into_minute) + Duration::from_millis(50)
}
