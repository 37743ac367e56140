pub mod build;
pub mod config;
pub mod discover;
pub mod init;
pub mod run;
pub mod schedule;

use anyhow::Context;
use clap::Args;
use conductor_core::config::Config;
use conductor_core::params::parse_assignment;
use conductor_core::{Params, TaskConfig};
use maa_driver::emulator::{AdbDiscovery, AdbEmulator};
use maa_driver::notify::{Notifier, TracingNotifier, WebhookNotifier};
use maa_driver::{Orchestrator, OrchestratorSettings, ProcessLauncher, RunRequest};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Inline task selection
// ---------------------------------------------------------------------------

#[derive(Args, Debug, Default, Clone)]
pub struct TaskArgs {
    /// Task to enable, by display or engine name (repeatable)
    #[arg(long = "task", short = 't', value_name = "TASK")]
    pub tasks: Vec<String>,

    /// Run parameter as key=value; the value is read as JSON when it parses
    #[arg(long = "param", short = 'p', value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    parse_assignment(raw).ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

impl TaskArgs {
    pub fn params(&self) -> Params {
        self.params.iter().cloned().collect()
    }

    pub fn task_config(&self) -> conductor_core::Result<TaskConfig> {
        TaskConfig::builder(&self.params())
            .tasks(self.tasks.iter().cloned())
            .build()
    }
}

/// What a command should build: a named profile or inline tasks.
pub enum Target {
    Profile(String),
    Inline(TaskArgs),
}

impl Target {
    pub fn new(profile: Option<String>, tasks: TaskArgs) -> Self {
        match profile {
            Some(name) => Target::Profile(name),
            None => Target::Inline(tasks),
        }
    }

    /// Turn the target into a run request. Inline targets fall back to the
    /// configuration-wide address.
    pub fn request(&self, config: &Config) -> anyhow::Result<RunRequest> {
        match self {
            Target::Profile(name) => RunRequest::from_profile(name, config)
                .with_context(|| format!("failed to build profile '{name}'")),
            Target::Inline(args) => {
                let task_config = args
                    .task_config()
                    .context("failed to build task configuration")?;
                let mut request = RunRequest::new("inline", task_config);
                request.connect_address = config.connect_address.clone();
                Ok(request)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator wiring
// ---------------------------------------------------------------------------

/// Orchestrator over the real engine, adb and the configured notifier.
pub fn orchestrator(root: &Path, config: &Config) -> anyhow::Result<Orchestrator> {
    let settings =
        OrchestratorSettings::from_config(root, config).context("invalid engine settings")?;

    let notifier: Arc<dyn Notifier> = match &config.notify.webhook_url {
        Some(url) => Arc::new(
            WebhookNotifier::new(url.clone(), config.notify.auto_hide_ms)
                .context("failed to create webhook notifier")?,
        ),
        None => Arc::new(TracingNotifier),
    };

    let adb = config
        .emulators
        .values()
        .find_map(|e| e.adb_path.clone());

    Ok(Orchestrator::new(settings, Arc::new(ProcessLauncher))
        .with_emulator(Arc::new(AdbEmulator::new(config.emulators.clone())))
        .with_discovery(Arc::new(AdbDiscovery::new(adb)))
        .with_notifier(notifier))
}

pub fn load_config(root: &Path) -> anyhow::Result<Config> {
    Config::load(root).context("failed to load .conductor/config.yaml")
}
