use crate::error::{CoreError, Result};
use crate::paths::{self, EngineLayout, ENGINE_EXECUTABLE, ENGINE_LOG_FILE};
use crate::profile::Profile;
use crate::schedule::ScheduleEntry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// EngineSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Engine installation directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default = "default_executable")]
    pub executable: PathBuf,
    #[serde(default = "default_log")]
    pub log: PathBuf,
    /// Extra command-line arguments passed to the engine.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

fn default_executable() -> PathBuf {
    PathBuf::from(ENGINE_EXECUTABLE)
}

fn default_log() -> PathBuf {
    PathBuf::from(ENGINE_LOG_FILE)
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            path: None,
            executable: default_executable(),
            log: default_log(),
            args: Vec::new(),
        }
    }
}

impl EngineSettings {
    pub fn layout(&self) -> Result<EngineLayout> {
        let root = self.path.as_ref().ok_or(CoreError::EngineNotConfigured)?;
        Ok(EngineLayout::new(root)
            .with_executable(&self.executable)
            .with_log(&self.log))
    }
}

// ---------------------------------------------------------------------------
// RetrySettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total launches per run, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub delay_secs: u64,
    /// Retry when the engine stops logging or overruns the attempt timeout.
    #[serde(default = "default_true")]
    pub retry_on_hang: bool,
    /// Retry when the engine reports completion with tasks left unfinished.
    #[serde(default = "default_true")]
    pub retry_on_partial: bool,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_retry_delay() -> u64 {
    3
}

fn default_true() -> bool {
    true
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_retry_delay(),
            retry_on_hang: true,
            retry_on_partial: true,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_emulator_ready")]
    pub emulator_ready_secs: u64,
    #[serde(default = "default_emulator_poll")]
    pub emulator_poll_secs: u64,
    #[serde(default = "default_attempt")]
    pub attempt_minutes: u64,
    #[serde(default = "default_idle")]
    pub idle_minutes: u64,
    #[serde(default = "default_grace")]
    pub termination_grace_secs: u64,
    /// How long to keep reading the log after the engine exits.
    #[serde(default = "default_exit_drain")]
    pub exit_drain_secs: u64,
}

fn default_emulator_ready() -> u64 {
    120
}

fn default_emulator_poll() -> u64 {
    1
}

fn default_attempt() -> u64 {
    60
}

fn default_idle() -> u64 {
    10
}

fn default_grace() -> u64 {
    3
}

fn default_exit_drain() -> u64 {
    2
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            emulator_ready_secs: default_emulator_ready(),
            emulator_poll_secs: default_emulator_poll(),
            attempt_minutes: default_attempt(),
            idle_minutes: default_idle(),
            termination_grace_secs: default_grace(),
            exit_drain_secs: default_exit_drain(),
        }
    }
}

impl TimeoutSettings {
    pub fn emulator_ready(&self) -> Duration {
        Duration::from_secs(self.emulator_ready_secs)
    }

    pub fn emulator_poll(&self) -> Duration {
        Duration::from_secs(self.emulator_poll_secs.max(1))
    }

    pub fn attempt(&self) -> Duration {
        Duration::from_secs(self.attempt_minutes * 60)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_minutes * 60)
    }

    pub fn termination_grace(&self) -> Duration {
        Duration::from_secs(self.termination_grace_secs)
    }

    pub fn exit_drain(&self) -> Duration {
        Duration::from_secs(self.exit_drain_secs)
    }
}

// ---------------------------------------------------------------------------
// MonitorSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_poll_ms")]
    pub poll_interval_ms: u64,
    /// Captured output lines kept for the run report.
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
}

fn default_poll_ms() -> u64 {
    1000
}

fn default_tail_lines() -> usize {
    200
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_ms(),
            tail_lines: default_tail_lines(),
        }
    }
}

impl MonitorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

// ---------------------------------------------------------------------------
// NotifySettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifySettings {
    /// JSON webhook receiving run status updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub auto_hide_ms: u64,
}

// ---------------------------------------------------------------------------
// EmulatorSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmulatorSettings {
    /// ADB address the emulator listens on, e.g. `127.0.0.1:16384`.
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adb_path: Option<PathBuf>,
    /// Program and arguments that start the emulator.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub start_command: Vec<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSettings,
    /// Default ADB address when neither the request nor the profile has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_address: Option<String>,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub notify: NotifySettings,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub emulators: BTreeMap<String, EmulatorSettings>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, Profile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schedules: Vec<ScheduleEntry>,
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(CoreError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile> {
        self.profiles
            .get(name)
            .ok_or_else(|| CoreError::ProfileNotFound(name.to_string()))
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        match &self.engine.path {
            None => error("engine.path is not set".to_string()),
            Some(path) if !path.is_dir() => {
                error(format!("engine.path '{}' is not a directory", path.display()))
            }
            Some(_) => {}
        }

        if self.retry.max_attempts == 0 {
            error("retry.max_attempts must be at least 1".to_string());
        }

        let t = &self.timeouts;
        for (name, value) in [
            ("timeouts.emulator_ready_secs", t.emulator_ready_secs),
            ("timeouts.attempt_minutes", t.attempt_minutes),
            ("timeouts.idle_minutes", t.idle_minutes),
        ] {
            if value == 0 {
                error(format!("{name} must be greater than zero"));
            }
        }

        for (name, emulator) in &self.emulators {
            if emulator.address.trim().is_empty() {
                error(format!("emulator '{name}' has an empty address"));
            }
        }

        for (name, profile) in &self.profiles {
            if let Some(emulator) = &profile.emulator {
                if !self.emulators.contains_key(emulator) {
                    error(format!(
                        "profile '{name}' references unknown emulator '{emulator}'"
                    ));
                }
            }
            if let Err(e) = profile.task_config() {
                error(format!("profile '{name}': {e}"));
            }
        }

        for entry in &self.schedules {
            if !self.profiles.contains_key(&entry.profile) {
                error(format!(
                    "schedule '{}' references unknown profile '{}'",
                    entry.name, entry.profile
                ));
            }
        }

        let mut seen = HashSet::new();
        for entry in &self.schedules {
            if !seen.insert(entry.name.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("duplicate schedule name '{}'", entry.name),
                });
            }
        }

        if self.timeouts.idle_minutes > self.timeouts.attempt_minutes {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "timeouts.idle_minutes exceeds timeouts.attempt_minutes; \
                          the idle timeout will never fire"
                    .to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn errors(warnings: &[ConfigWarning]) -> Vec<&str> {
        warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message.as_str())
            .collect()
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.retry.max_attempts, 4);
        assert_eq!(cfg.timeouts.emulator_ready(), Duration::from_secs(120));
        assert_eq!(cfg.timeouts.attempt(), Duration::from_secs(3600));
        assert_eq!(cfg.timeouts.termination_grace(), Duration::from_secs(3));
        assert_eq!(cfg.engine.executable, PathBuf::from("MAA.exe"));
        assert_eq!(cfg.monitor.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let yaml = r#"
engine:
  path: /opt/maa
connect_address: 127.0.0.1:16384
retry:
  max_attempts: 2
profiles:
  daily:
    tasks: [recruit]
    params:
      stage: 1-7
schedules:
  - name: dawn
    profile: daily
    time: "05:00"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.engine.path, Some(PathBuf::from("/opt/maa")));
        assert_eq!(loaded.retry.max_attempts, 2);
        assert_eq!(loaded.profiles["daily"].tasks, vec!["recruit"]);
        assert_eq!(loaded.schedules[0].name, "dawn");
    }

    #[test]
    fn load_without_file_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(CoreError::NotInitialized)
        ));
    }

    #[test]
    fn layout_requires_engine_path() {
        let cfg = Config::default();
        assert!(matches!(
            cfg.engine.layout(),
            Err(CoreError::EngineNotConfigured)
        ));
    }

    #[test]
    fn validate_clean_config() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.engine.path = Some(dir.path().to_path_buf());
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn validate_reports_dangling_references() {
        let yaml = r#"
profiles:
  p:
    emulator: nope
    params:
      medicine_count: "x"
schedules:
  - name: s
    profile: missing
    time: "01:00"
  - name: s
    profile: p
    time: "02:00"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        let warnings = cfg.validate();
        let errs = errors(&warnings);
        assert!(errs.iter().any(|m| m.contains("engine.path")));
        assert!(errs.iter().any(|m| m.contains("unknown emulator 'nope'")));
        assert!(errs.iter().any(|m| m.contains("medicine_count")));
        assert!(errs.iter().any(|m| m.contains("unknown profile 'missing'")));
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("duplicate")));
    }

    #[test]
    fn validate_zero_attempts() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.engine.path = Some(dir.path().to_path_buf());
        cfg.retry.max_attempts = 0;
        assert!(errors(&cfg.validate())
            .iter()
            .any(|m| m.contains("max_attempts")));
    }
}
