use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Project constants
// ---------------------------------------------------------------------------

pub const CONDUCTOR_DIR: &str = ".conductor";
pub const CONFIG_FILE: &str = ".conductor/config.yaml";
pub const BACKUPS_DIR: &str = ".conductor/backups";

// ---------------------------------------------------------------------------
// Engine constants
// ---------------------------------------------------------------------------

pub const ENGINE_EXECUTABLE: &str = "MAA.exe";
pub const ENGINE_CONFIG_DIR: &str = "config";
pub const ENGINE_GUI_FILE: &str = "gui.json";
pub const ENGINE_GUI_NEW_FILE: &str = "gui.new.json";
pub const ENGINE_LOG_FILE: &str = "debug/gui.log";

// ---------------------------------------------------------------------------
// Project path helpers
// ---------------------------------------------------------------------------

pub fn conductor_dir(root: &Path) -> PathBuf {
    root.join(CONDUCTOR_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn backups_dir(root: &Path) -> PathBuf {
    root.join(BACKUPS_DIR)
}

// ---------------------------------------------------------------------------
// EngineLayout
// ---------------------------------------------------------------------------

/// Locations of the files the conductor reads and writes inside an engine
/// installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLayout {
    root: PathBuf,
    executable: PathBuf,
    log: PathBuf,
}

impl EngineLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            executable: PathBuf::from(ENGINE_EXECUTABLE),
            log: PathBuf::from(ENGINE_LOG_FILE),
        }
    }

    /// Override the executable, relative to the engine root unless absolute.
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Override the log file, relative to the engine root unless absolute.
    pub fn with_log(mut self, log: impl Into<PathBuf>) -> Self {
        self.log = log.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn executable(&self) -> PathBuf {
        self.root.join(&self.executable)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join(ENGINE_CONFIG_DIR)
    }

    pub fn gui_json(&self) -> PathBuf {
        self.config_dir().join(ENGINE_GUI_FILE)
    }

    pub fn gui_new_json(&self) -> PathBuf {
        self.config_dir().join(ENGINE_GUI_NEW_FILE)
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join(&self.log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_defaults() {
        let layout = EngineLayout::new("/opt/maa");
        assert_eq!(layout.executable(), PathBuf::from("/opt/maa/MAA.exe"));
        assert_eq!(layout.gui_json(), PathBuf::from("/opt/maa/config/gui.json"));
        assert_eq!(
            layout.gui_new_json(),
            PathBuf::from("/opt/maa/config/gui.new.json")
        );
        assert_eq!(layout.log_file(), PathBuf::from("/opt/maa/debug/gui.log"));
    }

    #[test]
    fn absolute_overrides_replace_root() {
        let layout = EngineLayout::new("/opt/maa")
            .with_executable("/usr/bin/maa")
            .with_log("logs/run.log");
        assert_eq!(layout.executable(), PathBuf::from("/usr/bin/maa"));
        assert_eq!(layout.log_file(), PathBuf::from("/opt/maa/logs/run.log"));
    }
}
