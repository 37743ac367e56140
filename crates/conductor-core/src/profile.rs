use crate::error::Result;
use crate::params::Params;
use crate::task_config::TaskConfig;
use serde::{Deserialize, Serialize};

/// A named, persisted run target. Schedules refer to profiles by name and
/// `conductor run --profile` executes one directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tasks requested by name. Parameters may imply further tasks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<String>,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub params: Params,
    /// Overrides the top-level `connect_address`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_address: Option<String>,
    /// Key into `emulators`; when set the emulator is checked (and started)
    /// before the engine launches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emulator: Option<String>,
}

impl Profile {
    pub fn task_config(&self) -> Result<TaskConfig> {
        TaskConfig::builder(&self.params)
            .tasks(self.tasks.iter().cloned())
            .build()
    }
}
