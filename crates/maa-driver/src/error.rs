use conductor_core::CoreError;
use thiserror::Error;

use crate::state::RunState;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("a run is already in progress")]
    Busy,

    #[error("engine config {action} failed: {source}")]
    ConfigIo {
        action: &'static str,
        #[source]
        source: CoreError,
    },

    #[error("no device address: none configured and discovery found nothing")]
    AddressUnresolved,

    #[error("emulator unavailable: {0}")]
    EmulatorUnavailable(String),

    #[error("failed to start {program}: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine process {pid} did not exit after being killed")]
    SupervisorTermination { pid: u32 },

    #[error("invalid run transition from {from} to {to}")]
    InvalidTransition { from: RunState, to: RunState },

    #[error("notification failed: {0}")]
    Notification(String),
}
