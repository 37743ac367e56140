//! `maa-driver` is the async half of maa-conductor.
//!
//! Drives the MAA engine through complete runs: stage a configuration,
//! launch the engine against a device, follow its log to decide progress,
//! retry transient failures and put the engine's configuration back.
//!
//! # Architecture
//!
//! ```text
//! Scheduler ──┐        (minute ticks, drops fires while busy)
//!             ▼
//! Orchestrator          ← single run slot, RunState machine
//!     │  ConfigBackup   ← snapshot / restore of <engine>/config
//!     │  EmulatorControl, AddressDiscovery (adb)
//!     ▼
//! EngineHandle          ← child process, exit watch, terminate → kill
//!     │
//! LogMonitor            ← LogTail polling, rotation-safe
//!     │
//!     ▼
//! parse_line → LogEvent ← task boundaries, crash signatures
//! ```
//!
//! ```rust,ignore
//! use maa_driver::{Orchestrator, OrchestratorSettings, ProcessLauncher, RunRequest};
//! use std::sync::Arc;
//!
//! let settings = OrchestratorSettings::from_config(&root, &config)?;
//! let orchestrator = Orchestrator::new(settings, Arc::new(ProcessLauncher));
//! let report = orchestrator.run(RunRequest::from_profile("daily", &config)?).await;
//! println!("{}", report.summary());
//! ```

pub mod backup;
pub mod emulator;
pub mod error;
pub mod monitor;
pub mod notify;
pub mod orchestrator;
pub mod parse;
pub mod policy;
pub mod process;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod types;

pub use error::DriverError;
pub use orchestrator::{Orchestrator, OrchestratorSettings, RunPermit, RunRequest};
pub use process::{EngineCommand, EngineHandle, EngineLauncher, ProcessLauncher};
pub use scheduler::{FireOutcome, Scheduler};
pub use state::RunState;
pub use types::{FailureReason, LogEvent, RunOutcome, RunReport};

pub type Result<T> = std::result::Result<T, DriverError>;
