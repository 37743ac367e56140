//! `conductor-core` is the synchronous half of maa-conductor.
//!
//! Everything here is pure data and file I/O: the engine's task catalogue,
//! parameter coercion, the [`TaskConfig`] builder, the engine's GUI
//! configuration documents, profiles, schedules and the project settings
//! file. The async runtime that actually drives the engine lives in
//! `maa-driver`.

pub mod config;
pub mod engine_config;
pub mod error;
pub mod io;
pub mod params;
pub mod paths;
pub mod profile;
pub mod schedule;
pub mod task;
pub mod task_config;
pub mod task_params;

pub use error::{CoreError, Result};
pub use params::Params;
pub use task::TaskKind;
pub use task_config::TaskConfig;
