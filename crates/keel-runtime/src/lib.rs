//! Minimal durable execution substrate for agent runs.
//!
//! Provides the capabilities the engine requires of its host: named substeps
//! whose outputs are journaled and replayed on retry, run-level retry over a
//! shared journal, a per-session singleton supervisor with cancel-on-new
//! semantics, an in-process event bus, and a cron trigger.

pub mod bus;
pub mod cron;
pub mod error;
pub mod executor;
pub mod journal;
pub mod step;
pub mod supervisor;

pub use bus::{BusEvent, EventBus};
pub use error::{Result, RuntimeError};
pub use executor::Executor;
pub use step::StepContext;
pub use supervisor::SessionSupervisor;
