//! Domain types shared by every crate of the image generator agent.
//!
//! - [`step`]: task step records, status and the outbound step update.
//! - [`task_log`]: log entries attached to a task.
//! - [`artifact`]: the in-memory image produced for a step.
//! - [`prompt`]: character prompt extraction and prompt templates.

pub mod artifact;
pub mod error;
pub mod prompt;
pub mod step;
pub mod task_log;
pub mod types;

pub use artifact::Artifact;
pub use error::CoreError;
pub use step::{StepRef, StepStatus, StepUpdate, TaskStep};
pub use task_log::{LogLevel, TaskLog};
