// src/task/mod.rs

//! Units of work handed to the scheduler.
//!
//! - [`settings`] holds per-job resource requests and the per-task registry.
//! - [`script`] renders the shell wrapper every command-based job runs.
//! - [`job`] is a concrete, submittable unit with its submission record.
//! - [`definition`] is a named task that lazily expands into jobs.

pub mod definition;
pub mod job;
pub mod script;
pub mod settings;

pub use definition::{JobGenerator, Task};
pub use job::{Job, JobPayload, Submission};
pub use script::ScriptLayout;
pub use settings::{JobSettings, SettingsRegistry};
