// src/engine/mod.rs

//! Orchestration on top of the generic scheduler.
//!
//! - [`task_scheduler`] specialises the scheduler for tasks: submitting a
//!   task submits its jobs through a [`JobSubmitter`](crate::submit::JobSubmitter).
//! - [`plan`] turns a validated plan file into tasks and narrows them for
//!   `--only`.
//! - [`driver`] picks the backend at runtime.

pub mod driver;
pub mod plan;
pub mod task_scheduler;

pub use driver::Driver;
pub use plan::{build_plan, fan_out_jobs, select_tasks};
pub use task_scheduler::TaskScheduler;
