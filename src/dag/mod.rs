// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] builds an index-based graph over any [`DagNode`] slice and
//!   orders it topologically.
//! - [`state`] is the `to_run` / `running` / `completed` partition of one run.
//! - [`scheduler`] is the generic poll loop, parameterised by a
//!   [`SchedulePolicy`] that says what submitting and completing mean.
//! - [`scheduler_step`] defines the per-round report types.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state;

pub use graph::{DagGraph, DagNode};
pub use scheduler::{BoxFuture, DEFAULT_POLL_INTERVAL, ScheduleOptions, SchedulePolicy, Scheduler};
pub use scheduler_step::{RoundReport, ScheduleReport};
pub use state::{NodeState, RunState};
