// src/submit/mod.rs

//! Batch backends.
//!
//! A [`JobSubmitter`] hands a batch of jobs to some execution environment and
//! later answers whether an individual job has finished. The scheduler never
//! looks inside a backend; it only drives these two calls.
//!
//! - [`local`] runs jobs as child processes, bounded by a nested scheduler.
//! - [`condor`] submits one DAGMan file per batch.
//! - [`torque`] submits jobs one at a time with `afterok` dependencies.
//! - [`command`] is the seam over external CLIs, so tests can script replies.
//! - [`retry`] is the bounded exponential backoff used around flaky CLIs.

pub mod command;
pub mod condor;
pub mod local;
pub mod retry;
pub mod torque;

use crate::dag::BoxFuture;
use crate::errors::Result;
use crate::task::Job;

pub use command::{CommandRunner, RealCommandRunner};
pub use condor::CondorJobSubmitter;
pub use local::{DEFAULT_MAX_CONCURRENT_JOBS, LocalJobSubmitter};
pub use retry::RetryPolicy;
pub use torque::TorqueJobSubmitter;

/// Backend adapter for one execution environment.
pub trait JobSubmitter: Send {
    /// Start every job in `jobs`, recording on each job whatever
    /// [`JobSubmitter::is_complete`] needs later. An empty batch is a no-op.
    ///
    /// `dagname` labels the batch on backends that have such a notion.
    fn submit<'a>(
        &'a mut self,
        jobs: &'a mut [Job],
        dagname: Option<&'a str>,
    ) -> BoxFuture<'a, Result<()>>;

    /// Whether `job` has finished. Only queries; never changes backend state.
    fn is_complete<'a>(&'a mut self, job: &'a mut Job) -> BoxFuture<'a, Result<bool>>;
}
