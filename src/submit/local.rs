// src/submit/local.rs

use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::dag::{BoxFuture, RunState, ScheduleOptions, SchedulePolicy, Scheduler};
use crate::errors::{BatchdagError, Result};
use crate::fs::FileSystem;
use crate::submit::JobSubmitter;
use crate::task::{Job, Submission};

/// Job-level concurrency bound used when none is configured.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

/// Runs each job as `bash <script>` on this machine.
///
/// `submit` schedules the whole batch through a nested [`Scheduler`] (job
/// prerequisites honoured, at most `max_concurrent` children alive) and only
/// returns once every child has exited. A job counts as complete as soon as
/// its process has exited, whatever the exit code; failures are logged.
#[derive(Debug, Clone)]
pub struct LocalJobSubmitter {
    fs: Arc<dyn FileSystem>,
    options: ScheduleOptions,
}

impl LocalJobSubmitter {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            options: ScheduleOptions::default()
                .with_max_concurrent(Some(DEFAULT_MAX_CONCURRENT_JOBS)),
        }
    }

    /// Options for the nested job-level loop (bound, poll interval,
    /// deadline, cancellation).
    pub fn with_options(mut self, options: ScheduleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ScheduleOptions {
        &self.options
    }
}

impl JobSubmitter for LocalJobSubmitter {
    fn submit<'a>(
        &'a mut self,
        jobs: &'a mut [Job],
        dagname: Option<&'a str>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if jobs.is_empty() {
                return Ok(());
            }

            let scheduler = Scheduler::new(self.options.clone());
            let mut policy = LocalJobPolicy {
                fs: self.fs.as_ref(),
            };
            let report = scheduler.schedule(jobs, &mut policy).await?;

            info!(
                batch = dagname.unwrap_or("-"),
                jobs = report.completion_order.len(),
                "local batch finished"
            );
            Ok(())
        })
    }

    fn is_complete<'a>(&'a mut self, job: &'a mut Job) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { poll_child(job) })
    }
}

/// Job-level policy: spawn on submit, `try_wait` on poll, finish only when
/// nothing is left to run or running.
struct LocalJobPolicy<'f> {
    fs: &'f dyn FileSystem,
}

impl SchedulePolicy<Job> for LocalJobPolicy<'_> {
    fn submit<'a>(&'a mut self, job: &'a mut Job) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { spawn_job(self.fs, job) })
    }

    fn is_complete<'a>(&'a mut self, job: &'a mut Job) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { poll_child(job) })
    }

    fn is_finished(&self, state: &RunState) -> bool {
        state.to_run().is_empty() && state.running().is_empty()
    }
}

fn spawn_job(fs: &dyn FileSystem, job: &mut Job) -> Result<()> {
    let script = job.executable(fs)?;
    let child = Command::new("bash")
        .arg(&script)
        .spawn()
        .map_err(|e| BatchdagError::CommandFailed {
            program: "bash".to_string(),
            code: None,
            stderr: format!("could not start {}: {e}", script.display()),
        })?;

    info!(job = %job.name(), pid = ?child.id(), "started job");
    job.record_submission(Submission::Local {
        child,
        exit_status: None,
    });
    Ok(())
}

/// Non-blocking exit check. The first observed exit status is cached so
/// later polls keep answering `true`.
pub(crate) fn poll_child(job: &mut Job) -> Result<bool> {
    let name = job.name().to_string();
    match job.submission_mut() {
        Some(Submission::Local { child, exit_status }) => {
            if exit_status.is_some() {
                return Ok(true);
            }
            let Some(status) = child.try_wait()? else {
                return Ok(false);
            };
            if status.success() {
                debug!(job = %name, "job exited");
            } else {
                warn!(job = %name, code = ?status.code(), "job exited with failure status");
            }
            *exit_status = Some(status);
            Ok(true)
        }
        Some(other) => Err(BatchdagError::ConfigError(format!(
            "job '{name}' was submitted by another backend (id {:?})",
            other.cluster_id()
        ))),
        None => Err(BatchdagError::NotSubmitted(name)),
    }
}
