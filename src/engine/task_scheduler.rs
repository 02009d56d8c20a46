// src/engine/task_scheduler.rs

use tracing::{debug, info};

use crate::dag::{BoxFuture, RunState, ScheduleOptions, SchedulePolicy, ScheduleReport, Scheduler};
use crate::errors::{BatchdagError, Result};
use crate::submit::JobSubmitter;
use crate::task::Task;

/// Task-level scheduling on top of a [`JobSubmitter`].
///
/// - submitting a task expands it into jobs (once) and hands the whole batch
///   to the submitter, labelled with the task name;
/// - a task is complete once every one of its jobs is (vacuously true for a
///   task without jobs);
/// - the main loop ends as soon as nothing is left to submit, then the
///   still-running tasks are polled until they complete.
#[derive(Debug)]
pub struct TaskScheduler<S> {
    scheduler: Scheduler,
    submitter: S,
}

impl<S: JobSubmitter> TaskScheduler<S> {
    pub fn new(submitter: S, options: ScheduleOptions) -> Self {
        Self {
            scheduler: Scheduler::new(options),
            submitter,
        }
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    pub fn submitter_mut(&mut self) -> &mut S {
        &mut self.submitter
    }

    pub fn into_submitter(self) -> S {
        self.submitter
    }

    /// Run every task to completion.
    pub async fn schedule(&mut self, tasks: &mut [Task]) -> Result<ScheduleReport> {
        let mut policy = TaskPolicy {
            submitter: &mut self.submitter,
        };
        self.scheduler.schedule(tasks, &mut policy).await
    }
}

struct TaskPolicy<'s, S> {
    submitter: &'s mut S,
}

impl<S: JobSubmitter> SchedulePolicy<Task> for TaskPolicy<'_, S> {
    fn submit<'a>(&'a mut self, task: &'a mut Task) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            info!(task = %task.name(), "started task");
            let name = task.name().to_string();
            let jobs = task.generate_jobs()?;
            debug!(task = %name, jobs = jobs.len(), "expanded task into jobs");
            self.submitter.submit(jobs, Some(&name)).await
        })
    }

    fn is_complete<'a>(&'a mut self, task: &'a mut Task) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            if !task.is_expanded() {
                return Err(BatchdagError::NotSubmitted(task.name().to_string()));
            }
            for job in task.jobs_mut().into_iter().flatten() {
                if !self.submitter.is_complete(job).await? {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }

    fn is_finished(&self, state: &RunState) -> bool {
        state.to_run().is_empty()
    }

    fn drain_running(&self) -> bool {
        true
    }
}
