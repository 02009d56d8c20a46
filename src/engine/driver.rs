// src/engine/driver.rs

use std::sync::Arc;

use crate::config::ConfigFile;
use crate::dag::{BoxFuture, ScheduleOptions};
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::submit::{
    CommandRunner, CondorJobSubmitter, JobSubmitter, LocalJobSubmitter, TorqueJobSubmitter,
};
use crate::task::Job;
use crate::types::DriverKind;

/// The backend chosen for a run.
#[derive(Debug, Clone)]
pub enum Driver {
    Local(LocalJobSubmitter),
    Condor(CondorJobSubmitter),
    Torque(TorqueJobSubmitter),
}

impl Driver {
    /// Build the submitter for `kind` from the plan's settings.
    ///
    /// `job_options` carries the run's deadline and cancellation token. The
    /// local driver also takes its job-level bound from it; condor uses the
    /// token and deadline to cut retry pauses short.
    pub fn from_config(
        kind: DriverKind,
        config: &ConfigFile,
        fs: Arc<dyn FileSystem>,
        runner: Arc<dyn CommandRunner>,
        job_options: ScheduleOptions,
    ) -> Self {
        match kind {
            DriverKind::Local => Driver::Local(LocalJobSubmitter::new(fs).with_options(job_options)),
            DriverKind::Condor => Driver::Condor(
                CondorJobSubmitter::new(runner, fs, &config.config.submit_dir)
                    .with_retry(config.retry.clone())
                    .with_cancel(job_options.cancel.clone())
                    .with_deadline(job_options.deadline),
            ),
            DriverKind::Torque => Driver::Torque(TorqueJobSubmitter::new(runner, fs)),
        }
    }

    pub fn kind(&self) -> DriverKind {
        match self {
            Driver::Local(_) => DriverKind::Local,
            Driver::Condor(_) => DriverKind::Condor,
            Driver::Torque(_) => DriverKind::Torque,
        }
    }
}

impl JobSubmitter for Driver {
    fn submit<'a>(
        &'a mut self,
        jobs: &'a mut [Job],
        dagname: Option<&'a str>,
    ) -> BoxFuture<'a, Result<()>> {
        match self {
            Driver::Local(s) => s.submit(jobs, dagname),
            Driver::Condor(s) => s.submit(jobs, dagname),
            Driver::Torque(s) => s.submit(jobs, dagname),
        }
    }

    fn is_complete<'a>(&'a mut self, job: &'a mut Job) -> BoxFuture<'a, Result<bool>> {
        match self {
            Driver::Local(s) => s.is_complete(job),
            Driver::Condor(s) => s.is_complete(job),
            Driver::Torque(s) => s.is_complete(job),
        }
    }
}
