// src/task/definition.rs

use std::fmt;
use std::sync::Arc;

use crate::dag::DagNode;
use crate::errors::{BatchdagError, Result};
use crate::task::job::Job;
use crate::task::script::ScriptLayout;
use crate::task::settings::JobSettings;

/// Produces the jobs of a task. Called at most once per successful expansion.
pub type JobGenerator = Box<dyn FnMut() -> Result<Vec<Job>> + Send>;

/// A named unit of work that expands into jobs when it is first scheduled.
pub struct Task {
    name: String,
    prerequisites: Vec<String>,
    generator: JobGenerator,
    jobs: Option<Vec<Job>>,
}

impl Task {
    pub fn new<G>(name: impl Into<String>, prerequisites: Vec<String>, generator: G) -> Self
    where
        G: FnMut() -> Result<Vec<Job>> + Send + 'static,
    {
        Self {
            name: name.into(),
            prerequisites,
            generator: Box::new(generator),
            jobs: None,
        }
    }

    /// A task that runs `commands` as one job named after the task.
    pub fn atomic(
        name: impl Into<String>,
        commands: Vec<String>,
        layout: Arc<ScriptLayout>,
        prerequisites: Vec<String>,
        settings: JobSettings,
    ) -> Self {
        let name = name.into();
        let job_name = name.clone();
        Self::new(name, prerequisites, move || {
            Ok(vec![
                Job::from_commands(job_name.clone(), commands.clone(), Arc::clone(&layout))
                    .with_settings(settings.clone()),
            ])
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The task's jobs, running the generator on the first call only.
    ///
    /// A generator error is returned as [`BatchdagError::JobGeneration`] and
    /// leaves the task unexpanded.
    pub fn generate_jobs(&mut self) -> Result<&mut [Job]> {
        let jobs = match self.jobs.take() {
            Some(jobs) => jobs,
            None => (self.generator)().map_err(|source| BatchdagError::JobGeneration {
                task: self.name.clone(),
                source: Box::new(source),
            })?,
        };
        Ok(self.jobs.insert(jobs).as_mut_slice())
    }

    /// Jobs generated so far, or `None` if the task has not been expanded.
    pub fn jobs(&self) -> Option<&[Job]> {
        self.jobs.as_deref()
    }

    pub fn jobs_mut(&mut self) -> Option<&mut [Job]> {
        self.jobs.as_deref_mut()
    }

    pub fn is_expanded(&self) -> bool {
        self.jobs.is_some()
    }
}

impl DagNode for Task {
    fn name(&self) -> &str {
        &self.name
    }

    fn prerequisites(&self) -> &[String] {
        &self.prerequisites
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("prerequisites", &self.prerequisites)
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}
