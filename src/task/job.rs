// src/task/job.rs

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;

use tokio::process::Child;
use tracing::debug;

use crate::dag::DagNode;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::task::script::ScriptLayout;
use crate::task::settings::JobSettings;

/// What a job actually runs.
#[derive(Debug, Clone)]
pub enum JobPayload {
    /// Shell commands wrapped into a generated script (see [`ScriptLayout`]).
    Commands {
        commands: Vec<String>,
        layout: Arc<ScriptLayout>,
    },
    /// An existing script, used as-is.
    Script(PathBuf),
}

/// Backend-specific record of a submitted job.
///
/// Written once by the submitter that launched the job and consulted by that
/// same submitter when polling for completion.
#[derive(Debug)]
pub enum Submission {
    Local {
        child: Child,
        exit_status: Option<ExitStatus>,
    },
    Condor {
        cluster_id: u64,
        submit_file: PathBuf,
        dag_file: PathBuf,
    },
    Torque {
        cluster_id: String,
        queue: String,
    },
}

impl Submission {
    /// Backend-assigned identifier, for logging.
    pub fn cluster_id(&self) -> Option<String> {
        match self {
            Submission::Local { child, .. } => child.id().map(|pid| pid.to_string()),
            Submission::Condor { cluster_id, .. } => Some(cluster_id.to_string()),
            Submission::Torque { cluster_id, .. } => Some(cluster_id.clone()),
        }
    }
}

/// A concrete, independently submittable unit of work.
pub struct Job {
    name: String,
    prerequisites: Vec<String>,
    payload: JobPayload,
    settings: Option<JobSettings>,
    executable: Option<PathBuf>,
    submission: Option<Submission>,
}

impl Job {
    pub fn new(name: impl Into<String>, payload: JobPayload) -> Self {
        Self {
            name: name.into(),
            prerequisites: Vec::new(),
            payload,
            settings: None,
            executable: None,
            submission: None,
        }
    }

    /// Job running `commands` through a script generated under `layout`.
    pub fn from_commands(
        name: impl Into<String>,
        commands: Vec<String>,
        layout: Arc<ScriptLayout>,
    ) -> Self {
        Self::new(name, JobPayload::Commands { commands, layout })
    }

    /// Job running an existing script.
    pub fn from_script(name: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self::new(name, JobPayload::Script(script.into()))
    }

    /// Add a prerequisite job (by name, within the same submission batch).
    pub fn after(mut self, prerequisite: impl Into<String>) -> Self {
        self.prerequisites.push(prerequisite.into());
        self
    }

    pub fn with_prerequisites(mut self, prerequisites: Vec<String>) -> Self {
        self.prerequisites = prerequisites;
        self
    }

    pub fn with_settings(mut self, settings: JobSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &JobPayload {
        &self.payload
    }

    pub fn settings(&self) -> Option<&JobSettings> {
        self.settings.as_ref()
    }

    /// Path of the script that runs this job, generating it on first use.
    ///
    /// The script is written at most once; later calls return the same path
    /// without touching the filesystem.
    pub fn executable(&mut self, fs: &dyn FileSystem) -> Result<PathBuf> {
        if let Some(path) = &self.executable {
            return Ok(path.clone());
        }

        let path = match &self.payload {
            JobPayload::Commands { commands, layout } => {
                let path = layout.script_path(&self.name);
                let script = layout.render(&self.name, commands);
                fs.write(&path, script.as_bytes())?;
                debug!(job = %self.name, path = %path.display(), "wrote job script");
                path
            }
            JobPayload::Script(path) => path.clone(),
        };

        self.executable = Some(path.clone());
        Ok(path)
    }

    /// The generated script path, if [`Job::executable`] has run.
    pub fn executable_path(&self) -> Option<&Path> {
        self.executable.as_deref()
    }

    pub fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    pub fn submission_mut(&mut self) -> Option<&mut Submission> {
        self.submission.as_mut()
    }

    pub fn is_submitted(&self) -> bool {
        self.submission.is_some()
    }

    pub fn record_submission(&mut self, submission: Submission) {
        if self.submission.is_some() {
            tracing::warn!(job = %self.name, "job submitted twice; keeping latest record");
        }
        self.submission = Some(submission);
    }
}

impl DagNode for Job {
    fn name(&self) -> &str {
        &self.name
    }

    fn prerequisites(&self) -> &[String] {
        &self.prerequisites
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("prerequisites", &self.prerequisites)
            .field("settings", &self.settings)
            .field("executable", &self.executable)
            .field("submitted", &self.submission.is_some())
            .finish_non_exhaustive()
    }
}
