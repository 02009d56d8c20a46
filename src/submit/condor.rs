// src/submit/condor.rs

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dag::{BoxFuture, DagNode};
use crate::errors::{BatchdagError, Result};
use crate::fs::FileSystem;
use crate::submit::{CommandRunner, JobSubmitter, RetryPolicy};
use crate::task::{Job, JobSettings, Submission};

const SUBMIT_DAG: &str = "condor_submit_dag";
const QUERY: &str = "condor_q";

/// Submits each batch as one DAGMan file.
///
/// Every job gets a submit description next to its script; the batch gets a
/// `<dagname>.dag` in `dag_dir`. All jobs of a batch share the cluster id
/// DAGMan reports. A job is complete once `condor_q` no longer lists its
/// cluster. Both CLI calls are wrapped in the configured [`RetryPolicy`],
/// whose pauses end early on the run's cancellation token or deadline.
#[derive(Debug, Clone)]
pub struct CondorJobSubmitter {
    runner: Arc<dyn CommandRunner>,
    fs: Arc<dyn FileSystem>,
    dag_dir: PathBuf,
    retry: RetryPolicy,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CondorJobSubmitter {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        fs: Arc<dyn FileSystem>,
        dag_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            fs,
            dag_dir: dag_dir.into(),
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    async fn submit_batch(&mut self, jobs: &mut [Job], dagname: Option<&str>) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }
        let dagname = dagname
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut submit_files = Vec::with_capacity(jobs.len());
        for job in jobs.iter_mut() {
            let executable = job.executable(self.fs.as_ref())?;
            self.fs.set_executable(&executable)?;

            let submit_file = executable.with_extension("sub");
            let contents = submit_file_contents(&executable, job.settings());
            self.fs.write(&submit_file, contents.as_bytes())?;
            debug!(job = %job.name(), path = %submit_file.display(), "wrote submit file");
            submit_files.push(submit_file);
        }

        let dag_file = self.dag_dir.join(format!("{dagname}.dag"));
        self.fs
            .write(&dag_file, dag_file_contents(jobs, &submit_files).as_bytes())?;

        let args = vec![
            "-force".to_string(),
            "-batch-name".to_string(),
            dagname.clone(),
            dag_file.display().to_string(),
        ];
        let runner = &self.runner;
        let reply = self
            .retry
            .run(SUBMIT_DAG, &self.cancel, self.deadline, || {
                runner.run(SUBMIT_DAG, &args)
            })
            .await?;
        let cluster_id = parse_cluster_id(&reply)?;

        info!(dag = %dagname, cluster_id, jobs = jobs.len(), "submitted DAG to condor");

        for (job, submit_file) in jobs.iter_mut().zip(submit_files) {
            job.record_submission(Submission::Condor {
                cluster_id,
                submit_file,
                dag_file: dag_file.clone(),
            });
        }
        Ok(())
    }

    async fn query(&mut self, job: &Job) -> Result<bool> {
        let cluster_id = match job.submission() {
            Some(Submission::Condor { cluster_id, .. }) => *cluster_id,
            Some(other) => {
                return Err(BatchdagError::ConfigError(format!(
                    "job '{}' was submitted by another backend (id {:?})",
                    job.name(),
                    other.cluster_id()
                )));
            }
            None => return Err(BatchdagError::NotSubmitted(job.name().to_string())),
        };

        let args = vec![
            "-long".to_string(),
            "-attributes".to_string(),
            "ClusterId".to_string(),
            cluster_id.to_string(),
        ];
        let runner = &self.runner;
        let reply = self
            .retry
            .run(QUERY, &self.cancel, self.deadline, || runner.run(QUERY, &args))
            .await?;

        // An empty listing means the cluster has left the queue.
        let complete = reply.trim().is_empty();
        debug!(job = %job.name(), cluster_id, complete, "polled condor");
        Ok(complete)
    }
}

impl JobSubmitter for CondorJobSubmitter {
    fn submit<'a>(
        &'a mut self,
        jobs: &'a mut [Job],
        dagname: Option<&'a str>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.submit_batch(jobs, dagname))
    }

    fn is_complete<'a>(&'a mut self, job: &'a mut Job) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.query(job))
    }
}

/// Submit description for one job. A job that carries settings always
/// requests them explicitly, whatever their values; without settings the
/// pool's defaults apply.
pub fn submit_file_contents(executable: &Path, settings: Option<&JobSettings>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "executable = {}", executable.display());
    if let Some(settings) = settings {
        let _ = writeln!(out, "request_cpus = {}", settings.cpus);
        let _ = writeln!(out, "request_memory = {}", settings.memory);
        let _ = writeln!(out, "+MaxRuntime = {}", settings.runtime.as_secs());
    }
    out.push_str("queue\n");
    out
}

/// DAGMan file: a `JOB` line per job, then a `PARENT .. CHILD` line for every
/// job with prerequisites. `submit_files[i]` belongs to `jobs[i]`.
pub fn dag_file_contents(jobs: &[Job], submit_files: &[PathBuf]) -> String {
    let mut out = String::new();
    for (job, submit_file) in jobs.iter().zip(submit_files) {
        let _ = writeln!(out, "JOB {} {}", job.name(), submit_file.display());
    }
    for job in jobs {
        if job.prerequisites().is_empty() {
            continue;
        }
        let _ = writeln!(
            out,
            "PARENT {} CHILD {}",
            job.prerequisites().join(" "),
            job.name()
        );
    }
    out
}

/// Extract the cluster id from `condor_submit_dag` output
/// (`... submitted to cluster 4711.`).
pub fn parse_cluster_id(reply: &str) -> Result<u64> {
    let pattern = Regex::new(r"submitted to cluster (\d+)")
        .map_err(|e| BatchdagError::Other(e.into()))?;

    pattern
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| BatchdagError::ClusterIdParse(reply.trim().to_string()))
}
