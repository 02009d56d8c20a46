// src/submit/torque.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::dag::{BoxFuture, DagGraph, DagNode};
use crate::errors::{BatchdagError, Result};
use crate::fs::FileSystem;
use crate::submit::{CommandRunner, JobSubmitter};
use crate::task::{Job, Submission};

const SUBMIT: &str = "qsub";
const QUERY: &str = "qstat";

/// Longest runtime accepted by the `short` queue.
pub const SHORT_QUEUE_MAX_RUNTIME: Duration = Duration::from_secs(14400);

/// Submits jobs one by one with `qsub`, parents strictly before children so
/// each child can name its parents' ids in `depend=afterok:...`.
///
/// There is no per-job runtime request; the runtime picks the queue instead
/// (see [`queue_for_runtime`]). A job is complete only when `qstat` reports
/// state `C`. A failing `qstat`, or a job missing from its output, counts as
/// "not complete yet".
#[derive(Debug, Clone)]
pub struct TorqueJobSubmitter {
    runner: Arc<dyn CommandRunner>,
    fs: Arc<dyn FileSystem>,
}

impl TorqueJobSubmitter {
    pub fn new(runner: Arc<dyn CommandRunner>, fs: Arc<dyn FileSystem>) -> Self {
        Self { runner, fs }
    }

    async fn submit_batch(&mut self, jobs: &mut [Job], dagname: Option<&str>) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let order = DagGraph::build(&*jobs)?.topological_order()?;
        let mut ids: HashMap<String, String> = HashMap::with_capacity(jobs.len());

        for idx in order {
            let job = &mut jobs[idx];
            let settings = job.settings().cloned().unwrap_or_default();
            let queue = queue_for_runtime(settings.runtime);
            let executable = job.executable(self.fs.as_ref())?;

            let parent_ids: Vec<&str> = job
                .prerequisites()
                .iter()
                .filter_map(|p| ids.get(p).map(String::as_str))
                .collect();

            let mut args = vec![
                "-q".to_string(),
                queue.to_string(),
                "-l".to_string(),
                format!("nodes=1:ppn={}", settings.cpus),
            ];
            if let Some(depend) = dependency_string(&parent_ids) {
                args.push("-W".to_string());
                args.push(depend);
            }
            args.push(executable.display().to_string());

            let reply = self.runner.run(SUBMIT, &args).await?;
            let cluster_id = reply.trim().to_string();
            if cluster_id.is_empty() {
                return Err(BatchdagError::ClusterIdParse(reply));
            }

            info!(
                batch = dagname.unwrap_or("-"),
                job = %job.name(),
                cluster_id = %cluster_id,
                queue,
                "submitted job to torque"
            );
            ids.insert(job.name().to_string(), cluster_id.clone());
            job.record_submission(Submission::Torque {
                cluster_id,
                queue: queue.to_string(),
            });
        }
        Ok(())
    }

    async fn query(&mut self, job: &Job) -> Result<bool> {
        let (cluster_id, queue) = match job.submission() {
            Some(Submission::Torque { cluster_id, queue }) => (cluster_id.clone(), queue.clone()),
            Some(other) => {
                return Err(BatchdagError::ConfigError(format!(
                    "job '{}' was submitted by another backend (id {:?})",
                    job.name(),
                    other.cluster_id()
                )));
            }
            None => return Err(BatchdagError::NotSubmitted(job.name().to_string())),
        };

        let args = [cluster_id.clone()];
        let reply = match self.runner.run(QUERY, &args).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(job = %job.name(), cluster_id = %cluster_id, error = %err, "qstat failed; treating job as still running");
                return Ok(false);
            }
        };

        let status = parse_status(&reply, &queue);
        debug!(job = %job.name(), cluster_id = %cluster_id, status = ?status, "polled torque");
        Ok(status == Some('C'))
    }
}

impl JobSubmitter for TorqueJobSubmitter {
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

/// `short` up to four hours, `generic` beyond.
pub fn queue_for_runtime(runtime: Duration) -> &'static str {
    if runtime <= SHORT_QUEUE_MAX_RUNTIME {
        "short"
    } else {
        "generic"
    }
}

/// `depend=afterok:<id1>:<id2>...`, or `None` without parents.
pub fn dependency_string(parent_ids: &[&str]) -> Option<String> {
    if parent_ids.is_empty() {
        return None;
    }
    Some(format!("depend=afterok:{}", parent_ids.join(":")))
}

/// One-letter job state from `qstat` output, taken from the line whose state
/// column is followed by `queue`.
pub fn parse_status(reply: &str, queue: &str) -> Option<char> {
    let pattern = Regex::new(&format!(r"\s([A-Z])\s+{}\b", regex::escape(queue))).ok()?;
    pattern
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().chars().next())
}
