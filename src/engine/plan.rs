// src/engine/plan.rs

//! Turning a validated plan file into schedulable [`Task`]s.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::config::model::{fan_out_job_name, merge_job_name};
use crate::config::{ConfigFile, JobConfig, TaskConfig};
use crate::dag::DagGraph;
use crate::errors::{BatchdagError, Result};
use crate::task::{Job, JobSettings, ScriptLayout, Task};

/// One [`Task`] per `[task.<name>]`, in name order.
///
/// Jobs are not created here; each task carries a generator that builds them
/// the first time the task is scheduled.
pub fn build_plan(config: &ConfigFile, layout: Arc<ScriptLayout>) -> Vec<Task> {
    config
        .task
        .iter()
        .map(|(name, task)| {
            let settings = config.settings.get(name).clone();
            build_task(name, task, settings, Arc::clone(&layout))
        })
        .collect()
}

fn build_task(name: &str, task: &TaskConfig, settings: JobSettings, layout: Arc<ScriptLayout>) -> Task {
    let after = task.after.clone();

    if let Some(commands) = &task.commands {
        if task.split.is_none() && task.merge.is_none() {
            return Task::atomic(name, commands.clone(), layout, after, settings);
        }
        let task_name = name.to_string();
        let commands = commands.clone();
        let split = task.split.unwrap_or(1);
        let merge = task.merge.clone();
        return Task::new(name, after, move || {
            Ok(fan_out_jobs(&task_name, &commands, split, merge.as_deref(), &layout, &settings))
        });
    }

    if let Some(script) = &task.script {
        let job_name = name.to_string();
        let script = script.clone();
        return Task::new(name, after, move || {
            Ok(vec![
                Job::from_script(job_name.clone(), script.clone()).with_settings(settings.clone()),
            ])
        });
    }

    let jobs = task.jobs.clone().unwrap_or_default();
    Task::new(name, after, move || explicit_jobs(&jobs, &layout, &settings))
}

/// `split` copies of `commands` named `<task>_job_<i+1>_of_<split>`, with
/// `{index}` (0-based) and `{count}` substituted, plus an optional
/// `<task>_merge` job that waits for all of them.
pub fn fan_out_jobs(
    task: &str,
    commands: &[String],
    split: u32,
    merge: Option<&[String]>,
    layout: &Arc<ScriptLayout>,
    settings: &JobSettings,
) -> Vec<Job> {
    let mut jobs: Vec<Job> = (0..split)
        .map(|index| {
            let name = fan_out_job_name(task, index, split);
            let commands = commands
                .iter()
                .map(|c| {
                    c.replace("{index}", &index.to_string())
                        .replace("{count}", &split.to_string())
                })
                .collect();
            Job::from_commands(name, commands, Arc::clone(layout)).with_settings(settings.clone())
        })
        .collect();

    if let Some(merge) = merge {
        let parents = jobs.iter().map(|j| j.name().to_string()).collect();
        jobs.push(
            Job::from_commands(merge_job_name(task), merge.to_vec(), Arc::clone(layout))
                .with_prerequisites(parents)
                .with_settings(settings.clone()),
        );
    }

    debug!(task, jobs = jobs.len(), "fanned out task");
    jobs
}

fn explicit_jobs(
    jobs: &[JobConfig],
    layout: &Arc<ScriptLayout>,
    task_settings: &JobSettings,
) -> Result<Vec<Job>> {
    jobs.iter()
        .map(|job| {
            let settings = match &job.settings {
                Some(section) => section.resolve(task_settings)?,
                None => task_settings.clone(),
            };
            let built = match (&job.commands, &job.script) {
                (Some(commands), _) => {
                    Job::from_commands(job.name.clone(), commands.clone(), Arc::clone(layout))
                }
                (None, Some(script)) => Job::from_script(job.name.clone(), script.clone()),
                (None, None) => {
                    return Err(BatchdagError::ConfigError(format!(
                        "job '{}' has neither commands nor a script",
                        job.name
                    )));
                }
            };
            Ok(built
                .with_prerequisites(job.after.clone())
                .with_settings(settings))
        })
        .collect()
}

/// Keep only the tasks named in `only` plus everything they transitively
/// depend on. An empty `only` keeps every task.
pub fn select_tasks(tasks: Vec<Task>, only: &[String]) -> Result<Vec<Task>> {
    if only.is_empty() {
        return Ok(tasks);
    }

    let graph = DagGraph::build(&tasks)?;
    let roots = only
        .iter()
        .map(|name| {
            graph.index_of(name).ok_or_else(|| {
                BatchdagError::ConfigError(format!("--only names unknown task '{name}'"))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let keep: BTreeSet<usize> = graph.with_prerequisites(&roots);

    Ok(tasks
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| keep.contains(idx))
        .map(|(_, task)| task)
        .collect())
}
