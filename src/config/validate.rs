// src/config/validate.rs

use std::collections::HashMap;

use crate::config::model::{ConfigFile, JobConfig, RawConfigFile, TaskConfig, parse_field};
use crate::dag::{DagGraph, DagNode};
use crate::errors::{BatchdagError, Result};
use crate::task::{JobSettings, SettingsRegistry};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = BatchdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;

        let settings = build_settings_registry(&raw)?;
        let retry = raw.retry.to_policy()?;
        let poll_interval = parse_field("[config].poll_interval", &raw.config.poll_interval)?;
        let timeout = raw
            .config
            .timeout
            .as_ref()
            .map(|t| parse_field("[config].timeout", t))
            .transpose()?;

        Ok(ConfigFile {
            config: raw.config,
            task: raw.task,
            settings,
            retry,
            poll_interval,
            timeout,
        })
    }
}

/// Structural checks on a raw plan. Settings and durations are checked while
/// converting into [`ConfigFile`].
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_task_dependencies(cfg)?;
    for (name, task) in &cfg.task {
        validate_task_shape(name, task)?;
    }
    validate_job_names(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(BatchdagError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.max_concurrent_jobs == 0 {
        return Err(BatchdagError::ConfigError(
            "[config].max_concurrent_jobs must not be 0 (use -1 for unbounded)".to_string(),
        ));
    }
    if cfg.config.max_concurrent_tasks == 0 {
        return Err(BatchdagError::ConfigError(
            "[config].max_concurrent_tasks must not be 0 (use -1 for unbounded)".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(BatchdagError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(BatchdagError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    for name in cfg.settings.keys() {
        if !cfg.task.contains_key(name) {
            return Err(BatchdagError::ConfigError(format!(
                "[settings.{name}] does not match any task"
            )));
        }
    }
    Ok(())
}

fn validate_task_shape(name: &str, task: &TaskConfig) -> Result<()> {
    let kinds = [task.commands.is_some(), task.script.is_some(), task.jobs.is_some()];
    if kinds.iter().filter(|set| **set).count() != 1 {
        return Err(BatchdagError::ConfigError(format!(
            "task '{name}' must set exactly one of `commands`, `script` or `jobs`"
        )));
    }

    if let Some(commands) = &task.commands {
        if commands.is_empty() {
            return Err(BatchdagError::ConfigError(format!(
                "task '{name}' has an empty `commands` list"
            )));
        }
    } else if task.split.is_some() || task.merge.is_some() {
        return Err(BatchdagError::ConfigError(format!(
            "task '{name}': `split` and `merge` require `commands`"
        )));
    }

    if task.split == Some(0) {
        return Err(BatchdagError::ConfigError(format!(
            "task '{name}': `split` must be >= 1"
        )));
    }
    if matches!(&task.merge, Some(merge) if merge.is_empty()) {
        return Err(BatchdagError::ConfigError(format!(
            "task '{name}' has an empty `merge` list"
        )));
    }

    if let Some(jobs) = &task.jobs {
        validate_jobs(name, jobs)?;
    }
    Ok(())
}

fn validate_jobs(task: &str, jobs: &[JobConfig]) -> Result<()> {
    if jobs.is_empty() {
        return Err(BatchdagError::ConfigError(format!(
            "task '{task}' has an empty `jobs` list"
        )));
    }

    for job in jobs {
        if job.name.trim().is_empty() {
            return Err(BatchdagError::ConfigError(format!(
                "task '{task}' has a job without a name"
            )));
        }
        let has_commands = matches!(&job.commands, Some(c) if !c.is_empty());
        if has_commands == job.script.is_some() {
            return Err(BatchdagError::ConfigError(format!(
                "job '{}' of task '{task}' must set exactly one of non-empty `commands` or `script`",
                job.name
            )));
        }
    }

    let graph = DagGraph::build(jobs).map_err(|e| {
        BatchdagError::ConfigError(format!("jobs of task '{task}': {e}"))
    })?;
    graph.topological_order()?;
    Ok(())
}

/// Every job of the plan writes `<name>.sh`, `<name>.sub` and `<name>.log`
/// into shared directories, so generated and explicit names must be unique
/// across all tasks.
fn validate_job_names(cfg: &RawConfigFile) -> Result<()> {
    let mut owners: HashMap<String, &str> = HashMap::new();
    for (task_name, task) in &cfg.task {
        for job in task.job_names(task_name) {
            if let Some(owner) = owners.get(&job) {
                return Err(BatchdagError::ConfigError(format!(
                    "job name '{job}' is produced by both task '{owner}' and task '{task_name}'"
                )));
            }
            owners.insert(job, task_name);
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    let decls: Vec<TaskDecl<'_>> = cfg
        .task
        .iter()
        .map(|(name, task)| TaskDecl {
            name,
            after: &task.after,
        })
        .collect();

    DagGraph::build(&decls)?.topological_order()?;
    Ok(())
}

/// Settings registry: `[default]` as the baseline, then every per-task
/// override from `[settings.<task>]` or `[task.<name>.settings]`.
fn build_settings_registry(cfg: &RawConfigFile) -> Result<SettingsRegistry> {
    let baseline = cfg
        .default
        .resolve(&JobSettings::default())
        .map_err(|e| BatchdagError::ConfigError(format!("[default]: {e}")))?;
    let mut registry = SettingsRegistry::new(baseline.clone());

    let inline = cfg
        .task
        .iter()
        .filter_map(|(name, task)| task.settings.as_ref().map(|s| (name, s)));

    for (name, section) in cfg.settings.iter().chain(inline) {
        let settings = section
            .resolve(&baseline)
            .map_err(|e| BatchdagError::ConfigError(format!("settings of task '{name}': {e}")))?;
        registry.register(name.clone(), settings)?;
    }

    for (name, task) in &cfg.task {
        let task_settings = registry.get(name).clone();
        for job in task.jobs.iter().flatten() {
            if let Some(section) = &job.settings {
                section.resolve(&task_settings).map_err(|e| {
                    BatchdagError::ConfigError(format!("settings of job '{}': {e}", job.name))
                })?;
            }
        }
    }

    Ok(registry)
}

/// Task name plus `after`, for ordering checks before any task exists.
struct TaskDecl<'a> {
    name: &'a str,
    after: &'a [String],
}

impl DagNode for TaskDecl<'_> {
    fn name(&self) -> &str {
        self.name
    }

    fn prerequisites(&self) -> &[String] {
        self.after
    }
}

impl DagNode for JobConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn prerequisites(&self) -> &[String] {
        &self.after
    }
}
