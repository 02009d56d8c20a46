// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{BatchdagError, Result};
use crate::submit::RetryPolicy;
use crate::task::{JobSettings, ScriptLayout, SettingsRegistry};
use crate::types::{DriverKind, DurationSpec, MemoryRequest, concurrency_limit};

/// Top-level plan as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// driver = "condor"
/// submit_dir = "output/submit"
///
/// [default]
/// cpus = 1
/// runtime = "1h"
///
/// [settings.ranking]
/// runtime = 10800
///
/// [task.build_workspace]
/// commands = ["MakeWorkspace config.txt v1"]
///
/// [task.ranking]
/// after = ["build_workspace"]
/// commands = ["python rank.py --job {index} --of {count}"]
/// split = 10
/// ```
///
/// All sections except `[task.*]` are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    /// Global behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Backoff for flaky batch CLIs from `[retry]`.
    #[serde(default)]
    pub retry: RetrySection,

    /// Baseline job settings from `[default]`.
    #[serde(default)]
    pub default: SettingsSection,

    /// Per-task job settings from `[settings.<task>]`.
    #[serde(default)]
    pub settings: BTreeMap<String, SettingsSection>,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Backend the jobs are handed to.
    #[serde(default)]
    pub driver: DriverKind,

    /// Bound on concurrently running jobs for the local driver. Negative
    /// means unbounded.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: i64,

    /// Bound on concurrently running tasks. Negative means unbounded.
    #[serde(default = "default_unbounded")]
    pub max_concurrent_tasks: i64,

    /// Pause between two poll rounds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: DurationSpec,

    /// Give up on the whole run after this long.
    #[serde(default)]
    pub timeout: Option<DurationSpec>,

    /// Where job scripts, Condor submit files and DAG files go.
    #[serde(default = "default_submit_dir")]
    pub submit_dir: PathBuf,

    /// Where per-command logs go.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Directory each job script changes into. Falls back to
    /// `$ANALYSISDIR`, then `.`.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Script sourced by every job before its commands.
    #[serde(default)]
    pub setup_script: Option<PathBuf>,

    /// Grid proxy exported to every job. Falls back to `$X509_USER_PROXY`.
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_max_concurrent_jobs() -> i64 {
    crate::submit::DEFAULT_MAX_CONCURRENT_JOBS as i64
}

fn default_unbounded() -> i64 {
    -1
}

fn default_poll_interval() -> DurationSpec {
    DurationSpec::from(crate::dag::DEFAULT_POLL_INTERVAL)
}

fn default_submit_dir() -> PathBuf {
    PathBuf::from("output/submit")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("output/logs")
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            driver: DriverKind::default(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_concurrent_tasks: default_unbounded(),
            poll_interval: default_poll_interval(),
            timeout: None,
            submit_dir: default_submit_dir(),
            log_dir: default_log_dir(),
            work_dir: None,
            setup_script: None,
            proxy: None,
        }
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay: DurationSpec,

    #[serde(default = "default_max_delay")]
    pub max_delay: DurationSpec,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_retries() -> u32 {
    RetryPolicy::default().max_retries
}

fn default_initial_delay() -> DurationSpec {
    DurationSpec::from(RetryPolicy::default().initial_delay)
}

fn default_max_delay() -> DurationSpec {
    DurationSpec::from(RetryPolicy::default().max_delay)
}

fn default_multiplier() -> f64 {
    RetryPolicy::default().multiplier
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetrySection {
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(BatchdagError::ConfigError(format!(
                "[retry].multiplier must be >= 1.0 (got {})",
                self.multiplier
            )));
        }
        Ok(RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: parse_field("[retry].initial_delay", &self.initial_delay)?,
            max_delay: parse_field("[retry].max_delay", &self.max_delay)?,
            multiplier: self.multiplier,
        })
    }
}

/// Job settings as written in `[default]`, `[settings.<task>]`,
/// `[task.<name>.settings]` or on an explicit job. Unset fields inherit.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SettingsSection {
    #[serde(default)]
    pub cpus: Option<u32>,

    #[serde(default)]
    pub memory: Option<MemoryRequest>,

    #[serde(default)]
    pub runtime: Option<DurationSpec>,
}

impl SettingsSection {
    /// Overlay the fields set here onto `base`.
    pub fn resolve(&self, base: &JobSettings) -> Result<JobSettings> {
        let mut settings = base.clone();
        if let Some(cpus) = self.cpus {
            if cpus == 0 {
                return Err(BatchdagError::ConfigError("cpus must be >= 1".to_string()));
            }
            settings.cpus = cpus;
        }
        if let Some(memory) = &self.memory {
            settings.memory = memory.clone();
        }
        if let Some(runtime) = &self.runtime {
            settings.runtime = parse_field("runtime", runtime)?;
        }
        Ok(settings)
    }
}

/// `[task.<name>]` section.
///
/// A task runs exactly one of:
/// - `commands`, optionally fanned out with `split` and combined with `merge`;
/// - `script`, an existing script used as-is;
/// - `jobs`, an explicit list of jobs with their own prerequisites.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// Tasks that must complete before this one starts.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub commands: Option<Vec<String>>,

    /// Number of fan-out jobs. `{index}` (0-based) and `{count}` in the
    /// commands are replaced per job.
    #[serde(default)]
    pub split: Option<u32>,

    /// Commands of a combiner job that waits for every fan-out job.
    #[serde(default)]
    pub merge: Option<Vec<String>>,

    #[serde(default)]
    pub script: Option<PathBuf>,

    #[serde(default)]
    pub jobs: Option<Vec<JobConfig>>,

    /// Inline alternative to `[settings.<name>]`.
    #[serde(default)]
    pub settings: Option<SettingsSection>,
}

impl TaskConfig {
    /// Names of every job this task expands into, in generation order.
    pub fn job_names(&self, task: &str) -> Vec<String> {
        if let Some(jobs) = &self.jobs {
            return jobs.iter().map(|j| j.name.clone()).collect();
        }
        if self.commands.is_none() || (self.split.is_none() && self.merge.is_none()) {
            return vec![task.to_string()];
        }
        let split = self.split.unwrap_or(1);
        let mut names: Vec<String> = (0..split)
            .map(|index| fan_out_job_name(task, index, split))
            .collect();
        if self.merge.is_some() {
            names.push(merge_job_name(task));
        }
        names
    }
}

/// `<task>_job_<index+1>_of_<split>`.
pub fn fan_out_job_name(task: &str, index: u32, split: u32) -> String {
    format!("{task}_job_{}_of_{split}", index + 1)
}

pub fn merge_job_name(task: &str) -> String {
    format!("{task}_merge")
}

/// `[[task.<name>.jobs]]` entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobConfig {
    pub name: String,

    /// Jobs of the same task that must complete first.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub commands: Option<Vec<String>>,

    #[serde(default)]
    pub script: Option<PathBuf>,

    /// Overrides on top of the task's settings.
    #[serde(default)]
    pub settings: Option<SettingsSection>,
}

/// Validated plan.
///
/// Built from [`RawConfigFile`] via `TryFrom` (see `config::validate`):
/// durations are parsed, settings are resolved into a registry and the task
/// graph is known to be acyclic.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub task: BTreeMap<String, TaskConfig>,
    pub settings: SettingsRegistry,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub timeout: Option<Duration>,
}

impl ConfigFile {
    pub fn max_concurrent_jobs(&self) -> Option<usize> {
        concurrency_limit(self.config.max_concurrent_jobs)
    }

    pub fn max_concurrent_tasks(&self) -> Option<usize> {
        concurrency_limit(self.config.max_concurrent_tasks)
    }

    /// Script layout for command-based jobs, with environment fallbacks for
    /// the working directory and the proxy.
    pub fn script_layout(&self) -> ScriptLayout {
        let work_dir = self
            .config
            .work_dir
            .clone()
            .or_else(|| std::env::var_os("ANALYSISDIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));

        let mut layout = ScriptLayout::new(&self.config.submit_dir, &self.config.log_dir)
            .with_work_dir(work_dir);
        if let Some(setup) = &self.config.setup_script {
            layout = layout.with_setup_script(setup);
        }
        let proxy = self
            .config
            .proxy
            .clone()
            .or_else(|| std::env::var("X509_USER_PROXY").ok());
        if let Some(proxy) = proxy {
            layout = layout.with_proxy(proxy);
        }
        layout
    }
}

pub(crate) fn parse_field(field: &str, spec: &DurationSpec) -> Result<Duration> {
    spec.to_duration()
        .map_err(|e| BatchdagError::ConfigError(format!("{field}: {e}")))
}
