#![allow(dead_code)]

use std::path::Path;

use batchdag::config::{ConfigFile, JobConfig, RawConfigFile, SettingsSection, TaskConfig};
use batchdag::errors::Result;
use batchdag::types::{DriverKind, DurationSpec};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_driver(mut self, driver: DriverKind) -> Self {
        self.config.config.driver = driver;
        self
    }

    /// Put scripts, submit files and logs under `root`.
    pub fn with_output_root(mut self, root: &Path) -> Self {
        self.config.config.submit_dir = root.join("submit");
        self.config.config.log_dir = root.join("logs");
        self.config.config.work_dir = Some(root.to_path_buf());
        self
    }

    pub fn with_max_concurrent_jobs(mut self, max: i64) -> Self {
        self.config.config.max_concurrent_jobs = max;
        self
    }

    pub fn with_max_concurrent_tasks(mut self, max: i64) -> Self {
        self.config.config.max_concurrent_tasks = max;
        self
    }

    pub fn with_poll_interval_ms(mut self, millis: u64) -> Self {
        self.config.config.poll_interval = DurationSpec::Text(format!("{millis}ms"));
        self
    }

    pub fn with_default_settings(mut self, settings: SettingsSection) -> Self {
        self.config.default = settings;
        self
    }

    pub fn with_settings(mut self, task: &str, settings: SettingsSection) -> Self {
        self.config.settings.insert(task.to_string(), settings);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    /// Task running `commands` as a single job.
    pub fn commands(commands: &[&str]) -> Self {
        Self {
            task: TaskConfig {
                commands: Some(commands.iter().map(|c| c.to_string()).collect()),
                ..TaskConfig::default()
            },
        }
    }

    /// Task running an existing script.
    pub fn script(path: impl AsRef<Path>) -> Self {
        Self {
            task: TaskConfig {
                script: Some(path.as_ref().to_path_buf()),
                ..TaskConfig::default()
            },
        }
    }

    /// Task with an explicit job list.
    pub fn jobs(jobs: Vec<JobConfig>) -> Self {
        Self {
            task: TaskConfig {
                jobs: Some(jobs),
                ..TaskConfig::default()
            },
        }
    }

    pub fn after(mut self, deps: &[&str]) -> Self {
        self.task.after = deps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn split(mut self, n: u32) -> Self {
        self.task.split = Some(n);
        self
    }

    pub fn merge(mut self, commands: &[&str]) -> Self {
        self.task.merge = Some(commands.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn settings(mut self, settings: SettingsSection) -> Self {
        self.task.settings = Some(settings);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Explicit job running `commands` after the named sibling jobs.
pub fn job(name: &str, commands: &[&str], after: &[&str]) -> JobConfig {
    JobConfig {
        name: name.to_string(),
        after: after.iter().map(|s| s.to_string()).collect(),
        commands: Some(commands.iter().map(|c| c.to_string()).collect()),
        script: None,
        settings: None,
    }
}
