// src/task/settings.rs

use std::collections::BTreeMap;
use std::time::Duration;

use crate::errors::{BatchdagError, Result};
use crate::types::MemoryRequest;

/// Resources requested for one job on the worker node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    /// Number of CPUs to request.
    pub cpus: u32,
    /// Amount of RAM to request, passed through to the backend verbatim.
    pub memory: MemoryRequest,
    /// Maximum wall-clock runtime.
    pub runtime: Duration,
}

impl JobSettings {
    pub fn new(cpus: u32, memory: MemoryRequest, runtime: Duration) -> Self {
        Self {
            cpus,
            memory,
            runtime,
        }
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            cpus: 1,
            memory: MemoryRequest::default(),
            runtime: Duration::from_secs(3600),
        }
    }
}

/// Baseline settings plus per-task overrides.
///
/// Each task name may be registered at most once; a second registration is a
/// configuration error rather than a silent overwrite.
#[derive(Debug, Clone, Default)]
pub struct SettingsRegistry {
    default: JobSettings,
    per_task: BTreeMap<String, JobSettings>,
}

impl SettingsRegistry {
    pub fn new(default: JobSettings) -> Self {
        Self {
            default,
            per_task: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, task: impl Into<String>, settings: JobSettings) -> Result<()> {
        let task = task.into();
        if self.per_task.contains_key(&task) {
            return Err(BatchdagError::DuplicateSettings(task));
        }
        self.per_task.insert(task, settings);
        Ok(())
    }

    /// Settings for `task`: its own registration if any, else the baseline.
    pub fn get(&self, task: &str) -> &JobSettings {
        self.per_task.get(task).unwrap_or(&self.default)
    }

    pub fn default_settings(&self) -> &JobSettings {
        &self.default
    }

    pub fn is_registered(&self, task: &str) -> bool {
        self.per_task.contains_key(task)
    }
}
