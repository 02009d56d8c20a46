// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job settings already registered for task '{0}'")]
    DuplicateSettings(String),

    #[error("Duplicate node name in schedule: {0}")]
    DuplicateNode(String),

    #[error("'{node}' lists unknown prerequisite '{prerequisite}'")]
    UnknownPrerequisite { node: String, prerequisite: String },

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("Generating jobs for task '{task}' failed: {source}")]
    JobGeneration {
        task: String,
        #[source]
        source: Box<BatchdagError>,
    },

    #[error("`{program}` failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{operation} still failing after {attempts} attempts: {last_error}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Could not extract a cluster id from submission output: {0:?}")]
    ClusterIdParse(String),

    #[error("Job '{0}' has not been submitted")]
    NotSubmitted(String),

    #[error("Scheduling deadline exceeded")]
    DeadlineExceeded,

    #[error("Scheduling cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BatchdagError {
    /// Whether a failing backend command is worth another attempt.
    ///
    /// Parse failures and configuration problems are never retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BatchdagError::CommandFailed { .. } | BatchdagError::IoError(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BatchdagError>;
