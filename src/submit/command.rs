// src/submit/command.rs

use std::fmt::Debug;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::dag::BoxFuture;
use crate::errors::{BatchdagError, Result};

/// Runs an external program to completion and returns its stdout.
///
/// A non-zero exit (or a failure to spawn) is reported as
/// [`BatchdagError::CommandFailed`].
pub trait CommandRunner: Send + Sync + Debug {
    fn run<'a>(&'a self, program: &'a str, args: &'a [String]) -> BoxFuture<'a, Result<String>>;
}

/// Runner backed by `tokio::process::Command`.
#[derive(Debug, Clone, Default)]
pub struct RealCommandRunner;

impl CommandRunner for RealCommandRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [String]) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            debug!(program, args = ?args, "running command");

            let output = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|e| BatchdagError::CommandFailed {
                    program: program.to_string(),
                    code: None,
                    stderr: format!("could not spawn: {e}"),
                })?;

            if !output.status.success() {
                return Err(BatchdagError::CommandFailed {
                    program: program.to_string(),
                    code: output.status.code(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }

            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        })
    }
}
