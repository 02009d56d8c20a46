// src/cli.rs

//! CLI argument parsing using `clap`.

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::types::{DriverKind, parse_duration};

/// Command-line arguments for `batchdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "batchdag",
    version,
    about = "Run a DAG of tasks on a local machine, HTCondor or Torque.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the plan file (TOML).
    ///
    /// Default: `Batchdag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Batchdag.toml")]
    pub config: String,

    /// Backend to submit jobs to; overrides `[config].driver`.
    #[arg(long, value_enum, value_name = "DRIVER")]
    pub driver: Option<DriverKind>,

    /// Run only this task and everything it depends on. Repeatable.
    #[arg(long, value_name = "NAME")]
    pub only: Vec<String>,

    /// Concurrent local jobs; overrides `[config].max_concurrent_jobs`.
    /// Negative means unbounded.
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    pub max_concurrent_jobs: Option<i64>,

    /// Abort the run after this long (e.g. `90m`, `48h`); overrides
    /// `[config].timeout`.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BATCHDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the plan and list its tasks and jobs, but submit nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
