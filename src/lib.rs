// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod submit;
pub mod task;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::{DagGraph, DagNode, ScheduleOptions};
use crate::engine::{Driver, TaskScheduler, build_plan, select_tasks};
use crate::fs::{FileSystem, RealFileSystem};
use crate::submit::RealCommandRunner;
use crate::task::Task;
use crate::types::DriverKind;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - plan loading and validation
/// - task expansion and `--only` selection
/// - the backend chosen by `--driver` / `[config].driver`
/// - Ctrl-C handling and the overall deadline
/// - the task-level scheduler
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut cfg = load_and_validate(&config_path)?;

    if let Some(max) = args.max_concurrent_jobs {
        if max == 0 {
            bail!("--max-concurrent-jobs must not be 0 (use -1 for unbounded)");
        }
        cfg.config.max_concurrent_jobs = max;
    }
    let kind = args.driver.unwrap_or(cfg.config.driver);

    let layout = Arc::new(cfg.script_layout());
    let mut tasks = select_tasks(build_plan(&cfg, layout), &args.only)?;

    if args.dry_run {
        print_dry_run(&cfg, kind, &mut tasks)?;
        return Ok(());
    }

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    fs.create_dir_all(&cfg.config.submit_dir)?;
    fs.create_dir_all(&cfg.config.log_dir)?;

    // Ctrl-C → stop scheduling. Jobs already handed to a backend keep running.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            cancel.cancel();
        });
    }

    let deadline = args.timeout.or(cfg.timeout).and_then(|t| Instant::now().checked_add(t));
    let base = ScheduleOptions::default()
        .with_poll_interval(cfg.poll_interval)
        .with_deadline(deadline)
        .with_cancel(cancel);
    let job_options = base.clone().with_max_concurrent(cfg.max_concurrent_jobs());
    let task_options = base.with_max_concurrent(cfg.max_concurrent_tasks());

    let driver = Driver::from_config(kind, &cfg, fs, Arc::new(RealCommandRunner), job_options);
    info!(
        driver = %driver.kind(),
        tasks = tasks.len(),
        config = %config_path.display(),
        "starting run"
    );

    let mut scheduler = TaskScheduler::new(driver, task_options);
    let report = scheduler.schedule(&mut tasks).await?;

    info!(
        rounds = report.rounds.len(),
        max_in_flight = report.max_in_flight(),
        completed = ?report.completion_order,
        "all tasks complete"
    );
    Ok(())
}

/// Dry-run output: tasks in submission order with their jobs. Jobs are
/// expanded but no script is written and nothing is submitted.
fn print_dry_run(cfg: &ConfigFile, kind: DriverKind, tasks: &mut [Task]) -> Result<()> {
    let order = DagGraph::build(&*tasks)?.topological_order()?;

    println!("batchdag dry-run");
    println!("  config.driver = {kind}");
    println!("  config.max_concurrent_jobs = {:?}", cfg.max_concurrent_jobs());
    println!("  config.max_concurrent_tasks = {:?}", cfg.max_concurrent_tasks());
    println!("  config.poll_interval = {:?}", cfg.poll_interval);
    if let Some(timeout) = cfg.timeout {
        println!("  config.timeout = {timeout:?}");
    }
    println!();

    println!("tasks ({}):", tasks.len());
    for idx in order {
        let task = &mut tasks[idx];
        println!("  - {}", task.name());
        if !task.prerequisites().is_empty() {
            println!("      after: {:?}", task.prerequisites());
        }
        for job in task.generate_jobs()?.iter() {
            let settings = job.settings().cloned().unwrap_or_default();
            println!(
                "      job {} (cpus = {}, memory = {}, runtime = {}s)",
                job.name(),
                settings.cpus,
                settings.memory,
                settings.runtime.as_secs()
            );
            if !job.prerequisites().is_empty() {
                println!("          after: {:?}", job.prerequisites());
            }
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
