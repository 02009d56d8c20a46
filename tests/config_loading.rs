// tests/config_loading.rs

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use batchdag::config::{ConfigFile, load_and_validate};
use batchdag::dag::{DagNode, ScheduleOptions};
use batchdag::engine::{TaskScheduler, build_plan, select_tasks};
use batchdag::errors::BatchdagError;
use batchdag::task::{JobPayload, JobSettings, ScriptLayout, Task};
use batchdag::types::{DriverKind, MemoryRequest};
use batchdag_test_utils::builders::job;
use batchdag_test_utils::{
    ConfigFileBuilder, FakeEvent, FakeSubmitter, TaskConfigBuilder, init_tracing, with_timeout,
};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

const ANALYSIS: &str = r#"
[config]
driver = "torque"
max_concurrent_jobs = 2
poll_interval = "30s"
timeout = "48h"
submit_dir = "out/submit"
log_dir = "out/logs"
work_dir = "/ana"
setup_script = "setup.sh"
proxy = "/tmp/x509up_u1000"

[retry]
max_retries = 3
initial_delay = 5
max_delay = "1m"
multiplier = 3.0

[default]
memory = "2 GB"

[settings.ranking]
cpus = 4
runtime = 10800

[task.build_workspace]
commands = ["MakeWorkspace config.txt v1"]

[task.ranking]
after = ["build_workspace"]
commands = ["python rank.py --job {index} --of {count}"]
split = 10
merge = ["python merge.py"]

[task.scan]
after = ["build_workspace"]
settings = { runtime = "6h" }

[[task.scan.jobs]]
name = "scan_low"
commands = ["scan --range low"]

[[task.scan.jobs]]
name = "scan_high"
commands = ["scan --range high"]
after = ["scan_low"]
settings = { cpus = 2 }

[task.plots]
after = ["ranking", "scan"]
script = "/ana/plots.sh"
"#;

fn write_plan(contents: &str) -> Result<(TempDir, PathBuf), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("Batchdag.toml");
    fs::write(&path, contents)?;
    Ok((dir, path))
}

fn load(contents: &str) -> batchdag::errors::Result<ConfigFile> {
    let (_dir, path) = write_plan(contents).expect("temp plan file");
    load_and_validate(&path)
}

fn plan(cfg: &ConfigFile) -> Vec<Task> {
    build_plan(cfg, Arc::new(cfg.script_layout()))
}

fn task_names(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.name()).collect()
}

#[test]
fn full_plan_loads_with_every_section() -> TestResult {
    let cfg = load(ANALYSIS)?;

    assert_eq!(cfg.config.driver, DriverKind::Torque);
    assert_eq!(cfg.max_concurrent_jobs(), Some(2));
    assert_eq!(cfg.max_concurrent_tasks(), None);
    assert_eq!(cfg.poll_interval, Duration::from_secs(30));
    assert_eq!(cfg.timeout, Some(Duration::from_secs(48 * 3600)));

    assert_eq!(cfg.retry.max_retries, 3);
    assert_eq!(cfg.retry.initial_delay, Duration::from_secs(5));
    assert_eq!(cfg.retry.max_delay, Duration::from_secs(60));
    assert_eq!(cfg.retry.multiplier, 3.0);

    let two_gb = MemoryRequest::Text("2 GB".to_string());
    assert_eq!(
        cfg.settings.get("ranking"),
        &JobSettings::new(4, two_gb.clone(), Duration::from_secs(10800))
    );
    assert_eq!(
        cfg.settings.get("scan"),
        &JobSettings::new(1, two_gb.clone(), Duration::from_secs(6 * 3600))
    );
    assert_eq!(
        cfg.settings.get("build_workspace"),
        &JobSettings::new(1, two_gb, Duration::from_secs(3600))
    );

    assert_eq!(
        cfg.script_layout(),
        ScriptLayout::new("out/submit", "out/logs")
            .with_work_dir("/ana")
            .with_setup_script("setup.sh")
            .with_proxy("/tmp/x509up_u1000")
    );
    Ok(())
}

#[test]
fn minimal_plan_gets_defaults() -> TestResult {
    let cfg = load("[task.only]\ncommands = [\"true\"]\n")?;

    assert_eq!(cfg.config.driver, DriverKind::Local);
    assert_eq!(cfg.max_concurrent_jobs(), Some(4));
    assert_eq!(cfg.max_concurrent_tasks(), None);
    assert_eq!(cfg.poll_interval, Duration::from_secs(5));
    assert_eq!(cfg.timeout, None);
    assert_eq!(cfg.config.submit_dir, PathBuf::from("output/submit"));
    assert_eq!(cfg.config.log_dir, PathBuf::from("output/logs"));
    assert_eq!(cfg.retry.max_retries, 8);
    assert_eq!(cfg.settings.get("only"), &JobSettings::default());
    Ok(())
}

#[test]
fn plan_expands_every_task_kind() -> TestResult {
    let cfg = load(ANALYSIS)?;
    let mut tasks = plan(&cfg);

    assert_eq!(task_names(&tasks), vec!["build_workspace", "plots", "ranking", "scan"]);
    assert!(tasks.iter().all(|t| !t.is_expanded()));

    let workspace = tasks[0].generate_jobs()?;
    assert_eq!(workspace.len(), 1);
    assert_eq!(workspace[0].name(), "build_workspace");

    let plots = tasks[1].generate_jobs()?;
    assert!(matches!(plots[0].payload(), JobPayload::Script(path) if path == &PathBuf::from("/ana/plots.sh")));

    let ranking = tasks[2].generate_jobs()?;
    assert_eq!(ranking.len(), 11);
    assert_eq!(ranking[0].name(), "ranking_job_1_of_10");
    assert_eq!(ranking[10].name(), "ranking_merge");
    assert_eq!(ranking[10].prerequisites().len(), 10);
    assert!(ranking.iter().all(|j| j.settings().map(|s| s.cpus) == Some(4)));
    match ranking[9].payload() {
        JobPayload::Commands { commands, .. } => {
            assert_eq!(commands, &vec!["python rank.py --job 9 --of 10".to_string()]);
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let scan = tasks[3].generate_jobs()?;
    assert_eq!(scan[1].name(), "scan_high");
    assert_eq!(scan[1].prerequisites(), ["scan_low".to_string()]);
    let high = scan[1].settings().cloned().unwrap_or_default();
    assert_eq!(high.cpus, 2);
    assert_eq!(high.runtime, Duration::from_secs(6 * 3600));
    Ok(())
}

#[test]
fn only_keeps_requested_tasks_and_their_prerequisites() -> TestResult {
    let cfg = load(ANALYSIS)?;

    let selected = select_tasks(plan(&cfg), &["ranking".to_string()])?;
    assert_eq!(task_names(&selected), vec!["build_workspace", "ranking"]);

    let everything = select_tasks(plan(&cfg), &[])?;
    assert_eq!(everything.len(), 4);

    let err = select_tasks(plan(&cfg), &["nope".to_string()]).unwrap_err();
    assert!(matches!(err, BatchdagError::ConfigError(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn loaded_plan_runs_in_dependency_order() -> TestResult {
    init_tracing();

    let cfg = load(ANALYSIS)?;
    let mut tasks = plan(&cfg);
    let fake = FakeSubmitter::new();
    let options = ScheduleOptions::default().with_poll_interval(Duration::from_millis(5));
    let mut scheduler = TaskScheduler::new(fake.clone(), options);

    let report = with_timeout(scheduler.schedule(&mut tasks)).await?;

    assert_eq!(
        fake.submitted_batches(),
        vec!["build_workspace", "ranking", "scan", "plots"]
    );
    assert_eq!(report.completion_order.last().map(String::as_str), Some("plots"));
    let ranking_jobs = fake.events().into_iter().find_map(|e| match e {
        FakeEvent::Submitted { dagname, jobs } if dagname == "ranking" => Some(jobs.len()),
        _ => None,
    });
    assert_eq!(ranking_jobs, Some(11));
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, BatchdagError::IoError(_)), "got {err:?}");
}

#[test]
fn malformed_toml_is_rejected() {
    let err = load("[task.a]\ncommands = \"not a list\"\n").unwrap_err();
    assert!(matches!(err, BatchdagError::TomlError(_)), "got {err:?}");
}

#[test]
fn structural_errors_are_reported() {
    let cases = [
        ("no tasks", "[config]\ndriver = \"local\"\n"),
        (
            "unknown dependency",
            "[task.a]\ncommands = [\"true\"]\nafter = [\"ghost\"]\n",
        ),
        (
            "self dependency",
            "[task.a]\ncommands = [\"true\"]\nafter = [\"a\"]\n",
        ),
        (
            "zero job bound",
            "[config]\nmax_concurrent_jobs = 0\n[task.a]\ncommands = [\"true\"]\n",
        ),
        (
            "bad duration",
            "[config]\npoll_interval = \"5 fortnights\"\n[task.a]\ncommands = [\"true\"]\n",
        ),
        (
            "two payloads",
            "[task.a]\ncommands = [\"true\"]\nscript = \"a.sh\"\n",
        ),
        ("no payload", "[task.a]\nafter = []\n"),
        (
            "split without commands",
            "[task.a]\nscript = \"a.sh\"\nsplit = 3\n",
        ),
        ("zero split", "[task.a]\ncommands = [\"true\"]\nsplit = 0\n"),
        (
            "settings for unknown task",
            "[settings.ghost]\ncpus = 2\n[task.a]\ncommands = [\"true\"]\n",
        ),
        ("zero cpus", "[default]\ncpus = 0\n[task.a]\ncommands = [\"true\"]\n"),
        (
            "slow retry shrinks",
            "[retry]\nmultiplier = 0.5\n[task.a]\ncommands = [\"true\"]\n",
        ),
    ];

    for (label, contents) in cases {
        match load(contents) {
            Err(BatchdagError::ConfigError(_)) => {}
            other => panic!("{label}: expected a configuration error, got {other:?}"),
        }
    }
}

#[test]
fn cyclic_tasks_are_rejected() {
    let err = load(
        "[task.a]\ncommands = [\"true\"]\nafter = [\"b\"]\n\
         [task.b]\ncommands = [\"true\"]\nafter = [\"a\"]\n",
    )
    .unwrap_err();
    assert!(matches!(err, BatchdagError::DagCycle(_)), "got {err:?}");
}

#[test]
fn settings_given_twice_for_one_task_are_rejected() {
    let err = load(
        "[settings.a]\ncpus = 2\n\
         [task.a]\ncommands = [\"true\"]\nsettings = { cpus = 4 }\n",
    )
    .unwrap_err();
    assert!(matches!(err, BatchdagError::DuplicateSettings(name) if name == "a"));
}

#[test]
fn explicit_job_names_must_be_unique_across_the_plan() {
    let err = ConfigFileBuilder::new()
        .with_task(
            "fit",
            TaskConfigBuilder::jobs(vec![job("step", &["fit one"], &[])]).build(),
        )
        .with_task(
            "toys",
            TaskConfigBuilder::jobs(vec![job("step", &["toys one"], &[])]).build(),
        )
        .try_build()
        .unwrap_err();
    assert!(matches!(err, BatchdagError::ConfigError(_)), "got {err:?}");
}

#[test]
fn generated_job_names_must_not_collide_with_other_tasks() {
    let cases = [
        (
            "merge job vs atomic task",
            "[task.rank]\ncommands = [\"rank\"]\nsplit = 2\nmerge = [\"merge\"]\n\
             [task.rank_merge]\ncommands = [\"other\"]\n",
        ),
        (
            "fan-out job vs script task",
            "[task.toys]\ncommands = [\"toy\"]\nsplit = 2\n\
             [task.toys_job_1_of_2]\nscript = \"toys.sh\"\n",
        ),
        (
            "explicit job vs fan-out job",
            "[task.toys]\ncommands = [\"toy\"]\nsplit = 1\n\
             [task.fit]\n[[task.fit.jobs]]\nname = \"toys_job_1_of_1\"\ncommands = [\"fit\"]\n",
        ),
    ];

    for (label, contents) in cases {
        match load(contents) {
            Err(BatchdagError::ConfigError(msg)) => {
                assert!(msg.contains("job name"), "{label}: {msg}")
            }
            other => panic!("{label}: expected a configuration error, got {other:?}"),
        }
    }
}

#[test]
fn accepted_plan_gives_every_job_its_own_script() -> TestResult {
    let cfg = load(ANALYSIS)?;
    let layout = cfg.script_layout();
    let mut tasks = plan(&cfg);

    let mut names = Vec::new();
    for task in &mut tasks {
        for job in task.generate_jobs()? {
            names.push(job.name().to_string());
        }
    }
    let scripts: std::collections::BTreeSet<PathBuf> =
        names.iter().map(|n| layout.script_path(n)).collect();
    assert_eq!(scripts.len(), names.len(), "{names:?}");
    Ok(())
}

#[test]
fn builder_plan_with_job_chain_is_valid() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_driver(DriverKind::Condor)
        .with_max_concurrent_tasks(2)
        .with_task("prepare", TaskConfigBuilder::commands(&["prepare"]).build())
        .with_task(
            "fit",
            TaskConfigBuilder::jobs(vec![
                job("fit_sr", &["fit sr"], &[]),
                job("fit_combined", &["fit all"], &["fit_sr"]),
            ])
            .after(&["prepare"])
            .build(),
        )
        .try_build()?;

    assert_eq!(cfg.max_concurrent_tasks(), Some(2));
    let mut tasks = plan(&cfg);
    let fit = tasks
        .iter_mut()
        .find(|t| t.name() == "fit")
        .expect("fit task");
    let jobs = fit.generate_jobs()?;
    assert_eq!(jobs[1].prerequisites(), ["fit_sr".to_string()]);
    Ok(())
}
