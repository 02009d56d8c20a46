// tests/torque_backend.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use batchdag::errors::BatchdagError;
use batchdag::fs::mock::MockFileSystem;
use batchdag::submit::{JobSubmitter, TorqueJobSubmitter};
use batchdag::task::{Job, JobSettings, ScriptLayout, Submission};
use batchdag::types::MemoryRequest;
use batchdag_test_utils::{FakeCommandRunner, init_tracing};

type TestResult = Result<(), Box<dyn Error>>;

fn qstat(id: &str, state: char, queue: &str) -> String {
    format!(
        "Job ID                    Name             User            Time Use S Queue\n\
         ------------------------- ---------------- --------------- -------- - -----\n\
         {id:<25} job.sh           analyst         00:00:42 {state} {queue}\n"
    )
}

fn layout() -> Arc<ScriptLayout> {
    Arc::new(ScriptLayout::new("out/submit", "out/logs"))
}

fn submitter(runner: &FakeCommandRunner, fs: &MockFileSystem) -> TorqueJobSubmitter {
    TorqueJobSubmitter::new(Arc::new(runner.clone()), Arc::new(fs.clone()))
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

#[tokio::test]
async fn parents_are_submitted_first_and_children_depend_on_their_ids() -> TestResult {
    init_tracing();

    let runner = FakeCommandRunner::new();
    runner
        .push_stdout("qsub", "101.srv\n")
        .push_stdout("qsub", "102.srv\n")
        .push_stdout("qsub", "103.srv\n");
    let fs = MockFileSystem::new();
    let layout = layout();
    let mut jobs = vec![
        Job::from_commands("merge", vec!["echo merge".into()], Arc::clone(&layout))
            .after("left")
            .after("right"),
        Job::from_commands("left", vec!["echo left".into()], Arc::clone(&layout)),
        Job::from_commands("right", vec!["echo right".into()], Arc::clone(&layout)),
    ];

    submitter(&runner, &fs).submit(&mut jobs, Some("split")).await?;

    assert_eq!(
        runner.calls_to("qsub"),
        vec![
            strings(&["-q", "short", "-l", "nodes=1:ppn=1", "out/submit/left.sh"]),
            strings(&["-q", "short", "-l", "nodes=1:ppn=1", "out/submit/right.sh"]),
            strings(&[
                "-q",
                "short",
                "-l",
                "nodes=1:ppn=1",
                "-W",
                "depend=afterok:101.srv:102.srv",
                "out/submit/merge.sh",
            ]),
        ]
    );

    let ids: Vec<Option<String>> = jobs
        .iter()
        .map(|j| j.submission().and_then(|s| s.cluster_id()))
        .collect();
    assert_eq!(
        ids,
        vec![
            Some("103.srv".to_string()),
            Some("101.srv".to_string()),
            Some("102.srv".to_string()),
        ]
    );
    assert!(fs.contents("out/submit/merge.sh").is_some());
    Ok(())
}

#[tokio::test]
async fn long_jobs_go_to_the_generic_queue_with_their_cpus() -> TestResult {
    init_tracing();

    let runner = FakeCommandRunner::new();
    runner.push_stdout("qsub", "7.srv\n");
    let fs = MockFileSystem::new();
    let settings = JobSettings::new(4, MemoryRequest::default(), Duration::from_secs(14401));
    let mut jobs = vec![Job::from_script("fit", "/ana/fit.sh").with_settings(settings)];

    submitter(&runner, &fs).submit(&mut jobs, Some("fit")).await?;

    assert_eq!(
        runner.calls_to("qsub"),
        vec![strings(&["-q", "generic", "-l", "nodes=1:ppn=4", "/ana/fit.sh"])]
    );
    match jobs[0].submission() {
        Some(Submission::Torque { cluster_id, queue }) => {
            assert_eq!(cluster_id, "7.srv");
            assert_eq!(queue, "generic");
        }
        other => panic!("unexpected submission: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn qsub_failure_stops_the_batch() {
    init_tracing();

    let runner = FakeCommandRunner::new();
    runner
        .push_stdout("qsub", "1.srv\n")
        .push_failure("qsub", 2, "qsub: Unknown queue");
    let fs = MockFileSystem::new();
    let mut jobs = vec![
        Job::from_script("a", "a.sh"),
        Job::from_script("b", "b.sh").after("a"),
        Job::from_script("c", "c.sh").after("b"),
    ];

    let err = submitter(&runner, &fs)
        .submit(&mut jobs, Some("abc"))
        .await
        .expect_err("qsub failure must surface");

    assert!(matches!(err, BatchdagError::CommandFailed { .. }), "got {err:?}");
    assert_eq!(runner.calls_to("qsub").len(), 2);
    assert!(jobs[0].is_submitted());
    assert!(!jobs[2].is_submitted());
}

#[tokio::test]
async fn blank_qsub_reply_is_rejected() {
    let runner = FakeCommandRunner::new();
    runner.push_stdout("qsub", "  \n");
    let fs = MockFileSystem::new();
    let mut jobs = vec![Job::from_script("a", "a.sh")];

    let err = submitter(&runner, &fs)
        .submit(&mut jobs, Some("a"))
        .await
        .expect_err("blank id must be rejected");

    assert!(matches!(err, BatchdagError::ClusterIdParse(_)), "got {err:?}");
}

#[tokio::test]
async fn only_state_c_counts_as_complete() -> TestResult {
    init_tracing();

    let runner = FakeCommandRunner::new();
    runner
        .push_stdout("qsub", "55.srv\n")
        .push_stdout("qstat", &qstat("55.srv", 'Q', "short"))
        .push_stdout("qstat", &qstat("55.srv", 'R', "short"))
        .push_stdout("qstat", &qstat("55.srv", 'C', "short"));
    let fs = MockFileSystem::new();
    let mut jobs = vec![Job::from_script("a", "a.sh")];
    let mut torque = submitter(&runner, &fs);

    torque.submit(&mut jobs, Some("a")).await?;

    assert!(!torque.is_complete(&mut jobs[0]).await?);
    assert!(!torque.is_complete(&mut jobs[0]).await?);
    assert!(torque.is_complete(&mut jobs[0]).await?);
    assert_eq!(runner.calls_to("qstat")[0], vec!["55.srv".to_string()]);
    Ok(())
}

#[tokio::test]
async fn failing_or_unmatched_qstat_means_still_running() -> TestResult {
    init_tracing();

    let runner = FakeCommandRunner::new();
    runner
        .push_stdout("qsub", "55.srv\n")
        .push_failure("qstat", 153, "qstat: Unknown Job Id 55.srv")
        .push_stdout("qstat", &qstat("55.srv", 'C', "generic"));
    let fs = MockFileSystem::new();
    let mut jobs = vec![Job::from_script("a", "a.sh")];
    let mut torque = submitter(&runner, &fs);

    torque.submit(&mut jobs, Some("a")).await?;

    assert!(!torque.is_complete(&mut jobs[0]).await?);
    // The job went to `short`; a completed line on another queue does not count.
    assert!(!torque.is_complete(&mut jobs[0]).await?);
    Ok(())
}
