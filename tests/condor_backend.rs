// tests/condor_backend.rs

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use batchdag::errors::BatchdagError;
use batchdag::fs::mock::MockFileSystem;
use batchdag::submit::{CondorJobSubmitter, JobSubmitter, RetryPolicy};
use batchdag::task::{Job, JobSettings, ScriptLayout, Submission};
use batchdag::types::MemoryRequest;
use batchdag_test_utils::{FakeCommandRunner, init_tracing};
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn Error>>;

const SUBMITTED: &str = "File for submitting this DAG to HTCondor : out/submit/chain.dag.condor.sub\n\
                         1 job(s) submitted to cluster 4711.\n";

fn layout() -> Arc<ScriptLayout> {
    Arc::new(ScriptLayout::new("out/submit", "out/logs"))
}

fn chain(layout: &Arc<ScriptLayout>) -> Vec<Job> {
    vec![
        Job::from_commands("A", vec!["echo A".into()], Arc::clone(layout)),
        Job::from_commands("B", vec!["echo B".into()], Arc::clone(layout)).after("A"),
        Job::from_commands("C", vec!["echo C".into()], Arc::clone(layout)).after("B"),
    ]
}

fn submitter(runner: &FakeCommandRunner, fs: &MockFileSystem) -> CondorJobSubmitter {
    CondorJobSubmitter::new(Arc::new(runner.clone()), Arc::new(fs.clone()), "out/submit")
        .with_retry(RetryPolicy::immediate(2))
}

#[tokio::test]
async fn chain_is_written_as_one_dag_and_submitted_once() -> TestResult {
    init_tracing();

    let runner = FakeCommandRunner::new();
    runner.push_stdout("condor_submit_dag", SUBMITTED);
    let fs = MockFileSystem::new();
    let mut jobs = chain(&layout());

    submitter(&runner, &fs).submit(&mut jobs, Some("chain")).await?;

    let dag = fs.contents("out/submit/chain.dag").expect("dag file written");
    assert_eq!(
        dag,
        "JOB A out/submit/A.sub\n\
         JOB B out/submit/B.sub\n\
         JOB C out/submit/C.sub\n\
         PARENT A CHILD B\n\
         PARENT B CHILD C\n"
    );

    assert_eq!(
        runner.calls_to("condor_submit_dag"),
        vec![vec![
            "-force".to_string(),
            "-batch-name".to_string(),
            "chain".to_string(),
            "out/submit/chain.dag".to_string(),
        ]]
    );

    for job in &jobs {
        match job.submission() {
            Some(Submission::Condor {
                cluster_id,
                submit_file,
                dag_file,
            }) => {
                assert_eq!(*cluster_id, 4711);
                assert_eq!(*submit_file, PathBuf::from(format!("out/submit/{}.sub", job.name())));
                assert_eq!(*dag_file, PathBuf::from("out/submit/chain.dag"));
            }
            other => panic!("unexpected submission for {}: {other:?}", job.name()),
        }
    }
    Ok(())
}

#[tokio::test]
async fn scripts_are_executable_and_submit_files_carry_resources() -> TestResult {
    init_tracing();

    let runner = FakeCommandRunner::new();
    runner.push_stdout("condor_submit_dag", SUBMITTED);
    let fs = MockFileSystem::new();
    let layout = layout();
    let heavy = JobSettings::new(8, MemoryRequest::Megabytes(4000), Duration::from_secs(7200));
    let mut jobs = vec![
        Job::from_commands("light", vec!["echo light".into()], Arc::clone(&layout)),
        Job::from_commands("heavy", vec!["echo heavy".into()], Arc::clone(&layout))
            .with_settings(heavy),
    ];

    submitter(&runner, &fs).submit(&mut jobs, Some("mixed")).await?;

    assert!(fs.is_executable("out/submit/light.sh"));
    assert!(fs.is_executable("out/submit/heavy.sh"));

    let light = fs.contents("out/submit/light.sub").expect("submit file written");
    assert_eq!(light, "executable = out/submit/light.sh\nqueue\n");

    let heavy = fs.contents("out/submit/heavy.sub").expect("submit file written");
    assert!(heavy.contains("request_cpus = 8\n"));
    assert!(heavy.contains("request_memory = 4000\n"));
    assert!(heavy.contains("+MaxRuntime = 7200\n"));
    assert!(heavy.ends_with("queue\n"));
    Ok(())
}

#[tokio::test]
async fn batch_without_name_gets_a_generated_one() -> TestResult {
    init_tracing();

    let runner = FakeCommandRunner::new();
    runner.push_stdout("condor_submit_dag", SUBMITTED);
    let fs = MockFileSystem::new();
    let mut jobs = chain(&layout());

    submitter(&runner, &fs).submit(&mut jobs, None).await?;

    let calls = runner.calls_to("condor_submit_dag");
    let batch_name = &calls[0][2];
    assert_eq!(batch_name.len(), 36, "expected a uuid, got {batch_name}");
    assert_eq!(calls[0][3], format!("out/submit/{batch_name}.dag"));
    assert!(fs.contents(&calls[0][3]).is_some());
    Ok(())
}

#[tokio::test]
async fn empty_batch_submits_nothing() -> TestResult {
    let runner = FakeCommandRunner::new();
    let fs = MockFileSystem::new();

    submitter(&runner, &fs).submit(&mut [], Some("nothing")).await?;

    assert!(runner.calls().is_empty());
    assert!(fs.files().is_empty());
    Ok(())
}

#[tokio::test]
async fn transient_submit_failure_is_retried() -> TestResult {
    init_tracing();

    let runner = FakeCommandRunner::new();
    runner
        .push_failure("condor_submit_dag", 1, "schedd not reachable")
        .push_stdout("condor_submit_dag", SUBMITTED);
    let fs = MockFileSystem::new();
    let mut jobs = chain(&layout());

    submitter(&runner, &fs).submit(&mut jobs, Some("chain")).await?;

    assert_eq!(runner.calls_to("condor_submit_dag").len(), 2);
    assert!(jobs.iter().all(Job::is_submitted));
    Ok(())
}

#[tokio::test]
async fn persistent_submit_failure_exhausts_retries() {
    init_tracing();

    let runner = FakeCommandRunner::new();
    runner.always_fail("condor_submit_dag", 1, "schedd not reachable");
    let fs = MockFileSystem::new();
    let mut jobs = chain(&layout());

    let err = submitter(&runner, &fs)
        .submit(&mut jobs, Some("chain"))
        .await
        .expect_err("submission must fail");

    match err {
        BatchdagError::RetryExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(runner.calls_to("condor_submit_dag").len(), 3);
    assert!(jobs.iter().all(|j| !j.is_submitted()));
}

#[tokio::test]
async fn cancelled_run_stops_waiting_between_retries() {
    init_tracing();

    let runner = FakeCommandRunner::new();
    runner.always_fail("condor_submit_dag", 1, "schedd not reachable");
    let fs = MockFileSystem::new();
    let mut jobs = chain(&layout());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let patient = RetryPolicy {
        max_retries: 8,
        initial_delay: Duration::from_secs(600),
        max_delay: Duration::from_secs(600),
        multiplier: 2.0,
    };
    let mut condor =
        CondorJobSubmitter::new(Arc::new(runner.clone()), Arc::new(fs.clone()), "out/submit")
            .with_retry(patient)
            .with_cancel(cancel);

    let err = tokio::time::timeout(Duration::from_secs(5), condor.submit(&mut jobs, Some("chain")))
        .await
        .expect("retry pause must end on cancel")
        .expect_err("submission must fail");

    assert!(matches!(err, BatchdagError::Cancelled), "got {err:?}");
    assert_eq!(runner.calls_to("condor_submit_dag").len(), 1);
    assert!(jobs.iter().all(|j| !j.is_submitted()));
}

#[tokio::test]
async fn unparsable_submit_output_is_not_retried() {
    init_tracing();

    let runner = FakeCommandRunner::new();
    runner.always_stdout("condor_submit_dag", "something unexpected\n");
    let fs = MockFileSystem::new();
    let mut jobs = chain(&layout());

    let err = submitter(&runner, &fs)
        .submit(&mut jobs, Some("chain"))
        .await
        .expect_err("parse failure must surface");

    assert!(matches!(err, BatchdagError::ClusterIdParse(_)), "got {err:?}");
    assert_eq!(runner.calls_to("condor_submit_dag").len(), 1);
}

#[tokio::test]
async fn job_is_complete_once_its_cluster_leaves_the_queue() -> TestResult {
    init_tracing();

    let runner = FakeCommandRunner::new();
    runner
        .push_stdout("condor_submit_dag", SUBMITTED)
        .push_stdout("condor_q", "ClusterId = 4711\n\n")
        .push_stdout("condor_q", "\n");
    let fs = MockFileSystem::new();
    let mut jobs = chain(&layout());
    let mut condor = submitter(&runner, &fs);

    condor.submit(&mut jobs, Some("chain")).await?;

    assert!(!condor.is_complete(&mut jobs[0]).await?);
    assert!(condor.is_complete(&mut jobs[0]).await?);
    assert_eq!(
        runner.calls_to("condor_q")[0],
        vec!["-long", "-attributes", "ClusterId", "4711"]
    );
    Ok(())
}

#[tokio::test]
async fn polling_an_unsubmitted_job_fails() {
    let runner = FakeCommandRunner::new();
    let fs = MockFileSystem::new();
    let mut job = Job::from_script("lonely", "lonely.sh");

    let err = submitter(&runner, &fs)
        .is_complete(&mut job)
        .await
        .expect_err("unsubmitted job cannot be polled");

    assert!(matches!(err, BatchdagError::NotSubmitted(name) if name == "lonely"));
    assert!(runner.calls().is_empty());
}
