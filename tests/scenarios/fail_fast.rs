//! Test: Fail-Fast - a failing instance cancels undispatched siblings

use crate::helpers::*;
use ci_runner::core::{JobStatus, StepStatus};
use ci_runner::execution::ExecutionEvent;
use std::time::Duration;

fn tests_pipeline(fail_fast: bool, max_parallel: Option<usize>) -> String {
    let max_parallel = max_parallel
        .map(|n| format!("      max-parallel: {}\n", n))
        .unwrap_or_default();
    format!(
        r#"
name: tests
on: push
jobs:
  - name: test
    strategy:
      fail-fast: {}
{}      matrix:
        os: [ubuntu, windows, macOS]
        rust: ["1.56", stable, nightly]
    steps:
      - type: command
        name: Build
        run: cargo +${{{{ matrix.rust }}}} build on ${{{{ matrix.os }}}}
      - type: command
        name: Test
        run: cargo +${{{{ matrix.rust }}}} test on ${{{{ matrix.os }}}}
"#,
        fail_fast, max_parallel
    )
}

#[tokio::test]
async fn test_failure_cancels_remaining_instances() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new().fail_on("nightly test on windows", 101, "linker failed");
    let harness = Harness::new(runner, workspace.path());
    let pipeline = pipeline_from_yaml(&tests_pipeline(true, Some(1)));

    let result = harness.run(&pipeline, "push").await;
    assert_pipeline_failed(&result);

    let mut expected = vec![JobStatus::Success; 5];
    expected.push(JobStatus::Failure);
    expected.extend([JobStatus::Skipped; 3]);
    assert_eq!(statuses(&result, "test"), expected);

    let failed = outcome(&result, "test", &["windows", "nightly"]);
    let failure = failed.failure.as_ref().expect("failure report");
    assert_eq!(failure.step_name, "Test");
    assert_eq!(failure.exit_code, Some(101));
    assert!(failure.output.contains("linker failed"));

    let skipped = outcome(&result, "test", &["macOS", "1.56"]);
    assert!(skipped.steps.is_empty());
    assert!(skipped.warnings[0].contains("test (windows, nightly) failed"));

    // nothing of the cancelled instances ever reached the runner
    assert!(!harness.runner.ran("on macOS"));
    assert_eq!(harness.runner.commands().len(), 12);

    let skipped_events = harness
        .events()
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::InstanceSkipped { .. }))
        .count();
    assert_eq!(skipped_events, 3);
}

#[tokio::test]
async fn test_failure_does_not_interrupt_running_instances() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new()
        .fail_on("1.56 build on ubuntu", 1, "")
        .with_delay(Duration::from_millis(20));
    let harness = Harness::new(runner, workspace.path());
    let pipeline = pipeline_from_yaml(&tests_pipeline(true, None));

    let result = harness.run(&pipeline, "push").await;
    assert_pipeline_failed(&result);

    // all nine start together, so none is cancelled
    assert_eq!(result.count(JobStatus::Skipped), 0);
    assert_eq!(result.count(JobStatus::Failure), 1);
    let first = outcome(&result, "test", &["ubuntu", "1.56"]);
    assert_eq!(first.steps[1].status, StepStatus::Skipped);
}

#[tokio::test]
async fn test_without_fail_fast_every_instance_runs() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new().fail_on("nightly test on windows", 101, "");
    let harness = Harness::new(runner, workspace.path());
    let pipeline = pipeline_from_yaml(&tests_pipeline(false, Some(1)));

    let result = harness.run(&pipeline, "push").await;
    assert_pipeline_failed(&result);

    assert_eq!(result.count(JobStatus::Success), 8);
    assert_eq!(result.count(JobStatus::Failure), 1);
    assert_eq!(result.count(JobStatus::Skipped), 0);
    assert!(harness.runner.ran("nightly test on macOS"));
}

#[tokio::test]
async fn test_fail_fast_is_scoped_to_one_job() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new().fail_on("fmt on ubuntu", 1, "");
    let harness = Harness::new(runner, workspace.path());
    let pipeline = pipeline_from_yaml(
        r#"
name: tests
on: push
jobs:
  - name: lint
    strategy:
      max-parallel: 1
      matrix:
        os: [ubuntu, windows]
    steps:
      - type: command
        run: cargo fmt on ${{ matrix.os }}
  - name: test
    strategy:
      max-parallel: 1
      matrix:
        os: [ubuntu, windows]
    steps:
      - type: command
        run: cargo test on ${{ matrix.os }}
"#,
    );

    let result = harness.run(&pipeline, "push").await;
    assert_pipeline_failed(&result);
    assert_eq!(
        statuses(&result, "lint"),
        vec![JobStatus::Failure, JobStatus::Skipped]
    );
    assert_eq!(
        statuses(&result, "test"),
        vec![JobStatus::Success, JobStatus::Success]
    );
}
