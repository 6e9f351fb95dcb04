//! Test: Continue On Error - tolerated step and job failures

use crate::helpers::*;
use ci_runner::core::{JobStatus, StepStatus};

#[tokio::test]
async fn test_tolerated_step_failure_becomes_a_warning() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new().fail_on("clippy", 1, "warning: unused");
    let harness = Harness::new(runner, workspace.path());
    let pipeline = pipeline_from_yaml(
        r#"
name: tests
on: push
jobs:
  - name: lint
    steps:
      - type: command
        name: Clippy
        run: cargo clippy
        continue-on-error: true
      - type: command
        name: Fmt
        run: cargo fmt --check
"#,
    );

    let result = harness.run(&pipeline, "push").await;
    assert_pipeline_succeeded(&result);

    let lint = &result.outcomes[0];
    assert_eq!(lint.status, JobStatus::Success);
    assert!(lint.failure.is_none());
    assert_eq!(lint.steps[0].status, StepStatus::Failure);
    assert_eq!(lint.steps[1].status, StepStatus::Success);
    assert_eq!(
        lint.warnings,
        vec!["Clippy: step failed with exit code 1 and continued".to_string()]
    );
}

#[tokio::test]
async fn test_optional_job_failure_is_reported_but_not_blocking() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new().fail_on("nightly test on ubuntu", 101, "ICE");
    let harness = Harness::new(runner, workspace.path());
    let pipeline = pipeline_from_yaml(
        r#"
name: tests
on: push
jobs:
  - name: stable
    steps:
      - type: command
        run: cargo +stable test
  - name: nightly
    continue-on-error: true
    strategy:
      matrix:
        os: [ubuntu, windows]
    steps:
      - type: command
        run: cargo +nightly test on ${{ matrix.os }}
"#,
    );

    let result = harness.run(&pipeline, "push").await;
    assert_pipeline_succeeded(&result);

    let failed = result.failed_instances();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id.job, "nightly");
    assert!(!failed[0].required);
    assert_eq!(failed[0].id.assignment.get("os"), Some("ubuntu"));
}
