//! Test: Coverage - a single-instance job whose upload fails

use crate::helpers::*;
use ci_runner::core::{JobStatus, StepStatus};

const COVERAGE: &str = r#"
name: coverage
on: [push]
env:
  CARGO_INCREMENTAL: 0
jobs:
  - name: coverage
    runs-on: ubuntu-latest
    steps:
      - type: command
        name: Generate coverage
        run: cargo llvm-cov --lcov --output-path lcov.info
      - type: command
        name: Upload coverage
        run: codecov upload lcov.info
      - type: command
        name: Summary
        run: echo done
"#;

#[tokio::test]
async fn test_upload_failure_fails_the_run() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new().fail_on("codecov", 2, "upload rejected: bad token");
    let harness = Harness::new(runner, workspace.path());
    let pipeline = pipeline_from_yaml(COVERAGE);

    let result = harness.run(&pipeline, "push").await;
    assert_pipeline_failed(&result);
    assert_eq!(result.outcomes.len(), 1);

    let coverage = &result.outcomes[0];
    assert!(coverage.id.assignment.is_empty());
    assert_eq!(coverage.status, JobStatus::Failure);
    assert_eq!(coverage.target, "ubuntu-latest");

    let step_statuses: Vec<StepStatus> = coverage.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        step_statuses,
        vec![StepStatus::Success, StepStatus::Failure, StepStatus::Skipped]
    );

    let failure = coverage.failure.as_ref().unwrap();
    assert_eq!(failure.step_index, Some(1));
    assert_eq!(failure.step_name, "Upload coverage");
    assert_eq!(failure.exit_code, Some(2));
    assert!(failure.output.contains("bad token"));

    assert!(!harness.runner.ran("echo done"));
}

#[tokio::test]
async fn test_pipeline_env_reaches_commands() {
    let workspace = tempfile::tempdir().unwrap();
    let harness = Harness::new(ScriptedRunner::new(), workspace.path());
    let pipeline = pipeline_from_yaml(COVERAGE);

    let result = harness.run(&pipeline, "push").await;
    assert_pipeline_succeeded(&result);

    let recorded = harness.runner.recorded();
    assert_eq!(recorded.len(), 3);
    for run in &recorded {
        assert_eq!(run.env.get("CARGO_INCREMENTAL").map(String::as_str), Some("0"));
        assert_eq!(run.env.get("CI").map(String::as_str), Some("true"));
        assert!(!run.env.keys().any(|k| k.starts_with("MATRIX_")));
    }
}
