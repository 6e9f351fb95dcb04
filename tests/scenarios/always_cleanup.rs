//! Test: Always Steps - cleanup runs after a failure, other steps do not

use crate::helpers::*;
use ci_runner::core::StepStatus;

#[tokio::test]
async fn test_always_steps_run_after_failure() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new().fail_on("cargo test", 1, "1 test failed");
    let harness = Harness::new(runner, workspace.path());
    let pipeline = pipeline_from_yaml(
        r#"
name: tests
on: push
jobs:
  - name: test
    steps:
      - type: command
        name: Start services
        run: docker compose up -d
      - type: command
        name: Test
        run: cargo test
      - type: command
        name: Docs
        run: cargo doc
      - type: command
        name: Stop services
        run: docker compose down
        always: true
"#,
    );

    let result = harness.run(&pipeline, "push").await;
    assert_pipeline_failed(&result);

    assert_eq!(
        harness.runner.commands(),
        vec!["docker compose up -d", "cargo test", "docker compose down"]
    );

    let outcome = &result.outcomes[0];
    let step_statuses: Vec<StepStatus> = outcome.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        step_statuses,
        vec![
            StepStatus::Success,
            StepStatus::Failure,
            StepStatus::Skipped,
            StepStatus::Success,
        ]
    );
    // the first failure is the one reported
    assert_eq!(outcome.failure.as_ref().unwrap().step_name, "Test");
}

#[tokio::test]
async fn test_failing_cleanup_keeps_original_failure() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new()
        .fail_on("cargo test", 1, "")
        .fail_on("docker compose down", 3, "");
    let harness = Harness::new(runner, workspace.path());
    let pipeline = pipeline_from_yaml(
        r#"
name: tests
on: push
jobs:
  - name: test
    steps:
      - type: command
        name: Test
        run: cargo test
      - type: command
        name: Stop services
        run: docker compose down
        always: true
"#,
    );

    let result = harness.run(&pipeline, "push").await;
    let failure = result.outcomes[0].failure.as_ref().unwrap();
    assert_eq!(failure.step_name, "Test");
    assert_eq!(failure.exit_code, Some(1));
    assert_eq!(result.outcomes[0].steps[1].exit_code, Some(3));
}
