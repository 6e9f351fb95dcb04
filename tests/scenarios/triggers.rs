//! Test: Triggers - event selection across pipelines

use crate::helpers::*;
use ci_runner::core::{Pipeline, RunStatus, TriggerEvent};
use ci_runner::execution::ExecutionEngine;

fn pipelines() -> Vec<Pipeline> {
    vec![
        pipeline_from_yaml(
            r#"
name: tests
on: [push, pull_request]
jobs:
  - name: test
    steps:
      - type: command
        run: cargo test
"#,
        ),
        pipeline_from_yaml(
            r#"
name: coverage
on: push
jobs:
  - name: coverage
    steps:
      - type: command
        run: cargo llvm-cov
"#,
        ),
        pipeline_from_yaml(
            r#"
name: nightly
on: schedule
jobs:
  - name: bench
    steps:
      - type: command
        run: cargo bench
"#,
        ),
    ]
}

#[tokio::test]
async fn test_push_runs_every_push_pipeline() {
    let workspace = tempfile::tempdir().unwrap();
    let harness = Harness::new(ScriptedRunner::new(), workspace.path());
    let pipelines = pipelines();

    let results = harness
        .engine
        .trigger(&pipelines, &TriggerEvent::new("push"))
        .await;

    let names: Vec<&str> = results.iter().map(|r| r.pipeline.as_str()).collect();
    assert_eq!(names, vec!["tests", "coverage"]);
    assert!(results.iter().all(|r| r.status == RunStatus::Succeeded));
    assert!(!harness.runner.ran("cargo bench"));
}

#[tokio::test]
async fn test_event_names_are_normalized() {
    let pipelines = pipelines();
    let selected =
        ExecutionEngine::<ScriptedRunner>::select(&pipelines, &TriggerEvent::new(" Pull-Request "));
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].name, "tests");
}

#[tokio::test]
async fn test_unmatched_event_runs_nothing() {
    let workspace = tempfile::tempdir().unwrap();
    let harness = Harness::new(ScriptedRunner::new(), workspace.path());

    let results = harness
        .engine
        .trigger(&pipelines(), &TriggerEvent::new("release"))
        .await;
    assert!(results.is_empty());
    assert!(harness.runner.commands().is_empty());
}

#[tokio::test]
async fn test_event_name_is_visible_to_commands() {
    let workspace = tempfile::tempdir().unwrap();
    let harness = Harness::new(ScriptedRunner::new(), workspace.path());
    let pipeline = pipeline_from_yaml(
        r#"
name: tests
on: [push, pull_request]
jobs:
  - name: test
    steps:
      - type: command
        run: echo ${{ event.name }} ${{ pipeline.name }}/${{ job.name }}
"#,
    );

    harness.run(&pipeline, "pull_request").await;
    assert_eq!(harness.runner.commands(), vec!["echo pull_request tests/test"]);
}
