//! Test: Matrix Expansion - instance order, include/exclude and env injection

use crate::helpers::*;
use ci_runner::core::config::{ConfigError, PipelineConfig};
use ci_runner::core::JobStatus;

const TESTS: &str = r#"
name: tests
on: [push, pull_request]
jobs:
  - name: test
    runs-on: ${{ matrix.os }}-latest
    strategy:
      matrix:
        os: [ubuntu, windows, macOS]
        rust: ["1.56", stable, nightly]
    steps:
      - type: command
        name: Test
        run: cargo +${{ matrix.rust }} test --target ${{ runner.os }}
"#;

#[test]
fn test_three_by_three_expands_in_declaration_order() {
    let pipeline = pipeline_from_yaml(TESTS);
    let instances = pipeline.jobs[0].instances();

    assert_eq!(instances.len(), 9);
    let names: Vec<String> = instances.iter().map(|i| i.display_name()).collect();
    assert_eq!(names[0], "test (ubuntu, 1.56)");
    assert_eq!(names[1], "test (ubuntu, stable)");
    assert_eq!(names[5], "test (windows, nightly)");
    assert_eq!(names[8], "test (macOS, nightly)");
    for (position, instance) in instances.iter().enumerate() {
        assert_eq!(instance.index, position);
    }
}

#[test]
fn test_include_and_exclude() {
    let pipeline = pipeline_from_yaml(
        r#"
name: tests
on: push
jobs:
  - name: test
    strategy:
      matrix:
        os: [ubuntu, windows]
        rust: [stable, nightly]
        exclude:
          - os: windows
            rust: nightly
        include:
          - os: ubuntu
            rust: beta
    steps:
      - type: command
        run: cargo test
"#,
    );

    let names: Vec<String> = pipeline.jobs[0]
        .instances()
        .iter()
        .map(|i| i.display_name())
        .collect();
    assert_eq!(
        names,
        vec![
            "test (ubuntu, stable)",
            "test (ubuntu, nightly)",
            "test (windows, stable)",
            "test (ubuntu, beta)",
        ]
    );
}

#[test]
fn test_unknown_matrix_key_is_a_config_error() {
    let err = PipelineConfig::from_yaml(
        r#"
name: tests
on: push
jobs:
  - name: test
    strategy:
      matrix:
        os: [ubuntu]
    steps:
      - type: command
        run: cargo +${{ matrix.rust }} test
"#,
    )
    .and_then(|config| config.to_pipeline())
    .unwrap_err();

    assert!(matches!(err, ConfigError::UnknownMatrixKey { .. }), "{}", err);
}

#[tokio::test]
async fn test_every_instance_sees_its_own_assignment() {
    let workspace = tempfile::tempdir().unwrap();
    let harness = Harness::new(ScriptedRunner::new(), workspace.path());
    let pipeline = pipeline_from_yaml(TESTS);

    let result = harness.run(&pipeline, "push").await;
    assert_pipeline_succeeded(&result);
    assert_eq!(statuses(&result, "test"), vec![JobStatus::Success; 9]);

    let windows_nightly = outcome(&result, "test", &["windows", "nightly"]);
    assert_eq!(windows_nightly.index, 5);
    assert_eq!(windows_nightly.target, "windows-latest");

    let recorded = harness.runner.recorded();
    assert_eq!(recorded.len(), 9);
    let run = recorded
        .iter()
        .find(|r| r.command == "cargo +nightly test --target windows-latest")
        .expect("windows nightly command");
    assert_eq!(run.env.get("MATRIX_OS").map(String::as_str), Some("windows"));
    assert_eq!(run.env.get("MATRIX_RUST").map(String::as_str), Some("nightly"));
    assert_eq!(run.env.get("CI_EVENT").map(String::as_str), Some("push"));
    assert_eq!(run.env.get("CI_JOB").map(String::as_str), Some("test"));
}
