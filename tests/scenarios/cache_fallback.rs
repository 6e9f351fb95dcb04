//! Test: Cache Fallback - exact hits, prefix fallback and misses

use crate::helpers::*;
use std::fs;

const CACHED_BUILD: &str = r#"
name: tests
on: push
jobs:
  - name: build
    runs-on: ubuntu-latest
    steps:
      - type: cache-restore
        name: Restore target
        key: cargo-${{ runner.os }}-${{ hashFiles('**/Cargo.lock') }}
        restore-keys:
          - cargo-${{ runner.os }}-
        path: target
      - type: command
        name: Build
        run: cargo build
      - type: cache-save
        name: Save target
        key: cargo-${{ runner.os }}-${{ hashFiles('**/Cargo.lock') }}
        path: target
"#;

fn detail(result: &ci_runner::core::PipelineResult, step: usize) -> String {
    result.outcomes[0].steps[step]
        .detail
        .clone()
        .unwrap_or_default()
}

#[tokio::test]
async fn test_miss_then_prefix_fallback_then_exact_hit() {
    let workspace = tempfile::tempdir().unwrap();
    let root = workspace.path();
    fs::write(root.join("Cargo.lock"), "version = 1").unwrap();
    fs::create_dir_all(root.join("target/debug")).unwrap();
    fs::write(root.join("target/debug/app"), "binary v1").unwrap();

    let harness = Harness::new(ScriptedRunner::new(), root);
    let pipeline = pipeline_from_yaml(CACHED_BUILD);

    // cold cache
    let first = harness.run(&pipeline, "push").await;
    assert_pipeline_succeeded(&first);
    assert!(detail(&first, 0).starts_with("cache miss: cargo-ubuntu-latest-"));
    assert!(detail(&first, 2).starts_with("saved cargo-ubuntu-latest-"));
    let keys = harness.cache.keys().await;
    assert_eq!(keys.len(), 1);

    // lockfile changed: the old entry warms the build through the prefix
    fs::write(root.join("Cargo.lock"), "version = 2").unwrap();
    fs::remove_dir_all(root.join("target")).unwrap();
    let second = harness.run(&pipeline, "push").await;
    assert_pipeline_succeeded(&second);
    let restored = detail(&second, 0);
    assert!(restored.starts_with("partial cache hit: "), "{}", restored);
    assert!(restored.contains(&keys[0]));
    assert!(restored.contains("(prefix cargo-ubuntu-latest-)"));
    assert_eq!(
        fs::read_to_string(root.join("target/debug/app")).unwrap(),
        "binary v1"
    );
    assert_eq!(harness.cache.len().await, 2);

    // unchanged lockfile: exact hit
    let third = harness.run(&pipeline, "push").await;
    assert!(detail(&third, 0).starts_with("cache hit: cargo-ubuntu-latest-"));
    assert_eq!(harness.cache.len().await, 2);
}

#[tokio::test]
async fn test_cache_problems_never_fail_the_job() {
    let workspace = tempfile::tempdir().unwrap();
    let harness = Harness::new(ScriptedRunner::new(), workspace.path());
    let pipeline = pipeline_from_yaml(CACHED_BUILD);

    // no target directory to save
    let result = harness.run(&pipeline, "push").await;
    assert_pipeline_succeeded(&result);

    let outcome = &result.outcomes[0];
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].starts_with("Save target: cache save failed"));
    assert!(harness.cache.is_empty().await);
}
