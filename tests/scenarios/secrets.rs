//! Test: Secrets - injection, masking and missing secrets

use crate::helpers::*;
use ci_runner::core::secrets::StaticSecrets;

const PUBLISH: &str = r#"
name: release
on: release
jobs:
  - name: publish
    steps:
      - type: command
        name: Publish
        run: cargo publish --token $CARGO_TOKEN
        secrets: [CARGO_TOKEN, SLACK_WEBHOOK]
        env:
          CARGO_TOKEN: overridden-by-secret
"#;

#[tokio::test]
async fn test_secret_values_are_injected_and_masked() {
    let workspace = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new().fail_on("cargo publish", 1, "401 for token s3cr3t-value");
    let secrets = StaticSecrets::new().with_secret("CARGO_TOKEN", "s3cr3t-value");
    let harness = Harness::with_secrets(runner, workspace.path(), secrets);
    let pipeline = pipeline_from_yaml(PUBLISH);

    let result = harness.run(&pipeline, "release").await;
    assert_pipeline_failed(&result);

    let recorded = harness.runner.recorded();
    assert_eq!(
        recorded[0].env.get("CARGO_TOKEN").map(String::as_str),
        Some("s3cr3t-value")
    );
    assert!(!recorded[0].env.contains_key("SLACK_WEBHOOK"));

    let outcome = &result.outcomes[0];
    let failure = outcome.failure.as_ref().unwrap();
    assert!(!failure.output.contains("s3cr3t-value"));
    assert!(failure.output.contains("401 for token ***"));
    assert!(!outcome.steps[0].output.contains("s3cr3t-value"));

    assert_eq!(
        outcome.warnings,
        vec!["Publish: secret 'SLACK_WEBHOOK' is not available".to_string()]
    );
}
