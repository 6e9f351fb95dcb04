//! Test utility functions for scenario tests

use async_trait::async_trait;
use ci_runner::cache::{CacheStore, InMemoryCacheStore};
use ci_runner::core::config::PipelineConfig;
use ci_runner::core::secrets::StaticSecrets;
use ci_runner::core::{JobOutcome, JobStatus, Pipeline, PipelineResult, RunStatus, TriggerEvent};
use ci_runner::execution::{EngineConfig, ExecutionEngine, ExecutionEvent, SchedulingStrategy};
use ci_runner::runner::{CommandOutput, CommandRunner, Invocation, RunnerError};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A command the scripted runner saw
#[derive(Debug, Clone)]
pub struct Recorded {
    pub command: String,
    pub env: BTreeMap<String, String>,
}

/// Runner that never spawns anything
///
/// A command exits with the code of the first rule whose needle it contains,
/// or 0. Every invocation is recorded in order.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, i32, String)>,
    delay: Option<Duration>,
    recorded: Mutex<Vec<Recorded>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `needle` exit with `code` and print `output`
    pub fn fail_on(mut self, needle: &str, code: i32, output: &str) -> Self {
        self.rules.push((needle.to_string(), code, output.to_string()));
        self
    }

    /// Sleep before answering, so instances overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.recorded().into_iter().map(|r| r.command).collect()
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.commands().iter().any(|c| c.contains(needle))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        self.recorded.lock().unwrap().push(Recorded {
            command: invocation.command.clone(),
            env: invocation.env.clone(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        for (needle, code, output) in &self.rules {
            if invocation.command.contains(needle.as_str()) {
                return Ok(CommandOutput::new(*code, output.clone(), ""));
            }
        }
        Ok(CommandOutput::new(0, format!("ran: {}", invocation.command), ""))
    }
}

/// Everything a scenario needs after a run
pub struct Harness {
    pub runner: Arc<ScriptedRunner>,
    pub cache: Arc<InMemoryCacheStore>,
    pub events: Arc<Mutex<Vec<ExecutionEvent>>>,
    pub engine: ExecutionEngine<Arc<ScriptedRunner>>,
}

impl Harness {
    pub fn new(runner: ScriptedRunner, workspace: &Path) -> Self {
        Self::with_secrets(runner, workspace, StaticSecrets::new())
    }

    pub fn with_secrets(runner: ScriptedRunner, workspace: &Path, secrets: StaticSecrets) -> Self {
        Self::build(
            runner,
            Arc::new(InMemoryCacheStore::new()),
            workspace,
            secrets,
            SchedulingStrategy::Parallel,
        )
    }

    pub fn build(
        runner: ScriptedRunner,
        cache: Arc<InMemoryCacheStore>,
        workspace: &Path,
        secrets: StaticSecrets,
        strategy: SchedulingStrategy,
    ) -> Self {
        let runner = Arc::new(runner);
        let config = EngineConfig::new(workspace).with_strategy(strategy);
        let engine = ExecutionEngine::new(
            runner.clone(),
            cache.clone() as Arc<dyn CacheStore>,
            Arc::new(secrets),
            config,
        );

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

        Self {
            runner,
            cache,
            events,
            engine,
        }
    }

    pub async fn run(&self, pipeline: &Pipeline, event: &str) -> PipelineResult {
        self.engine.execute(pipeline, &TriggerEvent::new(event)).await
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }
}

pub fn pipeline_from_yaml(yaml: &str) -> Pipeline {
    PipelineConfig::from_yaml(yaml)
        .expect("valid yaml")
        .to_pipeline()
        .expect("valid pipeline")
}

/// Outcome of the instance of `job` whose assignment has these values
pub fn outcome<'a>(result: &'a PipelineResult, job: &'a str, values: &[&str]) -> &'a JobOutcome {
    result
        .job_outcomes(job)
        .find(|o| {
            let assigned: Vec<&str> = o.id.assignment.iter().map(|(_, v)| v).collect();
            assigned == values
        })
        .unwrap_or_else(|| panic!("no outcome for {} {:?}", job, values))
}

pub fn assert_pipeline_succeeded(result: &PipelineResult) {
    assert_eq!(
        result.status,
        RunStatus::Succeeded,
        "expected success, failed instances: {:?}",
        result
            .failed_instances()
            .iter()
            .map(|o| (o.id.to_string(), o.failure.clone()))
            .collect::<Vec<_>>()
    );
    assert_eq!(result.exit_code(), 0);
}

pub fn assert_pipeline_failed(result: &PipelineResult) {
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.exit_code(), 1);
}

pub fn statuses(result: &PipelineResult, job: &str) -> Vec<JobStatus> {
    result.job_outcomes(job).map(|o| o.status).collect()
}
