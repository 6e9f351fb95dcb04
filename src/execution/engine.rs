//! Main execution engine - turns trigger events into pipeline results

use crate::{
    cache::CacheStore,
    core::{
        secrets::SecretStore, InstanceId, JobOutcome, JobStatus, Pipeline, PipelineResult,
        PipelineRunState, RunStatus, StepStatus, TriggerEvent,
    },
    execution::{JobExecutor, JobScheduler, SchedulingStrategy, StepExecutor},
    runner::CommandRunner,
};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a pipeline run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        run_id: Uuid,
        pipeline: String,
        event: String,
        instances: usize,
    },
    InstanceStarted {
        run_id: Uuid,
        instance: InstanceId,
    },
    StepStarted {
        run_id: Uuid,
        instance: InstanceId,
        index: usize,
        name: String,
    },
    StepFinished {
        run_id: Uuid,
        instance: InstanceId,
        index: usize,
        name: String,
        status: StepStatus,
    },
    InstanceFinished {
        run_id: Uuid,
        instance: InstanceId,
        status: JobStatus,
    },
    /// Never dispatched because fail-fast cancelled it
    InstanceSkipped {
        run_id: Uuid,
        instance: InstanceId,
        reason: String,
    },
    PipelineFinished {
        run_id: Uuid,
        pipeline: String,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of execution events to registered handlers
#[derive(Clone, Default)]
pub struct EventSink {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventSink {
    pub fn add(&self, handler: EventHandler) {
        match self.handlers.write() {
            Ok(mut handlers) => handlers.push(handler),
            Err(_) => warn!("Event handler registry is poisoned; handler dropped"),
        }
    }

    /// Emit an event to all handlers
    ///
    /// A panicking handler is logged and does not reach the caller.
    pub fn emit(&self, event: ExecutionEvent) {
        let handlers = match self.handlers.read() {
            Ok(handlers) => handlers.clone(),
            Err(_) => return,
        };
        for handler in handlers.iter() {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| handler(event.clone())));
            if delivered.is_err() {
                warn!("Event handler panicked on {:?}", event);
            }
        }
    }
}

/// Runtime settings of the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory commands run in and cache paths are relative to
    pub workspace: PathBuf,

    pub strategy: SchedulingStrategy,

    /// Timeout for command steps without their own `timeout-secs`
    pub step_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            strategy: SchedulingStrategy::default(),
            step_timeout: None,
        }
    }
}

impl EngineConfig {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            ..Self::default()
        }
    }

    pub fn with_strategy(mut self, strategy: SchedulingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }
}

/// Main pipeline execution engine
pub struct ExecutionEngine<R> {
    scheduler: Arc<JobScheduler<R>>,
    events: EventSink,
}

impl<R> Clone for ExecutionEngine<R> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            events: self.events.clone(),
        }
    }
}

impl<R: CommandRunner + 'static> ExecutionEngine<R> {
    pub fn new(
        runner: R,
        cache: Arc<dyn CacheStore>,
        secrets: Arc<dyn SecretStore>,
        config: EngineConfig,
    ) -> Self {
        let events = EventSink::default();
        let steps =
            StepExecutor::new(runner, cache, secrets).with_default_timeout(config.step_timeout);
        let jobs = JobExecutor::new(steps, config.workspace, events.clone());
        let scheduler = JobScheduler::new(jobs, config.strategy, events.clone());

        Self {
            scheduler: Arc::new(scheduler),
            events,
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.add(Arc::new(handler));
    }

    /// Pipelines whose trigger set contains the event kind
    pub fn select<'a>(pipelines: &'a [Pipeline], event: &TriggerEvent) -> Vec<&'a Pipeline> {
        pipelines
            .iter()
            .filter(|p| p.is_triggered_by(event))
            .collect()
    }

    /// Run every pipeline triggered by `event`, concurrently
    ///
    /// Results come back in the order the pipelines were given.
    pub async fn trigger(&self, pipelines: &[Pipeline], event: &TriggerEvent) -> Vec<PipelineResult> {
        let selected = Self::select(pipelines, event);
        if selected.is_empty() {
            info!("No pipeline is triggered by '{}'", event);
            return Vec::new();
        }

        let mut runs = JoinSet::new();
        for (position, pipeline) in selected.iter().enumerate() {
            let engine = self.clone();
            let pipeline = (*pipeline).clone();
            let event = event.clone();
            runs.spawn(async move { (position, engine.execute(&pipeline, &event).await) });
        }

        let mut results = Vec::new();
        while let Some(joined) = runs.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!("Pipeline run task failed: {}", e),
            }
        }

        // a lost run still counts as failed
        for (position, pipeline) in selected.iter().enumerate() {
            if !results.iter().any(|(p, _)| *p == position) {
                results.push((position, Self::lost_run(pipeline, event)));
            }
        }

        results.sort_by_key(|(position, _)| *position);
        results.into_iter().map(|(_, result)| result).collect()
    }

    /// Failed result for a pipeline whose run task died before reporting
    fn lost_run(pipeline: &Pipeline, event: &TriggerEvent) -> PipelineResult {
        let mut state = PipelineRunState::new();
        state.start(pipeline.instance_count());
        state.finish(true);
        PipelineResult {
            run_id: state.run_id,
            pipeline: pipeline.name.clone(),
            event: event.kind().to_string(),
            status: state.status,
            outcomes: Vec::new(),
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }

    /// Run one pipeline for `event`, whether or not it is triggered by it
    pub async fn execute(&self, pipeline: &Pipeline, event: &TriggerEvent) -> PipelineResult {
        let pipeline = Arc::new(pipeline.clone());
        let mut state = PipelineRunState::new();
        let run_id = state.run_id;
        let total = pipeline.instance_count();

        info!(
            "Starting pipeline '{}' for '{}' ({} instance(s), run {})",
            pipeline.name, event, total, run_id
        );
        state.start(total);
        self.events.emit(ExecutionEvent::PipelineStarted {
            run_id,
            pipeline: pipeline.name.clone(),
            event: event.kind().to_string(),
            instances: total,
        });

        // jobs only share the cache, so they all run at once
        let mut jobs = JoinSet::new();
        for (position, job) in pipeline.jobs.iter().enumerate() {
            let scheduler = self.scheduler.clone();
            let pipeline = pipeline.clone();
            let job = job.clone();
            let event = event.clone();
            jobs.spawn(async move {
                let outcomes = scheduler.run_job(run_id, pipeline, job, event).await;
                (position, outcomes)
            });
        }

        let mut grouped: Vec<(usize, Vec<JobOutcome>)> = Vec::with_capacity(pipeline.jobs.len());
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(entry) => grouped.push(entry),
                Err(e) => error!("Job task of pipeline '{}' failed: {}", pipeline.name, e),
            }
        }

        // a job whose task died reports every instance as crashed
        for (position, job) in pipeline.jobs.iter().enumerate() {
            if grouped.iter().any(|(p, _)| *p == position) {
                continue;
            }
            let required = !job.continue_on_error;
            let crashed = job
                .instances()
                .iter()
                .map(|instance| {
                    JobOutcome::crashed(
                        instance.id(),
                        instance.index,
                        required,
                        "job task was lost before reporting",
                    )
                })
                .collect();
            grouped.push((position, crashed));
        }

        grouped.sort_by_key(|(position, _)| *position);
        let outcomes: Vec<JobOutcome> = grouped.into_iter().flat_map(|(_, o)| o).collect();
        for _ in &outcomes {
            state.record_outcome();
        }

        let failed = outcomes.iter().any(|o| o.is_blocking_failure());
        state.finish(failed);

        for outcome in outcomes.iter().filter(|o| o.is_failure()) {
            let failure = outcome.failure.as_ref();
            warn!(
                "{} failed at '{}' (exit code {:?}){}",
                outcome.id,
                failure.map(|f| f.step_name.as_str()).unwrap_or("?"),
                failure.and_then(|f| f.exit_code),
                if outcome.required { "" } else { " [not required]" }
            );
        }
        info!("Pipeline '{}' finished: {}", pipeline.name, state.status);

        self.events.emit(ExecutionEvent::PipelineFinished {
            run_id,
            pipeline: pipeline.name.clone(),
            status: state.status,
        });

        PipelineResult {
            run_id,
            pipeline: pipeline.name.clone(),
            event: event.kind().to_string(),
            status: state.status,
            outcomes,
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }
}
