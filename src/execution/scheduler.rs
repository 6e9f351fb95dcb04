//! Job scheduler - dispatches the instances of a job under fail-fast

use crate::{
    core::{Job, JobInstance, JobOutcome, Pipeline, TriggerEvent},
    execution::{
        engine::{EventSink, ExecutionEvent},
        CancellationFlag, JobExecutor,
    },
    runner::CommandRunner,
};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Engine-wide limit on concurrently running instances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStrategy {
    /// One instance at a time across all jobs
    Sequential,

    /// No global limit; only per-job `max-parallel` applies
    Parallel,

    /// Limited parallelism (max N concurrent instances)
    LimitedParallel(usize),
}

impl Default for SchedulingStrategy {
    fn default() -> Self {
        SchedulingStrategy::Parallel
    }
}

impl SchedulingStrategy {
    /// Global permit count, `None` when unbounded
    pub fn limit(&self) -> Option<usize> {
        match self {
            SchedulingStrategy::Sequential => Some(1),
            SchedulingStrategy::Parallel => None,
            SchedulingStrategy::LimitedParallel(n) => Some((*n).max(1)),
        }
    }
}

/// Dispatches job instances to the job executor
pub struct JobScheduler<R> {
    executor: Arc<JobExecutor<R>>,
    global: Option<Arc<Semaphore>>,
    events: EventSink,
}

impl<R: CommandRunner + 'static> JobScheduler<R> {
    pub fn new(executor: JobExecutor<R>, strategy: SchedulingStrategy, events: EventSink) -> Self {
        Self {
            executor: Arc::new(executor),
            global: strategy.limit().map(|n| Arc::new(Semaphore::new(n))),
            events,
        }
    }

    /// Hold a per-job permit and, if configured, a global one
    async fn permits(
        &self,
        per_job: &Arc<Semaphore>,
    ) -> Option<(OwnedSemaphorePermit, Option<OwnedSemaphorePermit>)> {
        let job_permit = per_job.clone().acquire_owned().await.ok()?;
        let global_permit = match &self.global {
            Some(global) => Some(global.clone().acquire_owned().await.ok()?),
            None => None,
        };
        Some((job_permit, global_permit))
    }

    /// Run every instance of `job`, returning one outcome per instance
    ///
    /// Instances are dispatched in expansion order. The cancellation flag is
    /// checked once both permits are held; an instance that finds it raised is
    /// recorded as skipped without running. Instances already running always
    /// complete.
    pub async fn run_job(
        &self,
        run_id: Uuid,
        pipeline: Arc<Pipeline>,
        job: Arc<Job>,
        event: TriggerEvent,
    ) -> Vec<JobOutcome> {
        let instances = job.instances();
        let limit = job.max_parallel.unwrap_or(instances.len()).max(1);
        let per_job = Arc::new(Semaphore::new(limit));
        let cancel = CancellationFlag::new();
        let required = !job.continue_on_error;

        info!(
            "Dispatching {} instance(s) of job '{}' (max {} in parallel, fail-fast {})",
            instances.len(),
            job.name,
            limit,
            job.fail_fast
        );

        let mut outcomes = Vec::with_capacity(instances.len());
        let mut dispatched = Vec::new();
        let mut running = JoinSet::new();

        for instance in instances {
            let permits = self.permits(&per_job).await;

            if permits.is_none() || cancel.is_cancelled() {
                let reason = match cancel.reason() {
                    Some(reason) => format!("cancelled by fail-fast: {}", reason),
                    None => "cancelled".to_string(),
                };
                debug!("Skipping {}: {}", instance.id(), reason);
                self.events.emit(ExecutionEvent::InstanceSkipped {
                    run_id,
                    instance: instance.id(),
                    reason: reason.clone(),
                });
                outcomes.push(JobOutcome::skipped(instance.id(), instance.index, required, reason));
                continue;
            }

            self.events.emit(ExecutionEvent::InstanceStarted {
                run_id,
                instance: instance.id(),
            });

            dispatched.push((instance.index, instance.id()));
            running.spawn(self.dispatch(
                run_id,
                pipeline.clone(),
                job.clone(),
                instance,
                event.clone(),
                cancel.clone(),
                permits,
            ));
        }

        while let Some(joined) = running.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!("Instance task of job '{}' was lost: {}", job.name, e),
            }
        }

        // every dispatched instance reports, even if its task died
        for (index, id) in dispatched {
            if !outcomes.iter().any(|o| o.index == index) {
                outcomes.push(JobOutcome::crashed(
                    id,
                    index,
                    required,
                    "instance task was lost before reporting",
                ));
            }
        }

        outcomes.sort_by_key(|o| o.index);
        outcomes
    }

    /// The task owning one dispatched instance
    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &self,
        run_id: Uuid,
        pipeline: Arc<Pipeline>,
        job: Arc<Job>,
        instance: JobInstance,
        event: TriggerEvent,
        cancel: CancellationFlag,
        permits: Option<(OwnedSemaphorePermit, Option<OwnedSemaphorePermit>)>,
    ) -> impl std::future::Future<Output = JobOutcome> + Send + 'static {
        let executor = self.executor.clone();
        let events = self.events.clone();

        async move {
            let id = instance.id();
            let index = instance.index;
            let required = !job.continue_on_error;
            let fail_fast = job.fail_fast;

            // a panicking instance still yields an outcome
            let work = tokio::spawn({
                let job = job.clone();
                async move {
                    executor
                        .execute(run_id, &pipeline, &job, &instance, &event)
                        .await
                }
            });
            let outcome = match work.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("{} crashed: {}", id, e);
                    JobOutcome::crashed(id.clone(), index, required, format!("instance crashed: {}", e))
                }
            };

            if outcome.is_failure() && fail_fast {
                info!("{} failed, cancelling remaining instances of '{}'", id, job.name);
                cancel.cancel(format!("{} failed", id));
            }

            events.emit(ExecutionEvent::InstanceFinished {
                run_id,
                instance: id,
                status: outcome.status,
            });

            // released only after the flag is raised
            drop(permits);
            outcome
        }
    }
}
