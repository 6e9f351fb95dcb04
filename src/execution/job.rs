//! Job executor - runs the ordered steps of one job instance

use crate::{
    core::{
        FailureReport, InstanceContext, Job, JobInstance, JobOutcome, JobStatus, Pipeline,
        StepReport, StepStatus, TriggerEvent,
    },
    execution::{
        engine::{EventSink, ExecutionEvent},
        StepExecutor,
    },
    runner::CommandRunner,
};
use chrono::Utc;
use std::path::PathBuf;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Runs every step of a job instance and produces exactly one outcome
pub struct JobExecutor<R> {
    steps: StepExecutor<R>,
    workspace: PathBuf,
    events: EventSink,
}

impl<R: CommandRunner> JobExecutor<R> {
    pub fn new(steps: StepExecutor<R>, workspace: PathBuf, events: EventSink) -> Self {
        Self {
            steps,
            workspace,
            events,
        }
    }

    /// Execute one instance; after the first failure only `always` steps run
    pub async fn execute(
        &self,
        run_id: Uuid,
        pipeline: &Pipeline,
        job: &Job,
        instance: &JobInstance,
        event: &TriggerEvent,
    ) -> JobOutcome {
        let id = instance.id();
        let required = !job.continue_on_error;
        let started_at = Utc::now();

        let ctx = match InstanceContext::new(pipeline, job, instance, event, &self.workspace) {
            Ok(ctx) => ctx,
            Err(e) => {
                error!("Could not prepare {}: {}", id, e);
                return JobOutcome {
                    id,
                    index: instance.index,
                    target: String::new(),
                    status: JobStatus::Failure,
                    required,
                    steps: Vec::new(),
                    failure: Some(FailureReport::setup(e.to_string())),
                    warnings: Vec::new(),
                    started_at: Some(started_at),
                    finished_at: Some(Utc::now()),
                };
            }
        };

        info!("Running {} on {}", id, ctx.target);

        let mut reports: Vec<StepReport> = Vec::with_capacity(job.steps.len());
        let mut failure: Option<FailureReport> = None;
        let mut warnings = Vec::new();

        for (index, step) in job.steps.iter().enumerate() {
            if failure.is_some() && !step.always {
                reports.push(StepReport::skipped(index, &step.name));
                self.events.emit(ExecutionEvent::StepFinished {
                    run_id,
                    instance: id.clone(),
                    index,
                    name: step.name.clone(),
                    status: StepStatus::Skipped,
                });
                continue;
            }

            self.events.emit(ExecutionEvent::StepStarted {
                run_id,
                instance: id.clone(),
                index,
                name: step.name.clone(),
            });

            let report = self.steps.execute(step, index, &ctx).await;

            self.events.emit(ExecutionEvent::StepFinished {
                run_id,
                instance: id.clone(),
                index,
                name: step.name.clone(),
                status: report.status,
            });

            warnings.extend(
                report
                    .warnings
                    .iter()
                    .map(|w| format!("{}: {}", step.name, w)),
            );

            if report.status == StepStatus::Failure && !step.tolerates_failure() {
                if failure.is_none() {
                    warn!(
                        "{} failed at step '{}' (exit code {:?})",
                        id, step.name, report.exit_code
                    );
                    failure = Some(FailureReport::from_step(&report));
                } else {
                    warn!("Cleanup step '{}' of {} failed", step.name, id);
                }
            }

            reports.push(report);
        }

        let status = if failure.is_some() {
            JobStatus::Failure
        } else {
            JobStatus::Success
        };
        info!("{} finished: {}", id, status);

        JobOutcome {
            id,
            index: instance.index,
            target: ctx.target,
            status,
            required,
            steps: reports,
            failure,
            warnings,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
        }
    }
}
