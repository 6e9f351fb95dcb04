//! Per-instance outcomes and the aggregated pipeline result

use crate::core::matrix::InstanceId;
use crate::core::state::{JobStatus, RunStatus, StepStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Lines of output kept in a failure report
pub const FAILURE_TAIL_LINES: usize = 20;

/// Report of one executed (or skipped) step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub name: String,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    /// Masked combined output
    pub output: String,
    /// Short human-readable detail, e.g. a cache hit description
    pub detail: Option<String>,
    pub warnings: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepReport {
    pub fn skipped(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            status: StepStatus::Skipped,
            exit_code: None,
            output: String::new(),
            detail: None,
            warnings: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// The first failing step of an instance
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    /// `None` when the instance failed before any step ran
    pub step_index: Option<usize>,
    pub step_name: String,
    pub exit_code: Option<i32>,
    /// Masked tail of the step output
    pub output: String,
}

impl FailureReport {
    pub fn from_step(report: &StepReport) -> Self {
        Self {
            step_index: Some(report.index),
            step_name: report.name.clone(),
            exit_code: report.exit_code,
            output: tail_lines(&report.output, FAILURE_TAIL_LINES),
        }
    }

    /// Failure that happened outside of any step
    pub fn setup(message: impl Into<String>) -> Self {
        Self {
            step_index: None,
            step_name: "setup".to_string(),
            exit_code: None,
            output: message.into(),
        }
    }
}

/// Last `n` lines of `text`
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

/// Terminal record of one job instance
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub id: InstanceId,
    /// Position in the job's expansion order
    pub index: usize,
    /// Rendered execution target
    pub target: String,
    pub status: JobStatus,
    /// Failures count against the pipeline
    pub required: bool,
    pub steps: Vec<StepReport>,
    pub failure: Option<FailureReport>,
    pub warnings: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobOutcome {
    /// Outcome for an instance that was never dispatched
    pub fn skipped(id: InstanceId, index: usize, required: bool, reason: impl Into<String>) -> Self {
        Self {
            id,
            index,
            target: String::new(),
            status: JobStatus::Skipped,
            required,
            steps: Vec::new(),
            failure: None,
            warnings: vec![reason.into()],
            started_at: None,
            finished_at: None,
        }
    }

    /// Outcome for an instance whose task died without reporting
    pub fn crashed(id: InstanceId, index: usize, required: bool, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            index,
            target: String::new(),
            status: JobStatus::Failure,
            required,
            steps: Vec::new(),
            failure: Some(FailureReport::setup(message)),
            warnings: Vec::new(),
            started_at: Some(now),
            finished_at: Some(now),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == JobStatus::Failure
    }

    /// A failure that makes the pipeline fail
    pub fn is_blocking_failure(&self) -> bool {
        self.required && self.is_failure()
    }
}

/// Aggregated result of one triggered pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub pipeline: String,
    pub event: String,
    pub status: RunStatus,
    /// Sorted by job declaration order, then instance index
    pub outcomes: Vec<JobOutcome>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineResult {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Outcome of a specific instance
    pub fn outcome(&self, id: &InstanceId) -> Option<&JobOutcome> {
        self.outcomes.iter().find(|o| &o.id == id)
    }

    /// Outcomes of one job
    pub fn job_outcomes<'a>(&'a self, job: &'a str) -> impl Iterator<Item = &'a JobOutcome> + 'a {
        self.outcomes.iter().filter(move |o| o.id.job == job)
    }

    /// Instances that failed, required or not
    pub fn failed_instances(&self) -> Vec<&JobOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure()).collect()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Process exit code for this result
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }
}
