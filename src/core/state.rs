//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use uuid::Uuid;

/// Overall status of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run has not started
    Pending,
    /// Instances are being dispatched or are running
    Running,
    /// Every required instance succeeded or was skipped
    Succeeded,
    /// At least one required instance failed
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }

    /// Whether the state machine allows moving to `next`
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Running, RunStatus::Succeeded)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Terminal status of one job instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Success,
    Failure,
    /// Never dispatched because fail-fast cancelled it
    Skipped,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
            JobStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Status of one step within an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Success,
    Failure,
    /// Not run because an earlier step failed
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Success => "success",
            StepStatus::Failure => "failure",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Lifecycle of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunState {
    /// Unique run ID
    pub run_id: Uuid,

    pub status: RunStatus,

    /// When the run started
    pub started_at: Option<DateTime<Utc>>,

    /// When the run reached a terminal status
    pub finished_at: Option<DateTime<Utc>>,

    /// Number of instances the run dispatches or skips
    pub total_instances: usize,

    /// Instances with a recorded outcome
    pub finished_instances: usize,
}

impl PipelineRunState {
    /// Create a new run state
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: RunStatus::Pending,
            started_at: None,
            finished_at: None,
            total_instances: 0,
            finished_instances: 0,
        }
    }

    /// Move to `next`; illegal transitions are ignored and logged
    pub fn transition(&mut self, next: RunStatus) -> bool {
        if !self.status.can_transition_to(next) {
            warn!(
                "Ignoring illegal run transition {} -> {} for run {}",
                self.status, next, self.run_id
            );
            return false;
        }

        match next {
            RunStatus::Running => self.started_at = Some(Utc::now()),
            RunStatus::Succeeded | RunStatus::Failed => self.finished_at = Some(Utc::now()),
            RunStatus::Pending => {}
        }
        self.status = next;
        true
    }

    /// Mark run as started
    pub fn start(&mut self, total_instances: usize) -> bool {
        self.total_instances = total_instances;
        self.transition(RunStatus::Running)
    }

    /// Count one more recorded outcome
    pub fn record_outcome(&mut self) {
        self.finished_instances += 1;
    }

    /// Mark run as finished
    pub fn finish(&mut self, failed: bool) -> bool {
        self.transition(if failed {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        })
    }

    /// Calculate progress percentage (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_instances == 0 {
            return 0.0;
        }
        self.finished_instances as f64 / self.total_instances as f64
    }
}

impl Default for PipelineRunState {
    fn default() -> Self {
        Self::new()
    }
}
