//! CLI output formatting

use crate::core::{
    FailureReport, InstanceId, JobOutcome, JobStatus, Pipeline, PipelineResult, RunStatus,
    StepReport, StepStatus,
};
use crate::execution::ExecutionEvent;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a run status for display
pub fn format_run_status(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => style("PENDING").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format an instance status for display
pub fn format_job_status(status: JobStatus) -> String {
    match status {
        JobStatus::Success => style("SUCCESS").green().to_string(),
        JobStatus::Failure => style("FAILURE").red().to_string(),
        JobStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

fn step_icon(status: StepStatus) -> Emoji<'static, 'static> {
    match status {
        StepStatus::Success => CHECK,
        StepStatus::Failure => CROSS,
        StepStatus::Skipped => SKIP,
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    let line = match event {
        ExecutionEvent::PipelineStarted {
            run_id,
            pipeline,
            event,
            instances,
        } => format!(
            "{} Starting pipeline {} for {} ({} instances, {})",
            ROCKET,
            style(pipeline).bold(),
            style(event).cyan(),
            instances,
            style(&run_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::InstanceStarted { instance, .. } => {
            format!("{} {}", SPINNER, style(instance).cyan())
        }
        ExecutionEvent::StepFinished {
            instance,
            name,
            status,
            ..
        } => format!(
            "   {}{} {}",
            step_icon(*status),
            style(instance).dim(),
            name
        ),
        ExecutionEvent::InstanceFinished {
            instance, status, ..
        } => {
            let icon = if *status == JobStatus::Success { CHECK } else { CROSS };
            format!("{} {} {}", icon, style(instance).bold(), format_job_status(*status))
        }
        ExecutionEvent::InstanceSkipped {
            instance, reason, ..
        } => format!("{} {} {}", SKIP, style(instance).dim(), style(reason).dim()),
        ExecutionEvent::PipelineFinished {
            pipeline, status, ..
        } => format!(
            "{} Pipeline {} {}",
            INFO,
            style(pipeline).bold(),
            format_run_status(*status)
        ),
        ExecutionEvent::StepStarted { .. } => return None,
    };
    Some(line)
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

/// Heading above a step's captured output
pub fn format_step_heading(instance: &InstanceId, step: &StepReport) -> String {
    let mut out = format!("{} {} / {}", INFO, style(instance).bold(), style(&step.name).cyan());
    if let Some(ms) = step.duration_ms() {
        out.push_str(&format!(" {}", style(format!("({} ms)", ms)).dim()));
    }
    out
}

/// Describe a failed instance: assignment, failing step, exit code and output
pub fn format_failure(outcome: &JobOutcome) -> String {
    let mut out = format!("{} {}", CROSS, style(&outcome.id.job).bold());
    if !outcome.id.assignment.is_empty() {
        out.push_str(&format!(" [{}]", outcome.id.assignment));
    }
    if !outcome.required {
        out.push_str(&format!(" {}", style("(not required)").dim()));
    }

    if let Some(FailureReport {
        step_name,
        exit_code,
        output,
        ..
    }) = &outcome.failure
    {
        let code = exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string());
        out.push_str(&format!(
            "\n    step: {}\n    exit code: {}",
            style(step_name).red(),
            code
        ));
        if !output.trim().is_empty() {
            for line in output.lines() {
                out.push_str(&format!("\n    {} {}", style("|").dim(), line));
            }
        }
    }
    out
}

/// One-line summary of a pipeline result
pub fn format_result_summary(result: &PipelineResult) -> String {
    let icon = if result.succeeded() { CHECK } else { CROSS };
    format!(
        "{} {} {} - {} succeeded, {} failed, {} skipped",
        icon,
        style(&result.pipeline).bold(),
        format_run_status(result.status),
        style(result.count(JobStatus::Success)).green(),
        style(result.count(JobStatus::Failure)).red(),
        style(result.count(JobStatus::Skipped)).dim()
    )
}

/// Describe a pipeline for `validate` and `list`
pub fn format_pipeline(pipeline: &Pipeline, show_instances: bool) -> String {
    let mut out = format!(
        "{} (on: {})",
        style(&pipeline.name).bold(),
        style(pipeline.triggers.join(", ")).cyan()
    );
    for job in &pipeline.jobs {
        let instances = job.instances();
        let dims = job
            .matrix
            .as_ref()
            .map(|m| {
                m.dimensions()
                    .iter()
                    .map(|d| format!("{}[{}]", d.name, d.values.len()))
                    .collect::<Vec<_>>()
                    .join(" x ")
            })
            .unwrap_or_default();
        out.push_str(&format!(
            "\n  {} - {} instance(s), {} step(s){}{}",
            style(&job.name).bold(),
            style(instances.len()).cyan(),
            job.steps.len(),
            if dims.is_empty() {
                String::new()
            } else {
                format!(", matrix {}", dims)
            },
            if job.fail_fast { "" } else { ", no fail-fast" }
        ));
        if show_instances {
            for instance in &instances {
                out.push_str(&format!("\n    - {}", instance.display_name()));
            }
        }
    }
    out
}
