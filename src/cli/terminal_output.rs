//! Live terminal reporting of a pipeline run
//!
//! `TerminalReporter` receives [`ExecutionEvent`]s from the engine and keeps
//! a progress bar over all job instances, printing one line per finished
//! step or instance above it.

use crate::cli::output::{create_progress_bar, format_execution_event, style};
use crate::core::PipelineResult;
use crate::execution::ExecutionEvent;
use indicatif::ProgressBar;
use std::io::{self, Write};

/// Event handler that renders engine events to the terminal
#[derive(Clone)]
pub struct TerminalReporter {
    progress: ProgressBar,
    show_steps: bool,
}

impl TerminalReporter {
    /// Reporter with a progress bar over `total_instances`
    pub fn new(total_instances: usize, show_steps: bool) -> Self {
        Self {
            progress: create_progress_bar(total_instances),
            show_steps,
        }
    }

    /// Reporter that prints event lines but draws no bar
    pub fn hidden(show_steps: bool) -> Self {
        Self {
            progress: ProgressBar::hidden(),
            show_steps,
        }
    }

    /// Render one event
    pub fn handle(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::StepStarted { instance, name, .. } => {
                self.progress.set_message(format!("{}: {}", instance, name));
                return;
            }
            ExecutionEvent::StepFinished { .. } if !self.show_steps => return,
            ExecutionEvent::InstanceFinished { .. } | ExecutionEvent::InstanceSkipped { .. } => {
                self.progress.inc(1);
            }
            _ => {}
        }

        if let Some(line) = format_execution_event(event) {
            self.print(&line);
        }
    }

    /// Clear the bar once every pipeline is done
    pub fn finish(&self, results: &[PipelineResult]) {
        self.progress.finish_and_clear();
        let failed = results.iter().filter(|r| !r.succeeded()).count();
        if failed > 0 {
            println!("{}", style(format!("{} pipeline(s) failed", failed)).red());
        }
        let _ = io::stdout().flush();
    }

    /// A horizontal rule spanning the terminal width
    pub fn print_separator(&self) {
        let width = term_size::dimensions_stdout()
            .map(|(w, _)| w)
            .unwrap_or(80);
        self.print(&style("─".repeat(width)).dim().to_string());
    }

    fn print(&self, line: &str) {
        if self.progress.is_hidden() {
            println!("{}", line);
        } else {
            self.progress.println(line);
        }
    }
}
