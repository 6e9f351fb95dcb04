//! Command execution for command steps

pub mod config;
pub mod output;
pub mod shell;

use async_trait::async_trait;
pub use config::RunnerConfig;
pub use output::{CommandOutput, RunnerError};
pub use shell::ShellRunner;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// A fully rendered command, ready to run
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Command text handed to the shell
    pub command: String,

    /// Complete environment overlay for this command
    pub env: BTreeMap<String, String>,

    pub working_dir: PathBuf,

    pub timeout: Option<Duration>,

    /// Display label for logs; never contains secret values
    pub label: String,
}

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion; a non-zero exit is not an error
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError>;
}

#[async_trait]
impl<T: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<T> {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        (**self).run(invocation).await
    }
}
