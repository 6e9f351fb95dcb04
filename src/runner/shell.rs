//! Runs commands through a local shell subprocess

use crate::runner::{CommandOutput, CommandRunner, Invocation, RunnerConfig, RunnerError};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Variables kept when the environment is not inherited
const PASSTHROUGH_VARS: &[&str] = &["PATH", "HOME", "SYSTEMROOT", "TEMP", "TMP"];

/// Command runner backed by `sh -c` (or `cmd /C` on Windows)
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    config: RunnerConfig,
}

impl ShellRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn command(&self, invocation: &Invocation) -> Result<Command, RunnerError> {
        let (program, args) = self
            .config
            .shell
            .split_first()
            .ok_or(RunnerError::NoShell)?;

        if !invocation.working_dir.is_dir() {
            return Err(RunnerError::MissingWorkingDir(
                invocation.working_dir.display().to_string(),
            ));
        }

        let mut command = Command::new(program);
        command
            .args(args)
            .arg(&invocation.command)
            .current_dir(&invocation.working_dir)
            .kill_on_drop(true);

        if !self.config.inherit_env {
            command.env_clear();
            for var in PASSTHROUGH_VARS {
                if let Ok(value) = std::env::var(var) {
                    command.env(var, value);
                }
            }
        }
        command.envs(&invocation.env);

        Ok(command)
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        debug!(
            "Running '{}' in {}",
            invocation.label,
            invocation.working_dir.display()
        );

        let mut command = self.command(invocation)?;
        let program = self.config.shell[0].clone();

        let output = match invocation.timeout {
            Some(limit) => timeout(limit, command.output())
                .await
                .map_err(|_| RunnerError::Timeout(limit.as_secs()))?,
            None => command.output().await,
        }
        .map_err(|source| RunnerError::Spawn { program, source })?;

        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code != 0 {
            warn!("'{}' exited with code {}", invocation.label, exit_code);
        }

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
