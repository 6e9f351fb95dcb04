//! Step executor - runs individual steps of a job instance

use crate::{
    cache::{archive, CacheError, CacheLookup, CacheStore},
    core::{
        secrets::{SecretMasker, SecretStore},
        CommandStep, InstanceContext, Step, StepKind, StepReport, StepStatus, Template,
    },
    runner::{CommandRunner, Invocation},
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Executes a single step
pub struct StepExecutor<R> {
    runner: R,
    cache: Arc<dyn CacheStore>,
    secrets: Arc<dyn SecretStore>,
    /// Applied to command steps without their own `timeout-secs`
    default_timeout: Option<Duration>,
}

impl<R: CommandRunner> StepExecutor<R> {
    pub fn new(runner: R, cache: Arc<dyn CacheStore>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            runner,
            cache,
            secrets,
            default_timeout: None,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Execute a step and report what happened
    pub async fn execute(&self, step: &Step, index: usize, ctx: &InstanceContext) -> StepReport {
        info!("Executing step '{}' of {}", step.name, ctx.instance_name());

        let mut report = StepReport {
            index,
            name: step.name.clone(),
            status: StepStatus::Success,
            exit_code: None,
            output: String::new(),
            detail: None,
            warnings: Vec::new(),
            started_at: Some(Utc::now()),
            finished_at: None,
        };

        match &step.kind {
            StepKind::CacheRestore {
                key,
                restore_keys,
                path,
            } => {
                if let Err(e) = self.restore(key, restore_keys, path, ctx, &mut report).await {
                    warn!("Cache restore in '{}' failed: {}", step.name, e);
                    report.warnings.push(format!("cache restore failed: {}", e));
                }
            }
            StepKind::CacheSave { key, path } => {
                if let Err(e) = self.save(key, path, ctx, &mut report).await {
                    warn!("Cache save in '{}' failed: {}", step.name, e);
                    report.warnings.push(format!("cache save failed: {}", e));
                }
            }
            StepKind::Command(command) => self.command(step, command, ctx, &mut report).await,
        }

        report.finished_at = Some(Utc::now());
        report
    }

    async fn restore(
        &self,
        key: &Template,
        restore_keys: &[Template],
        path: &Template,
        ctx: &InstanceContext,
        report: &mut StepReport,
    ) -> Result<(), StepIssue> {
        let key = ctx.render(key)?;
        let fallbacks = restore_keys
            .iter()
            .map(|k| ctx.render(k))
            .collect::<Result<Vec<_>, _>>()?;
        let path = ctx.render(path)?;

        let lookup = self.cache.restore(&key, &fallbacks).await?;
        report.detail = Some(match &lookup {
            CacheLookup::Hit { key, .. } => format!("cache hit: {}", key),
            CacheLookup::Partial { key, prefix, .. } => {
                format!("partial cache hit: {} (prefix {})", key, prefix)
            }
            CacheLookup::Miss => format!("cache miss: {}", key),
        });

        match lookup {
            CacheLookup::Hit { blob, .. } | CacheLookup::Partial { blob, .. } => {
                debug!("Unpacking {} bytes into {}", blob.len(), path);
                archive::unpack(&ctx.workspace, &path, blob).await?;
            }
            CacheLookup::Miss => info!("Cache miss for key '{}' ({})", key, ctx.instance_name()),
        }

        Ok(())
    }

    async fn save(
        &self,
        key: &Template,
        path: &Template,
        ctx: &InstanceContext,
        report: &mut StepReport,
    ) -> Result<(), StepIssue> {
        let key = ctx.render(key)?;
        let path = ctx.render(path)?;

        let blob = archive::pack(&ctx.workspace, &path).await?;
        let size = blob.len();
        self.cache.save(&key, blob).await?;

        report.detail = Some(format!("saved {} ({} bytes)", key, size));
        Ok(())
    }

    async fn command(
        &self,
        step: &Step,
        command: &CommandStep,
        ctx: &InstanceContext,
        report: &mut StepReport,
    ) {
        let mut masker = SecretMasker::new();
        let invocation = match self.prepare(step, command, ctx, &mut masker, report) {
            Ok(invocation) => invocation,
            Err(e) => {
                report.status = StepStatus::Failure;
                report.output = masker.mask(&e.to_string());
                return;
            }
        };

        match self.runner.run(&invocation).await {
            Ok(output) => {
                report.exit_code = Some(output.exit_code);
                report.output = masker.mask(&output.combined());
                if !output.success() {
                    report.status = StepStatus::Failure;
                }
            }
            Err(e) => {
                let message = masker.mask(&e.to_string());
                warn!("Step '{}' could not run: {}", step.name, message);
                report.status = StepStatus::Failure;
                report.output = message;
            }
        }

        if report.status == StepStatus::Failure && command.continue_on_error {
            let cause = match report.exit_code {
                Some(code) => format!("exit code {}", code),
                None => "an error".to_string(),
            };
            report
                .warnings
                .push(format!("step failed with {} and continued", cause));
        }
    }

    /// Render the command and build its environment overlay
    fn prepare(
        &self,
        step: &Step,
        command: &CommandStep,
        ctx: &InstanceContext,
        masker: &mut SecretMasker,
        report: &mut StepReport,
    ) -> Result<Invocation, StepIssue> {
        let mut overlay = ctx.env.clone();
        for (key, value) in &command.env {
            let rendered = ctx.render_with_env(value, &overlay)?;
            overlay.insert(key.clone(), rendered);
        }

        for name in &command.secrets {
            match self.secrets.get(name) {
                Some(value) => {
                    masker.add(&value);
                    overlay.insert(name.clone(), value);
                }
                None => {
                    warn!("Secret '{}' is not available for step '{}'", name, step.name);
                    report
                        .warnings
                        .push(format!("secret '{}' is not available", name));
                }
            }
        }

        let run = ctx.render_with_env(&command.run, &overlay)?;
        let working_dir = match &command.working_directory {
            Some(dir) => ctx.workspace.join(ctx.render_with_env(dir, &overlay)?),
            None => ctx.workspace.clone(),
        };

        Ok(Invocation {
            command: run,
            env: overlay,
            working_dir,
            timeout: command
                .timeout_secs
                .map(Duration::from_secs)
                .or(self.default_timeout),
            label: step.name.clone(),
        })
    }
}

/// Anything that goes wrong inside a step before or around the actual work
#[derive(Debug, thiserror::Error)]
enum StepIssue {
    #[error(transparent)]
    Template(#[from] crate::core::template::TemplateError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}
