//! Per-instance execution context
//!
//! Everything a step of one job instance may read: the matrix assignment,
//! the rendered target and the environment overlay built before the first
//! step runs. Steps only ever get a shared reference, so nothing they do can
//! change the instance's assignment.

use crate::core::matrix::{Assignment, InstanceId, JobInstance};
use crate::core::pipeline::{Job, Pipeline, TriggerEvent};
use crate::core::template::{RenderContext, Template, TemplateError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Context of one job instance
#[derive(Debug, Clone)]
pub struct InstanceContext {
    pub pipeline: String,
    pub job: String,
    pub event: String,
    /// Rendered `runs-on`
    pub target: String,
    pub assignment: Assignment,
    /// Pipeline env, `CI*` variables, `MATRIX_*` variables and job env, in
    /// increasing precedence
    pub env: BTreeMap<String, String>,
    pub workspace: PathBuf,
}

impl InstanceContext {
    /// Build the context of `instance`, rendering target and environment
    pub fn new(
        pipeline: &Pipeline,
        job: &Job,
        instance: &JobInstance,
        event: &TriggerEvent,
        workspace: &Path,
    ) -> Result<Self, TemplateError> {
        let mut ctx = Self {
            pipeline: pipeline.name.clone(),
            job: job.name.clone(),
            event: event.kind().to_string(),
            target: String::new(),
            assignment: instance.assignment.clone(),
            env: BTreeMap::new(),
            workspace: workspace.to_path_buf(),
        };

        ctx.target = ctx.render(&job.target)?;

        for (key, value) in &pipeline.env {
            let rendered = ctx.render(value)?;
            ctx.env.insert(key.clone(), rendered);
        }

        let builtins = [
            ("CI", "true".to_string()),
            ("CI_PIPELINE", ctx.pipeline.clone()),
            ("CI_JOB", ctx.job.clone()),
            ("CI_EVENT", ctx.event.clone()),
            ("CI_TARGET", ctx.target.clone()),
            ("CI_INSTANCE", instance.display_name()),
            ("CI_WORKSPACE", workspace.display().to_string()),
        ];
        for (key, value) in builtins {
            ctx.env.insert(key.to_string(), value);
        }

        ctx.env.extend(instance.matrix_env());

        for (key, value) in &job.env {
            let rendered = ctx.render(value)?;
            ctx.env.insert(key.clone(), rendered);
        }

        Ok(ctx)
    }

    /// Render a template against this instance
    pub fn render(&self, template: &Template) -> Result<String, TemplateError> {
        template.render(&self.render_context(&self.env))
    }

    /// Render against an extended environment, e.g. with step env applied
    pub fn render_with_env(
        &self,
        template: &Template,
        env: &BTreeMap<String, String>,
    ) -> Result<String, TemplateError> {
        template.render(&self.render_context(env))
    }

    fn render_context<'a>(&'a self, env: &'a BTreeMap<String, String>) -> RenderContext<'a> {
        RenderContext {
            matrix: &self.assignment,
            env,
            job: &self.job,
            pipeline: &self.pipeline,
            target: &self.target,
            event: &self.event,
            workspace: &self.workspace,
        }
    }

    /// Display name of the instance
    pub fn instance_name(&self) -> String {
        InstanceId {
            job: self.job.clone(),
            assignment: self.assignment.clone(),
        }
        .to_string()
    }
}
