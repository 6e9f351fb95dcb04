//! Pipeline domain model

use crate::core::{
    config::{scalar_to_string, ConfigError, JobConfig, PipelineConfig, StepConfig},
    matrix::{Assignment, Dimension, JobInstance, Matrix, MatrixError, MatrixExpander},
    step::{CommandStep, Step, StepKind},
    template::Template,
};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Default execution target when a job declares no `runs-on`
pub const DEFAULT_TARGET: &str = "local";

/// An event that may start pipelines, e.g. `push` or `pull_request`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerEvent {
    kind: String,
}

impl TriggerEvent {
    pub fn new(kind: impl AsRef<str>) -> Self {
        Self {
            kind: normalize_event(kind.as_ref()),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)
    }
}

fn normalize_event(kind: &str) -> String {
    kind.trim().to_ascii_lowercase().replace('-', "_")
}

/// A job definition
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,

    /// Matrix strategy, `None` for a single instance
    pub matrix: Option<Matrix>,

    /// Cancel undispatched siblings after the first failed instance
    pub fail_fast: bool,

    /// Upper bound on concurrently running instances of this job
    pub max_parallel: Option<usize>,

    /// Failed instances do not fail the pipeline
    pub continue_on_error: bool,

    /// Execution target descriptor (`runs-on`)
    pub target: Template,

    pub env: BTreeMap<String, Template>,

    /// Ordered steps
    pub steps: Vec<Step>,
}

impl Job {
    /// Concrete instances of this job, in expansion order
    pub fn instances(&self) -> Vec<JobInstance> {
        MatrixExpander::new().expand(self)
    }

    fn from_config(config: &JobConfig) -> Result<Self, ConfigError> {
        let job = config.name.clone();
        let template = |location: String, source: &str| {
            Template::parse(source).map_err(|source| ConfigError::Template {
                job: job.clone(),
                location,
                source,
            })
        };

        let strategy = config.strategy.as_ref();
        let matrix = match strategy.and_then(|s| s.matrix.as_ref()) {
            Some(mapping) => Some(parse_matrix(mapping).map_err(|source| ConfigError::Matrix {
                job: job.clone(),
                source,
            })?),
            None => None,
        };

        let max_parallel = strategy.and_then(|s| s.max_parallel);
        if max_parallel == Some(0) {
            return Err(ConfigError::ZeroMaxParallel(job.clone()));
        }

        if config.steps.is_empty() {
            return Err(ConfigError::NoSteps(job.clone()));
        }

        let target = template(
            "runs-on".to_string(),
            config.runs_on.as_deref().unwrap_or(DEFAULT_TARGET),
        )?;
        let env = env_templates(&config.env, &format!("job '{}' env", job), |key, value| {
            template(format!("env.{}", key), value)
        })?;

        let mut steps = Vec::with_capacity(config.steps.len());
        for (index, step_config) in config.steps.iter().enumerate() {
            let location = |field: &str| format!("step {} {}", index + 1, field);
            let (name, always, kind) = match step_config {
                StepConfig::CacheRestore {
                    name,
                    key,
                    restore_keys,
                    path,
                    always,
                } => {
                    let restore_keys = restore_keys
                        .iter()
                        .map(|k| template(location("restore-keys"), k))
                        .collect::<Result<Vec<_>, _>>()?;
                    let kind = StepKind::CacheRestore {
                        key: template(location("key"), key)?,
                        restore_keys,
                        path: template(location("path"), path)?,
                    };
                    (name, *always, kind)
                }
                StepConfig::CacheSave {
                    name,
                    key,
                    path,
                    always,
                } => {
                    let kind = StepKind::CacheSave {
                        key: template(location("key"), key)?,
                        path: template(location("path"), path)?,
                    };
                    (name, *always, kind)
                }
                StepConfig::Command {
                    name,
                    run,
                    env,
                    secrets,
                    continue_on_error,
                    working_directory,
                    timeout_secs,
                    always,
                } => {
                    if secrets.iter().any(|s| s.trim().is_empty()) {
                        return Err(ConfigError::EmptySecretName(job.clone()));
                    }
                    let env = env_templates(env, &location("env"), |key, value| {
                        template(location(&format!("env.{}", key)), value)
                    })?;
                    let working_directory = working_directory
                        .as_deref()
                        .map(|dir| template(location("working-directory"), dir))
                        .transpose()?;
                    let kind = StepKind::Command(CommandStep {
                        run: template(location("run"), run)?,
                        env,
                        secrets: secrets.clone(),
                        continue_on_error: *continue_on_error,
                        working_directory,
                        timeout_secs: *timeout_secs,
                    });
                    (name, *always, kind)
                }
            };

            steps.push(Step {
                name: name.clone().unwrap_or_else(|| Step::default_name(&kind)),
                always,
                kind,
            });
        }

        let job = Job {
            name: job,
            matrix,
            fail_fast: strategy.map(|s| s.fail_fast).unwrap_or(true),
            max_parallel,
            continue_on_error: config.continue_on_error,
            target,
            env,
            steps,
        };
        job.check_matrix_refs()?;

        Ok(job)
    }

    /// Every `${{ matrix.X }}` must name a declared dimension
    fn check_matrix_refs(&self) -> Result<(), ConfigError> {
        let templates = std::iter::once(&self.target)
            .chain(self.env.values())
            .chain(self.steps.iter().flat_map(|s| s.templates()));

        for template in templates {
            for dimension in template.matrix_refs() {
                let declared = self
                    .matrix
                    .as_ref()
                    .map(|m| m.has_key(dimension))
                    .unwrap_or(false);
                if !declared {
                    return Err(ConfigError::UnknownMatrixKey {
                        job: self.name.clone(),
                        dimension: dimension.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn env_templates<F>(
    env: &BTreeMap<String, Value>,
    location: &str,
    mut parse: F,
) -> Result<BTreeMap<String, Template>, ConfigError>
where
    F: FnMut(&str, &str) -> Result<Template, ConfigError>,
{
    let mut out = BTreeMap::new();
    for (key, value) in env {
        let raw = scalar_to_string(value).ok_or_else(|| ConfigError::NonScalar {
            location: location.to_string(),
            key: key.clone(),
        })?;
        out.insert(key.clone(), parse(key, &raw)?);
    }
    Ok(out)
}

fn mapping_key(key: &Value) -> Result<String, MatrixError> {
    scalar_to_string(key)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| MatrixError::InvalidDimension {
            dimension: format!("{:?}", key),
            reason: "dimension names must be strings".to_string(),
        })
}

fn assignment_list(name: &str, value: &Value) -> Result<Vec<Assignment>, MatrixError> {
    let invalid = |reason: &str| MatrixError::InvalidDimension {
        dimension: name.to_string(),
        reason: reason.to_string(),
    };

    let entries = value
        .as_sequence()
        .ok_or_else(|| invalid("expected a list of mappings"))?;

    entries
        .iter()
        .map(|entry| {
            let mapping = entry
                .as_mapping()
                .ok_or_else(|| invalid("expected a list of mappings"))?;
            mapping
                .iter()
                .map(|(k, v)| {
                    let key = mapping_key(k)?;
                    let value = scalar_to_string(v).ok_or_else(|| invalid("values must be scalars"))?;
                    Ok((key, value))
                })
                .collect::<Result<Assignment, MatrixError>>()
        })
        .collect()
}

/// Build a matrix from its YAML mapping, keeping declaration order
fn parse_matrix(mapping: &Mapping) -> Result<Matrix, MatrixError> {
    let mut dimensions = Vec::new();
    let mut include = Vec::new();
    let mut exclude = Vec::new();

    for (key, value) in mapping {
        let name = mapping_key(key)?;
        match name.as_str() {
            "include" => include = assignment_list(&name, value)?,
            "exclude" => exclude = assignment_list(&name, value)?,
            _ => {
                let values = value
                    .as_sequence()
                    .ok_or_else(|| MatrixError::InvalidDimension {
                        dimension: name.clone(),
                        reason: "expected a list of values".to_string(),
                    })?
                    .iter()
                    .map(|v| {
                        scalar_to_string(v).ok_or_else(|| MatrixError::InvalidDimension {
                            dimension: name.clone(),
                            reason: "values must be scalars".to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                dimensions.push(Dimension::new(name, values));
            }
        }
    }

    Matrix::with_rules(dimensions, include, exclude)
}

/// A pipeline definition
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Normalized event kinds that start this pipeline
    pub triggers: Vec<String>,

    /// Process-wide environment defaults
    pub env: BTreeMap<String, Template>,

    /// Jobs in declaration order
    pub jobs: Vec<Arc<Job>>,
}

impl Pipeline {
    /// Create a pipeline from configuration, validating it fully
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        if config.jobs.is_empty() {
            return Err(ConfigError::NoJobs(config.name.clone()));
        }

        let mut names = HashSet::new();
        let mut jobs = Vec::with_capacity(config.jobs.len());
        for job_config in &config.jobs {
            if !names.insert(job_config.name.as_str()) {
                return Err(ConfigError::DuplicateJob {
                    pipeline: config.name.clone(),
                    job: job_config.name.clone(),
                });
            }
            jobs.push(Arc::new(Job::from_config(job_config)?));
        }

        let env = env_templates(&config.env, "pipeline env", |key, value| {
            // pipeline env has no matrix; matrix refs render empty
            Template::parse(value).map_err(|source| ConfigError::Template {
                job: String::new(),
                location: format!("env.{}", key),
                source,
            })
        })?;

        Ok(Pipeline {
            name: config.name.clone(),
            triggers: config
                .triggers
                .events()
                .iter()
                .map(|e| normalize_event(e))
                .collect(),
            env,
            jobs,
        })
    }

    /// Get a job by name
    pub fn job(&self, name: &str) -> Option<&Arc<Job>> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Whether this pipeline's trigger set contains the event kind
    pub fn is_triggered_by(&self, event: &TriggerEvent) -> bool {
        self.triggers.iter().any(|t| t == event.kind())
    }

    /// All instances of all jobs, grouped by job in declaration order
    pub fn expand(&self) -> Vec<(Arc<Job>, Vec<JobInstance>)> {
        self.jobs
            .iter()
            .map(|job| (job.clone(), job.instances()))
            .collect()
    }

    /// Total number of job instances a run will produce
    pub fn instance_count(&self) -> usize {
        self.jobs.iter().map(|j| j.instances().len()).sum()
    }
}
