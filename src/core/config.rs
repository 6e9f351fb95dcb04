//! Pipeline configuration from YAML

use crate::core::matrix::MatrixError;
use crate::core::template::TemplateError;
use crate::core::Pipeline;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors, always raised before any job instance runs
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pipeline definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("pipeline '{0}' defines no jobs")]
    NoJobs(String),

    #[error("duplicate job name '{job}' in pipeline '{pipeline}'")]
    DuplicateJob { pipeline: String, job: String },

    #[error("duplicate pipeline name '{0}'")]
    DuplicatePipeline(String),

    #[error("job '{0}' has no steps")]
    NoSteps(String),

    #[error("job '{job}': {source}")]
    Matrix {
        job: String,
        #[source]
        source: MatrixError,
    },

    #[error("job '{job}': invalid template in {location}: {source}")]
    Template {
        job: String,
        location: String,
        #[source]
        source: TemplateError,
    },

    #[error("job '{job}' references undeclared matrix dimension '{dimension}'")]
    UnknownMatrixKey { job: String, dimension: String },

    #[error("job '{0}': max-parallel must be at least 1")]
    ZeroMaxParallel(String),

    #[error("{location}: value of '{key}' must be a string, number or boolean")]
    NonScalar { location: String, key: String },

    #[error("job '{0}': secret names must not be empty")]
    EmptySecretName(String),
}

/// Trigger list; a single event name is accepted too
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerConfig {
    One(String),
    Many(Vec<String>),
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig::Many(Vec::new())
    }
}

impl TriggerConfig {
    pub fn events(&self) -> Vec<String> {
        match self {
            TriggerConfig::One(event) => vec![event.clone()],
            TriggerConfig::Many(events) => events.clone(),
        }
    }
}

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Event kinds that start this pipeline
    #[serde(default, rename = "on", alias = "triggers")]
    pub triggers: TriggerConfig,

    /// Process-wide environment defaults
    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Jobs, in declaration order
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,

    /// Execution target descriptor
    #[serde(default, rename = "runs-on")]
    pub runs_on: Option<String>,

    #[serde(default)]
    pub strategy: Option<StrategyConfig>,

    #[serde(default)]
    pub env: BTreeMap<String, Value>,

    /// Failures of this job's instances do not fail the pipeline
    #[serde(default, rename = "continue-on-error")]
    pub continue_on_error: bool,

    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// Matrix strategy of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Dimension name to value list, plus optional `include`/`exclude`
    #[serde(default)]
    pub matrix: Option<Mapping>,

    #[serde(default = "default_fail_fast", rename = "fail-fast")]
    pub fail_fast: bool,

    #[serde(default, rename = "max-parallel")]
    pub max_parallel: Option<usize>,
}

fn default_fail_fast() -> bool {
    true
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StepConfig {
    CacheRestore {
        #[serde(default)]
        name: Option<String>,
        #[serde(alias = "key-template")]
        key: String,
        #[serde(default, rename = "restore-keys")]
        restore_keys: Vec<String>,
        path: String,
        #[serde(default)]
        always: bool,
    },
    CacheSave {
        #[serde(default)]
        name: Option<String>,
        #[serde(alias = "key-template")]
        key: String,
        path: String,
        #[serde(default)]
        always: bool,
    },
    Command {
        #[serde(default)]
        name: Option<String>,
        run: String,
        #[serde(default)]
        env: BTreeMap<String, Value>,
        #[serde(default)]
        secrets: Vec<String>,
        #[serde(default, rename = "continue-on-error")]
        continue_on_error: bool,
        #[serde(default, rename = "working-directory")]
        working_directory: Option<String>,
        #[serde(default, rename = "timeout-secs")]
        timeout_secs: Option<u64>,
        #[serde(default)]
        always: bool,
    },
}

/// String form of a YAML scalar
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_pipeline().map(|_| ())
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Result<Pipeline, ConfigError> {
        Pipeline::from_config(self)
    }
}

/// Load every pipeline from a file or a directory of `*.yml` / `*.yaml` files
pub fn load_pipelines<P: AsRef<Path>>(path: P) -> Result<Vec<Pipeline>, ConfigError> {
    let path = path.as_ref();
    let files = if path.is_dir() {
        let entries = std::fs::read_dir(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("yml") | Some("yaml")
                    )
            })
            .collect();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut pipelines = Vec::with_capacity(files.len());
    let mut names = HashSet::new();
    for file in files {
        let pipeline = PipelineConfig::from_file(&file)?.to_pipeline()?;
        if !names.insert(pipeline.name.clone()) {
            return Err(ConfigError::DuplicatePipeline(pipeline.name));
        }
        pipelines.push(pipeline);
    }

    Ok(pipelines)
}
