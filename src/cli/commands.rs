//! CLI command definitions

use crate::execution::SchedulingStrategy;
use clap::Args;
use std::path::PathBuf;

/// Default location of pipeline definitions
pub const DEFAULT_PIPELINE_PATH: &str = ".ci";

/// Run the pipelines triggered by an event
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Pipeline YAML file or directory of YAML files
    #[arg(short, long, default_value = DEFAULT_PIPELINE_PATH)]
    pub file: PathBuf,

    /// Trigger event kind (push, pull_request, ...)
    #[arg(short, long, default_value = "push")]
    pub event: String,

    /// Scheduling strategy
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Parallel)]
    pub strategy: SchedulingStrategyArg,

    /// Instance limit for `--strategy parallel-limited`
    #[arg(long, default_value_t = 4)]
    pub max_parallel: usize,

    /// Secret values (NAME=VALUE)
    #[arg(long, value_parser = parse_key_value)]
    pub secret: Vec<(String, String)>,

    /// Also resolve secrets from this process's environment
    #[arg(long)]
    pub env_secrets: bool,

    /// Cache backend
    #[arg(long, value_enum, default_value_t = CacheBackendArg::default())]
    pub cache: CacheBackendArg,

    /// Cache database path (sqlite backend)
    #[arg(long)]
    pub cache_path: Option<PathBuf>,

    /// Workspace commands run in (defaults to the current directory)
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Default timeout for command steps, in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Do not pass this process's environment to commands
    #[arg(long)]
    pub clean_env: bool,

    /// Print captured output of every step
    #[arg(long)]
    pub show_output: bool,
}

/// Validate pipeline definitions
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Pipeline YAML file or directory of YAML files
    #[arg(short, long, default_value = DEFAULT_PIPELINE_PATH)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List pipelines, their jobs and instances
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Pipeline YAML file or directory of YAML files
    #[arg(short, long, default_value = DEFAULT_PIPELINE_PATH)]
    pub file: PathBuf,

    /// Only pipelines triggered by this event
    #[arg(short, long)]
    pub event: Option<String>,

    /// Show every job instance
    #[arg(long)]
    pub instances: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

impl SchedulingStrategyArg {
    pub fn into_strategy(self, limit: usize) -> SchedulingStrategy {
        match self {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => SchedulingStrategy::LimitedParallel(limit),
        }
    }
}

/// Cache backend argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CacheBackendArg {
    /// Lives for a single invocation
    Memory,
    /// Persistent SQLite database
    Sqlite,
}

impl Default for CacheBackendArg {
    fn default() -> Self {
        if cfg!(feature = "sqlite") {
            CacheBackendArg::Sqlite
        } else {
            CacheBackendArg::Memory
        }
    }
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
