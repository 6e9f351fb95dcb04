//! ci-runner - a matrix-expanding CI workflow executor

pub mod cache;
pub mod cli;
pub mod core;
pub mod execution;
pub mod runner;

// Re-export commonly used types
pub use cache::{CacheLookup, CacheStore, InMemoryCacheStore};
pub use core::config::{load_pipelines, ConfigError, PipelineConfig};
pub use core::{JobInstance, JobOutcome, JobStatus, Pipeline, PipelineResult, RunStatus, TriggerEvent};
pub use execution::{EngineConfig, ExecutionEngine, ExecutionEvent, SchedulingStrategy};
pub use runner::{CommandRunner, ShellRunner};
