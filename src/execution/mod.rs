//! Pipeline execution: steps, job instances, scheduling and aggregation

pub mod cancellation;
pub mod engine;
pub mod executor;
pub mod job;
pub mod scheduler;

pub use cancellation::CancellationFlag;
pub use engine::{EngineConfig, EventHandler, EventSink, ExecutionEngine, ExecutionEvent};
pub use executor::StepExecutor;
pub use job::JobExecutor;
pub use scheduler::{JobScheduler, SchedulingStrategy};
