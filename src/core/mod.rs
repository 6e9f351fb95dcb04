//! Core domain models
//!
//! This module defines the fundamental data structures that represent
//! pipelines, jobs, matrices, steps and their outcomes.

pub mod config;
pub mod context;
pub mod matrix;
pub mod outcome;
pub mod pipeline;
pub mod secrets;
pub mod state;
pub mod step;
pub mod template;

pub use context::*;
pub use matrix::{Assignment, InstanceId, JobInstance, Matrix, MatrixExpander};
pub use outcome::*;
pub use pipeline::*;
pub use secrets::{EnvSecrets, SecretMasker, SecretStore, StaticSecrets};
pub use state::*;
pub use step::*;
pub use template::Template;
