//! Step domain model

use crate::core::template::Template;
use std::collections::BTreeMap;

/// A single ordered action within a job instance
#[derive(Debug, Clone)]
pub struct Step {
    /// Display name, unique enough to identify the step in reports
    pub name: String,

    /// Run even after an earlier step of the same instance failed
    pub always: bool,

    pub kind: StepKind,
}

/// What a step does
#[derive(Debug, Clone)]
pub enum StepKind {
    /// Restore `path` from the cache, trying `restore_keys` as fallback prefixes
    CacheRestore {
        key: Template,
        restore_keys: Vec<Template>,
        path: Template,
    },

    /// Store `path` under the exact resolved `key`
    CacheSave { key: Template, path: Template },

    /// Run a shell command
    Command(CommandStep),
}

/// A shell command step
#[derive(Debug, Clone)]
pub struct CommandStep {
    pub run: Template,

    /// Step-level env, applied over the instance env
    pub env: BTreeMap<String, Template>,

    /// Secret names injected as env vars of the same name
    pub secrets: Vec<String>,

    /// Record a failure without failing the instance
    pub continue_on_error: bool,

    /// Relative to the workspace
    pub working_directory: Option<Template>,

    pub timeout_secs: Option<u64>,
}

impl Step {
    pub fn is_cache(&self) -> bool {
        matches!(self.kind, StepKind::CacheRestore { .. } | StepKind::CacheSave { .. })
    }

    /// A failure of this step does not fail the instance
    pub fn tolerates_failure(&self) -> bool {
        match &self.kind {
            StepKind::Command(command) => command.continue_on_error,
            _ => true,
        }
    }

    /// Every template the step renders
    pub fn templates(&self) -> Vec<&Template> {
        match &self.kind {
            StepKind::CacheRestore {
                key,
                restore_keys,
                path,
            } => {
                let mut all = vec![key, path];
                all.extend(restore_keys.iter());
                all
            }
            StepKind::CacheSave { key, path } => vec![key, path],
            StepKind::Command(command) => {
                let mut all = vec![&command.run];
                all.extend(command.env.values());
                all.extend(command.working_directory.iter());
                all
            }
        }
    }

    /// Default name when the definition gives none
    pub fn default_name(kind: &StepKind) -> String {
        match kind {
            StepKind::CacheRestore { path, .. } => format!("Restore cache ({})", path),
            StepKind::CacheSave { path, .. } => format!("Save cache ({})", path),
            StepKind::Command(command) => {
                let first_line = command.run.source().lines().next().unwrap_or("").trim();
                format!("Run {}", first_line)
            }
        }
    }
}
