//! Secret lookup and masking
//!
//! Secrets are fetched right before the command step that lists them runs,
//! injected as environment variables of the same name, and masked in every
//! piece of captured output.

use std::collections::HashMap;

/// Replacement text for secret values
pub const MASK: &str = "***";

/// Source of secret values
pub trait SecretStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// Fixed set of secrets, e.g. from `--secret NAME=VALUE`
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, String)> for StaticSecrets {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl SecretStore for StaticSecrets {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Secrets read from the executor's own environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl SecretStore for EnvSecrets {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Tries each store in order
pub struct ChainedSecrets {
    stores: Vec<Box<dyn SecretStore>>,
}

impl ChainedSecrets {
    pub fn new(stores: Vec<Box<dyn SecretStore>>) -> Self {
        Self { stores }
    }
}

impl SecretStore for ChainedSecrets {
    fn get(&self, name: &str) -> Option<String> {
        self.stores.iter().find_map(|store| store.get(name))
    }
}

/// Replaces known secret values with [`MASK`]
#[derive(Debug, Clone, Default)]
pub struct SecretMasker {
    values: Vec<String>,
}

impl SecretMasker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: &str) {
        if value.is_empty() || self.values.iter().any(|v| v == value) {
            return;
        }
        self.values.push(value.to_string());
        // longest first so overlapping secrets mask completely
        self.values.sort_by(|a, b| b.len().cmp(&a.len()));
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mask(&self, text: &str) -> String {
        let mut out = text.to_string();
        for value in &self.values {
            if out.contains(value.as_str()) {
                out = out.replace(value.as_str(), MASK);
            }
        }
        out
    }
}
