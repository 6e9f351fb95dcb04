//! Matrix model and expansion into job instances

use crate::core::pipeline::Job;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Errors in a matrix definition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatrixError {
    #[error("matrix declares no dimensions")]
    NoDimensions,

    #[error("matrix dimension '{0}' has no values")]
    EmptyDimension(String),

    #[error("matrix dimension '{0}' is declared twice")]
    DuplicateDimension(String),

    #[error("matrix dimension '{dimension}' is invalid: {reason}")]
    InvalidDimension { dimension: String, reason: String },

    #[error("exclude entry references undeclared dimension '{0}'")]
    UnknownExcludeKey(String),

    #[error("matrix expands to no instances")]
    EmptyExpansion,
}

/// One value per matrix dimension, in dimension declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Assignment(Vec<(String, String)>);

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, dimension: impl Into<String>, value: impl Into<String>) {
        self.0.push((dimension.into(), value.into()));
    }

    /// Value assigned to a dimension
    pub fn get(&self, dimension: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == dimension)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when every pair of `partial` appears in this assignment
    pub fn matches(&self, partial: &Assignment) -> bool {
        partial.iter().all(|(k, v)| self.get(k) == Some(v))
    }

    /// Same pairs regardless of order
    fn same_as(&self, other: &Assignment) -> bool {
        self.len() == other.len() && self.matches(other)
    }
}

impl FromIterator<(String, String)> for Assignment {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        f.write_str(&parts.join(", "))
    }
}

/// A named matrix axis with its ordered candidate values
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dimension {
    pub name: String,
    pub values: Vec<String>,
}

impl Dimension {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Validated matrix of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Matrix {
    dimensions: Vec<Dimension>,
    include: Vec<Assignment>,
    exclude: Vec<Assignment>,
}

impl Matrix {
    /// Build a matrix; every dimension must have at least one value
    pub fn new(dimensions: Vec<Dimension>) -> Result<Self, MatrixError> {
        Self::with_rules(dimensions, Vec::new(), Vec::new())
    }

    /// Build a matrix with extra include/exclude combinations
    pub fn with_rules(
        dimensions: Vec<Dimension>,
        include: Vec<Assignment>,
        exclude: Vec<Assignment>,
    ) -> Result<Self, MatrixError> {
        if dimensions.is_empty() && include.is_empty() {
            return Err(MatrixError::NoDimensions);
        }

        let mut seen = HashSet::new();
        for dimension in &dimensions {
            if !seen.insert(dimension.name.as_str()) {
                return Err(MatrixError::DuplicateDimension(dimension.name.clone()));
            }
            if dimension.values.is_empty() {
                return Err(MatrixError::EmptyDimension(dimension.name.clone()));
            }
        }

        for entry in &exclude {
            for (key, _) in entry.iter() {
                if !seen.contains(key) {
                    return Err(MatrixError::UnknownExcludeKey(key.to_string()));
                }
            }
        }

        let matrix = Self {
            dimensions,
            include,
            exclude,
        };

        if matrix.combinations().is_empty() {
            return Err(MatrixError::EmptyExpansion);
        }

        Ok(matrix)
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Whether `${{ matrix.<name> }}` can resolve for at least one instance
    pub fn has_key(&self, name: &str) -> bool {
        self.dimensions.iter().any(|d| d.name == name)
            || self.include.iter().any(|a| a.get(name).is_some())
    }

    /// Full cross product, first dimension varying slowest, then excludes
    /// removed and includes appended
    pub fn combinations(&self) -> Vec<Assignment> {
        let mut combos = if self.dimensions.is_empty() {
            Vec::new()
        } else {
            let mut combos = vec![Assignment::new()];
            for dimension in &self.dimensions {
                let mut next = Vec::with_capacity(combos.len() * dimension.values.len());
                for combo in &combos {
                    for value in &dimension.values {
                        let mut extended = combo.clone();
                        extended.push(dimension.name.clone(), value.clone());
                        next.push(extended);
                    }
                }
                combos = next;
            }
            combos
        };

        combos.retain(|combo| !self.exclude.iter().any(|rule| combo.matches(rule)));

        for extra in &self.include {
            if !combos.iter().any(|combo| combo.same_as(extra)) {
                combos.push(extra.clone());
            }
        }

        combos
    }
}

/// Identity of a job instance: job name plus its matrix assignment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstanceId {
    pub job: String,
    pub assignment: Assignment,
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.assignment.is_empty() {
            write!(f, "{}", self.job)
        } else {
            let values: Vec<&str> = self.assignment.iter().map(|(_, v)| v).collect();
            write!(f, "{} ({})", self.job, values.join(", "))
        }
    }
}

/// One concrete, fully assigned execution of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobInstance {
    pub job: String,
    /// Position in the expansion order
    pub index: usize,
    pub assignment: Assignment,
}

impl JobInstance {
    pub fn id(&self) -> InstanceId {
        InstanceId {
            job: self.job.clone(),
            assignment: self.assignment.clone(),
        }
    }

    pub fn display_name(&self) -> String {
        self.id().to_string()
    }

    /// `MATRIX_<DIMENSION>` variables injected before any step runs
    pub fn matrix_env(&self) -> Vec<(String, String)> {
        self.assignment
            .iter()
            .map(|(k, v)| (matrix_env_name(k), v.to_string()))
            .collect()
    }
}

fn matrix_env_name(dimension: &str) -> String {
    let normalized: String = dimension
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("MATRIX_{}", normalized)
}

/// Expands jobs into their instances
#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixExpander;

impl MatrixExpander {
    pub fn new() -> Self {
        Self
    }

    /// Instances of a job in their deterministic order
    pub fn expand(&self, job: &Job) -> Vec<JobInstance> {
        let assignments = match &job.matrix {
            Some(matrix) => matrix.combinations(),
            None => vec![Assignment::new()],
        };

        assignments
            .into_iter()
            .enumerate()
            .map(|(index, assignment)| JobInstance {
                job: job.name.clone(),
                index,
                assignment,
            })
            .collect()
    }
}
