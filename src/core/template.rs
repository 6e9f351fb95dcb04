//! `${{ ... }}` templates used by cache keys, targets, env values and commands
//!
//! Templates are parsed once when a pipeline is loaded and rendered once per
//! job instance, right before the step that uses them runs.

use crate::cache::keys::hash_files;
use crate::core::matrix::Assignment;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors raised while parsing or rendering a template
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unterminated '${{{{' in template '{0}'")]
    Unterminated(String),

    #[error("unknown expression '{0}'")]
    UnknownExpression(String),

    #[error("invalid hashFiles call '{0}'")]
    InvalidHashFiles(String),

    #[error("hashFiles({pattern}) failed: {source}")]
    HashFiles {
        pattern: String,
        #[source]
        source: std::io::Error,
    },
}

/// A single `${{ ... }}` placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Matrix(String),
    Env(String),
    JobName,
    PipelineName,
    RunnerTarget,
    EventName,
    HashFiles(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Expr(Expression),
}

/// Parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

/// Values a template can draw from while rendering
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub matrix: &'a Assignment,
    pub env: &'a BTreeMap<String, String>,
    pub job: &'a str,
    pub pipeline: &'a str,
    pub target: &'a str,
    pub event: &'a str,
    pub workspace: &'a Path,
}

fn namespaced_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(matrix|env|job|pipeline|runner|event)\.([A-Za-z0-9_.\-]+)$")
            .expect("namespaced expression regex is valid")
    })
}

fn hash_files_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^hashFiles\((.*)\)$").expect("hashFiles regex is valid")
    })
}

fn quoted_arg_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*(?:'([^']*)'|"([^"]*)")\s*$"#).expect("quoted argument regex is valid")
    })
}

impl Expression {
    fn parse(raw: &str) -> Result<Self, TemplateError> {
        let expr = raw.trim();

        if let Some(caps) = hash_files_regex().captures(expr) {
            let args = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let mut patterns = Vec::new();
            for arg in args.split(',') {
                let caps = quoted_arg_regex()
                    .captures(arg)
                    .ok_or_else(|| TemplateError::InvalidHashFiles(expr.to_string()))?;
                let pattern = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                if pattern.is_empty() {
                    return Err(TemplateError::InvalidHashFiles(expr.to_string()));
                }
                patterns.push(pattern);
            }
            return Ok(Expression::HashFiles(patterns));
        }

        let caps = namespaced_regex()
            .captures(expr)
            .ok_or_else(|| TemplateError::UnknownExpression(expr.to_string()))?;
        let field = caps[2].to_string();

        match (&caps[1], field.as_str()) {
            ("matrix", _) => Ok(Expression::Matrix(field)),
            ("env", _) => Ok(Expression::Env(field)),
            ("job", "name") => Ok(Expression::JobName),
            ("pipeline", "name") => Ok(Expression::PipelineName),
            ("runner", "target") | ("runner", "os") => Ok(Expression::RunnerTarget),
            ("event", "name") => Ok(Expression::EventName),
            _ => Err(TemplateError::UnknownExpression(expr.to_string())),
        }
    }

    fn render(&self, ctx: &RenderContext<'_>) -> Result<String, TemplateError> {
        let value = match self {
            Expression::Matrix(key) => ctx.matrix.get(key).unwrap_or_default().to_string(),
            Expression::Env(key) => ctx.env.get(key).cloned().unwrap_or_default(),
            Expression::JobName => ctx.job.to_string(),
            Expression::PipelineName => ctx.pipeline.to_string(),
            Expression::RunnerTarget => ctx.target.to_string(),
            Expression::EventName => ctx.event.to_string(),
            Expression::HashFiles(patterns) => {
                hash_files(ctx.workspace, patterns).map_err(|source| TemplateError::HashFiles {
                    pattern: patterns.join(", "),
                    source,
                })?
            }
        };
        Ok(value)
    }
}

impl Template {
    /// Parse a template string
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("${{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + 3..];
            let end = after_open
                .find("}}")
                .ok_or_else(|| TemplateError::Unterminated(source.to_string()))?;
            segments.push(Segment::Expr(Expression::parse(&after_open[..end])?));
            rest = &after_open[end + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// A template with no placeholders
    pub fn literal(value: impl Into<String>) -> Self {
        let value = value.into();
        let segments = if value.is_empty() {
            Vec::new()
        } else {
            vec![Segment::Literal(value.clone())]
        };
        Self {
            source: value,
            segments,
        }
    }

    /// The template as written in the pipeline definition
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Matrix dimensions this template refers to
    pub fn matrix_refs(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Expr(Expression::Matrix(key)) => Some(key.as_str()),
            _ => None,
        })
    }

    /// Render the template against one job instance
    pub fn render(&self, ctx: &RenderContext<'_>) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Expr(expr) => out.push_str(&expr.render(ctx)?),
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
