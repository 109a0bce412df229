// src/errors.rs

//! Crate-wide error types.
//!
//! - [`SchemaError`] collects everything wrong with a set of raw task records.
//! - [`GraphError`] covers graph construction and graph queries.
//! - [`DeployDagError`] is what the high-level entry points return.
//!
//! Every error can be turned into structured diagnostics, see
//! [`crate::diagnostics::ToDiagnostics`].

use std::fmt;

use thiserror::Error;

use crate::types::TaskName;
use crate::vars::MissingVariable;

/// One problem found while validating raw task records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaIssue {
    /// The document contains no tasks at all.
    EmptyTaskSet,
    /// A record has the wrong shape (not a mapping, name not a string,
    /// relation field not a list of strings, ...).
    Malformed { index: usize, reason: String },
    /// A record has no name, or a blank one.
    MissingName { index: usize },
    /// A task provides nothing.
    EmptyProvides { task: TaskName },
    /// Several tasks share a name. All offending names are reported together.
    DuplicateNames { names: Vec<TaskName> },
    /// A `triggers` entry names a task that does not exist.
    UnknownTriggerTarget {
        task: TaskName,
        target: TaskName,
        available: Vec<TaskName>,
    },
    /// A `depends_on` entry is not provided by any task.
    ///
    /// `looks_like_variable` is only an annotation: the entry resembles a
    /// variable reference that probably belongs in `requires_vars`.
    MissingResource {
        task: TaskName,
        resource: String,
        looks_like_variable: bool,
        available: Vec<String>,
    },
    /// An inferred `required_tasks` entry names a task that does not exist.
    UnknownRequiredTask { task: TaskName, required: TaskName },
}

impl SchemaIssue {
    /// Name of the task this issue is about, if any.
    pub fn task(&self) -> Option<&str> {
        match self {
            SchemaIssue::EmptyTaskSet
            | SchemaIssue::Malformed { .. }
            | SchemaIssue::MissingName { .. }
            | SchemaIssue::DuplicateNames { .. } => None,
            SchemaIssue::EmptyProvides { task }
            | SchemaIssue::UnknownTriggerTarget { task, .. }
            | SchemaIssue::MissingResource { task, .. }
            | SchemaIssue::UnknownRequiredTask { task, .. } => Some(task.as_str()),
        }
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaIssue::EmptyTaskSet => {
                write!(f, "task set must contain at least one task")
            }
            SchemaIssue::Malformed { index, reason } => {
                write!(f, "task at index {index} is malformed: {reason}")
            }
            SchemaIssue::MissingName { index } => {
                write!(f, "task at index {index} must have a non-empty 'name'")
            }
            SchemaIssue::EmptyProvides { task } => write!(
                f,
                "task '{task}' must provide at least one resource; use a descriptive \
                 identifier for what this task provides"
            ),
            SchemaIssue::DuplicateNames { names } => write!(
                f,
                "duplicate task names found: {}; each task must have a unique name",
                names.join(", ")
            ),
            SchemaIssue::UnknownTriggerTarget { task, target, .. } => {
                write!(f, "task '{task}' triggers non-existent task '{target}'")
            }
            SchemaIssue::MissingResource {
                task,
                resource,
                looks_like_variable,
                available,
            } => {
                write!(
                    f,
                    "task '{task}' depends on non-existent resource '{resource}'"
                )?;
                if *looks_like_variable {
                    write!(
                        f,
                        " (note: '{resource}' looks like a variable reference and \
                         probably belongs in 'requires_vars', not 'depends_on')"
                    )?;
                }
                write!(f, "; available resources: {}", available.join(", "))
            }
            SchemaIssue::UnknownRequiredTask { task, required } => {
                write!(f, "task '{task}' requires non-existent task '{required}'")
            }
        }
    }
}

/// Validation failure for a set of raw task records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid task set: {}", join_issues(.issues))]
pub struct SchemaError {
    pub issues: Vec<SchemaIssue>,
}

impl SchemaError {
    pub fn new(issues: Vec<SchemaIssue>) -> Self {
        Self { issues }
    }

    pub fn single(issue: SchemaIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }
}

fn join_issues(issues: &[SchemaIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from building or querying a [`DependencyGraph`](crate::dag::DependencyGraph).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error(
        "task '{task}' depends on resource '{resource}' but no task provides it. \
         Available resources: {}",
        .available.join(", ")
    )]
    MissingResource {
        task: TaskName,
        resource: String,
        available: Vec<String>,
    },

    #[error("task '{task}' triggers '{target}' but that task does not exist")]
    MissingTriggerTarget { task: TaskName, target: TaskName },

    /// Every distinct elementary cycle, each returning to its first node.
    #[error("circular dependency detected:\n{}", format_cycles(.cycles))]
    CycleDetected { cycles: Vec<Vec<TaskName>> },

    #[error("unknown task(s): {}", .names.join(", "))]
    UnknownTask { names: Vec<TaskName> },
}

/// Render cycles as `  - a -> b -> a` lines.
pub fn format_cycles(cycles: &[Vec<TaskName>]) -> String {
    cycles
        .iter()
        .map(|c| format!("  - {}", c.join(" -> ")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Error, Debug)]
pub enum DeployDagError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Only raised when `strict_variables` is enabled.
    #[error(
        "required variables have no known producer: {}",
        .0.iter().map(|m| format!("{}:{}", m.task, m.variable)).collect::<Vec<_>>().join(", ")
    )]
    MissingVariables(Vec<MissingVariable>),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DeployDagError>;
