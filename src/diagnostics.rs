// src/diagnostics.rs

//! Structured diagnostics.
//!
//! Every error and advisory finding converts to one or more [`Diagnostic`]s
//! carrying a kind, the implicated tasks, a message and a details map, so
//! callers can render human-readable or JSON reports without parsing
//! message text.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{validate_tasks, RawTask, TaskSet};
use crate::dag::DependencyGraph;
use crate::errors::{DeployDagError, GraphError, SchemaError, SchemaIssue};
use crate::types::TaskName;
use crate::vars::{analyze_variables, KnownVariables, MissingVariable, VariableSearch};
use crate::watch::{validate_watch_patterns, PatternWarning, PatternWarningReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SchemaInvalid,
    CycleDetected,
    UnknownTask,
    MissingVariableProducer,
    PatternMatchWarning,
    Io,
    Parse,
}

impl ErrorKind {
    /// Advisory kinds accompany an otherwise usable result; the caller
    /// decides how severe they are.
    pub fn is_advisory(self) -> bool {
        matches!(
            self,
            ErrorKind::MissingVariableProducer | ErrorKind::PatternMatchWarning
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::SchemaInvalid => "schema_invalid",
            ErrorKind::CycleDetected => "cycle_detected",
            ErrorKind::UnknownTask => "unknown_task",
            ErrorKind::MissingVariableProducer => "missing_variable_producer",
            ErrorKind::PatternMatchWarning => "pattern_match_warning",
            ErrorKind::Io => "io",
            ErrorKind::Parse => "parse",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    /// Tasks implicated, if any.
    pub tasks: Vec<TaskName>,
    pub message: String,
    pub details: BTreeMap<String, Value>,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            tasks: Vec::new(),
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_task(mut self, task: impl Into<TaskName>) -> Self {
        self.tasks.push(task.into());
        self
    }

    pub fn with_tasks<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        self.tasks.extend(tasks.into_iter().map(Into::into));
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn is_advisory(&self) -> bool {
        self.kind.is_advisory()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Conversion into structured diagnostics.
pub trait ToDiagnostics {
    fn to_diagnostics(&self) -> Vec<Diagnostic>;
}

impl ToDiagnostics for SchemaIssue {
    fn to_diagnostics(&self) -> Vec<Diagnostic> {
        let base = Diagnostic::new(ErrorKind::SchemaInvalid, self.to_string());
        let diagnostic = match self {
            SchemaIssue::EmptyTaskSet => base.with_detail("issue", "empty_task_set"),
            SchemaIssue::Malformed { index, reason } => base
                .with_detail("issue", "malformed")
                .with_detail("index", index)
                .with_detail("reason", reason),
            SchemaIssue::MissingName { index } => base
                .with_detail("issue", "missing_name")
                .with_detail("index", index),
            SchemaIssue::EmptyProvides { task } => base
                .with_task(task.clone())
                .with_detail("issue", "empty_provides"),
            SchemaIssue::DuplicateNames { names } => base
                .with_tasks(names.iter().cloned())
                .with_detail("issue", "duplicate_names")
                .with_detail("duplicates", names),
            SchemaIssue::UnknownTriggerTarget {
                task,
                target,
                available,
            } => base
                .with_task(task.clone())
                .with_detail("issue", "unknown_trigger_target")
                .with_detail("target", target)
                .with_detail("available_tasks", available),
            SchemaIssue::MissingResource {
                task,
                resource,
                looks_like_variable,
                available,
            } => base
                .with_task(task.clone())
                .with_detail("issue", "missing_resource")
                .with_detail("resource", resource)
                .with_detail("looks_like_variable", looks_like_variable)
                .with_detail("available_resources", available),
            SchemaIssue::UnknownRequiredTask { task, required } => base
                .with_task(task.clone())
                .with_detail("issue", "unknown_required_task")
                .with_detail("required", required),
        };
        vec![diagnostic]
    }
}

impl ToDiagnostics for SchemaError {
    fn to_diagnostics(&self) -> Vec<Diagnostic> {
        self.issues.iter().flat_map(|i| i.to_diagnostics()).collect()
    }
}

impl ToDiagnostics for GraphError {
    fn to_diagnostics(&self) -> Vec<Diagnostic> {
        let diagnostic = match self {
            GraphError::MissingResource {
                task,
                resource,
                available,
            } => Diagnostic::new(ErrorKind::SchemaInvalid, self.to_string())
                .with_task(task.clone())
                .with_detail("issue", "missing_resource")
                .with_detail("resource", resource)
                .with_detail("available_resources", available),
            GraphError::MissingTriggerTarget { task, target } => {
                Diagnostic::new(ErrorKind::SchemaInvalid, self.to_string())
                    .with_task(task.clone())
                    .with_detail("issue", "unknown_trigger_target")
                    .with_detail("target", target)
            }
            GraphError::CycleDetected { cycles } => {
                let mut tasks: Vec<&TaskName> = cycles.iter().flatten().collect();
                tasks.sort();
                tasks.dedup();
                Diagnostic::new(ErrorKind::CycleDetected, self.to_string())
                    .with_tasks(tasks.into_iter().cloned())
                    .with_detail("cycles", cycles)
            }
            GraphError::UnknownTask { names } => {
                Diagnostic::new(ErrorKind::UnknownTask, self.to_string())
                    .with_tasks(names.iter().cloned())
                    .with_detail("unknown", names)
            }
        };
        vec![diagnostic]
    }
}

impl ToDiagnostics for MissingVariable {
    fn to_diagnostics(&self) -> Vec<Diagnostic> {
        let mut message = format!(
            "task '{}' requires variable '{}' but nothing is known to produce it",
            self.task, self.variable
        );
        if !self.candidates.is_empty() {
            message.push_str(&format!(
                "; related known variables: {}",
                self.candidates
                    .iter()
                    .map(|(name, producers)| {
                        let from: Vec<String> = producers.iter().map(|p| p.to_string()).collect();
                        format!("{name} (from {})", from.join(", "))
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        vec![Diagnostic::new(ErrorKind::MissingVariableProducer, message)
            .with_task(self.task.clone())
            .with_detail("variable", &self.variable)
            .with_detail("candidates", &self.candidates)]
    }
}

impl ToDiagnostics for PatternWarning {
    fn to_diagnostics(&self) -> Vec<Diagnostic> {
        let base = Diagnostic::new(ErrorKind::PatternMatchWarning, self.to_string())
            .with_task(self.task.clone())
            .with_detail("pattern", &self.pattern);

        let diagnostic = match &self.reason {
            PatternWarningReason::Blank => base.with_detail("issue", "blank_pattern"),
            PatternWarningReason::InvalidGlob(err) => base
                .with_detail("issue", "invalid_glob")
                .with_detail("error", err),
        };
        vec![diagnostic]
    }
}

impl ToDiagnostics for DeployDagError {
    fn to_diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            DeployDagError::Schema(e) => e.to_diagnostics(),
            DeployDagError::Graph(e) => e.to_diagnostics(),
            DeployDagError::MissingVariables(missing) => {
                missing.iter().flat_map(|m| m.to_diagnostics()).collect()
            }
            DeployDagError::IoError(_) | DeployDagError::Other(_) => {
                vec![Diagnostic::new(ErrorKind::Io, self.to_string())]
            }
            DeployDagError::TomlError(_) | DeployDagError::YamlError(_) => {
                vec![Diagnostic::new(ErrorKind::Parse, self.to_string())]
            }
        }
    }
}

impl<T: ToDiagnostics> ToDiagnostics for [T] {
    fn to_diagnostics(&self) -> Vec<Diagnostic> {
        self.iter().flat_map(|d| d.to_diagnostics()).collect()
    }
}

/// A batch of diagnostics with per-kind counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiagnosticReport {
    pub total: usize,
    pub summary: BTreeMap<ErrorKind, usize>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticReport {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        let mut summary = BTreeMap::new();
        for d in &diagnostics {
            *summary.entry(d.kind).or_insert(0) += 1;
        }
        Self {
            total: diagnostics.len(),
            summary,
            diagnostics,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// True if at least one non-advisory diagnostic is present.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| !d.is_advisory())
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_advisory())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_advisory())
    }

    pub fn to_json_value(&self) -> Value {
        json!({
            "total": self.total,
            "summary": self.summary,
            "diagnostics": self.diagnostics,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.diagnostics.is_empty() {
            return write!(f, "no problems found");
        }
        for d in &self.diagnostics {
            writeln!(f, "{d}")?;
        }
        Ok(())
    }
}

/// Run every check over raw task records and report everything found.
///
/// Unlike the planning pipeline this does not stop at the first failing
/// stage: pattern warnings and variable analysis still run when graph
/// construction fails, so a single report covers as much as possible.
pub fn collect_diagnostics(
    raw: &[RawTask],
    known: Option<&KnownVariables>,
    search: Option<&dyn VariableSearch>,
) -> DiagnosticReport {
    let task_set: TaskSet = match validate_tasks(raw) {
        Ok(set) => set,
        Err(e) => return DiagnosticReport::new(e.to_diagnostics()),
    };

    let mut diagnostics = validate_watch_patterns(&task_set).to_diagnostics();

    let analysis = analyze_variables(&task_set, known, search);
    diagnostics.extend(analysis.missing.to_diagnostics());

    match task_set.with_required_tasks(&analysis.required_tasks) {
        Ok(augmented) => {
            if let Err(e) = DependencyGraph::build(&augmented) {
                diagnostics.extend(e.to_diagnostics());
            }
        }
        Err(e) => diagnostics.extend(e.to_diagnostics()),
    }

    debug!(count = diagnostics.len(), "collected diagnostics");
    DiagnosticReport::new(diagnostics)
}
