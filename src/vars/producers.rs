// src/vars/producers.rs

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_yaml::Value;
use tracing::debug;

use crate::types::TaskName;
use crate::vars::search::{VarFileCategory, VariableHit};

/// Something able to supply a named variable at run time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariableProducer {
    /// A task listing the variable in its `provides`.
    Task { task: TaskName },
    /// A variable definition file found by a [`VariableSearch`](crate::vars::VariableSearch).
    File {
        category: VarFileCategory,
        path: PathBuf,
        line: Option<usize>,
    },
    /// Externally supplied known variables.
    Inventory { source: Option<PathBuf> },
}

impl VariableProducer {
    pub fn task(name: impl Into<TaskName>) -> Self {
        VariableProducer::Task { task: name.into() }
    }

    /// The producing task, for task-based producers.
    pub fn task_name(&self) -> Option<&str> {
        match self {
            VariableProducer::Task { task } => Some(task.as_str()),
            _ => None,
        }
    }

    pub fn is_task(&self) -> bool {
        matches!(self, VariableProducer::Task { .. })
    }
}

impl From<VariableHit> for VariableProducer {
    fn from(hit: VariableHit) -> Self {
        VariableProducer::File {
            category: hit.category,
            path: hit.path,
            line: hit.line,
        }
    }
}

impl fmt::Display for VariableProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableProducer::Task { task } => write!(f, "task '{task}'"),
            VariableProducer::File {
                category,
                path,
                line: Some(line),
            } => write!(f, "{category} {}:{line}", path.display()),
            VariableProducer::File { category, path, .. } => {
                write!(f, "{category} {}", path.display())
            }
            VariableProducer::Inventory { source: Some(path) } => {
                write!(f, "inventory {}", path.display())
            }
            VariableProducer::Inventory { source: None } => f.write_str("inventory"),
        }
    }
}

/// Whether a `provides` entry names a variable rather than an internal
/// marker.
///
/// Names starting with `_` are markers. Everything else must be an
/// identifier, optionally dotted (`server_map.service`).
pub fn is_variable_name(name: &str) -> bool {
    if name.is_empty() || name.starts_with('_') {
        return false;
    }
    name.split('.').all(is_identifier)
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Variable names known to exist before any analysis runs.
///
/// Nested mappings are flattened: `{server_map: {service: web}}` registers
/// both `server_map` and `server_map.service`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownVariables {
    names: BTreeSet<String>,
    source: Option<PathBuf>,
}

impl KnownVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flat list of names, taken as-is.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            source: None,
        }
    }

    /// Flatten a nested key/value mapping. Non-mapping values contribute
    /// nothing.
    pub fn from_value(value: &Value) -> Self {
        let mut names = BTreeSet::new();
        if let Value::Mapping(mapping) = value {
            flatten_into(&mut names, mapping, None);
        }
        Self {
            names,
            source: None,
        }
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, serde_yaml::Error> {
        let value: Value = serde_yaml::from_str(contents)?;
        Ok(Self::from_value(&value))
    }

    /// Record where these variables came from (an inventory file, say).
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn flatten_into(names: &mut BTreeSet<String>, mapping: &serde_yaml::Mapping, prefix: Option<&str>) {
    for (key, value) in mapping {
        let key = match key {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                debug!(key = ?other, "skipping non-scalar variable key");
                continue;
            }
        };

        let full = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key,
        };

        if let Value::Mapping(nested) = value {
            flatten_into(names, nested, Some(&full));
        }
        names.insert(full);
    }
}
