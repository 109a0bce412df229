// src/config/validate.rs

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::model::{RawTask, Task, TaskSet};
use crate::errors::{SchemaError, SchemaIssue};
use crate::types::TaskName;

impl TryFrom<Vec<RawTask>> for TaskSet {
    type Error = SchemaError;

    fn try_from(raw: Vec<RawTask>) -> std::result::Result<Self, Self::Error> {
        validate_tasks(&raw)
    }
}

/// Validate raw task records and build a [`TaskSet`].
///
/// Checks run in stages, and a stage only runs when the previous ones passed:
///
/// 1. the set is non-empty;
/// 2. per task, stopping at the first problem of that task: name present,
///    no blank relation entries, `provides` non-empty;
/// 3. names are unique (all duplicates reported together);
/// 4. referential integrity across the whole set: every `triggers` target
///    exists and every `depends_on` entry is provided by some task. All
///    violations are accumulated.
///
/// Pure: no logging above `debug`, no side effects.
pub fn validate_tasks(raw: &[RawTask]) -> Result<TaskSet, SchemaError> {
    ensure_has_tasks(raw)?;
    let names = validate_structure(raw)?;
    ensure_unique_names(&names)?;
    validate_references(raw, &names)?;

    let tasks = raw
        .iter()
        .zip(names)
        .map(|(r, name)| Task::from_raw(name.to_string(), r))
        .collect();

    Ok(TaskSet::new_unchecked(tasks))
}

fn ensure_has_tasks(raw: &[RawTask]) -> Result<(), SchemaError> {
    if raw.is_empty() {
        return Err(SchemaError::single(SchemaIssue::EmptyTaskSet));
    }
    Ok(())
}

fn validate_structure(raw: &[RawTask]) -> Result<Vec<&str>, SchemaError> {
    let mut names = Vec::with_capacity(raw.len());
    let mut issues = Vec::new();

    for (index, task) in raw.iter().enumerate() {
        match check_task_structure(index, task) {
            Ok(name) => names.push(name),
            Err(issue) => issues.push(issue),
        }
    }

    if issues.is_empty() {
        Ok(names)
    } else {
        Err(SchemaError::new(issues))
    }
}

fn check_task_structure(index: usize, task: &RawTask) -> Result<&str, SchemaIssue> {
    let name = match task.name.as_deref() {
        Some(n) if !n.trim().is_empty() => n,
        _ => return Err(SchemaIssue::MissingName { index }),
    };

    // Blank watch patterns are only advisory, see `watch::validate_watch_patterns`.
    let fields: [(&str, &[String]); 4] = [
        ("provides", &task.provides),
        ("requires_vars", &task.requires_vars),
        ("triggers", &task.triggers),
        ("depends_on", &task.depends_on),
    ];
    for (field, values) in fields {
        if values.iter().any(|v| v.trim().is_empty()) {
            return Err(SchemaIssue::Malformed {
                index,
                reason: format!("task '{name}' has an empty entry in '{field}'"),
            });
        }
    }

    if task.provides.is_empty() {
        return Err(SchemaIssue::EmptyProvides {
            task: name.to_string(),
        });
    }

    Ok(name)
}

fn ensure_unique_names(names: &[&str]) -> Result<(), SchemaError> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for name in names.iter().copied() {
        *counts.entry(name).or_default() += 1;
    }

    let duplicates: Vec<TaskName> = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(name, _)| name.to_string())
        .collect();

    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::single(SchemaIssue::DuplicateNames {
            names: duplicates,
        }))
    }
}

fn validate_references(raw: &[RawTask], names: &[&str]) -> Result<(), SchemaError> {
    let all_names: BTreeSet<&str> = names.iter().copied().collect();
    let all_provides: BTreeSet<&str> = raw
        .iter()
        .flat_map(|t| t.provides.iter().map(String::as_str))
        .collect();

    let available_tasks: Vec<TaskName> = all_names.iter().map(|s| s.to_string()).collect();
    let available_resources: Vec<String> = all_provides.iter().map(|s| s.to_string()).collect();

    let mut issues = Vec::new();

    for (task, name) in raw.iter().zip(names) {
        let triggers: BTreeSet<&str> = task.triggers.iter().map(String::as_str).collect();
        for target in triggers {
            if !all_names.contains(target) {
                issues.push(SchemaIssue::UnknownTriggerTarget {
                    task: name.to_string(),
                    target: target.to_string(),
                    available: available_tasks.clone(),
                });
            }
        }

        let depends_on: BTreeSet<&str> = task.depends_on.iter().map(String::as_str).collect();
        for resource in depends_on {
            if !all_provides.contains(resource) {
                issues.push(SchemaIssue::MissingResource {
                    task: name.to_string(),
                    resource: resource.to_string(),
                    looks_like_variable: looks_like_variable_reference(resource),
                    available: available_resources.clone(),
                });
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        debug!(count = issues.len(), "referential integrity violations");
        Err(SchemaError::new(issues))
    }
}

/// Heuristic for a `depends_on` entry that is really a variable reference,
/// e.g. one lifted out of a `when:` condition: a dotted path such as
/// `server_map.service`, or a bare identifier.
pub fn looks_like_variable_reference(entry: &str) -> bool {
    if entry.contains('.') {
        return true;
    }
    !entry.is_empty() && entry.chars().all(|c| c.is_alphanumeric() || c == '_')
}

impl TaskSet {
    /// Return a new set whose tasks carry the given inferred task-level
    /// dependencies.
    ///
    /// Entries keyed by unknown tasks are ignored; required names that do not
    /// exist are rejected. A task never requires itself.
    pub fn with_required_tasks(
        self,
        required: &BTreeMap<TaskName, BTreeSet<TaskName>>,
    ) -> Result<TaskSet, SchemaError> {
        let mut issues = Vec::new();

        for (task, reqs) in required {
            if !self.contains(task) {
                debug!(task = %task, "ignoring required tasks for unknown task");
                continue;
            }
            for req in reqs {
                if !self.contains(req) {
                    issues.push(SchemaIssue::UnknownRequiredTask {
                        task: task.clone(),
                        required: req.clone(),
                    });
                }
            }
        }

        if !issues.is_empty() {
            return Err(SchemaError::new(issues));
        }

        let tasks = self
            .into_tasks()
            .into_iter()
            .map(|mut task| {
                if let Some(reqs) = required.get(&task.name) {
                    task.required_tasks = reqs
                        .iter()
                        .filter(|r| **r != task.name)
                        .cloned()
                        .collect();
                }
                task
            })
            .collect();

        Ok(TaskSet::new_unchecked(tasks))
    }
}
