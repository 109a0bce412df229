// src/vars/analyzer.rs

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TaskSet;
use crate::types::TaskName;
use crate::vars::producers::{is_variable_name, KnownVariables, VariableProducer};
use crate::vars::search::VariableSearch;

/// A required variable for which no producer was found anywhere.
///
/// Advisory: the variable may still arrive through a channel the analysis
/// does not model (extra vars on the command line, say).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MissingVariable {
    pub task: TaskName,
    pub variable: String,
    /// Registered variables sharing a dotted prefix with `variable`
    /// (`server_map` for `server_map.port`, and the other way round), with
    /// their producers.
    pub candidates: BTreeMap<String, Vec<VariableProducer>>,
}

/// Result of the two-pass variable analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariableAnalysis {
    /// Variable → everything able to supply it.
    pub producers: BTreeMap<String, Vec<VariableProducer>>,
    /// Task → other tasks producing variables it requires.
    pub required_tasks: BTreeMap<TaskName, BTreeSet<TaskName>>,
    /// Task → every producing task: `required_tasks` plus resource providers.
    pub task_dependencies: BTreeMap<TaskName, BTreeSet<TaskName>>,
    pub missing: Vec<MissingVariable>,
}

impl VariableAnalysis {
    /// Missing variables of the given tasks only.
    pub fn missing_for<'a>(&'a self, tasks: &'a BTreeSet<TaskName>) -> impl Iterator<Item = &'a MissingVariable> {
        self.missing.iter().filter(move |m| tasks.contains(&m.task))
    }
}

/// Variable → producers map for one task set (pass 1 of the analysis).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableProducerIndex {
    producers: BTreeMap<String, Vec<VariableProducer>>,
}

impl VariableProducerIndex {
    /// Register producers, in this order:
    ///
    /// 1. every known variable (as an inventory producer);
    /// 2. every task whose `provides` has a variable-shaped entry;
    /// 3. search hits, only for required variables still without a
    ///    producer. A dotted variable is searched by its base name and the
    ///    hits are registered under both names.
    ///
    /// With a complete `known` listing the search is never consulted.
    pub fn build(
        task_set: &TaskSet,
        known: Option<&KnownVariables>,
        search: Option<&dyn VariableSearch>,
    ) -> Self {
        let mut index = Self::default();

        if let Some(known) = known {
            let source = known.source().map(|p| p.to_path_buf());
            for name in known.iter() {
                index.register(name, VariableProducer::Inventory { source: source.clone() });
            }
        }

        for task in task_set {
            for provided in task.provides.iter().filter(|p| is_variable_name(p)) {
                index.register(provided, VariableProducer::task(task.name.clone()));
            }
        }

        if let Some(search) = search {
            let unresolved: BTreeSet<&str> = task_set
                .iter()
                .flat_map(|t| t.requires_vars.iter().map(String::as_str))
                .filter(|v| !index.has_producer(v))
                .collect();

            for variable in unresolved {
                let base = base_name(variable);
                for hit in search.find(base) {
                    let producer = VariableProducer::from(hit);
                    if base != variable {
                        index.register(variable, producer.clone());
                    }
                    index.register(base, producer);
                }
            }
        }

        info!(variables = index.producers.len(), "built variable producer index");
        index
    }

    fn register(&mut self, variable: &str, producer: VariableProducer) {
        let entry = self.producers.entry(variable.to_string()).or_default();
        if !entry.contains(&producer) {
            debug!(variable, %producer, "registered variable producer");
            entry.push(producer);
        }
    }

    /// Producers of exactly `variable`; empty if there are none.
    pub fn producers_of(&self, variable: &str) -> &[VariableProducer] {
        self.producers.get(variable).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_producer(&self, variable: &str) -> bool {
        !self.producers_of(variable).is_empty()
    }

    pub fn producers(&self) -> &BTreeMap<String, Vec<VariableProducer>> {
        &self.producers
    }

    /// Registered names related to `variable` by a dotted prefix, with
    /// their producers.
    fn candidates(&self, variable: &str) -> BTreeMap<String, Vec<VariableProducer>> {
        self.producers
            .iter()
            .filter(|(k, _)| k.as_str() != variable)
            .filter(|(k, _)| is_dotted_prefix(k, variable) || is_dotted_prefix(variable, k))
            .map(|(k, producers)| (k.clone(), producers.clone()))
            .collect()
    }

    /// Pass 2: task-level dependencies from variable usage.
    ///
    /// Only task producers become dependencies, never the consuming task
    /// itself. File and inventory producers are assumed available at run
    /// time.
    pub fn required_tasks(&self, task_set: &TaskSet) -> BTreeMap<TaskName, BTreeSet<TaskName>> {
        task_set
            .iter()
            .map(|task| {
                let required: BTreeSet<TaskName> = task
                    .requires_vars
                    .iter()
                    .flat_map(|v| self.producers_of(v))
                    .filter_map(VariableProducer::task_name)
                    .filter(|name| *name != task.name && task_set.contains(name))
                    .map(str::to_string)
                    .collect();
                (task.name.clone(), required)
            })
            .collect()
    }

    /// Run pass 2 and collect missing producers.
    pub fn analyze(&self, task_set: &TaskSet) -> VariableAnalysis {
        let required_tasks = self.required_tasks(task_set);
        let providers = task_set.resource_providers();

        let task_dependencies = task_set
            .iter()
            .map(|task| {
                let mut deps = required_tasks.get(&task.name).cloned().unwrap_or_default();
                for resource in &task.depends_on {
                    let by_resource = providers.get(resource.as_str()).into_iter().flatten();
                    deps.extend(
                        by_resource
                            .filter(|p| **p != task.name)
                            .map(|p| p.to_string()),
                    );
                }
                (task.name.clone(), deps)
            })
            .collect();

        let missing: Vec<MissingVariable> = task_set
            .iter()
            .flat_map(|task| {
                task.requires_vars
                    .iter()
                    .filter(|v| !self.has_producer(v))
                    .map(move |v| MissingVariable {
                        task: task.name.clone(),
                        variable: v.clone(),
                        candidates: self.candidates(v),
                    })
            })
            .collect();

        for m in &missing {
            warn!(task = %m.task, variable = %m.variable, "required variable has no known producer");
        }

        VariableAnalysis {
            producers: self.producers.clone(),
            required_tasks,
            task_dependencies,
            missing,
        }
    }
}

/// Build the index and run the full analysis in one go.
pub fn analyze_variables(
    task_set: &TaskSet,
    known: Option<&KnownVariables>,
    search: Option<&dyn VariableSearch>,
) -> VariableAnalysis {
    VariableProducerIndex::build(task_set, known, search).analyze(task_set)
}

fn base_name(variable: &str) -> &str {
    variable.split('.').next().unwrap_or(variable)
}

/// `prefix` is `name` cut at a `.` boundary (`a` for `a.b`).
fn is_dotted_prefix(prefix: &str, name: &str) -> bool {
    name.len() > prefix.len()
        && name.starts_with(prefix)
        && name.as_bytes()[prefix.len()] == b'.'
}
