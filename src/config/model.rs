// src/config/model.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::TaskName;

/// One task record as handed over by a document parser.
///
/// This mirrors the declarative task document:
///
/// ```toml
/// [[task]]
/// name = "generate_config"
/// provides = ["config_file"]
/// requires_vars = ["app_port"]
/// watch_patterns = ["templates/app.conf.j2"]
///
/// [[task]]
/// name = "restart_service"
/// provides = ["svc"]
/// depends_on = ["config_file"]
/// ```
///
/// Nothing here is validated yet; use [`TaskSet::try_from`] or
/// [`validate_tasks`](crate::config::validate_tasks) for that.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTask {
    #[serde(default)]
    pub name: Option<String>,

    /// Resources or capabilities this task produces.
    #[serde(default)]
    pub provides: Vec<String>,

    /// Variables this task consumes.
    #[serde(default)]
    pub requires_vars: Vec<String>,

    /// Tasks to run after this one (notify-style).
    #[serde(default)]
    pub triggers: Vec<String>,

    /// Path-matching rules associating file changes with this task.
    #[serde(default, alias = "watch_files")]
    pub watch_patterns: Vec<String>,

    /// Resources (from other tasks' `provides`) this task consumes.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A validated task.
///
/// Relation fields are sets, so ordering and duplicates in the source
/// document never leak into graph construction. Only `watch_patterns` keeps
/// its author-supplied order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub name: TaskName,
    pub provides: BTreeSet<String>,
    pub requires_vars: BTreeSet<String>,
    pub triggers: BTreeSet<TaskName>,
    pub watch_patterns: Vec<String>,
    pub depends_on: BTreeSet<String>,

    /// Task-level dependencies inferred from variable usage.
    ///
    /// Always empty on a freshly validated set; populated through
    /// [`TaskSet::with_required_tasks`].
    pub required_tasks: BTreeSet<TaskName>,
}

impl Task {
    pub(crate) fn from_raw(name: TaskName, raw: &RawTask) -> Self {
        Self {
            name,
            provides: raw.provides.iter().cloned().collect(),
            requires_vars: raw.requires_vars.iter().cloned().collect(),
            triggers: raw.triggers.iter().cloned().collect(),
            watch_patterns: raw.watch_patterns.clone(),
            depends_on: raw.depends_on.iter().cloned().collect(),
            required_tasks: BTreeSet::new(),
        }
    }
}

/// An immutable, validated collection of tasks.
///
/// Construct via `TaskSet::try_from(Vec<RawTask>)`; the constructor is the
/// only place validation happens (see `config::validate`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSet {
    tasks: Vec<Task>,
    index: HashMap<TaskName, usize>,
}

impl TaskSet {
    /// Construct from tasks that are already known to satisfy every
    /// invariant. Used by `config::validate` only.
    pub(crate) fn new_unchecked(tasks: Vec<Task>) -> Self {
        let index = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        Self { tasks, index }
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tasks in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Every resource provided by any task.
    pub fn all_provides(&self) -> BTreeSet<&str> {
        self.tasks
            .iter()
            .flat_map(|t| t.provides.iter().map(String::as_str))
            .collect()
    }

    /// Resource → names of the tasks providing it, in declaration order.
    pub fn resource_providers(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut providers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for task in &self.tasks {
            for resource in &task.provides {
                providers
                    .entry(resource.as_str())
                    .or_default()
                    .push(task.name.as_str());
            }
        }
        providers
    }

    pub(crate) fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }
}

impl<'a> IntoIterator for &'a TaskSet {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

/// Planner behaviour from the optional `[config]` section of a task document.
///
/// ```toml
/// [config]
/// include_triggers = true
/// strict_variables = false
/// full_deploy_patterns = ["deploy_map.toml"]
/// ```
///
/// All keys are optional and have reasonable defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlannerConfig {
    /// Also run everything downstream of a matched task, not just its
    /// dependencies.
    #[serde(default = "default_true")]
    pub include_triggers: bool,

    /// Infer extra task dependencies from shared variable usage before
    /// building the graph.
    #[serde(default = "default_true")]
    pub analyze_variables: bool,

    /// Treat a missing variable producer for a planned task as fatal.
    #[serde(default)]
    pub strict_variables: bool,

    /// A change to any file matching one of these patterns plans every task.
    #[serde(default = "default_full_deploy_patterns")]
    pub full_deploy_patterns: Vec<String>,

    /// Upper bound on files read by the variable-definition search.
    #[serde(default = "default_max_search_files")]
    pub max_search_files: usize,
}

fn default_true() -> bool {
    true
}

fn default_full_deploy_patterns() -> Vec<String> {
    vec![
        "dependency_map.yml".to_string(),
        "dependency_map.yaml".to_string(),
        "deploy_map.toml".to_string(),
    ]
}

fn default_max_search_files() -> usize {
    512
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            include_triggers: default_true(),
            analyze_variables: default_true(),
            strict_variables: false,
            full_deploy_patterns: default_full_deploy_patterns(),
            max_search_files: default_max_search_files(),
        }
    }
}

/// A parsed but not yet validated task document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTaskDocument {
    pub config: PlannerConfig,
    pub tasks: Vec<RawTask>,
}
