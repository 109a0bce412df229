// src/lib.rs

pub mod config;
pub mod dag;
pub mod diagnostics;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod types;
pub mod vars;
pub mod watch;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{load_and_validate_with, PlannerConfig, TaskSet};
use crate::dag::{DependencyGraph, Resolver};
use crate::diagnostics::{Diagnostic, ToDiagnostics};
use crate::errors::{DeployDagError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::TaskName;
use crate::vars::{analyze_variables, FsVariableSearcher, KnownVariables, VariableSearch};
use crate::watch::{match_changed_files, match_file, validate_watch_patterns};

/// Inputs of one planning run besides the task set itself.
#[derive(Default)]
pub struct PlanRequest<'a> {
    /// Changed file paths, relative to the repository root.
    pub changed_files: Vec<String>,
    /// Variables known to exist up front (inventory, extra vars).
    pub known_variables: Option<&'a KnownVariables>,
    /// Read-only lookup of variable definition files.
    pub search: Option<&'a dyn VariableSearch>,
}

impl fmt::Debug for PlanRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanRequest")
            .field("changed_files", &self.changed_files)
            .field("known_variables", &self.known_variables)
            .field("search", &self.search.is_some())
            .finish()
    }
}

impl<'a> PlanRequest<'a> {
    pub fn new<I, S>(changed_files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            changed_files: changed_files.into_iter().map(Into::into).collect(),
            known_variables: None,
            search: None,
        }
    }

    pub fn with_known_variables(mut self, known: &'a KnownVariables) -> Self {
        self.known_variables = Some(known);
        self
    }

    pub fn with_search(mut self, search: &'a dyn VariableSearch) -> Self {
        self.search = Some(search);
        self
    }
}

/// Outcome of a planning run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentPlan {
    /// Tasks whose watch patterns matched a changed file.
    pub matched: BTreeSet<TaskName>,
    /// Tasks to run, dependencies first.
    pub execution_order: Vec<TaskName>,
    /// A changed file matched one of the full-deploy patterns, so every task
    /// is planned.
    pub full_deploy: bool,
    /// Advisory findings: pattern warnings and missing variable producers.
    pub diagnostics: Vec<Diagnostic>,
}

impl DeploymentPlan {
    pub fn is_empty(&self) -> bool {
        self.execution_order.is_empty()
    }
}

/// Match changed files, infer variable dependencies, build the graph and
/// resolve the execution order.
///
/// Fails on any graph error, and on missing variable producers of planned
/// tasks when `config.strict_variables` is set. Nothing partial is
/// returned on failure.
pub fn plan(task_set: &TaskSet, config: &PlannerConfig, request: &PlanRequest<'_>) -> Result<DeploymentPlan> {
    let mut diagnostics = validate_watch_patterns(task_set).to_diagnostics();

    let full_deploy = request
        .changed_files
        .iter()
        .find(|f| match_file(f, &config.full_deploy_patterns));
    if let Some(file) = full_deploy {
        info!(file = %file, "task document changed, planning a full deploy");
    }
    let full_deploy = full_deploy.is_some();

    let matched: BTreeSet<TaskName> = if full_deploy {
        task_set.names().map(str::to_string).collect()
    } else {
        match_changed_files(&request.changed_files, task_set)
    };

    let (task_set, analysis) = if config.analyze_variables {
        let analysis = analyze_variables(task_set, request.known_variables, request.search);
        let augmented = task_set.clone().with_required_tasks(&analysis.required_tasks)?;
        (augmented, Some(analysis))
    } else {
        debug!("variable analysis disabled");
        (task_set.clone(), None)
    };

    let graph = DependencyGraph::build(&task_set)?;

    let execution_order = if full_deploy {
        graph.topological_order().to_vec()
    } else {
        let matched: Vec<&str> = matched.iter().map(String::as_str).collect();
        Resolver::new(&graph).resolve(&matched, config.include_triggers)?
    };

    if let Some(analysis) = &analysis {
        let planned: BTreeSet<TaskName> = execution_order.iter().cloned().collect();
        let missing: Vec<_> = analysis.missing_for(&planned).cloned().collect();

        if config.strict_variables && !missing.is_empty() {
            return Err(DeployDagError::MissingVariables(missing));
        }
        if !missing.is_empty() {
            warn!(count = missing.len(), "planned tasks require variables with no known producer");
        }
        diagnostics.extend(missing.to_diagnostics());
    }

    info!(
        matched = matched.len(),
        planned = execution_order.len(),
        full_deploy,
        "deployment plan ready"
    );

    Ok(DeploymentPlan {
        matched,
        execution_order,
        full_deploy,
        diagnostics,
    })
}

/// Load the task document at `path` and [`plan`] with its `[config]`.
///
/// Variable definitions are searched for in the directory holding the
/// document, see [`plan_in_repo`].
pub fn plan_from_path(path: impl AsRef<Path>, request: &PlanRequest<'_>) -> Result<DeploymentPlan> {
    let path = path.as_ref();
    let root = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    plan_in_repo(&RealFileSystem, root, path, request)
}

/// Load the task document at `document` through `fs` and [`plan`] with its
/// `[config]`.
///
/// Unless `request` already carries a search, variable definitions are
/// looked up under `root` by an [`FsVariableSearcher`] reading at most
/// `max_search_files` files.
pub fn plan_in_repo(
    fs: &dyn FileSystem,
    root: impl Into<PathBuf>,
    document: impl AsRef<Path>,
    request: &PlanRequest<'_>,
) -> Result<DeploymentPlan> {
    let loaded = load_and_validate_with(fs, document)?;

    if request.search.is_some() || !loaded.config.analyze_variables {
        return plan(&loaded.tasks, &loaded.config, request);
    }

    let searcher =
        FsVariableSearcher::new(fs, root).with_max_files(loaded.config.max_search_files);
    let request = PlanRequest {
        changed_files: request.changed_files.clone(),
        known_variables: request.known_variables,
        search: Some(&searcher),
    };
    plan(&loaded.tasks, &loaded.config, &request)
}
