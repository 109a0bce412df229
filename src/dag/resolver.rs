// src/dag/resolver.rs

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::dag::graph::DependencyGraph;
use crate::errors::GraphError;
use crate::types::TaskName;

/// Turns a set of matched tasks into an ordered execution plan.
///
/// Dependencies of a matched task are always pulled in. Dependents
/// (everything downstream through provider, trigger or variable edges) are
/// pulled in only when triggers are requested. A task reachable both ways
/// simply ends up in the plan once.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'g> {
    graph: &'g DependencyGraph,
}

impl<'g> Resolver<'g> {
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &'g DependencyGraph {
        self.graph
    }

    /// Resolve `matched` into a topologically ordered task list.
    ///
    /// Fails with [`GraphError::UnknownTask`] naming every unknown entry of
    /// `matched`. An empty `matched` resolves to an empty plan.
    pub fn resolve<S: AsRef<str>>(
        &self,
        matched: &[S],
        include_triggers: bool,
    ) -> Result<Vec<TaskName>, GraphError> {
        self.graph.check_known(matched)?;

        let mut to_run: BTreeSet<TaskName> =
            matched.iter().map(|s| s.as_ref().to_string()).collect();

        for name in matched.iter().map(AsRef::as_ref) {
            let deps = self.graph.all_dependencies(name)?;
            debug!(task = name, count = deps.len(), "adding dependencies");
            to_run.extend(deps);
        }

        if include_triggers {
            for name in matched.iter().map(AsRef::as_ref) {
                let dependents = self.graph.all_dependents(name)?;
                debug!(task = name, count = dependents.len(), "adding dependents");
                to_run.extend(dependents);
            }
        }

        // Dependents pulled in above may have dependencies of their own that
        // were not reached from the matched set.
        let closure: Vec<TaskName> = to_run.iter().cloned().collect();
        let order = self.graph.execution_order(&closure)?;

        info!(
            matched = matched.len(),
            planned = order.len(),
            include_triggers,
            "resolved execution order"
        );
        Ok(order)
    }

    /// `matched` plus everything it depends on.
    pub fn resolve_dependencies_only<S: AsRef<str>>(
        &self,
        matched: &[S],
    ) -> Result<Vec<TaskName>, GraphError> {
        self.resolve(matched, false)
    }

    /// `matched`, everything it depends on and everything downstream of it.
    pub fn resolve_with_triggers<S: AsRef<str>>(
        &self,
        matched: &[S],
    ) -> Result<Vec<TaskName>, GraphError> {
        self.resolve(matched, true)
    }

    /// Transitive dependencies of a single task.
    pub fn task_dependencies(&self, name: &str) -> Result<BTreeSet<TaskName>, GraphError> {
        self.graph.all_dependencies(name)
    }

    /// Every task that runs downstream of `name`.
    pub fn task_triggers(&self, name: &str) -> Result<BTreeSet<TaskName>, GraphError> {
        self.graph.all_dependents(name)
    }
}
