// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef, Reversed};
use petgraph::Direction;
use tracing::{debug, info};

use crate::config::TaskSet;
use crate::dag::cycles::elementary_cycles;
use crate::errors::GraphError;
use crate::types::{EdgeKind, TaskName};

/// Validated, acyclic graph over the tasks of one [`TaskSet`].
///
/// An edge `u -> v` always means "`u` runs before `v`", whatever its
/// [`EdgeKind`]. Provider, trigger and variable edges share the graph, so
/// cycle detection and ordering treat them uniformly.
///
/// A `DependencyGraph` only exists once construction succeeded: there is no
/// way to observe a partially built or cyclic graph.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<TaskName, EdgeKind>,
    index: HashMap<TaskName, NodeIndex>,
    /// Topological order, computed once at build time.
    order: Vec<TaskName>,
}

impl DependencyGraph {
    /// Build the graph from a validated task set.
    ///
    /// - `depends_on` entries become provider edges from every providing task
    ///   (a task consuming its own resource gets no self-edge).
    /// - `triggers` entries become trigger edges.
    /// - `required_tasks` entries become variable edges.
    ///
    /// Fails with the first missing resource or trigger target, and with
    /// every elementary cycle if the combined edges are not acyclic.
    pub fn build(task_set: &TaskSet) -> Result<Self, GraphError> {
        let mut graph: DiGraph<TaskName, EdgeKind> =
            DiGraph::with_capacity(task_set.len(), task_set.len());
        let mut index = HashMap::with_capacity(task_set.len());

        for task in task_set {
            let idx = graph.add_node(task.name.clone());
            index.insert(task.name.clone(), idx);
        }

        let providers = task_set.resource_providers();

        for task in task_set {
            let consumer = index[task.name.as_str()];

            for resource in &task.depends_on {
                let Some(provider_names) = providers.get(resource.as_str()) else {
                    return Err(GraphError::MissingResource {
                        task: task.name.clone(),
                        resource: resource.clone(),
                        available: task_set.all_provides().into_iter().map(str::to_string).collect(),
                    });
                };

                for provider in provider_names.iter().filter(|p| **p != task.name) {
                    add_edge(&mut graph, index[*provider], consumer, EdgeKind::Provider);
                }
            }

            for target in &task.triggers {
                let Some(&target_idx) = index.get(target.as_str()) else {
                    return Err(GraphError::MissingTriggerTarget {
                        task: task.name.clone(),
                        target: target.clone(),
                    });
                };
                add_edge(&mut graph, consumer, target_idx, EdgeKind::Trigger);
            }

            let unknown: Vec<TaskName> = task
                .required_tasks
                .iter()
                .filter(|r| !index.contains_key(r.as_str()))
                .cloned()
                .collect();
            if !unknown.is_empty() {
                return Err(GraphError::UnknownTask { names: unknown });
            }
            for required in task.required_tasks.iter().filter(|r| **r != task.name) {
                add_edge(&mut graph, index[required.as_str()], consumer, EdgeKind::Variable);
            }
        }

        let order = match topological_sort(&graph) {
            Some(order) => order,
            None => {
                let cycles = elementary_cycles(&graph);
                debug!(count = cycles.len(), "dependency cycles found");
                return Err(GraphError::CycleDetected { cycles });
            }
        };

        info!(
            tasks = graph.node_count(),
            edges = graph.edge_count(),
            "dependency graph built"
        );

        Ok(Self {
            graph,
            index,
            order,
        })
    }

    fn node(&self, name: &str) -> Result<NodeIndex, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownTask {
                names: vec![name.to_string()],
            })
    }

    /// Fail with every name in `names` that is not a task of this graph.
    pub(crate) fn check_known<S: AsRef<str>>(&self, names: &[S]) -> Result<(), GraphError> {
        let unknown: BTreeSet<TaskName> = names
            .iter()
            .map(AsRef::as_ref)
            .filter(|n| !self.index.contains_key(*n))
            .map(str::to_string)
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(GraphError::UnknownTask {
                names: unknown.into_iter().collect(),
            })
        }
    }

    /// Task names in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Every edge as `(from, to, kind)`, sorted.
    pub fn edges(&self) -> Vec<(&str, &str, EdgeKind)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .map(|e| {
                (
                    self.graph[e.source()].as_str(),
                    self.graph[e.target()].as_str(),
                    *e.weight(),
                )
            })
            .collect();
        edges.sort();
        edges
    }

    /// Tasks with an edge into `name`: they run before it.
    pub fn direct_dependencies(&self, name: &str) -> Result<BTreeSet<TaskName>, GraphError> {
        let idx = self.node(name)?;
        Ok(self.neighbors(idx, Direction::Incoming, None))
    }

    /// Tasks with an edge out of `name`: they run after it.
    pub fn direct_dependents(&self, name: &str) -> Result<BTreeSet<TaskName>, GraphError> {
        let idx = self.node(name)?;
        Ok(self.neighbors(idx, Direction::Outgoing, None))
    }

    /// Like [`direct_dependents`](Self::direct_dependents), restricted to one
    /// edge kind. `direct_dependents_by_kind(t, EdgeKind::Trigger)` is the
    /// set of tasks `t` notifies.
    pub fn direct_dependents_by_kind(
        &self,
        name: &str,
        kind: EdgeKind,
    ) -> Result<BTreeSet<TaskName>, GraphError> {
        let idx = self.node(name)?;
        Ok(self.neighbors(idx, Direction::Outgoing, Some(kind)))
    }

    fn neighbors(
        &self,
        idx: NodeIndex,
        direction: Direction,
        kind: Option<EdgeKind>,
    ) -> BTreeSet<TaskName> {
        self.graph
            .edges_directed(idx, direction)
            .filter(|e| kind.is_none_or(|k| *e.weight() == k))
            .map(|e| match direction {
                Direction::Incoming => self.graph[e.source()].clone(),
                Direction::Outgoing => self.graph[e.target()].clone(),
            })
            .collect()
    }

    /// Transitive ancestors of `name`, excluding `name` itself.
    pub fn all_dependencies(&self, name: &str) -> Result<BTreeSet<TaskName>, GraphError> {
        let start = self.node(name)?;
        let reversed = Reversed(&self.graph);
        let mut bfs = Bfs::new(reversed, start);

        let mut out = BTreeSet::new();
        while let Some(idx) = bfs.next(reversed) {
            if idx != start {
                out.insert(self.graph[idx].clone());
            }
        }
        Ok(out)
    }

    /// Transitive descendants of `name`, excluding `name` itself.
    pub fn all_dependents(&self, name: &str) -> Result<BTreeSet<TaskName>, GraphError> {
        let start = self.node(name)?;
        let mut bfs = Bfs::new(&self.graph, start);

        let mut out = BTreeSet::new();
        while let Some(idx) = bfs.next(&self.graph) {
            if idx != start {
                out.insert(self.graph[idx].clone());
            }
        }
        Ok(out)
    }

    /// Every task, ordered so each edge `u -> v` has `u` before `v`.
    ///
    /// Among tasks with no constraint between them, names come in lexical
    /// order, so the same task set always yields the same order.
    pub fn topological_order(&self) -> &[TaskName] {
        &self.order
    }

    /// `subset` plus all of its transitive dependencies, in topological order.
    pub fn execution_order<S: AsRef<str>>(&self, subset: &[S]) -> Result<Vec<TaskName>, GraphError> {
        self.check_known(subset)?;

        let mut wanted: BTreeSet<TaskName> = BTreeSet::new();
        for name in subset {
            wanted.insert(name.as_ref().to_string());
            wanted.extend(self.all_dependencies(name.as_ref())?);
        }

        Ok(self.filter_order(&wanted))
    }

    /// Restrict the cached topological order to `wanted`.
    fn filter_order(&self, wanted: &BTreeSet<TaskName>) -> Vec<TaskName> {
        self.order
            .iter()
            .filter(|name| wanted.contains(*name))
            .cloned()
            .collect()
    }
}

/// Add `from -> to` unless an edge of the same kind already exists.
fn add_edge(graph: &mut DiGraph<TaskName, EdgeKind>, from: NodeIndex, to: NodeIndex, kind: EdgeKind) {
    if graph.edges_connecting(from, to).any(|e| *e.weight() == kind) {
        return;
    }
    debug!(from = %graph[from], to = %graph[to], %kind, "adding edge");
    graph.add_edge(from, to, kind);
}

/// Kahn's algorithm with a lexically ordered ready set.
///
/// Returns `None` if the graph has a cycle.
fn topological_sort(graph: &DiGraph<TaskName, EdgeKind>) -> Option<Vec<TaskName>> {
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|idx| graph.edges_directed(idx, Direction::Incoming).count())
        .collect();

    let mut ready: BTreeMap<&str, NodeIndex> = graph
        .node_indices()
        .filter(|idx| in_degree[idx.index()] == 0)
        .map(|idx| (graph[idx].as_str(), idx))
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some((name, idx)) = ready.pop_first() {
        order.push(name.to_string());
        for edge in graph.edges_directed(idx, Direction::Outgoing) {
            let target = edge.target();
            in_degree[target.index()] -= 1;
            if in_degree[target.index()] == 0 {
                ready.insert(graph[target].as_str(), target);
            }
        }
    }

    (order.len() == graph.node_count()).then_some(order)
}

