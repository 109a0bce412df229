use std::fmt;

use serde::Serialize;

/// Name of a task. Unique within a [`TaskSet`](crate::config::TaskSet).
pub type TaskName = String;

/// Why an edge exists between two tasks in the dependency graph.
///
/// - `Provider`: the source task provides a resource the target lists in
///   `depends_on`, so the source must run first.
/// - `Trigger`: the source task lists the target in `triggers`, so the
///   target runs after it (notify-style).
/// - `Variable`: the source task produces a variable the target consumes
///   (inferred by the variable analysis, see [`crate::vars`]).
///
/// All kinds share one graph, so cycle detection and ordering treat them
/// uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Provider,
    Trigger,
    Variable,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeKind::Provider => "provider",
            EdgeKind::Trigger => "trigger",
            EdgeKind::Variable => "variable",
        };
        f.write_str(s)
    }
}
