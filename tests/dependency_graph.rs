// tests/dependency_graph.rs

use std::collections::{BTreeMap, BTreeSet};

use deploydag::config::TaskSet;
use deploydag::dag::{DependencyGraph, GraphError};
use deploydag::types::EdgeKind;
use deploydag_test_utils::builders::{TaskBuilder, TaskSetBuilder};
use deploydag_test_utils::init_tracing;

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// base -> config -> service, with service triggering a handler.
fn chain() -> TaskSet {
    TaskSetBuilder::new()
        .with_task(TaskBuilder::new("base").provides(&["packages"]).build())
        .with_task(
            TaskBuilder::new("config")
                .provides(&["config_file"])
                .depends_on("packages")
                .build(),
        )
        .with_task(
            TaskBuilder::new("service")
                .provides(&["svc"])
                .depends_on("config_file")
                .triggers("handler")
                .build(),
        )
        .with_task(TaskBuilder::new("handler").provides(&["restarted"]).build())
        .build()
}

#[test]
fn test_direct_queries() {
    init_tracing();
    let graph = DependencyGraph::build(&chain()).unwrap();

    assert_eq!(graph.len(), 4);
    assert_eq!(graph.direct_dependencies("config").unwrap(), set(&["base"]));
    assert_eq!(graph.direct_dependents("config").unwrap(), set(&["service"]));
    assert_eq!(graph.direct_dependencies("handler").unwrap(), set(&["service"]));
    assert!(graph.direct_dependencies("base").unwrap().is_empty());
}

#[test]
fn test_transitive_queries() {
    let graph = DependencyGraph::build(&chain()).unwrap();

    assert_eq!(
        graph.all_dependencies("service").unwrap(),
        set(&["base", "config"])
    );
    assert_eq!(
        graph.all_dependents("base").unwrap(),
        set(&["config", "handler", "service"])
    );
    assert!(graph.all_dependents("handler").unwrap().is_empty());
}

#[test]
fn test_edges_are_tagged() {
    let graph = DependencyGraph::build(&chain()).unwrap();

    assert_eq!(
        graph.edges(),
        vec![
            ("base", "config", EdgeKind::Provider),
            ("config", "service", EdgeKind::Provider),
            ("service", "handler", EdgeKind::Trigger),
        ]
    );
    assert_eq!(
        graph.direct_dependents_by_kind("service", EdgeKind::Trigger).unwrap(),
        set(&["handler"])
    );
    assert!(graph
        .direct_dependents_by_kind("service", EdgeKind::Provider)
        .unwrap()
        .is_empty());
}

#[test]
fn test_parallel_edges_of_different_kinds_are_kept() {
    let tasks = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("a").provides(&["ra"]).triggers("b").build())
        .with_task(TaskBuilder::new("b").depends_on("ra").build())
        .build();
    let graph = DependencyGraph::build(&tasks).unwrap();

    assert_eq!(
        graph.edges(),
        vec![("a", "b", EdgeKind::Provider), ("a", "b", EdgeKind::Trigger)]
    );
    assert_eq!(graph.topological_order(), ["a", "b"]);
}

#[test]
fn test_multiple_providers_all_become_dependencies() {
    let tasks = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("p1").provides(&["shared"]).build())
        .with_task(TaskBuilder::new("p2").provides(&["shared"]).build())
        .with_task(TaskBuilder::new("c").depends_on("shared").build())
        .build();
    let graph = DependencyGraph::build(&tasks).unwrap();

    assert_eq!(graph.direct_dependencies("c").unwrap(), set(&["p1", "p2"]));
}

#[test]
fn test_self_dependency_produces_no_self_edge() {
    let tasks = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("task1").provides(&["r1"]).depends_on("r1").build())
        .build();
    let graph = DependencyGraph::build(&tasks).unwrap();

    assert!(graph.direct_dependencies("task1").unwrap().is_empty());
    assert!(graph.edges().is_empty());
}

#[test]
fn test_two_task_cycle_is_detected() {
    let tasks = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("task1").provides(&["r1"]).depends_on("r2").build())
        .with_task(TaskBuilder::new("task2").provides(&["r2"]).depends_on("r1").build())
        .build();

    match DependencyGraph::build(&tasks) {
        Err(GraphError::CycleDetected { cycles }) => {
            assert_eq!(
                cycles,
                vec![vec![
                    "task1".to_string(),
                    "task2".to_string(),
                    "task1".to_string()
                ]]
            );
        }
        other => panic!("Expected CycleDetected, got: {:?}", other),
    }
}

#[test]
fn test_every_elementary_cycle_is_reported() {
    // a <-> b and b <-> c share b; a -> b -> c -> a closes a third cycle.
    let tasks = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("a").provides(&["ra"]).depends_on("rb").build())
        .with_task(
            TaskBuilder::new("b")
                .provides(&["rb"])
                .depends_on("ra")
                .depends_on("rc")
                .build(),
        )
        .with_task(
            TaskBuilder::new("c")
                .provides(&["rc"])
                .depends_on("rb")
                .triggers("a")
                .build(),
        )
        .with_task(TaskBuilder::new("free").build())
        .build();

    let err = DependencyGraph::build(&tasks).unwrap_err();
    let GraphError::CycleDetected { cycles } = &err else {
        panic!("Expected CycleDetected, got: {:?}", err);
    };

    let expected: Vec<Vec<String>> = vec![
        vec!["a", "b", "a"],
        vec!["a", "b", "c", "a"],
        vec!["b", "c", "b"],
    ]
    .into_iter()
    .map(|c| c.into_iter().map(str::to_string).collect())
    .collect();
    assert_eq!(cycles, &expected);

    let msg = err.to_string();
    assert!(msg.contains("a -> b -> c -> a"), "message: {msg}");
}

#[test]
fn test_self_trigger_is_a_cycle() {
    let tasks = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("loop").triggers("loop").build())
        .build();

    match DependencyGraph::build(&tasks) {
        Err(GraphError::CycleDetected { cycles }) => {
            assert_eq!(cycles, vec![vec!["loop".to_string(), "loop".to_string()]]);
        }
        other => panic!("Expected CycleDetected, got: {:?}", other),
    }
}

#[test]
fn test_variable_edges_join_the_graph() {
    let tasks = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("facts").provides(&["app_port"]).build())
        .with_task(TaskBuilder::new("render").requires_var("app_port").build())
        .build();

    let mut required = BTreeMap::new();
    required.insert("render".to_string(), set(&["facts"]));
    let tasks = tasks.with_required_tasks(&required).unwrap();

    let graph = DependencyGraph::build(&tasks).unwrap();
    assert_eq!(
        graph.edges(),
        vec![("facts", "render", EdgeKind::Variable)]
    );
    assert_eq!(graph.all_dependencies("render").unwrap(), set(&["facts"]));
}

#[test]
fn test_topological_order_breaks_ties_lexically() {
    let tasks = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("zeta").build())
        .with_task(TaskBuilder::new("gamma").provides(&["g"]).build())
        .with_task(TaskBuilder::new("alpha").depends_on("g").build())
        .with_task(TaskBuilder::new("beta").build())
        .build();
    let graph = DependencyGraph::build(&tasks).unwrap();

    assert_eq!(graph.topological_order(), ["beta", "gamma", "alpha", "zeta"]);
}

#[test]
fn test_topological_order_is_deterministic() {
    let first = DependencyGraph::build(&chain()).unwrap();
    let second = DependencyGraph::build(&chain()).unwrap();

    assert_eq!(first.topological_order(), second.topological_order());
    assert_eq!(
        first.topological_order(),
        ["base", "config", "service", "handler"]
    );
}

#[test]
fn test_execution_order_pulls_in_dependencies() {
    let graph = DependencyGraph::build(&chain()).unwrap();

    assert_eq!(
        graph.execution_order(&["service"]).unwrap(),
        vec!["base", "config", "service"]
    );
    assert_eq!(graph.execution_order(&["handler", "base"]).unwrap(), vec![
        "base", "config", "service", "handler"
    ]);
    assert!(graph.execution_order::<&str>(&[]).unwrap().is_empty());
}

#[test]
fn test_unknown_task_queries_fail() {
    let graph = DependencyGraph::build(&chain()).unwrap();

    assert_eq!(
        graph.direct_dependencies("ghost").unwrap_err(),
        GraphError::UnknownTask {
            names: vec!["ghost".to_string()]
        }
    );
    assert!(graph.all_dependents("ghost").is_err());
    assert_eq!(
        graph.execution_order(&["zz", "base", "aa"]).unwrap_err(),
        GraphError::UnknownTask {
            names: vec!["aa".to_string(), "zz".to_string()]
        }
    );
}
