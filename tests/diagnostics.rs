// tests/diagnostics.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use deploydag::dag::GraphError;
use deploydag::diagnostics::{collect_diagnostics, DiagnosticReport, ErrorKind, ToDiagnostics};
use deploydag::errors::{DeployDagError, SchemaError, SchemaIssue};
use deploydag::vars::{KnownVariables, MissingVariable, VariableProducer};
use deploydag_test_utils::builders::{TaskBuilder, TaskSetBuilder};
use deploydag_test_utils::init_tracing;
use serde_json::json;

#[test]
fn test_missing_resource_details_list_available_resources() {
    let err = SchemaError::single(SchemaIssue::MissingResource {
        task: "web".to_string(),
        resource: "db_ready".to_string(),
        looks_like_variable: true,
        available: vec!["packages".to_string(), "svc".to_string()],
    });

    let diagnostics = err.to_diagnostics();
    assert_eq!(diagnostics.len(), 1);

    let d = &diagnostics[0];
    assert_eq!(d.kind, ErrorKind::SchemaInvalid);
    assert_eq!(d.tasks, vec!["web".to_string()]);
    assert_eq!(d.details["resource"], json!("db_ready"));
    assert_eq!(d.details["looks_like_variable"], json!(true));
    assert_eq!(d.details["available_resources"], json!(["packages", "svc"]));
    assert!(!d.is_advisory());
}

#[test]
fn test_cycle_diagnostic_carries_every_path() {
    let err = GraphError::CycleDetected {
        cycles: vec![
            vec!["a".to_string(), "b".to_string(), "a".to_string()],
            vec!["b".to_string(), "c".to_string(), "b".to_string()],
        ],
    };

    let d = &err.to_diagnostics()[0];
    assert_eq!(d.kind, ErrorKind::CycleDetected);
    assert_eq!(d.tasks, vec!["a", "b", "c"]);
    assert_eq!(d.details["cycles"], json!([["a", "b", "a"], ["b", "c", "b"]]));
}

#[test]
fn test_missing_variable_is_advisory() {
    let mut candidates = BTreeMap::new();
    candidates.insert(
        "server_map".to_string(),
        vec![VariableProducer::Inventory {
            source: Some(PathBuf::from("inventory.yml")),
        }],
    );
    let missing = MissingVariable {
        task: "deploy".to_string(),
        variable: "server_map.port".to_string(),
        candidates,
    };

    let d = &missing.to_diagnostics()[0];
    assert_eq!(d.kind, ErrorKind::MissingVariableProducer);
    assert!(d.is_advisory());
    assert!(d.message.contains("server_map.port"));
    assert!(
        d.message.contains("server_map (from inventory inventory.yml)"),
        "message: {}",
        d.message
    );
    assert_eq!(
        d.details["candidates"],
        json!({"server_map": [{"kind": "inventory", "source": "inventory.yml"}]})
    );
}

#[test]
fn test_deploy_dag_error_delegates() {
    let err = DeployDagError::Graph(GraphError::UnknownTask {
        names: vec!["ghost".to_string()],
    });
    let diagnostics = err.to_diagnostics();
    assert_eq!(diagnostics[0].kind, ErrorKind::UnknownTask);
    assert_eq!(diagnostics[0].tasks, vec!["ghost"]);
}

#[test]
fn test_report_summary_and_json() {
    let schema = SchemaError::new(vec![
        SchemaIssue::MissingName { index: 0 },
        SchemaIssue::EmptyProvides {
            task: "b".to_string(),
        },
    ]);
    let mut diagnostics = schema.to_diagnostics();
    diagnostics.extend(
        MissingVariable {
            task: "c".to_string(),
            variable: "v".to_string(),
            candidates: BTreeMap::new(),
        }
        .to_diagnostics(),
    );

    let report = DiagnosticReport::new(diagnostics);
    assert_eq!(report.total, 3);
    assert_eq!(report.summary[&ErrorKind::SchemaInvalid], 2);
    assert_eq!(report.summary[&ErrorKind::MissingVariableProducer], 1);
    assert!(report.has_errors());
    assert_eq!(report.errors().count(), 2);
    assert_eq!(report.warnings().count(), 1);

    let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(value["total"], json!(3));
    assert_eq!(value["summary"]["schema_invalid"], json!(2));
    assert_eq!(value["diagnostics"][0]["kind"], json!("schema_invalid"));
    assert_eq!(value["diagnostics"][1]["tasks"], json!(["b"]));
    assert_eq!(report.to_json_value(), value);
}

#[test]
fn test_collect_diagnostics_on_invalid_schema_stops_at_validation() {
    init_tracing();
    let raw = vec![
        TaskBuilder::new("a").triggers("ghost").build(),
        TaskBuilder::new("a").build(),
    ];

    let report = collect_diagnostics(&raw, None, None);
    assert_eq!(report.total, 1);
    assert_eq!(report.diagnostics[0].details["issue"], json!("duplicate_names"));
}

#[test]
fn test_collect_diagnostics_accumulates_every_stage() {
    let raw = TaskSetBuilder::new()
        .with_task(
            TaskBuilder::new("a")
                .provides(&["ra"])
                .depends_on("rb")
                .watch(" ")
                .build(),
        )
        .with_task(
            TaskBuilder::new("b")
                .provides(&["rb"])
                .depends_on("ra")
                .requires_var("mystery")
                .build(),
        )
        .raw();

    let report = collect_diagnostics(&raw, Some(&KnownVariables::new()), None);

    let kinds: Vec<ErrorKind> = report.diagnostics.iter().map(|d| d.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ErrorKind::PatternMatchWarning,
            ErrorKind::MissingVariableProducer,
            ErrorKind::CycleDetected,
        ]
    );
    assert!(report.has_errors());
}

#[test]
fn test_collect_diagnostics_clean_set() {
    let raw = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("a").watch("roles/a/**").build())
        .raw();

    let report = collect_diagnostics(&raw, None, None);
    assert!(report.is_empty());
    assert!(!report.has_errors());
    assert_eq!(report.to_string(), "no problems found");
}
