// tests/variable_analysis.rs

use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::PathBuf;

use deploydag::fs::mock::MockFileSystem;
use deploydag::fs::RealFileSystem;
use deploydag::vars::{
    analyze_variables, is_variable_name, FsVariableSearcher, KnownVariables, VarFileCategory,
    VariableHit, VariableProducer, VariableProducerIndex, VariableSearch,
};
use deploydag_test_utils::builders::{TaskBuilder, TaskSetBuilder};
use deploydag_test_utils::init_tracing;
use serde_json::json;

/// Search collaborator answering from a fixed table and counting calls.
struct FixedSearch {
    hits: Vec<(&'static str, VariableHit)>,
    calls: Cell<usize>,
}

impl FixedSearch {
    fn new(hits: Vec<(&'static str, VariableHit)>) -> Self {
        Self {
            hits,
            calls: Cell::new(0),
        }
    }
}

impl VariableSearch for FixedSearch {
    fn find(&self, variable: &str) -> Vec<VariableHit> {
        self.calls.set(self.calls.get() + 1);
        self.hits
            .iter()
            .filter(|(name, _)| *name == variable)
            .map(|(_, hit)| hit.clone())
            .collect()
    }
}

fn group_vars_hit(path: &str) -> VariableHit {
    VariableHit {
        category: VarFileCategory::GroupVars,
        path: PathBuf::from(path),
        line: None,
    }
}

#[test]
fn test_task_producer_becomes_required_task() {
    init_tracing();

    let tasks = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("A").provides(&["x"]).build())
        .with_task(TaskBuilder::new("B").requires_var("x").build())
        .build();

    let analysis = analyze_variables(&tasks, None, None);

    assert_eq!(
        analysis.required_tasks["B"].iter().collect::<Vec<_>>(),
        vec!["A"]
    );
    assert!(analysis.required_tasks["A"].is_empty());
    assert!(analysis.missing.is_empty());
    assert_eq!(analysis.producers["x"], vec![VariableProducer::task("A")]);

    let augmented = tasks.with_required_tasks(&analysis.required_tasks).unwrap();
    assert!(augmented.get("B").unwrap().required_tasks.contains("A"));
}

#[test]
fn test_task_never_requires_itself() {
    let tasks = TaskSetBuilder::new()
        .with_task(
            TaskBuilder::new("facts")
                .provides(&["app_port"])
                .requires_var("app_port")
                .build(),
        )
        .build();

    let analysis = analyze_variables(&tasks, None, None);
    assert!(analysis.required_tasks["facts"].is_empty());
}

#[test]
fn test_marker_provides_are_not_variables() {
    assert!(is_variable_name("app_port"));
    assert!(is_variable_name("server_map.service"));
    assert!(!is_variable_name("_internal_marker"));
    assert!(!is_variable_name("nginx-config"));
    assert!(!is_variable_name("a..b"));
    assert!(!is_variable_name(""));

    let tasks = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("A").provides(&["_setup_done"]).build())
        .with_task(TaskBuilder::new("B").requires_var("_setup_done").build())
        .build();

    let analysis = analyze_variables(&tasks, None, None);
    assert!(analysis.required_tasks["B"].is_empty());
    assert_eq!(analysis.missing.len(), 1);
}

#[test]
fn test_known_variables_are_flattened() {
    let known = KnownVariables::from_yaml_str(
        r#"
app_port: 8080
server_map:
  service:
    port: 80
  name: web
"#,
    )
    .unwrap();

    let names: Vec<_> = known.iter().collect();
    assert_eq!(
        names,
        vec![
            "app_port",
            "server_map",
            "server_map.name",
            "server_map.service",
            "server_map.service.port"
        ]
    );
}

#[test]
fn test_known_variables_satisfy_requirements_without_edges() {
    let tasks = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("deploy").requires_var("server_map.service").build())
        .build();
    let known = KnownVariables::from_names(["server_map", "server_map.service"])
        .with_source("inventory/hosts.yml");

    let analysis = analyze_variables(&tasks, Some(&known), None);

    assert!(analysis.missing.is_empty());
    assert!(analysis.required_tasks["deploy"].is_empty());
    assert_eq!(
        analysis.producers["server_map.service"],
        vec![VariableProducer::Inventory {
            source: Some(PathBuf::from("inventory/hosts.yml"))
        }]
    );
}

#[test]
fn test_search_is_skipped_when_known_variables_cover_everything() {
    let tasks = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("deploy").requires_var("app_port").build())
        .build();
    let known = KnownVariables::from_names(["app_port"]);
    let search = FixedSearch::new(Vec::new());

    let index = VariableProducerIndex::build(&tasks, Some(&known), Some(&search));

    assert_eq!(search.calls.get(), 0);
    assert!(index.has_producer("app_port"));
}

#[test]
fn test_search_hits_are_registered_for_base_and_dotted_names() {
    let tasks = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("deploy").requires_var("db.password").build())
        .build();
    let search = FixedSearch::new(vec![("db", group_vars_hit("group_vars/all.yml"))]);

    let index = VariableProducerIndex::build(&tasks, None, Some(&search));

    let expected = VariableProducer::File {
        category: VarFileCategory::GroupVars,
        path: PathBuf::from("group_vars/all.yml"),
        line: None,
    };
    assert_eq!(index.producers_of("db"), &[expected.clone()]);
    assert_eq!(index.producers_of("db.password"), &[expected]);

    let analysis = index.analyze(&tasks);
    assert!(analysis.missing.is_empty());
    // File producers never turn into task edges.
    assert!(analysis.required_tasks["deploy"].is_empty());
}

#[test]
fn test_missing_variable_lists_candidates() {
    let tasks = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("deploy").requires_var("server_map.port").build())
        .build();
    let known =
        KnownVariables::from_names(["server_map", "unrelated"]).with_source("inventory.yml");

    let analysis = analyze_variables(&tasks, Some(&known), None);

    assert_eq!(analysis.missing.len(), 1);
    let missing = &analysis.missing[0];
    assert_eq!(missing.task, "deploy");
    assert_eq!(missing.variable, "server_map.port");

    let mut expected = BTreeMap::new();
    expected.insert(
        "server_map".to_string(),
        vec![VariableProducer::Inventory {
            source: Some(PathBuf::from("inventory.yml")),
        }],
    );
    assert_eq!(missing.candidates, expected);
}

#[test]
fn test_analysis_serializes_tagged_producers() {
    let tasks = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("facts").provides(&["app_port"]).build())
        .with_task(
            TaskBuilder::new("web")
                .requires_var("app_port")
                .requires_var("db_host")
                .requires_var("region")
                .requires_var("secret")
                .build(),
        )
        .build();
    let known = KnownVariables::from_names(["region"]).with_source("inventory.yml");
    let search = FixedSearch::new(vec![("db_host", group_vars_hit("group_vars/all.yml"))]);

    let analysis = analyze_variables(&tasks, Some(&known), Some(&search));
    let value = serde_json::to_value(&analysis).unwrap();

    assert_eq!(
        value["producers"]["app_port"],
        json!([{"kind": "task", "task": "facts"}])
    );
    assert_eq!(
        value["producers"]["db_host"],
        json!([{
            "kind": "file",
            "category": "group_vars",
            "path": "group_vars/all.yml",
            "line": null
        }])
    );
    assert_eq!(
        value["producers"]["region"],
        json!([{"kind": "inventory", "source": "inventory.yml"}])
    );
    assert_eq!(value["required_tasks"]["web"], json!(["facts"]));
    assert_eq!(
        value["missing"],
        json!([{"task": "web", "variable": "secret", "candidates": {}}])
    );
}

#[test]
fn test_task_dependencies_fold_in_resource_providers() {
    let tasks = TaskSetBuilder::new()
        .with_task(TaskBuilder::new("facts").provides(&["app_port"]).build())
        .with_task(TaskBuilder::new("pkgs").provides(&["nginx-package"]).build())
        .with_task(
            TaskBuilder::new("render")
                .requires_var("app_port")
                .depends_on("nginx-package")
                .build(),
        )
        .build();

    let analysis = analyze_variables(&tasks, None, None);

    assert_eq!(
        analysis.required_tasks["render"].iter().collect::<Vec<_>>(),
        vec!["facts"]
    );
    assert_eq!(
        analysis.task_dependencies["render"].iter().collect::<Vec<_>>(),
        vec!["facts", "pkgs"]
    );
}

fn ansible_repo() -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_file("/repo/group_vars/all.yml", "ntp_server: pool.ntp.org\n");
    fs.add_file("/repo/group_vars/web/main.yml", "nginx_workers: 4\n");
    fs.add_file("/repo/inventories/prod/host_vars/web1.yml", "web_ip: 10.0.0.1\n");
    fs.add_file(
        "/repo/hosts.ini",
        "[web]\nweb1 ansible_host=10.0.0.1\n\n[all:vars]\n# comment = ignored\ndeploy_user=ops\n",
    );
    fs.add_file(
        "/repo/inventory.yml",
        "all:\n  vars:\n    region: eu-west\n  hosts:\n    web1: {}\n",
    );
    fs.add_file(
        "/repo/site.yml",
        "- hosts: web\n  vars:\n    app_version: \"1.2\"\n  roles: [web]\n",
    );
    fs.add_file(
        "/repo/dependency_map.yml",
        "- hosts: all\n  vars:\n    should_not_be_found: 1\n",
    );
    fs.add_file("/repo/roles/web/defaults/main.yml", "web_port: 80\n");
    fs.add_file("/repo/roles/web/vars/main.yaml", "web_root: /srv/www\n");
    fs.add_file("/repo/roles/db/defaults/main.yml", "not: [valid yaml\n");
    fs
}

#[test]
fn test_fs_searcher_finds_every_category() {
    init_tracing();
    let fs = ansible_repo();
    let searcher = FsVariableSearcher::new(&fs, "/repo");

    let category_of = |name: &str| -> Vec<VarFileCategory> {
        searcher.find(name).into_iter().map(|h| h.category).collect()
    };

    assert_eq!(category_of("ntp_server"), vec![VarFileCategory::GroupVars]);
    assert_eq!(category_of("nginx_workers"), vec![VarFileCategory::GroupVars]);
    assert_eq!(category_of("web_ip"), vec![VarFileCategory::HostVars]);
    assert_eq!(category_of("region"), vec![VarFileCategory::Inventory]);
    assert_eq!(category_of("app_version"), vec![VarFileCategory::Playbooks]);
    assert_eq!(category_of("web_port"), vec![VarFileCategory::RoleDefaults]);
    assert_eq!(category_of("web_root"), vec![VarFileCategory::RoleVars]);

    assert!(searcher.find("should_not_be_found").is_empty());
    assert!(searcher.find("comment").is_empty());
    assert!(searcher.find("unknown_var").is_empty());
}

#[test]
fn test_fs_searcher_reports_ini_line_numbers() {
    let fs = ansible_repo();
    let searcher = FsVariableSearcher::new(&fs, "/repo");

    assert_eq!(
        searcher.find("deploy_user"),
        vec![VariableHit {
            category: VarFileCategory::Inventory,
            path: PathBuf::from("/repo/hosts.ini"),
            line: Some(6),
        }]
    );
}

#[test]
fn test_fs_searcher_respects_file_budget() {
    let fs = ansible_repo();
    let searcher = FsVariableSearcher::new(&fs, "/repo").with_max_files(1);

    // Only the first group_vars file is read.
    assert_eq!(searcher.find("ntp_server").len(), 1);
    assert!(searcher.find("web_root").is_empty());
}

#[test]
fn test_fs_searcher_on_real_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let group_vars = dir.path().join("group_vars");
    std::fs::create_dir_all(&group_vars).unwrap();
    std::fs::write(group_vars.join("all.yaml"), "db_host: localhost\n").unwrap();

    let fs = RealFileSystem;
    let searcher = FsVariableSearcher::new(&fs, dir.path());

    let hits = searcher.find("db_host");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, group_vars.join("all.yaml"));
}

#[test]
fn test_analysis_with_fs_searcher() {
    let fs = ansible_repo();
    let searcher = FsVariableSearcher::new(&fs, "/repo");

    let tasks = TaskSetBuilder::new()
        .with_task(
            TaskBuilder::new("web")
                .requires_var("web_port")
                .requires_var("secret_token")
                .build(),
        )
        .build();

    let analysis = analyze_variables(&tasks, None, Some(&searcher));
    assert!(analysis.producers.contains_key("web_port"));
    assert_eq!(analysis.missing.len(), 1);
    assert_eq!(analysis.missing[0].variable, "secret_token");
}
