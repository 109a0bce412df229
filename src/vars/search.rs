// src/vars/search.rs

use std::cell::OnceCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_yaml::Value;
use tracing::{debug, info, warn};

use crate::fs::FileSystem;

/// Default upper bound on files read by [`FsVariableSearcher`].
pub const DEFAULT_MAX_SEARCH_FILES: usize = 512;

/// Document names never treated as playbooks.
const DEPENDENCY_MAP_FILES: &[&str] = &["dependency_map.yml", "dependency_map.yaml"];

static INI_ASSIGNMENT: OnceLock<Regex> = OnceLock::new();

fn ini_assignment() -> &'static Regex {
    INI_ASSIGNMENT.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*[=:]").expect("INI_ASSIGNMENT is valid")
    })
}

/// Where a variable definition was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VarFileCategory {
    GroupVars,
    HostVars,
    Inventory,
    Playbooks,
    RoleDefaults,
    RoleVars,
}

impl fmt::Display for VarFileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VarFileCategory::GroupVars => "group_vars",
            VarFileCategory::HostVars => "host_vars",
            VarFileCategory::Inventory => "inventory",
            VarFileCategory::Playbooks => "playbooks",
            VarFileCategory::RoleDefaults => "role_defaults",
            VarFileCategory::RoleVars => "role_vars",
        };
        f.write_str(s)
    }
}

/// A single definition site of a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VariableHit {
    pub category: VarFileCategory,
    pub path: PathBuf,
    /// 1-based line, when the format makes it cheap to know.
    pub line: Option<usize>,
}

/// Read-only lookup of variable definitions outside the task document.
pub trait VariableSearch {
    /// Every known definition site of `variable`, in a stable order.
    fn find(&self, variable: &str) -> Vec<VariableHit>;
}

impl<T: VariableSearch + ?Sized> VariableSearch for &T {
    fn find(&self, variable: &str) -> Vec<VariableHit> {
        (**self).find(variable)
    }
}

/// Searches the conventional variable locations of a deployment repository.
///
/// Nothing is read until the first [`find`](VariableSearch::find); the whole
/// tree is then indexed once. At most `max_files` files are read per
/// searcher.
pub struct FsVariableSearcher<'a> {
    fs: &'a dyn FileSystem,
    root: PathBuf,
    max_files: usize,
    index: OnceCell<HashMap<String, BTreeSet<VariableHit>>>,
}

impl fmt::Debug for FsVariableSearcher<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsVariableSearcher")
            .field("root", &self.root)
            .field("max_files", &self.max_files)
            .field("indexed", &self.index.get().is_some())
            .finish()
    }
}

impl<'a> FsVariableSearcher<'a> {
    pub fn new(fs: &'a dyn FileSystem, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
            max_files: DEFAULT_MAX_SEARCH_FILES,
            index: OnceCell::new(),
        }
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index(&self) -> &HashMap<String, BTreeSet<VariableHit>> {
        self.index.get_or_init(|| {
            let mut scan = Scan::new(self.fs, self.max_files);
            scan.run(&self.root);
            scan.finish()
        })
    }
}

impl VariableSearch for FsVariableSearcher<'_> {
    fn find(&self, variable: &str) -> Vec<VariableHit> {
        self.index()
            .get(variable)
            .map(|hits| hits.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// One bounded pass over the repository.
struct Scan<'a> {
    fs: &'a dyn FileSystem,
    budget: usize,
    files_read: usize,
    truncated: bool,
    index: HashMap<String, BTreeSet<VariableHit>>,
}

impl<'a> Scan<'a> {
    fn new(fs: &'a dyn FileSystem, budget: usize) -> Self {
        Self {
            fs,
            budget,
            files_read: 0,
            truncated: false,
            index: HashMap::new(),
        }
    }

    fn run(&mut self, root: &Path) {
        for dir in vars_dirs(self.fs, root, "group_vars") {
            self.vars_dir(&dir, VarFileCategory::GroupVars);
        }
        for dir in vars_dirs(self.fs, root, "host_vars") {
            self.vars_dir(&dir, VarFileCategory::HostVars);
        }

        for file in inventory_files(self.fs, root) {
            if file.extension().is_some_and(|e| e == "ini") {
                self.ini_file(&file);
            } else {
                self.yaml_file(&file, VarFileCategory::Inventory);
            }
        }

        for dir in [root.to_path_buf(), root.join("playbooks")] {
            for file in self.list(&dir) {
                let excluded = file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| DEPENDENCY_MAP_FILES.contains(&n));
                if is_yaml(&file) && self.fs.is_file(&file) && !excluded {
                    self.playbook_file(&file);
                }
            }
        }

        for role in self.list(&root.join("roles")) {
            if !self.fs.is_dir(&role) {
                continue;
            }
            for (sub, category) in [
                ("defaults", VarFileCategory::RoleDefaults),
                ("vars", VarFileCategory::RoleVars),
            ] {
                for file_name in ["main.yml", "main.yaml"] {
                    let file = role.join(sub).join(file_name);
                    if self.fs.is_file(&file) {
                        self.yaml_file(&file, category);
                    }
                }
            }
        }
    }

    fn finish(self) -> HashMap<String, BTreeSet<VariableHit>> {
        if self.truncated {
            warn!(
                max_files = self.budget,
                "variable search stopped early; raise max_search_files to search everything"
            );
        }
        info!(
            files = self.files_read,
            variables = self.index.len(),
            "indexed variable definitions"
        );
        self.index
    }

    fn list(&self, dir: &Path) -> Vec<PathBuf> {
        if !self.fs.is_dir(dir) {
            return Vec::new();
        }
        self.fs.read_dir(dir).unwrap_or_else(|e| {
            debug!(dir = ?dir, error = %e, "skipping unreadable directory");
            Vec::new()
        })
    }

    fn read(&mut self, path: &Path) -> Option<String> {
        if self.files_read >= self.budget {
            self.truncated = true;
            return None;
        }
        self.files_read += 1;

        match self.fs.read_to_string(path) {
            Ok(contents) => Some(contents),
            Err(e) => {
                debug!(file = ?path, error = %e, "skipping unreadable file");
                None
            }
        }
    }

    fn parse_yaml(&mut self, path: &Path) -> Option<Value> {
        let contents = self.read(path)?;
        match serde_yaml::from_str::<Value>(&contents) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(file = ?path, error = %e, "skipping unparsable YAML file");
                None
            }
        }
    }

    /// `*.yml` / `*.yaml` directly in `dir`, and one level down for
    /// per-group or per-host directories.
    fn vars_dir(&mut self, dir: &Path, category: VarFileCategory) {
        for entry in self.list(dir) {
            if self.fs.is_dir(&entry) {
                for nested in self.list(&entry) {
                    if is_yaml(&nested) && self.fs.is_file(&nested) {
                        self.yaml_file(&nested, category);
                    }
                }
            } else if is_yaml(&entry) {
                self.yaml_file(&entry, category);
            }
        }
    }

    /// Top-level keys, `vars` keys and `all.vars` keys.
    fn yaml_file(&mut self, path: &Path, category: VarFileCategory) {
        let Some(Value::Mapping(doc)) = self.parse_yaml(path) else {
            return;
        };

        let mut names: Vec<String> = mapping_keys(&doc).collect();
        if let Some(Value::Mapping(vars)) = doc.get("vars") {
            names.extend(mapping_keys(vars));
        }
        if let Some(Value::Mapping(vars)) = doc.get("all").and_then(|all| all.get("vars")) {
            names.extend(mapping_keys(vars));
        }

        for name in names {
            self.record(name, category, path, None);
        }
    }

    /// Keys of each play's `vars` mapping.
    fn playbook_file(&mut self, path: &Path) {
        let Some(Value::Sequence(plays)) = self.parse_yaml(path) else {
            return;
        };

        let names: Vec<String> = plays
            .iter()
            .filter_map(|play| match play.get("vars") {
                Some(Value::Mapping(vars)) => Some(vars),
                _ => None,
            })
            .flat_map(mapping_keys)
            .collect();

        for name in names {
            self.record(name, VarFileCategory::Playbooks, path, None);
        }
    }

    /// `name = value` and `name: value` lines, skipping comments and
    /// `[section]` headers.
    fn ini_file(&mut self, path: &Path) {
        let Some(contents) = self.read(path) else {
            return;
        };

        let re = ini_assignment();
        for (i, line) in contents.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with(['#', ';', '[']) {
                continue;
            }
            if let Some(caps) = re.captures(line) {
                self.record(
                    caps[1].to_string(),
                    VarFileCategory::Inventory,
                    path,
                    Some(i + 1),
                );
            }
        }
    }

    fn record(&mut self, name: String, category: VarFileCategory, path: &Path, line: Option<usize>) {
        debug!(variable = %name, %category, file = ?path, "found variable definition");
        self.index.entry(name).or_default().insert(VariableHit {
            category,
            path: path.to_path_buf(),
            line,
        });
    }
}

/// `root/<name>`, `root/inventories/<name>` and `root/inventories/*/<name>`.
fn vars_dirs(fs: &dyn FileSystem, root: &Path, name: &str) -> Vec<PathBuf> {
    let inventories = root.join("inventories");
    let mut dirs = vec![root.join(name), inventories.join(name)];

    if fs.is_dir(&inventories) {
        let nested = fs.read_dir(&inventories).unwrap_or_default();
        dirs.extend(
            nested
                .into_iter()
                .filter(|d| fs.is_dir(d) && !d.ends_with(name))
                .map(|d| d.join(name)),
        );
    }

    dirs.retain(|d| fs.is_dir(d));
    dirs
}

fn inventory_files(fs: &dyn FileSystem, root: &Path) -> Vec<PathBuf> {
    const EXTENSIONS: [&str; 3] = ["ini", "yml", "yaml"];

    let mut files: Vec<PathBuf> = ["hosts", "inventory"]
        .iter()
        .flat_map(|stem| EXTENSIONS.iter().map(move |ext| root.join(format!("{stem}.{ext}"))))
        .collect();

    let inventories = root.join("inventories");
    if fs.is_dir(&inventories) {
        for dir in fs.read_dir(&inventories).unwrap_or_default() {
            if fs.is_dir(&dir) {
                files.extend(EXTENSIONS.iter().map(|ext| dir.join(format!("hosts.{ext}"))));
            }
        }
    }

    files.retain(|f| fs.is_file(f));
    files
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == "yml" || e == "yaml")
}

fn mapping_keys(mapping: &serde_yaml::Mapping) -> impl Iterator<Item = String> + '_ {
    mapping.keys().filter_map(|k| k.as_str().map(str::to_string))
}
