// src/config/loader.rs

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use serde_yaml::Value;
use tracing::debug;

use crate::config::model::{PlannerConfig, RawTask, RawTaskDocument, TaskSet};
use crate::config::validate::validate_tasks;
use crate::errors::{DeployDagError, Result, SchemaError, SchemaIssue};
use crate::fs::FileSystem;

/// Serialisation format of a task document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Toml,
    Yaml,
}

impl DocumentFormat {
    /// Pick the format from the file extension (`.toml`, `.yml`, `.yaml`).
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Some(DocumentFormat::Toml),
            Some("yml") | Some("yaml") => Some(DocumentFormat::Yaml),
            _ => None,
        }
    }
}

/// A validated task document.
#[derive(Debug, Clone)]
pub struct LoadedTasks {
    pub config: PlannerConfig,
    pub tasks: TaskSet,
}

/// Parse a task document without validating it.
///
/// Both formats are normalised to a YAML value first, then each task record
/// is deserialised on its own so that one malformed record is reported with
/// its index instead of failing the whole document with an opaque message.
pub fn parse_document(contents: &str, format: DocumentFormat) -> Result<RawTaskDocument> {
    let value: Value = match format {
        DocumentFormat::Toml => {
            let table: toml::Table = toml::from_str(contents)?;
            serde_yaml::to_value(table)?
        }
        DocumentFormat::Yaml => serde_yaml::from_str(contents)?,
    };

    document_from_value(value)
}

fn document_from_value(value: Value) -> Result<RawTaskDocument> {
    let mut root = match value {
        Value::Mapping(m) => m,
        Value::Null => return Ok(RawTaskDocument::default()),
        _ => {
            return Err(DeployDagError::Other(anyhow!(
                "task document root must be a mapping"
            )));
        }
    };

    let config = match root.remove("config") {
        Some(v) => serde_yaml::from_value::<PlannerConfig>(v)?,
        None => PlannerConfig::default(),
    };

    let records = match root.remove("tasks").or_else(|| root.remove("task")) {
        Some(Value::Sequence(seq)) => seq,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(DeployDagError::Other(anyhow!(
                "'tasks' must be a list of task records"
            )));
        }
    };

    let mut tasks = Vec::with_capacity(records.len());
    let mut issues = Vec::new();
    for (index, record) in records.into_iter().enumerate() {
        match serde_yaml::from_value::<RawTask>(record) {
            Ok(task) => tasks.push(task),
            Err(e) => issues.push(SchemaIssue::Malformed {
                index,
                reason: e.to_string(),
            }),
        }
    }

    if !issues.is_empty() {
        return Err(SchemaError::new(issues).into());
    }

    Ok(RawTaskDocument { config, tasks })
}

fn format_for(path: &Path) -> Result<DocumentFormat> {
    DocumentFormat::from_path(path).ok_or_else(|| {
        DeployDagError::Other(anyhow!(
            "unsupported task document {:?}: expected a .toml, .yml or .yaml file",
            path
        ))
    })
}

/// Load a task document from a given path and return the raw records.
///
/// This only performs deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawTaskDocument> {
    let path = path.as_ref();
    let format = format_for(path)?;
    let contents = fs::read_to_string(path)?;
    parse_document(&contents, format)
}

/// Load a task document from path and validate it into a [`TaskSet`].
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<LoadedTasks> {
    let document = load_from_path(path)?;
    let tasks = validate_tasks(&document.tasks)?;
    Ok(LoadedTasks {
        config: document.config,
        tasks,
    })
}

/// Like [`load_and_validate`], reading through a [`FileSystem`].
pub fn load_and_validate_with<F: FileSystem + ?Sized>(
    fs: &F,
    path: impl AsRef<Path>,
) -> Result<LoadedTasks> {
    let path = path.as_ref();
    let format = format_for(path)?;
    let contents = fs.read_to_string(path)?;
    let document = parse_document(&contents, format)?;
    let tasks = validate_tasks(&document.tasks)?;
    Ok(LoadedTasks {
        config: document.config,
        tasks,
    })
}

#[derive(Debug, Clone)]
struct CachedDocument {
    digest: blake3::Hash,
    document: RawTaskDocument,
}

/// Loader that keeps parsed documents across runs.
///
/// Entries are keyed by path and invalidated by a blake3 digest of the file
/// contents, so an unchanged document is never parsed twice. The cache lives
/// here and not in the graph or resolver types; callers that want no
/// caching just use [`load_from_path`].
#[derive(Debug)]
pub struct MemoizingLoader<F: FileSystem> {
    fs: F,
    cache: HashMap<PathBuf, CachedDocument>,
    hits: usize,
    misses: usize,
}

impl<F: FileSystem> MemoizingLoader<F> {
    pub fn new(fs: F) -> Self {
        Self {
            fs,
            cache: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Load (or reuse) the raw document at `path`.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<RawTaskDocument> {
        let path = path.as_ref();
        let format = format_for(path)?;
        let contents = self.fs.read_to_string(path)?;
        let digest = blake3::hash(contents.as_bytes());

        if let Some(cached) = self.cache.get(path) {
            if cached.digest == digest {
                self.hits += 1;
                debug!(path = ?path, "task document unchanged, reusing parsed copy");
                return Ok(cached.document.clone());
            }
        }

        self.misses += 1;
        let document = parse_document(&contents, format)?;
        debug!(path = ?path, digest = %digest.to_hex(), "parsed task document");
        self.cache.insert(
            path.to_path_buf(),
            CachedDocument {
                digest,
                document: document.clone(),
            },
        );
        Ok(document)
    }

    /// Load (or reuse) and validate the document at `path`.
    pub fn load_and_validate(&mut self, path: impl AsRef<Path>) -> Result<LoadedTasks> {
        let document = self.load(path)?;
        let tasks = validate_tasks(&document.tasks)?;
        Ok(LoadedTasks {
            config: document.config,
            tasks,
        })
    }

    /// Drop the cached copy of `path`, if any.
    pub fn invalidate(&mut self, path: impl AsRef<Path>) {
        self.cache.remove(path.as_ref());
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}
