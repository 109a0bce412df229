// src/watch/patterns.rs

use std::collections::BTreeSet;
use std::fmt;

use globset::{GlobBuilder, GlobMatcher};
use tracing::{debug, info, warn};

use crate::config::TaskSet;
use crate::types::TaskName;
use crate::watch::path_utils::{basename, normalize, segment_suffixes};

/// A single compiled watch pattern.
///
/// Globs follow shell-style semantics: `*` and `?` also match `/`, and
/// `[...]` is a character class. A pattern that fails to compile as a glob
/// still matches by exact path equality.
#[derive(Clone)]
pub struct WatchPattern {
    raw: String,
    normalized: String,
    glob: Option<GlobMatcher>,
}

impl fmt::Debug for WatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchPattern")
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

impl WatchPattern {
    pub fn new(raw: &str) -> Self {
        let normalized = normalize(raw);
        let glob = match compile_glob(&normalized) {
            Ok(m) => Some(m),
            Err(e) => {
                debug!(pattern = raw, error = %e, "watch pattern is not a valid glob, using exact match only");
                None
            }
        };

        Self {
            raw: raw.to_string(),
            normalized,
            glob,
        }
    }

    /// The pattern as the author wrote it.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Blank patterns never match anything.
    pub fn is_blank(&self) -> bool {
        self.raw.trim().is_empty()
    }

    /// Returns true if `path` (any separator style) matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        self.matches_normalized(&normalize(path))
    }

    /// Strategies, first success wins:
    ///
    /// 1. exact equality;
    /// 2. glob against the full path;
    /// 3. glob against the basename;
    /// 4. glob against every segment suffix of the path, and against the
    ///    basename of that suffix.
    fn matches_normalized(&self, path: &str) -> bool {
        if self.is_blank() {
            return false;
        }

        if path == self.normalized {
            return true;
        }

        let Some(glob) = &self.glob else {
            return false;
        };

        if glob.is_match(path) {
            return true;
        }

        if glob.is_match(basename(path)) {
            return true;
        }

        segment_suffixes(path).any(|suffix| glob.is_match(suffix) || glob.is_match(basename(suffix)))
    }
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    let glob = GlobBuilder::new(pattern).literal_separator(false).build()?;
    Ok(glob.compile_matcher())
}

/// Compiled watch patterns for a single task.
#[derive(Clone)]
pub struct TaskWatchProfile {
    name: TaskName,
    patterns: Vec<WatchPattern>,
}

impl fmt::Debug for TaskWatchProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskWatchProfile")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl TaskWatchProfile {
    pub fn new<N: Into<TaskName>>(name: N, patterns: &[String]) -> Self {
        Self {
            name: name.into(),
            patterns: patterns.iter().map(|p| WatchPattern::new(p)).collect(),
        }
    }

    /// Name of the task this profile belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn patterns(&self) -> &[WatchPattern] {
        &self.patterns
    }

    /// Returns true if any pattern of this task matches `path`.
    pub fn matches(&self, path: &str) -> bool {
        let path = normalize(path);
        self.matches_normalized(&path)
    }

    fn matches_normalized(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches_normalized(path))
    }
}

/// Build a compiled watch profile for each task, in declaration order.
pub fn build_task_watch_profiles(task_set: &TaskSet) -> Vec<TaskWatchProfile> {
    task_set
        .iter()
        .map(|t| TaskWatchProfile::new(t.name.clone(), &t.watch_patterns))
        .collect()
}

/// Returns true if `path` matches any of `patterns`.
pub fn match_file<P: AsRef<str>>(path: &str, patterns: &[P]) -> bool {
    let path = normalize(path);
    patterns
        .iter()
        .any(|p| WatchPattern::new(p.as_ref()).matches_normalized(&path))
}

/// All tasks with at least one pattern matching at least one changed path.
///
/// The result carries no ordering meaning; the resolver orders tasks later.
pub fn match_changed_files<S: AsRef<str>>(paths: &[S], task_set: &TaskSet) -> BTreeSet<TaskName> {
    let profiles = build_task_watch_profiles(task_set);
    let mut matched = BTreeSet::new();

    for path in paths {
        let normalized = normalize(path.as_ref());
        for profile in &profiles {
            if profile.matches_normalized(&normalized) {
                debug!(file = %normalized, task = profile.name(), "changed file matches task");
                matched.insert(profile.name().to_string());
            }
        }
    }

    info!(
        changed_files = paths.len(),
        matched_tasks = matched.len(),
        "matched changed files to tasks"
    );
    matched
}

/// Why a watch pattern is suspicious.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternWarningReason {
    /// Empty or whitespace-only; it will never match.
    Blank,
    /// Not a valid glob; only exact path equality applies.
    InvalidGlob(String),
}

/// Advisory finding about a single watch pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternWarning {
    pub task: TaskName,
    pub pattern: String,
    pub reason: PatternWarningReason,
}

impl fmt::Display for PatternWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            PatternWarningReason::Blank => {
                write!(f, "task '{}' has an empty watch pattern", self.task)
            }
            PatternWarningReason::InvalidGlob(err) => write!(
                f,
                "task '{}' has watch pattern '{}' that is not a valid glob ({err}); \
                 only exact paths will match",
                self.task, self.pattern
            ),
        }
    }
}

/// Check every watch pattern of every task.
pub fn validate_watch_patterns(task_set: &TaskSet) -> Vec<PatternWarning> {
    let mut warnings = Vec::new();

    for task in task_set {
        for pattern in &task.watch_patterns {
            let reason = if pattern.trim().is_empty() {
                Some(PatternWarningReason::Blank)
            } else {
                compile_glob(&normalize(pattern))
                    .err()
                    .map(|e| PatternWarningReason::InvalidGlob(e.to_string()))
            };

            if let Some(reason) = reason {
                let warning = PatternWarning {
                    task: task.name.clone(),
                    pattern: pattern.clone(),
                    reason,
                };
                warn!("{warning}");
                warnings.push(warning);
            }
        }
    }

    warnings
}
