// src/watch/mod.rs

//! Changed-file to task matching.
//!
//! This module is responsible for:
//! - Compiling each task's `watch_patterns`.
//! - Matching changed paths against them, tolerating patterns written as a
//!   full relative path, a bare filename or a partial subpath.
//! - Flagging blank or invalid patterns.
//!
//! It does **not** know about the DAG; it only turns file changes into the
//! initial set of matched tasks.

pub mod path_utils;
pub mod patterns;

pub use patterns::{
    build_task_watch_profiles, match_changed_files, match_file, validate_watch_patterns,
    PatternWarning, PatternWarningReason, TaskWatchProfile, WatchPattern,
};
