// src/config/mod.rs

//! Task data model, validation and loading.
//!
//! Responsibilities:
//! - Define the raw record shape and the validated `Task` / `TaskSet` (`model.rs`).
//! - Validate structural and referential invariants (`validate.rs`).
//! - Load a task document from disk, optionally memoized (`loader.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    load_and_validate, load_and_validate_with, load_from_path, parse_document, DocumentFormat,
    LoadedTasks, MemoizingLoader,
};
pub use model::{PlannerConfig, RawTask, RawTaskDocument, Task, TaskSet};
pub use validate::{looks_like_variable_reference, validate_tasks};
