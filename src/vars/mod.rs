// src/vars/mod.rs

//! Variable producer analysis.
//!
//! Two passes over a task set:
//! - pass 1 ([`VariableProducerIndex::build`]) maps every variable to what
//!   can produce it: known variables, tasks and definition files found by a
//!   [`VariableSearch`];
//! - pass 2 ([`VariableProducerIndex::analyze`]) turns variable usage into
//!   task-level dependencies and reports variables nobody produces.

pub mod analyzer;
pub mod producers;
pub mod search;

pub use analyzer::{analyze_variables, MissingVariable, VariableAnalysis, VariableProducerIndex};
pub use producers::{is_variable_name, KnownVariables, VariableProducer};
pub use search::{
    FsVariableSearcher, VarFileCategory, VariableHit, VariableSearch, DEFAULT_MAX_SEARCH_FILES,
};
