// src/dag/mod.rs

//! Dependency graph and resolution.
//!
//! - [`graph`] builds the validated, acyclic task graph and answers
//!   ancestor, descendant and ordering queries.
//! - [`cycles`] enumerates every elementary cycle when construction fails.
//! - [`resolver`] turns matched tasks into an ordered execution plan.

pub mod cycles;
pub mod graph;
pub mod resolver;

pub use crate::errors::GraphError;
pub use cycles::elementary_cycles;
pub use graph::DependencyGraph;
pub use resolver::Resolver;
