//! Foreign-key graph resolution and dependency ordering.

pub mod resolver;
pub mod topo;

pub use resolver::{
    expand_wildcards, resolve_referenced_tables, DependencyGraph, DependencyResolver,
};
pub use topo::{topological_sort, CyclePolicy};
