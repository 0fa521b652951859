//! Analyses consumed by the fixup passes.
//!
//! - [`cfg`] - Control-flow graph, dominators and loop nesting of a function
//! - [`bindings`] - Tracing pipeline layouts to their descriptor-set bindings
//!
//! Both analyses are read-only and rebuilt for every pass invocation; the
//! passes never keep them across mutations of the IR they were built from.

pub mod bindings;
pub mod cfg;

pub use bindings::{LayoutBindings, LayoutLookup};
pub use cfg::{ControlFlowGraph, LoopAnalysis, LoopForest, LoopInfo};
