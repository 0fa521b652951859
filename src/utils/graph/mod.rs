//! Directed graph infrastructure for control-flow analysis.
//!
//! # Key Components
//!
//! - [`NodeId`] - Strongly-typed node identifier
//! - [`DirectedGraph`] - Adjacency-list graph with node data
//! - [`GraphBase`], [`Successors`], [`Predecessors`], [`RootedGraph`] - Traits the
//!   algorithms are written against
//! - [`algorithms`] - Dominator tree computation

mod directed;
mod node;
mod traits;

pub mod algorithms;

pub use directed::DirectedGraph;
pub use node::NodeId;
pub use traits::{GraphBase, Predecessors, RootedGraph, Successors};
