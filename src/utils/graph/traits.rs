//! Trait definitions for graph abstractions.
//!
//! Graph algorithms in this crate are written against these traits rather than
//! a concrete graph type, so the dominator and loop analyses run unchanged on
//! [`DirectedGraph`](crate::utils::graph::DirectedGraph) and on anything else
//! that exposes adjacency.
//!
//! - [`GraphBase`] - Core properties: node count and node iteration
//! - [`Successors`] - Forward edge traversal (outgoing edges)
//! - [`Predecessors`] - Backward edge traversal (incoming edges)
//! - [`RootedGraph`] - Graphs with a designated entry node

use crate::utils::graph::NodeId;

/// Basic graph properties.
pub trait GraphBase {
    /// Returns the number of nodes.
    fn node_count(&self) -> usize;

    /// Iterates over all node ids.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Forward adjacency.
pub trait Successors: GraphBase {
    /// Iterates over the targets of `node`'s outgoing edges.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Backward adjacency.
pub trait Predecessors: GraphBase {
    /// Iterates over the sources of `node`'s incoming edges.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// A graph with a designated entry node.
pub trait RootedGraph: Successors + Predecessors {
    /// Returns the entry node.
    fn entry(&self) -> NodeId;
}
