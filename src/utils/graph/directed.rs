//! Adjacency-list directed graph.
//!
//! [`DirectedGraph`] stores node data in a vector and keeps both outgoing and
//! incoming adjacency lists, so successor and predecessor queries are O(degree).
//! Parallel edges are allowed; callers that need a simple graph check
//! [`DirectedGraph::contains_edge`] first.

use crate::{
    utils::graph::{GraphBase, NodeId, Predecessors, Successors},
    Error, Result,
};

/// A directed graph with typed node data.
///
/// # Thread Safety
///
/// `DirectedGraph<N>` is [`Send`] and [`Sync`] when `N` is. Build it
/// single-threaded, then query it immutably.
///
/// # Examples
///
/// ```rust
/// use halfix::utils::graph::{DirectedGraph, Successors};
///
/// let mut graph: DirectedGraph<&str> = DirectedGraph::new();
/// let a = graph.add_node("A");
/// let b = graph.add_node("B");
/// graph.add_edge(a, b)?;
///
/// assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![b]);
/// # Ok::<(), halfix::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct DirectedGraph<N> {
    nodes: Vec<N>,
    outgoing: Vec<Vec<NodeId>>,
    incoming: Vec<Vec<NodeId>>,
    edge_count: usize,
}

impl<N> Default for DirectedGraph<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> DirectedGraph<N> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty graph with room for `node_capacity` nodes.
    #[must_use]
    pub fn with_capacity(node_capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(node_capacity),
            outgoing: Vec::with_capacity(node_capacity),
            incoming: Vec::with_capacity(node_capacity),
            edge_count: 0,
        }
    }

    /// Adds a node and returns its id.
    pub fn add_node(&mut self, data: N) -> NodeId {
        self.nodes.push(data);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        NodeId::new(self.nodes.len() - 1)
    }

    /// Adds an edge from `source` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if either node does not exist.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId) -> Result<()> {
        for (role, node) in [("source", source), ("target", target)] {
            if node.index() >= self.nodes.len() {
                return Err(Error::GraphError(format!(
                    "{role} node {node} does not exist in graph with {} nodes",
                    self.nodes.len()
                )));
            }
        }

        self.outgoing[source.index()].push(target);
        self.incoming[target.index()].push(source);
        self.edge_count += 1;
        Ok(())
    }

    /// Returns the data of `node`.
    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&N> {
        self.nodes.get(node.index())
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Returns `true` if an edge `source -> target` exists.
    #[must_use]
    pub fn contains_edge(&self, source: NodeId, target: NodeId) -> bool {
        self.outgoing
            .get(source.index())
            .is_some_and(|targets| targets.contains(&target))
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<N> GraphBase for DirectedGraph<N> {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId::new)
    }
}

impl<N> Successors for DirectedGraph<N> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.outgoing[node.index()].iter().copied()
    }
}

impl<N> Predecessors for DirectedGraph<N> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.incoming[node.index()].iter().copied()
    }
}
