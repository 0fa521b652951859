//! Control-flow graph of a [`Function`].
//!
//! [`ControlFlowGraph`] mirrors the block structure of a function as a
//! [`DirectedGraph`] whose node index equals the block index. Edges come from
//! each block's terminator; a terminator naming the same successor twice yields
//! a single edge. The dominator tree is computed lazily on first use.

use std::sync::OnceLock;

use crate::{
    ir::{BlockId, Function},
    utils::graph::{
        algorithms::{self, DominatorTree},
        DirectedGraph, GraphBase, NodeId, Predecessors, RootedGraph, Successors,
    },
    Result,
};

/// Control-flow graph with lazily computed dominators.
///
/// # Examples
///
/// ```rust
/// use halfix::analysis::cfg::ControlFlowGraph;
/// use halfix::ir::{BlockId, FunctionBuilder};
/// use halfix::utils::graph::NodeId;
///
/// let function = FunctionBuilder::new("f", &[]).build_with(|f| {
///     f.block(0, |b| b.jump(1));
///     f.block(1, |b| b.ret());
/// });
///
/// let cfg = ControlFlowGraph::from_function(&function)?;
/// assert_eq!(cfg.block_count(), 2);
/// assert!(cfg.dominates(NodeId::new(0), NodeId::new(1)));
/// assert_eq!(cfg.block(NodeId::new(1)), Some(BlockId::new(1)));
/// # Ok::<(), halfix::Error>(())
/// ```
#[derive(Debug)]
pub struct ControlFlowGraph {
    graph: DirectedGraph<BlockId>,
    dominators: OnceLock<DominatorTree>,
}

impl ControlFlowGraph {
    /// Builds the control-flow graph of `function`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] if a terminator names a block that
    /// does not exist.
    pub fn from_function(function: &Function) -> Result<Self> {
        let mut graph = DirectedGraph::with_capacity(function.block_count());
        for block in function.block_ids() {
            graph.add_node(block);
        }

        for block in function.block_ids() {
            let source = NodeId::new(block.index());
            for successor in function.successors(block) {
                let target = NodeId::new(successor.index());
                if !graph.contains_edge(source, target) {
                    graph.add_edge(source, target)?;
                }
            }
        }

        Ok(Self {
            graph,
            dominators: OnceLock::new(),
        })
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the block represented by `node`.
    #[must_use]
    pub fn block(&self, node: NodeId) -> Option<BlockId> {
        self.graph.node(node).copied()
    }

    /// Returns the dominator tree, computing it on first access.
    pub fn dominators(&self) -> &DominatorTree {
        self.dominators
            .get_or_init(|| algorithms::compute_dominators_rooted(self))
    }

    /// Returns `true` if `dominator` dominates `dominated`.
    #[must_use]
    pub fn dominates(&self, dominator: NodeId, dominated: NodeId) -> bool {
        self.dominators().dominates(dominator, dominated)
    }

    /// Returns the underlying graph.
    #[must_use]
    pub fn graph(&self) -> &DirectedGraph<BlockId> {
        &self.graph
    }
}

impl GraphBase for ControlFlowGraph {
    fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.graph.node_ids()
    }
}

impl Successors for ControlFlowGraph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.graph.successors(node)
    }
}

impl Predecessors for ControlFlowGraph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.graph.predecessors(node)
    }
}

impl RootedGraph for ControlFlowGraph {
    fn entry(&self) -> NodeId {
        NodeId::new(0)
    }
}
