//! Dominator tree computation using the Lengauer-Tarjan algorithm.
//!
//! A node `d` **dominates** a node `n` if every path from the entry node to `n`
//! must pass through `d`. The **immediate dominator** of `n` is the unique node
//! that strictly dominates `n` but does not strictly dominate any other
//! dominator of `n`. Making each node's immediate dominator its parent forms the
//! dominator tree, rooted at the entry.
//!
//! Nodes that cannot be reached from the entry have no dominators at all. They
//! are reported by [`DominatorTree::is_reachable`] and never dominate, nor are
//! dominated by, any other node.
//!
//! # Algorithm
//!
//! Lengauer-Tarjan with path compression, O(V α(V)) where α is the inverse
//! Ackermann function.

use crate::utils::graph::{NodeId, Predecessors, RootedGraph, Successors};

const SENTINEL: NodeId = NodeId::new(usize::MAX);

/// Result of dominator tree computation.
///
/// # Examples
///
/// ```rust
/// use halfix::utils::graph::{algorithms::compute_dominators, DirectedGraph};
///
/// // entry -> a -> b
/// let mut graph: DirectedGraph<&str> = DirectedGraph::new();
/// let entry = graph.add_node("entry");
/// let a = graph.add_node("a");
/// let b = graph.add_node("b");
/// graph.add_edge(entry, a)?;
/// graph.add_edge(a, b)?;
///
/// let dom_tree = compute_dominators(&graph, entry);
/// assert!(dom_tree.dominates(entry, b));
/// assert_eq!(dom_tree.immediate_dominator(b), Some(a));
/// # Ok::<(), halfix::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct DominatorTree {
    entry: NodeId,
    /// Immediate dominator per node; `None` for the entry and unreachable nodes.
    idom: Vec<Option<NodeId>>,
    reachable: Vec<bool>,
}

impl DominatorTree {
    /// Returns the entry (root) node of the dominator tree.
    #[inline]
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns the number of nodes covered by the tree.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.idom.len()
    }

    /// Returns `true` if `node` is reachable from the entry.
    #[inline]
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.reachable.get(node.index()).copied().unwrap_or(false)
    }

    /// Returns the immediate dominator of a node, or `None` for the entry node
    /// and for unreachable nodes.
    #[inline]
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        self.idom.get(node.index()).copied().flatten()
    }

    /// Checks if node `a` dominates node `b`.
    ///
    /// A reachable node dominates itself. Unreachable nodes take part in no
    /// dominance relation.
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        self.dominators(b).any(|d| d == a)
    }

    /// Checks if node `a` strictly dominates node `b`.
    #[inline]
    #[must_use]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns an iterator over all dominators of a node, from the node itself
    /// up to (and including) the entry node.
    ///
    /// Yields nothing for an unreachable node.
    pub fn dominators(&self, node: NodeId) -> DominatorIterator<'_> {
        DominatorIterator {
            tree: self,
            current: self.is_reachable(node).then_some(node),
        }
    }

    /// Returns the depth of a node in the dominator tree.
    ///
    /// The entry node has depth 0; unreachable nodes have no depth.
    #[must_use]
    pub fn depth(&self, node: NodeId) -> Option<usize> {
        self.is_reachable(node)
            .then(|| self.dominators(node).count() - 1)
    }

    /// Returns all children of a node in the dominator tree.
    ///
    /// # Complexity
    ///
    /// O(V) where V is the number of nodes.
    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.idom
            .iter()
            .enumerate()
            .filter(|(_, idom)| **idom == Some(node))
            .map(|(i, _)| NodeId::new(i))
            .collect()
    }
}

/// Iterator over dominators of a node, from the node up to the entry.
pub struct DominatorIterator<'a> {
    tree: &'a DominatorTree,
    current: Option<NodeId>,
}

impl Iterator for DominatorIterator<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = self.tree.immediate_dominator(current);
        Some(current)
    }
}

/// Computes the dominator tree for a graph, starting at `entry`.
///
/// # Complexity
///
/// - Time: O((V + E) α(V))
/// - Space: O(V)
///
/// # Examples
///
/// ```rust
/// use halfix::utils::graph::{algorithms::compute_dominators, DirectedGraph};
///
/// // Diamond: entry -> {a, b} -> exit
/// let mut graph: DirectedGraph<()> = DirectedGraph::new();
/// let entry = graph.add_node(());
/// let a = graph.add_node(());
/// let b = graph.add_node(());
/// let exit = graph.add_node(());
/// graph.add_edge(entry, a)?;
/// graph.add_edge(entry, b)?;
/// graph.add_edge(a, exit)?;
/// graph.add_edge(b, exit)?;
///
/// let dom_tree = compute_dominators(&graph, entry);
/// assert!(!dom_tree.strictly_dominates(a, exit));
/// assert_eq!(dom_tree.immediate_dominator(exit), Some(entry));
/// # Ok::<(), halfix::Error>(())
/// ```
pub fn compute_dominators<G>(graph: &G, entry: NodeId) -> DominatorTree
where
    G: Successors + Predecessors,
{
    let node_count = graph.node_count();
    if entry.index() >= node_count {
        return DominatorTree {
            entry,
            idom: vec![None; node_count],
            reachable: vec![false; node_count],
        };
    }

    let mut lt = LengauerTarjan::new(node_count, entry);
    lt.compute(graph);

    let reachable: Vec<bool> = lt.dfnum.iter().map(|&n| n != 0).collect();
    let idom = lt
        .idom
        .iter()
        .enumerate()
        .map(|(i, &idom)| {
            (reachable[i] && NodeId::new(i) != entry && idom != SENTINEL).then_some(idom)
        })
        .collect();

    DominatorTree {
        entry,
        idom,
        reachable,
    }
}

/// Computes dominators for a [`RootedGraph`] from its own entry node.
pub fn compute_dominators_rooted<G>(graph: &G) -> DominatorTree
where
    G: RootedGraph,
{
    compute_dominators(graph, graph.entry())
}

/// Internal state for the Lengauer-Tarjan algorithm.
struct LengauerTarjan {
    entry: NodeId,
    /// DFS number for each node (0 = not visited)
    dfnum: Vec<usize>,
    /// Node with each DFS number (inverse of dfnum)
    vertex: Vec<NodeId>,
    /// Parent in DFS tree
    parent: Vec<NodeId>,
    /// Semidominator
    semi: Vec<NodeId>,
    idom: Vec<NodeId>,
    /// Ancestor in the forest for link-eval
    ancestor: Vec<NodeId>,
    /// Best node on path to ancestor (for path compression)
    best: Vec<NodeId>,
    /// Nodes whose semidominator is this node
    bucket: Vec<Vec<NodeId>>,
    dfs_counter: usize,
}

impl LengauerTarjan {
    fn new(n: usize, entry: NodeId) -> Self {
        Self {
            entry,
            dfnum: vec![0; n],
            vertex: vec![SENTINEL; n],
            parent: vec![SENTINEL; n],
            semi: (0..n).map(NodeId::new).collect(),
            idom: vec![SENTINEL; n],
            ancestor: vec![SENTINEL; n],
            best: (0..n).map(NodeId::new).collect(),
            bucket: vec![Vec::new(); n],
            dfs_counter: 0,
        }
    }

    fn compute<G: Successors + Predecessors>(&mut self, graph: &G) {
        self.dfs(graph, self.entry);

        // Reverse DFS order, entry excluded
        for i in (1..self.dfs_counter).rev() {
            let w = self.vertex[i];
            let parent_w = self.parent[w.index()];

            for v in graph.predecessors(w) {
                if self.dfnum[v.index()] == 0 {
                    continue;
                }
                let u = self.eval(v);
                if self.dfnum[self.semi[u.index()].index()]
                    < self.dfnum[self.semi[w.index()].index()]
                {
                    self.semi[w.index()] = self.semi[u.index()];
                }
            }

            let semi_w = self.semi[w.index()];
            self.bucket[semi_w.index()].push(w);
            self.ancestor[w.index()] = parent_w;

            let bucket = std::mem::take(&mut self.bucket[parent_w.index()]);
            for v in bucket {
                let u = self.eval(v);
                self.idom[v.index()] = if self.semi[u.index()] == self.semi[v.index()] {
                    parent_w
                } else {
                    u
                };
            }
        }

        for i in 1..self.dfs_counter {
            let w = self.vertex[i];
            if self.idom[w.index()] != self.semi[w.index()] {
                self.idom[w.index()] = self.idom[self.idom[w.index()].index()];
            }
        }

        self.idom[self.entry.index()] = self.entry;
    }

    /// Iterative DFS assigning preorder numbers and DFS-tree parents.
    fn dfs<G: Successors>(&mut self, graph: &G, start: NodeId) {
        let mut stack = vec![(start, SENTINEL)];

        while let Some((node, parent)) = stack.pop() {
            let idx = node.index();
            if self.dfnum[idx] != 0 {
                continue;
            }

            self.dfs_counter += 1;
            self.dfnum[idx] = self.dfs_counter;
            self.vertex[self.dfs_counter - 1] = node;
            self.parent[idx] = parent;

            for succ in graph.successors(node) {
                if self.dfnum[succ.index()] == 0 {
                    stack.push((succ, node));
                }
            }
        }
    }

    fn eval(&mut self, v: NodeId) -> NodeId {
        if self.ancestor[v.index()] == SENTINEL {
            return v;
        }
        self.compress(v);
        self.best[v.index()]
    }

    fn compress(&mut self, v: NodeId) {
        let ancestor_v = self.ancestor[v.index()];
        if self.ancestor[ancestor_v.index()] == SENTINEL {
            return;
        }

        self.compress(ancestor_v);

        let best_ancestor = self.best[ancestor_v.index()];
        let best_v = self.best[v.index()];
        if self.dfnum[self.semi[best_ancestor.index()].index()]
            < self.dfnum[self.semi[best_v.index()].index()]
        {
            self.best[v.index()] = best_ancestor;
        }

        self.ancestor[v.index()] = self.ancestor[ancestor_v.index()];
    }
}
