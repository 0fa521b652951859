//! Natural-loop analysis and hoist-target queries.
//!
//! # Loop Structure
//!
//! ```text
//!     [preheader]     <- Unique predecessor of the header outside the loop
//!          |
//!          v
//!     [header] <------+  <- Single entry point, dominates all loop nodes
//!          |          |
//!     [body ...]      |
//!          |          |
//!     [latch] --------+  <- Back edge source(s)
//! ```
//!
//! [`detect_loops`] works on any graph implementing `GraphBase`, `Successors`
//! and `Predecessors`. [`LoopAnalysis`] bundles the control-flow graph of a
//! [`Function`] with its loop forest and answers the question the hoister asks
//! for every block: where, if anywhere, may loop-invariant work move to?

use std::collections::{HashMap, HashSet};

use crate::{
    analysis::cfg::ControlFlowGraph,
    ir::{BlockId, Function},
    utils::graph::{algorithms::DominatorTree, GraphBase, NodeId, Predecessors, Successors},
    Result,
};

/// A natural loop.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    /// The header block (single entry point, dominates all loop nodes).
    pub header: NodeId,

    /// All blocks in the loop body (including header).
    pub body: HashSet<NodeId>,

    /// Back edge sources (blocks that jump to the header from within the loop).
    pub latches: Vec<NodeId>,

    /// The unique predecessor of the header outside the loop.
    /// `None` if the header has zero or several distinct such predecessors.
    pub preheader: Option<NodeId>,

    /// Loop nesting depth (0 = outermost).
    pub depth: usize,

    /// Parent loop header, if this loop is nested.
    pub parent: Option<NodeId>,

    /// Immediate child loop headers.
    pub children: Vec<NodeId>,
}

impl LoopInfo {
    /// Creates a new `LoopInfo` with the given header.
    #[must_use]
    pub fn new(header: NodeId) -> Self {
        let mut body = HashSet::new();
        body.insert(header);
        Self {
            header,
            body,
            latches: Vec::new(),
            preheader: None,
            depth: 0,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Returns true if this loop contains the given block.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.body.contains(&node)
    }

    /// Returns the number of blocks in the loop.
    #[must_use]
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Returns true if the loop has a preheader.
    #[must_use]
    pub fn has_preheader(&self) -> bool {
        self.preheader.is_some()
    }

    /// Returns true if this is an innermost loop (no children).
    #[must_use]
    pub fn is_innermost(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns true if this is an outermost loop (no parent).
    #[must_use]
    pub fn is_outermost(&self) -> bool {
        self.parent.is_none()
    }
}

/// Loop forest containing all loops in a function.
#[derive(Debug, Clone)]
pub struct LoopForest {
    /// All loops, ordered by header.
    loops: Vec<LoopInfo>,
    /// Map from block to the innermost loop containing it.
    block_to_loop: Vec<Option<usize>>,
}

impl LoopForest {
    /// Creates an empty loop forest.
    #[must_use]
    pub fn new(block_count: usize) -> Self {
        Self {
            loops: Vec::new(),
            block_to_loop: vec![None; block_count],
        }
    }

    /// Adds a loop to the forest.
    pub fn add_loop(&mut self, loop_info: LoopInfo) {
        let loop_idx = self.loops.len();

        for &block in &loop_info.body {
            let Some(slot) = self.block_to_loop.get_mut(block.index()) else {
                continue;
            };
            // Only update if this is a more deeply nested loop
            match *slot {
                Some(existing) if self.loops[existing].depth >= loop_info.depth => {}
                _ => *slot = Some(loop_idx),
            }
        }

        self.loops.push(loop_info);
    }

    /// Returns all loops in the forest.
    #[must_use]
    pub fn loops(&self) -> &[LoopInfo] {
        &self.loops
    }

    /// Returns the number of loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    /// Returns true if there are no loops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Returns the innermost loop containing the given block.
    #[must_use]
    pub fn innermost_loop(&self, block: NodeId) -> Option<&LoopInfo> {
        self.block_to_loop
            .get(block.index())
            .copied()
            .flatten()
            .map(|idx| &self.loops[idx])
    }

    /// Returns the loop with the given header.
    #[must_use]
    pub fn loop_for_header(&self, header: NodeId) -> Option<&LoopInfo> {
        self.loops.iter().find(|l| l.header == header)
    }

    /// Returns the outermost loop enclosing `loop_info` (itself if it has no parent).
    #[must_use]
    pub fn outermost<'a>(&'a self, loop_info: &'a LoopInfo) -> &'a LoopInfo {
        let mut current = loop_info;
        while let Some(parent) = current.parent.and_then(|h| self.loop_for_header(h)) {
            current = parent;
        }
        current
    }

    /// Returns the loop depth for a block (0 if not in any loop).
    #[must_use]
    pub fn loop_depth(&self, block: NodeId) -> usize {
        self.innermost_loop(block).map_or(0, |l| l.depth + 1)
    }

    /// Returns true if a block is in any loop.
    #[must_use]
    pub fn is_in_loop(&self, block: NodeId) -> bool {
        self.innermost_loop(block).is_some()
    }

    /// Iterates over all loops in the forest.
    pub fn iter(&self) -> impl Iterator<Item = &LoopInfo> {
        self.loops.iter()
    }
}

/// Detects all natural loops in a graph using dominance-based back edge detection.
///
/// # Algorithm
///
/// 1. Finds back edges using dominance (n → h where h dominates n)
/// 2. For each back edge, computes the natural loop body
/// 3. Computes preheaders
/// 4. Establishes nesting relationships
///
/// Blocks unreachable from the entry never belong to a loop.
#[must_use]
pub fn detect_loops<G>(graph: &G, dominators: &DominatorTree) -> LoopForest
where
    G: GraphBase + Successors + Predecessors,
{
    let mut forest = LoopForest::new(graph.node_count());
    let mut loops_by_header: HashMap<NodeId, LoopInfo> = HashMap::new();

    for node in graph.node_ids() {
        if !dominators.is_reachable(node) {
            continue;
        }
        for succ in graph.successors(node) {
            if dominators.dominates(succ, node) {
                let loop_info = loops_by_header
                    .entry(succ)
                    .or_insert_with(|| LoopInfo::new(succ));

                loop_info.latches.push(node);
                expand_loop_body(graph, dominators, loop_info, node);
            }
        }
    }

    for loop_info in loops_by_header.values_mut() {
        compute_preheader(graph, loop_info);
    }

    let mut loops: Vec<LoopInfo> = loops_by_header.into_values().collect();
    compute_nesting(&mut loops);

    // Deterministic ordering
    loops.sort_by_key(|l| l.header.index());

    for loop_info in loops {
        forest.add_loop(loop_info);
    }

    forest
}

/// Expands the loop body to include all reachable nodes that reach the latch
/// without passing through the header.
fn expand_loop_body<G>(graph: &G, dominators: &DominatorTree, loop_info: &mut LoopInfo, latch: NodeId)
where
    G: Predecessors,
{
    if loop_info.body.contains(&latch) {
        return;
    }

    let mut worklist = vec![latch];

    while let Some(node) = worklist.pop() {
        if loop_info.body.insert(node) {
            for pred in graph.predecessors(node) {
                if pred != loop_info.header
                    && !loop_info.body.contains(&pred)
                    && dominators.is_reachable(pred)
                {
                    worklist.push(pred);
                }
            }
        }
    }
}

/// Identifies the unique predecessor of the header outside the loop.
fn compute_preheader<G>(graph: &G, loop_info: &mut LoopInfo)
where
    G: Predecessors,
{
    let mut outside: Option<NodeId> = None;

    for pred in graph.predecessors(loop_info.header) {
        if loop_info.body.contains(&pred) {
            continue;
        }
        match outside {
            Some(existing) if existing != pred => {
                loop_info.preheader = None;
                return;
            }
            _ => outside = Some(pred),
        }
    }

    loop_info.preheader = outside;
}

/// Computes loop nesting relationships and depths.
fn compute_nesting(loops: &mut [LoopInfo]) {
    let n = loops.len();

    let header_to_idx: HashMap<NodeId, usize> = loops
        .iter()
        .enumerate()
        .map(|(i, l)| (l.header, i))
        .collect();

    // Parent is the smallest other loop containing this loop's header
    for i in 0..n {
        let header = loops[i].header;
        loops[i].parent = (0..n)
            .filter(|&j| j != i && loops[j].body.contains(&header))
            .min_by_key(|&j| loops[j].size())
            .map(|j| loops[j].header);
    }

    for i in 0..n {
        if let Some(&parent_idx) = loops[i].parent.and_then(|p| header_to_idx.get(&p)) {
            let child = loops[i].header;
            loops[parent_idx].children.push(child);
        }
    }

    for i in 0..n {
        let mut depth = 0;
        let mut current = loops[i].parent;
        while let Some(parent_header) = current {
            depth += 1;
            current = header_to_idx
                .get(&parent_header)
                .and_then(|&idx| loops[idx].parent);
        }
        loops[i].depth = depth;
    }
}

/// Loop queries over a function, built once per function.
///
/// Answers, for any block, its innermost loop, that loop's outermost ancestor,
/// and the outermost loop's preheader: the block loop-invariant work is
/// hoisted into.
///
/// # Examples
///
/// ```rust
/// use halfix::analysis::cfg::LoopAnalysis;
/// use halfix::ir::{BlockId, FunctionBuilder, Type};
///
/// // bb0 -> bb1 <-> bb2, bb1 -> bb3
/// let function = FunctionBuilder::new("f", &[Type::Integer(1)]).build_with(|f| {
///     let cond = f.arg(0);
///     f.block(0, |b| b.jump(1));
///     f.block(1, |b| b.branch(cond, 2, 3));
///     f.block(2, |b| b.jump(1));
///     f.block(3, |b| b.ret());
/// });
///
/// let analysis = LoopAnalysis::new(&function)?;
/// assert_eq!(analysis.hoist_target(BlockId::new(2)), Some(BlockId::new(0)));
/// assert_eq!(analysis.hoist_target(BlockId::new(3)), None);
/// # Ok::<(), halfix::Error>(())
/// ```
#[derive(Debug)]
pub struct LoopAnalysis {
    cfg: ControlFlowGraph,
    forest: LoopForest,
}

impl LoopAnalysis {
    /// Builds the control-flow graph, dominators and loop forest of `function`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] if a terminator names an unknown block.
    pub fn new(function: &Function) -> Result<Self> {
        let cfg = ControlFlowGraph::from_function(function)?;
        let forest = detect_loops(&cfg, cfg.dominators());
        Ok(Self { cfg, forest })
    }

    /// Returns the control-flow graph.
    #[must_use]
    pub fn cfg(&self) -> &ControlFlowGraph {
        &self.cfg
    }

    /// Returns the loop forest.
    #[must_use]
    pub fn forest(&self) -> &LoopForest {
        &self.forest
    }

    /// Returns the innermost loop containing `block`.
    #[must_use]
    pub fn innermost_loop(&self, block: BlockId) -> Option<&LoopInfo> {
        self.forest.innermost_loop(NodeId::new(block.index()))
    }

    /// Returns the outermost ancestor of `loop_info`.
    #[must_use]
    pub fn outermost<'a>(&'a self, loop_info: &'a LoopInfo) -> &'a LoopInfo {
        self.forest.outermost(loop_info)
    }

    /// Returns the block loop-invariant work in `block` may be hoisted into.
    ///
    /// `None` if `block` is in no loop, its outermost loop has no unique
    /// outside predecessor, or that predecessor is itself inside a loop.
    #[must_use]
    pub fn hoist_target(&self, block: BlockId) -> Option<BlockId> {
        let innermost = self.innermost_loop(block)?;
        let preheader = self.outermost(innermost).preheader?;
        if self.forest.is_in_loop(preheader) {
            return None;
        }
        self.cfg.block(preheader)
    }
}
