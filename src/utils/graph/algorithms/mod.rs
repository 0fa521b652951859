//! Graph algorithms over the [`Successors`](crate::utils::graph::Successors) and
//! [`Predecessors`](crate::utils::graph::Predecessors) traits.

mod dominators;

pub use dominators::{
    compute_dominators, compute_dominators_rooted, DominatorIterator, DominatorTree,
};
