//! Control-flow graph and loop analysis for IR functions.
//!
//! - [`ControlFlowGraph`] - Block graph of a function with lazy dominators
//! - [`detect_loops`] / [`LoopForest`] / [`LoopInfo`] - Natural-loop detection
//! - [`LoopAnalysis`] - Per-block innermost loop, outermost ancestor and hoist target

mod graph;
mod loops;

pub use graph::ControlFlowGraph;
pub use loops::{detect_loops, LoopAnalysis, LoopForest, LoopInfo};
