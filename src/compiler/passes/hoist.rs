//! Loop-invariant hoisting of allocations and command-stream operations.
//!
//! Front ends emit buffer allocation and command-buffer recording naively
//! inside loop bodies. Both kinds of operation have no loop-carried value
//! dependency by construction, so they are moved to the preheader of their
//! outermost enclosing loop without a data-invariance check.
//!
//! # Algorithm
//!
//! For each function, with a [`LoopAnalysis`] built up front:
//!
//! 1. Collect, in block layout order, every qualifying operation together with
//!    its hoist target (innermost loop → outermost ancestor → preheader).
//!    Operations outside loops, or whose outermost loop has no unique outside
//!    predecessor, are not collected and stay in place.
//! 2. Move each collected operation to immediately before the terminator of
//!    its target, in collected order.
//!
//! Allocations are hoisted first, then command-stream operations. Because
//! every move appends directly before the terminator, operations hoisted into
//! the same block keep their relative order.
//!
//! # Example
//!
//! ```text
//! // Before
//! bb0:                           bb1:
//!     jump bb1                       %buf = hal.allocator.allocate %a, %n
//!                                    %cb  = hal.command_buffer.create %dev
//!                                    hal.command_buffer.finalize %cb
//!                                    cond_br %c, bb1, bb2
//!
//! // After
//! bb0:                           bb1:
//!     %buf = hal.allocator.allocate %a, %n
//!     %cb  = hal.command_buffer.create %dev
//!     hal.command_buffer.finalize %cb
//!     jump bb1                       cond_br %c, bb1, bb2
//! ```
//!
//! Only preheaders that sit outside every loop are used as targets; a loop
//! whose preheader is the body of an earlier loop stays put. Running the
//! hoister a second time therefore finds nothing to move.

use crate::{
    analysis::LoopAnalysis,
    compiler::{EventKind, EventLog},
    ir::{BlockId, Function, Op, OpCode, OpId},
    Result,
};

/// A planned move of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hoist {
    op: OpId,
    from: BlockId,
    to: BlockId,
}

/// Hoists every allocation inside a loop to its outermost preheader.
///
/// # Returns
///
/// The number of operations moved.
///
/// # Errors
///
/// Returns an error if a target block has lost its terminator.
pub fn hoist_allocations(
    function: &mut Function,
    loops: &LoopAnalysis,
    events: &EventLog,
) -> Result<usize> {
    let plan = collect(function, loops, |op| op.opcode() == OpCode::AllocatorAllocate);
    apply(function, &plan, events)
}

/// Hoists every command-stream operation inside a loop to its outermost
/// preheader, preserving the relative order of the moved operations.
///
/// # Returns
///
/// The number of operations moved.
///
/// # Errors
///
/// Returns an error if a target block has lost its terminator.
pub fn hoist_command_ops(
    function: &mut Function,
    loops: &LoopAnalysis,
    events: &EventLog,
) -> Result<usize> {
    let plan = collect(function, loops, Op::is_command_stream);
    apply(function, &plan, events)
}

fn collect<F>(function: &Function, loops: &LoopAnalysis, qualifies: F) -> Vec<Hoist>
where
    F: Fn(&Op) -> bool,
{
    function
        .op_ids()
        .into_iter()
        .filter(|&id| function.op(id).is_some_and(&qualifies))
        .filter_map(|op| {
            let from = function.block_of(op)?;
            let to = loops.hoist_target(from)?;
            Some(Hoist { op, from, to })
        })
        .collect()
}

fn apply(function: &mut Function, plan: &[Hoist], events: &EventLog) -> Result<usize> {
    let name = function.name().to_string();

    for hoist in plan {
        function.move_before_terminator(hoist.op, hoist.to)?;

        let mnemonic = function.op(hoist.op).map_or("<erased>", Op::name);
        events
            .record(EventKind::OperationHoisted)
            .at(name.as_str(), hoist.op.index())
            .message(format!("{mnemonic} moved from {} to {}", hoist.from, hoist.to));
    }

    Ok(plan.len())
}
