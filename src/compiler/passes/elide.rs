//! Scalar optimization-barrier elision (`hal-pre-fixup`).
//!
//! Front ends wrap index computations in `util.optimization_barrier` to keep
//! earlier canonicalization from folding them. Once lowering is done those
//! markers only obstruct constant matching, so barriers whose operands and
//! results are all of `index` type are removed: every result is replaced by the
//! operand at the same position and the barrier is erased.
//!
//! Barriers carrying any non-index value are kept; they may still be
//! protecting something.
//!
//! # Example
//!
//! ```text
//! // Before
//! %c64 = constant 64 : index
//! %0   = util.optimization_barrier %c64
//! %1   = util.optimization_barrier %0
//! use(%1)
//!
//! // After
//! %c64 = constant 64 : index
//! use(%c64)
//! ```

use crate::{
    compiler::{pass::ModulePass, EventKind, EventLog},
    ir::{Function, Module, Op, OpCode, OpId, Type},
    Result,
};

/// Removes optimization barriers over index values from the whole module.
pub struct PreFixupPass;

impl Default for PreFixupPass {
    fn default() -> Self {
        Self::new()
    }
}

impl PreFixupPass {
    /// Pass name used in pipelines and events.
    pub const NAME: &'static str = "hal-pre-fixup";

    /// Creates a new pre-fixup pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ModulePass for PreFixupPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Removes optimization barriers whose values are all of index type"
    }

    fn run(&self, module: &mut Module, events: &EventLog) -> Result<bool> {
        Ok(elide_scalar_barriers(module, events)? > 0)
    }
}

/// Returns `true` if `op` is an optimization barrier over index values only.
fn is_scalar_barrier(function: &Function, op: &Op) -> bool {
    let Op::OptimizationBarrier { dests, operands } = op else {
        return false;
    };
    dests
        .iter()
        .chain(operands)
        .all(|&value| function.value_type(value).is_some_and(Type::is_index))
}

/// Elides every scalar optimization barrier in `module`.
///
/// All qualifying barriers are collected before any is removed. Chains of
/// barriers collapse onto the root operand.
///
/// # Returns
///
/// The number of barriers erased.
///
/// # Errors
///
/// Returns an error if a collected barrier was erased by someone else in the
/// meantime.
pub fn elide_scalar_barriers(module: &mut Module, events: &EventLog) -> Result<usize> {
    let collected: Vec<(usize, OpId)> = module
        .functions
        .iter()
        .enumerate()
        .flat_map(|(index, function)| {
            function
                .find_ops(OpCode::OptimizationBarrier)
                .into_iter()
                .filter(move |&id| {
                    function
                        .op(id)
                        .is_some_and(|op| is_scalar_barrier(function, op))
                })
                .map(move |id| (index, id))
        })
        .collect();

    for &(index, id) in &collected {
        let function = &mut module.functions[index];
        let Some(Op::OptimizationBarrier { dests, operands }) = function.op(id).cloned() else {
            continue;
        };

        for (&from, &to) in dests.iter().zip(&operands) {
            function.replace_all_uses(from, to);
        }
        function.erase(id)?;

        events
            .record(EventKind::BarrierElided)
            .at(function.name(), id.index())
            .message(format!("forwarded {} value(s)", dests.len()));
    }

    Ok(collected.len())
}
