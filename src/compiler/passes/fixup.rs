//! Loop hoisting followed by hazard-barrier insertion (`hal-fixup`).
//!
//! For every function with more than one block:
//!
//! 1. build the [`LoopAnalysis`];
//! 2. hoist allocations, then command-stream operations, to their outermost
//!    preheaders;
//! 3. scan the hoisted stream and insert execution barriers where bindings
//!    conflict.
//!
//! Pipeline-layout bindings are traced once per invocation, before any
//! function is touched. Neither hoisting nor barrier insertion moves global
//! stores or layout creation, so the table stays valid for every function.

use crate::{
    analysis::{LayoutBindings, LoopAnalysis},
    compiler::{
        pass::ModulePass,
        passes::{
            barriers::insert_barriers,
            hoist::{hoist_allocations, hoist_command_ops},
        },
        EventLog,
    },
    ir::{Function, Module},
    Result,
};

/// Hoists loop-invariant command recording and inserts hazard barriers.
pub struct FixupPass;

impl Default for FixupPass {
    fn default() -> Self {
        Self::new()
    }
}

impl FixupPass {
    /// Pass name used in pipelines and events.
    pub const NAME: &'static str = "hal-fixup";

    /// Creates a new fixup pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Runs hoisting and barrier insertion on a single function.
    ///
    /// Functions with one block or fewer are left alone.
    ///
    /// # Returns
    ///
    /// `true` if the function was changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the function's control-flow graph or block
    /// structure is malformed.
    pub fn run_on_function(
        function: &mut Function,
        layouts: &LayoutBindings,
        events: &EventLog,
    ) -> Result<bool> {
        if function.block_count() <= 1 {
            return Ok(false);
        }

        let loops = LoopAnalysis::new(function)?;
        let hoisted = hoist_allocations(function, &loops, events)?
            + hoist_command_ops(function, &loops, events)?;
        let tracker = insert_barriers(function, layouts, events)?;

        Ok(hoisted > 0 || !tracker.inserted_barriers().is_empty())
    }
}

impl ModulePass for FixupPass {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Hoists command recording out of loops and inserts hazard barriers"
    }

    fn should_run(&self, module: &Module) -> bool {
        module.functions.iter().any(|f| f.block_count() > 1)
    }

    fn run(&self, module: &mut Module, events: &EventLog) -> Result<bool> {
        let layouts = LayoutBindings::scan(module, events);

        let mut changed = false;
        for function in &mut module.functions {
            changed |= Self::run_on_function(function, &layouts, events)?;
        }
        Ok(changed)
    }
}
