//! Pass trait for module-level transformations.

use crate::{compiler::EventLog, ir::Module, Result};

/// A transformation over a whole [`Module`].
///
/// All passes must be thread-safe (Send + Sync) so a pipeline can be shared
/// between threads processing independent modules. Passes receive mutable
/// access to the module and record what they do into the shared event log.
///
/// # Pipeline Integration
///
/// Passes don't declare their own ordering. The
/// [`PassPipeline`](crate::compiler::PassPipeline) runs them once each, in the
/// order they were added.
pub trait ModulePass: Send + Sync {
    /// Returns the unique name of this pass.
    fn name(&self) -> &'static str;

    /// Returns whether this pass should run on the given module.
    ///
    /// Default implementation returns `true`.
    fn should_run(&self, _module: &Module) -> bool {
        true
    }

    /// Runs the pass.
    ///
    /// # Returns
    ///
    /// `true` if the module was changed.
    ///
    /// # Errors
    ///
    /// Returns an error if a structural invariant of the IR was violated while
    /// mutating it. The module may be partially transformed in that case.
    fn run(&self, module: &mut Module, events: &EventLog) -> Result<bool>;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
