//! # halfix Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the halfix library. Import this module to get quick access to the essential
//! types for building IR and running the fixup passes.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all halfix operations
pub use crate::Error;

/// The result type used throughout halfix
pub use crate::Result;

/// Run the default or a configured pipeline over a module
pub use crate::{run_fixup, run_fixup_with};

// ================================================================================================
// Intermediate Representation
// ================================================================================================

/// Compilation unit, functions and their building blocks
pub use crate::ir::{Block, BlockId, Function, Global, Module, OpId};

/// Operations and their attributes
pub use crate::ir::{
    BufferUsage, DescriptorFlags, DescriptorSetBinding, DescriptorType, ExecutionBarrierFlags,
    ExecutionStage, MemoryType, Op, OpCode, PushBinding,
};

/// SSA values and their types
pub use crate::ir::{Type, Value, ValueDef, ValueId};

/// Closure-based IR construction
pub use crate::ir::{BlockBuilder, FunctionBuilder, FunctionContext};

// ================================================================================================
// Analysis
// ================================================================================================

/// Loop nesting and hoist targets
pub use crate::analysis::{ControlFlowGraph, LoopAnalysis, LoopForest, LoopInfo};

/// Pipeline-layout binding resolution
pub use crate::analysis::{LayoutBindings, LayoutLookup};

// ================================================================================================
// Passes and Pipeline
// ================================================================================================

/// Pass trait, pipeline and configuration
pub use crate::compiler::{ModulePass, PassPipeline, PipelineConfig};

/// The fixup passes
pub use crate::compiler::{FixupPass, PreFixupPass};

/// Building blocks of the fixup passes
pub use crate::compiler::passes::{
    elide_scalar_barriers, hoist_allocations, hoist_command_ops, insert_barriers, AccessRecord,
    HazardTracker,
};

/// Event log and event types
pub use crate::compiler::{Event, EventKind, EventLog};
