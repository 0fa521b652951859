//! Pass infrastructure and the fixup passes.
//!
//! This module sits on top of [`crate::ir`] and [`crate::analysis`]:
//!
//! - [`crate::ir`] - Module, functions, operations and mutation primitives
//! - [`crate::analysis`] - Loop nesting and pipeline-layout bindings
//! - [`compiler`](self) - Passes that rewrite the IR in place
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Fixup Pipeline                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  PassPipeline                Ordered, run-once execution         │
//! │    ├─ hal-pre-fixup          (scalar optimization barriers)      │
//! │    └─ hal-fixup              (hoisting + hazard barriers)        │
//! │                                                                  │
//! │  ModulePass trait            Interface for all passes            │
//! │    ├─ should_run()           Cheap applicability check           │
//! │    └─ run()                  Whole-module transformation         │
//! │                                                                  │
//! │  hal-fixup, per function with more than one block:               │
//! │    ├─ LoopAnalysis           dominators, loop forest, preheaders │
//! │    ├─ hoist_allocations      allocations → outermost preheader   │
//! │    ├─ hoist_command_ops      recording → outermost preheader     │
//! │    └─ insert_barriers        greedy overlap scan                 │
//! │                                                                  │
//! │  EventLog                    Change tracking and diagnostics     │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod events;
mod pass;
mod pipeline;

pub mod passes;

pub use events::{Event, EventBuilder, EventKind, EventLog, EventLogIter};
pub use pass::ModulePass;
pub use passes::{FixupPass, PreFixupPass};
pub use pipeline::{PassPipeline, PipelineConfig};
