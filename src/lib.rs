// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # halfix
//!
//! Loop-invariant hoisting and hazard-driven barrier insertion for an intermediate
//! representation that records accelerator command buffers.
//!
//! Front ends that lower tensor programs to command-buffer recording tend to emit buffer
//! allocation and the whole create / bind / dispatch / finalize sequence inside loop bodies,
//! and leave synchronization between overlapping resource accesses to a later stage.
//! `halfix` is that later stage:
//!
//! - **`hal-pre-fixup`** removes optimization barriers that only carry `index` values
//! - **`hal-fixup`** moves allocations and command recording to the preheader of their
//!   outermost loop, then inserts execution barriers in front of every push-descriptor-set
//!   whose bindings conflict with an access still in flight on the same command buffer
//!
//! ## Quick Start
//!
//! ```rust
//! use halfix::prelude::*;
//!
//! let function = FunctionBuilder::new("record", &[Type::Device, Type::Integer(1)]).build_with(|f| {
//!     let device = f.arg(0);
//!     let cond = f.arg(1);
//!     f.block(0, |b| b.jump(1));
//!     f.block(1, |b| {
//!         let cb = b.command_buffer_create(device);
//!         b.finalize(cb);
//!         b.branch(cond, 1, 2);
//!     });
//!     f.block(2, |b| b.ret());
//! });
//!
//! let mut module = Module::new();
//! module.add_function(function);
//!
//! let events = halfix::run_fixup(&mut module)?;
//! assert_eq!(events.count_kind(EventKind::OperationHoisted), 2);
//! println!("{}", events.summary());
//! # Ok::<(), halfix::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - Module, functions, blocks, operations and their mutation primitives
//! - [`analysis`] - Control-flow graph, dominators, loop forest, layout bindings
//! - [`compiler`] - Pass trait, pipeline, event log and the fixup passes
//! - [`utils`] - Generic graph containers and algorithms
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Error Handling
//!
//! The passes are best-effort: missing preheaders, non-constant binding ranges and layouts
//! that cannot be traced are skipped, the latter with a warning event. Only structural damage
//! that makes an in-place mutation impossible surfaces as an [`Error`]:
//!
//! ```rust
//! use halfix::{ir::{Function, OpId}, Error};
//!
//! let mut function = Function::new("empty");
//! match function.erase(OpId::new(0)) {
//!     Err(Error::InvalidOperation(_)) => println!("nothing to erase"),
//!     Err(e) => println!("Other error: {}", e),
//!     Ok(_) => unreachable!(),
//! }
//! ```

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use halfix::prelude::*;
///
/// let mut module = Module::new();
/// let events = run_fixup(&mut module)?;
/// assert!(events.transformations().next().is_none());
/// # Ok::<(), halfix::Error>(())
/// ```
pub mod prelude;

/// Command-recording intermediate representation.
///
/// # Key Types
///
/// - [`ir::Module`] - Globals plus functions
/// - [`ir::Function`] - Blocks, operation arena, value table
/// - [`ir::Op`] - Tagged operation variants
/// - [`ir::FunctionBuilder`] - Closure-based construction for tests and tools
pub mod ir;

/// Analyses over the IR consumed by the passes.
///
/// - [`analysis::ControlFlowGraph`] - Block graph with lazily computed dominators
/// - [`analysis::LoopAnalysis`] - Innermost loop, outermost ancestor and hoist target per block
/// - [`analysis::LayoutBindings`] - Descriptor-set bindings per pipeline-layout global
pub mod analysis;

/// Passes, the pipeline that runs them, and the event log they report into.
pub mod compiler;

/// Generic utilities: directed graphs and dominator computation.
pub mod utils;

/// `halfix` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `halfix` Error type
///
/// The main error type for all operations in this crate. Covers structural violations found
/// while mutating the IR and unexpected operation shapes found while tracing value chains.
pub use error::Error;

use compiler::{EventLog, PassPipeline, PipelineConfig};

/// Runs the default pipeline (`hal-pre-fixup`, then `hal-fixup`) over `module`.
///
/// # Returns
///
/// The events recorded while the passes ran.
///
/// # Errors
///
/// Returns an error if a pass hits structurally malformed IR.
pub fn run_fixup(module: &mut ir::Module) -> Result<EventLog> {
    run_fixup_with(module, &PipelineConfig::default())
}

/// Runs the pipeline described by `config` over `module`.
///
/// # Errors
///
/// Returns an error if a pass hits structurally malformed IR.
pub fn run_fixup_with(module: &mut ir::Module, config: &PipelineConfig) -> Result<EventLog> {
    let events = EventLog::new();
    PassPipeline::from_config(config).run(module, &events)?;
    Ok(events)
}
