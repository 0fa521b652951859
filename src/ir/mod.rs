//! Command-recording intermediate representation.
//!
//! A [`Module`] holds globals and [`Function`]s. Each function is a control-flow
//! graph of [`Block`]s whose operations ([`Op`]) live in an arena addressed by
//! [`OpId`]; SSA values are addressed by [`ValueId`] and typed by [`Type`].
//!
//! # Key Components
//!
//! - [`Op`] / [`OpCode`] - Operation variants and their discriminant
//! - [`Function`] - Blocks, operation arena, value table and mutation primitives
//! - [`Module`] / [`Global`] - Compilation unit
//! - [`FunctionBuilder`] - Closure-based construction
//!
//! # Example
//!
//! ```rust
//! use halfix::ir::{FunctionBuilder, Module, OpCode, Type};
//!
//! let function = FunctionBuilder::new("record", &[Type::Device]).build_with(|f| {
//!     let device = f.arg(0);
//!     f.block(0, |b| {
//!         let cb = b.command_buffer_create(device);
//!         b.finalize(cb);
//!         b.ret();
//!     });
//! });
//!
//! let mut module = Module::new();
//! module.add_function(function);
//! assert_eq!(module.functions[0].find_ops(OpCode::CommandBufferCreate).len(), 1);
//! ```

mod block;
mod builder;
mod function;
mod module;
mod ops;
mod types;
mod value;

pub use block::{Block, BlockId, OpId};
pub use builder::{BlockBuilder, FunctionBuilder, FunctionContext};
pub use function::Function;
pub use module::{Global, Module};
pub use ops::{
    BufferUsage, DescriptorFlags, DescriptorSetBinding, DescriptorType, ExecutionBarrierFlags,
    ExecutionStage, MemoryType, Op, OpCode, PushBinding,
};
pub use types::Type;
pub use value::{Value, ValueDef, ValueId};
