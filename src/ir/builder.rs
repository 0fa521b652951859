//! Builder pattern for programmatic IR construction.
//!
//! The builder uses a closure-based API where all blocks are defined within a
//! single expression, making the CFG structure visually clear:
//!
//! ```rust
//! use halfix::ir::{FunctionBuilder, Type};
//!
//! let function = FunctionBuilder::new("loop", &[Type::Integer(1)]).build_with(|f| {
//!     let cond = f.arg(0);
//!
//!     f.block(0, |b| b.jump(1));
//!     f.block(1, |b| b.branch(cond, 1, 2));
//!     f.block(2, |b| b.ret());
//! });
//!
//! assert_eq!(function.block_count(), 3);
//! ```
//!
//! Values are allocated as operations are added; operations that produce
//! values return the allocated [`ValueId`]s. Blocks referenced by branches
//! but not yet defined are created empty and filled by a later `block` call.
//!
//! The builder is meant for tests, benchmarks and front ends that produce
//! well-formed input; it panics on out-of-range argument indices instead of
//! returning errors.

use crate::ir::{
    BlockId, BufferUsage, DescriptorSetBinding, ExecutionBarrierFlags, ExecutionStage, Function,
    MemoryType, Op, OpId, PushBinding, Type, ValueId,
};

/// Builder for constructing functions programmatically.
#[derive(Debug)]
pub struct FunctionBuilder {
    function: Function,
    args: Vec<ValueId>,
}

impl FunctionBuilder {
    /// Creates a builder for a function whose entry block takes `arg_types`.
    ///
    /// # Arguments
    ///
    /// * `name` - Symbol name of the function
    /// * `arg_types` - Types of the entry block parameters
    #[must_use]
    pub fn new(name: impl Into<String>, arg_types: &[Type]) -> Self {
        let mut function = Function::new(name);
        let entry = function.add_block();
        let args = arg_types
            .iter()
            .filter_map(|&ty| function.add_block_param(entry, ty).ok())
            .collect();
        Self { function, args }
    }

    /// Builds the function using a closure that defines all blocks.
    pub fn build_with<F>(mut self, f: F) -> Function
    where
        F: FnOnce(&mut FunctionContext<'_>),
    {
        let mut ctx = FunctionContext { builder: &mut self };
        f(&mut ctx);
        self.function
    }
}

fn ensure_block(function: &mut Function, id: usize) -> BlockId {
    while function.block_count() <= id {
        function.add_block();
    }
    BlockId::new(id)
}

/// Context passed to the build closure for defining blocks.
pub struct FunctionContext<'a> {
    builder: &'a mut FunctionBuilder,
}

impl FunctionContext<'_> {
    /// Gets the entry block argument at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below the number of argument types.
    #[must_use]
    pub fn arg(&self, index: usize) -> ValueId {
        self.builder.args[index]
    }

    /// Adds a parameter of type `ty` to block `block`, creating the block if needed.
    pub fn param(&mut self, block: usize, ty: Type) -> ValueId {
        let function = &mut self.builder.function;
        let id = ensure_block(function, block);
        // The block exists after `ensure_block`.
        function
            .add_block_param(id, ty)
            .unwrap_or_else(|_| unreachable!("block {id} was just created"))
    }

    /// Defines the contents of block `id` using a closure.
    pub fn block<F>(&mut self, id: usize, f: F)
    where
        F: FnOnce(&mut BlockBuilder<'_>),
    {
        let function = &mut self.builder.function;
        let block = ensure_block(function, id);
        let mut block_builder = BlockBuilder { function, block };
        f(&mut block_builder);
    }
}

/// Builder for the operations of a single block.
pub struct BlockBuilder<'a> {
    function: &'a mut Function,
    block: BlockId,
}

impl BlockBuilder<'_> {
    /// Returns the id of the block being built.
    #[must_use]
    pub fn id(&self) -> BlockId {
        self.block
    }

    /// Appends an arbitrary operation.
    ///
    /// # Panics
    ///
    /// Panics if `op` mentions a value that does not exist.
    pub fn op(&mut self, op: Op) -> OpId {
        match self.function.append_op(self.block, op) {
            Ok(id) => id,
            Err(error) => panic!("invalid operation in {}: {error}", self.block),
        }
    }

    fn value(&mut self, ty: Type) -> ValueId {
        self.function.new_value(ty)
    }

    fn push(&mut self, op: Op) -> OpId {
        self.function.push_op(self.block, op)
    }

    /// Adds: `dest = constant value : ty`
    pub fn constant(&mut self, value: i64, ty: Type) -> ValueId {
        let dest = self.value(ty);
        self.push(Op::Constant { dest, value });
        dest
    }

    /// Adds: `dest = constant value : index`
    pub fn const_index(&mut self, value: i64) -> ValueId {
        self.constant(value, Type::Index)
    }

    /// Adds: `dest = hal.allocator.allocate allocator, size`
    pub fn allocate(&mut self, allocator: ValueId, size: ValueId) -> ValueId {
        let dest = self.value(Type::Buffer);
        self.push(Op::AllocatorAllocate {
            dest,
            allocator,
            memory_types: MemoryType::DEVICE_LOCAL,
            buffer_usage: BufferUsage::TRANSFER | BufferUsage::DISPATCH_STORAGE,
            size,
        });
        dest
    }

    /// Adds: `dest = hal.command_buffer.create device`
    pub fn command_buffer_create(&mut self, device: ValueId) -> ValueId {
        let dest = self.value(Type::CommandBuffer);
        self.push(Op::CommandBufferCreate { dest, device });
        dest
    }

    /// Adds a push-descriptor-set binding `(buffer, offset, length)` triples
    /// with ordinals assigned in order.
    pub fn push_descriptor_set(
        &mut self,
        command_buffer: ValueId,
        pipeline_layout: ValueId,
        set: u32,
        bindings: &[(ValueId, ValueId, ValueId)],
    ) -> OpId {
        let bindings = bindings
            .iter()
            .zip(0u32..)
            .map(|(&(buffer, offset, length), ordinal)| PushBinding {
                ordinal,
                buffer,
                offset,
                length,
            })
            .collect();
        self.push(Op::PushDescriptorSet {
            command_buffer,
            pipeline_layout,
            set,
            bindings,
        })
    }

    /// Adds a buffer-to-buffer copy.
    pub fn copy_buffer(
        &mut self,
        command_buffer: ValueId,
        source: (ValueId, ValueId),
        target: (ValueId, ValueId),
        length: ValueId,
    ) -> OpId {
        self.push(Op::CopyBuffer {
            command_buffer,
            source: source.0,
            source_offset: source.1,
            target: target.0,
            target_offset: target.1,
            length,
        })
    }

    /// Adds a dispatch of `entry_point` in `executable`.
    pub fn dispatch(
        &mut self,
        command_buffer: ValueId,
        executable: ValueId,
        entry_point: u32,
        workgroups: [ValueId; 3],
    ) -> OpId {
        self.push(Op::Dispatch {
            command_buffer,
            executable,
            entry_point,
            workgroups,
        })
    }

    /// Adds a dispatch-to-dispatch execution barrier.
    pub fn execution_barrier(&mut self, command_buffer: ValueId) -> OpId {
        self.push(Op::ExecutionBarrier {
            command_buffer,
            source_stages: ExecutionStage::DISPATCH,
            target_stages: ExecutionStage::DISPATCH,
            flags: ExecutionBarrierFlags::empty(),
        })
    }

    /// Adds: `hal.command_buffer.finalize command_buffer`
    pub fn finalize(&mut self, command_buffer: ValueId) -> OpId {
        self.push(Op::CommandBufferFinalize { command_buffer })
    }

    /// Adds: `dest = hal.descriptor_set_layout.create device, bindings`
    pub fn descriptor_set_layout(
        &mut self,
        device: ValueId,
        bindings: &[DescriptorSetBinding],
    ) -> ValueId {
        let dest = self.value(Type::DescriptorSetLayout);
        self.push(Op::DescriptorSetLayoutCreate {
            dest,
            device,
            bindings: bindings.to_vec(),
        });
        dest
    }

    /// Adds: `dest = hal.pipeline_layout.create device, set_layouts`
    pub fn pipeline_layout(&mut self, device: ValueId, set_layouts: &[ValueId]) -> ValueId {
        let dest = self.value(Type::PipelineLayout);
        self.push(Op::PipelineLayoutCreate {
            dest,
            device,
            push_constants: 0,
            set_layouts: set_layouts.to_vec(),
        });
        dest
    }

    /// Adds: `dest = util.global.load @global : ty`
    pub fn global_load(&mut self, global: &str, ty: Type) -> ValueId {
        let dest = self.value(ty);
        self.push(Op::GlobalLoad {
            dest,
            global: global.to_string(),
        });
        dest
    }

    /// Adds: `util.global.store value, @global`
    pub fn global_store(&mut self, value: ValueId, global: &str) -> OpId {
        self.push(Op::GlobalStore {
            value,
            global: global.to_string(),
        })
    }

    /// Adds an optimization barrier forwarding `operands`; result types match
    /// the operand types.
    ///
    /// # Panics
    ///
    /// Panics if an operand does not exist.
    pub fn optimization_barrier(&mut self, operands: &[ValueId]) -> Vec<ValueId> {
        let dests: Vec<ValueId> = operands
            .iter()
            .map(|&operand| match self.function.value_type(operand) {
                Some(ty) => self.value(ty),
                None => panic!("unknown operand {operand}"),
            })
            .collect();
        self.push(Op::OptimizationBarrier {
            dests: dests.clone(),
            operands: operands.to_vec(),
        });
        dests
    }

    /// Adds an uninterpreted operation `name` with the given result types.
    pub fn generic(&mut self, name: &str, operands: &[ValueId], results: &[Type]) -> Vec<ValueId> {
        let dests: Vec<ValueId> = results.iter().map(|&ty| self.value(ty)).collect();
        self.push(Op::Generic {
            name: name.to_string(),
            dests: dests.clone(),
            operands: operands.to_vec(),
        });
        dests
    }

    /// Terminates with an unconditional branch to `target`.
    pub fn jump(&mut self, target: usize) {
        self.jump_with(target, &[]);
    }

    /// Terminates with an unconditional branch passing `args` to `target`.
    pub fn jump_with(&mut self, target: usize, args: &[ValueId]) {
        let target = ensure_block(self.function, target);
        self.push(Op::Branch {
            target,
            args: args.to_vec(),
        });
    }

    /// Terminates with a conditional branch.
    pub fn branch(&mut self, condition: ValueId, true_target: usize, false_target: usize) {
        let true_target = ensure_block(self.function, true_target);
        let false_target = ensure_block(self.function, false_target);
        self.push(Op::CondBranch {
            condition,
            true_target,
            true_args: Vec::new(),
            false_target,
            false_args: Vec::new(),
        });
    }

    /// Terminates with a return of no values.
    pub fn ret(&mut self) {
        self.ret_vals(&[]);
    }

    /// Terminates with a return of `values`.
    pub fn ret_vals(&mut self, values: &[ValueId]) {
        self.push(Op::Return {
            values: values.to_vec(),
        });
    }
}
