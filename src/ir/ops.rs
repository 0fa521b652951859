//! Operations of the command-recording IR.
//!
//! Every operation is a variant of [`Op`] with named fields, so passes match on
//! the variant they expect instead of down-casting an untyped operation. The
//! field-less discriminant [`OpCode`] carries the textual mnemonic and the
//! classification predicates used by the passes.
//!
//! # Operation Families
//!
//! | Family | Variants |
//! |--------|----------|
//! | Scalars | [`Op::Constant`], [`Op::Generic`] |
//! | Allocation | [`Op::AllocatorAllocate`] |
//! | Command stream | [`Op::CommandBufferCreate`], [`Op::PushDescriptorSet`], [`Op::CopyBuffer`], [`Op::Dispatch`], [`Op::ExecutionBarrier`], [`Op::CommandBufferFinalize`] |
//! | Layouts | [`Op::DescriptorSetLayoutCreate`], [`Op::PipelineLayoutCreate`] |
//! | Globals | [`Op::GlobalLoad`], [`Op::GlobalStore`] |
//! | Markers | [`Op::OptimizationBarrier`] |
//! | Terminators | [`Op::Branch`], [`Op::CondBranch`], [`Op::Return`] |

use std::fmt;

use bitflags::bitflags;
use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::ir::{BlockId, ValueId};

bitflags! {
    /// Pipeline stages an execution barrier waits on or releases.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ExecutionStage: u32 {
        /// Commands are issued to the device.
        const COMMAND_ISSUE = 1 << 0;
        /// Commands are processed by the device front end.
        const COMMAND_PROCESS = 1 << 1;
        /// Dispatch work executes.
        const DISPATCH = 1 << 2;
        /// Transfer (copy/fill) work executes.
        const TRANSFER = 1 << 3;
        /// Commands retire.
        const COMMAND_RETIRE = 1 << 4;
        /// Host access.
        const HOST = 1 << 5;
    }

    /// Flags modifying an execution barrier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ExecutionBarrierFlags: u32 {
        /// Reserved for future use.
        const RESERVED = 1 << 0;
    }

    /// Per-binding flags of a descriptor-set layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DescriptorFlags: u32 {
        /// The binding is only read by the dispatch.
        const READ_ONLY = 1 << 0;
        /// The binding is accessed indirectly.
        const INDIRECT = 1 << 1;
    }

    /// Memory placement requested by an allocation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemoryType: u32 {
        /// Device local memory.
        const DEVICE_LOCAL = 1 << 0;
        /// Memory mappable by the host.
        const HOST_VISIBLE = 1 << 1;
        /// Host writes are visible without explicit flushes.
        const HOST_COHERENT = 1 << 2;
    }

    /// Intended usage of an allocated buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        /// Source or target of transfer commands.
        const TRANSFER = 1 << 0;
        /// Bound as a storage buffer of a dispatch.
        const DISPATCH_STORAGE = 1 << 1;
        /// Mapped into host memory.
        const MAPPING = 1 << 2;
    }
}

/// Kind of resource a descriptor-set binding refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    /// A uniform buffer.
    UniformBuffer,
    /// A storage buffer.
    StorageBuffer,
}

/// One binding slot declared by a descriptor-set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetBinding {
    /// Binding ordinal within the set.
    pub ordinal: u32,
    /// Resource kind.
    pub descriptor_type: DescriptorType,
    /// Access flags; absence of [`DescriptorFlags::READ_ONLY`] means writable.
    pub flags: DescriptorFlags,
}

impl DescriptorSetBinding {
    /// Creates a writable storage-buffer binding.
    #[must_use]
    pub const fn storage(ordinal: u32) -> Self {
        Self {
            ordinal,
            descriptor_type: DescriptorType::StorageBuffer,
            flags: DescriptorFlags::empty(),
        }
    }

    /// Creates a read-only storage-buffer binding.
    #[must_use]
    pub const fn read_only(ordinal: u32) -> Self {
        Self {
            ordinal,
            descriptor_type: DescriptorType::StorageBuffer,
            flags: DescriptorFlags::READ_ONLY,
        }
    }

    /// Returns `true` if the binding permits writes.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        !self.flags.contains(DescriptorFlags::READ_ONLY)
    }
}

/// A buffer range bound by a push-descriptor-set operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushBinding {
    /// Binding ordinal within the set.
    pub ordinal: u32,
    /// The bound buffer.
    pub buffer: ValueId,
    /// Byte offset of the range.
    pub offset: ValueId,
    /// Byte length of the range.
    pub length: ValueId,
}

/// Field-less operation discriminant.
///
/// The strum derives provide the mnemonic (`IntoStaticStr`) and iteration over
/// all kinds (`EnumIter`), which tests use to check the classification tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, EnumIter, EnumCount)]
pub enum OpCode {
    /// `arith.constant`
    #[strum(serialize = "arith.constant")]
    Constant,
    /// `hal.allocator.allocate`
    #[strum(serialize = "hal.allocator.allocate")]
    AllocatorAllocate,
    /// `hal.command_buffer.create`
    #[strum(serialize = "hal.command_buffer.create")]
    CommandBufferCreate,
    /// `hal.command_buffer.push_descriptor_set`
    #[strum(serialize = "hal.command_buffer.push_descriptor_set")]
    PushDescriptorSet,
    /// `hal.command_buffer.copy_buffer`
    #[strum(serialize = "hal.command_buffer.copy_buffer")]
    CopyBuffer,
    /// `hal.command_buffer.dispatch`
    #[strum(serialize = "hal.command_buffer.dispatch")]
    Dispatch,
    /// `hal.command_buffer.execution_barrier`
    #[strum(serialize = "hal.command_buffer.execution_barrier")]
    ExecutionBarrier,
    /// `hal.command_buffer.finalize`
    #[strum(serialize = "hal.command_buffer.finalize")]
    CommandBufferFinalize,
    /// `hal.descriptor_set_layout.create`
    #[strum(serialize = "hal.descriptor_set_layout.create")]
    DescriptorSetLayoutCreate,
    /// `hal.pipeline_layout.create`
    #[strum(serialize = "hal.pipeline_layout.create")]
    PipelineLayoutCreate,
    /// `util.global.load`
    #[strum(serialize = "util.global.load")]
    GlobalLoad,
    /// `util.global.store`
    #[strum(serialize = "util.global.store")]
    GlobalStore,
    /// `util.optimization_barrier`
    #[strum(serialize = "util.optimization_barrier")]
    OptimizationBarrier,
    /// Any other operation, identified by its own name.
    #[strum(serialize = "generic")]
    Generic,
    /// `cf.br`
    #[strum(serialize = "cf.br")]
    Branch,
    /// `cf.cond_br`
    #[strum(serialize = "cf.cond_br")]
    CondBranch,
    /// `func.return`
    #[strum(serialize = "func.return")]
    Return,
}

impl OpCode {
    /// Returns the textual mnemonic.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Returns `true` for operations that record into a command buffer.
    ///
    /// These six kinds form an ordered recording sequence per command buffer;
    /// any code motion must keep their relative order.
    #[must_use]
    pub const fn is_command_stream(self) -> bool {
        matches!(
            self,
            OpCode::CommandBufferCreate
                | OpCode::PushDescriptorSet
                | OpCode::CopyBuffer
                | OpCode::Dispatch
                | OpCode::ExecutionBarrier
                | OpCode::CommandBufferFinalize
        )
    }

    /// Returns `true` for block terminators.
    #[must_use]
    pub const fn is_terminator(self) -> bool {
        matches!(self, OpCode::Branch | OpCode::CondBranch | OpCode::Return)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// An operation of the command-recording IR.
///
/// Result values are listed in `dest`/`dests` fields, operands in the remaining
/// [`ValueId`] fields. Use [`Op::defs`] and [`Op::uses`] for generic traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Integer or index constant.
    Constant {
        /// Result value.
        dest: ValueId,
        /// Constant value, sign-extended.
        value: i64,
    },

    /// Allocates a buffer from an allocator.
    AllocatorAllocate {
        /// The allocated buffer.
        dest: ValueId,
        /// Allocator to allocate from.
        allocator: ValueId,
        /// Requested memory placement.
        memory_types: MemoryType,
        /// Intended buffer usage.
        buffer_usage: BufferUsage,
        /// Allocation size in bytes.
        size: ValueId,
    },

    /// Begins recording a new command buffer.
    CommandBufferCreate {
        /// The new command buffer.
        dest: ValueId,
        /// Device owning the command buffer.
        device: ValueId,
    },

    /// Binds buffer ranges to a descriptor set for subsequent dispatches.
    PushDescriptorSet {
        /// Command buffer being recorded.
        command_buffer: ValueId,
        /// Pipeline layout describing the set.
        pipeline_layout: ValueId,
        /// Descriptor set index.
        set: u32,
        /// Bound ranges, in binding order.
        bindings: Vec<PushBinding>,
    },

    /// Copies a byte range between buffers.
    CopyBuffer {
        /// Command buffer being recorded.
        command_buffer: ValueId,
        /// Source buffer.
        source: ValueId,
        /// Source byte offset.
        source_offset: ValueId,
        /// Target buffer.
        target: ValueId,
        /// Target byte offset.
        target_offset: ValueId,
        /// Bytes to copy.
        length: ValueId,
    },

    /// Records a dispatch of an executable entry point.
    Dispatch {
        /// Command buffer being recorded.
        command_buffer: ValueId,
        /// Executable containing the entry point.
        executable: ValueId,
        /// Entry point ordinal.
        entry_point: u32,
        /// Workgroup counts (x, y, z).
        workgroups: [ValueId; 3],
    },

    /// Orders execution of prior and subsequent commands.
    ExecutionBarrier {
        /// Command buffer being recorded.
        command_buffer: ValueId,
        /// Stages that must complete before the barrier.
        source_stages: ExecutionStage,
        /// Stages that may not begin until the barrier.
        target_stages: ExecutionStage,
        /// Barrier flags.
        flags: ExecutionBarrierFlags,
    },

    /// Ends recording of a command buffer.
    CommandBufferFinalize {
        /// Command buffer being finalized.
        command_buffer: ValueId,
    },

    /// Declares a descriptor-set layout.
    DescriptorSetLayoutCreate {
        /// The layout handle.
        dest: ValueId,
        /// Device owning the layout.
        device: ValueId,
        /// Declared bindings, in order.
        bindings: Vec<DescriptorSetBinding>,
    },

    /// Declares a pipeline layout from descriptor-set layouts.
    PipelineLayoutCreate {
        /// The layout handle.
        dest: ValueId,
        /// Device owning the layout.
        device: ValueId,
        /// Number of push constants.
        push_constants: u32,
        /// Descriptor-set layouts, in set order.
        set_layouts: Vec<ValueId>,
    },

    /// Loads the value of a module global.
    GlobalLoad {
        /// Loaded value.
        dest: ValueId,
        /// Global name.
        global: String,
    },

    /// Stores a value into a module global.
    GlobalStore {
        /// Stored value.
        value: ValueId,
        /// Global name.
        global: String,
    },

    /// Opaque identity marker that blocks optimization across it.
    OptimizationBarrier {
        /// Results, one per operand, of the same types.
        dests: Vec<ValueId>,
        /// Forwarded operands.
        operands: Vec<ValueId>,
    },

    /// Any operation the passes do not interpret.
    Generic {
        /// Operation name.
        name: String,
        /// Result values.
        dests: Vec<ValueId>,
        /// Operands.
        operands: Vec<ValueId>,
    },

    /// Unconditional branch.
    Branch {
        /// Successor block.
        target: BlockId,
        /// Arguments for the successor's block parameters.
        args: Vec<ValueId>,
    },

    /// Two-way conditional branch.
    CondBranch {
        /// Branch condition (`i1`).
        condition: ValueId,
        /// Successor when the condition holds.
        true_target: BlockId,
        /// Arguments for `true_target`.
        true_args: Vec<ValueId>,
        /// Successor otherwise.
        false_target: BlockId,
        /// Arguments for `false_target`.
        false_args: Vec<ValueId>,
    },

    /// Returns from the function.
    Return {
        /// Returned values.
        values: Vec<ValueId>,
    },
}

impl Op {
    /// Returns the operation kind.
    #[must_use]
    pub fn opcode(&self) -> OpCode {
        match self {
            Op::Constant { .. } => OpCode::Constant,
            Op::AllocatorAllocate { .. } => OpCode::AllocatorAllocate,
            Op::CommandBufferCreate { .. } => OpCode::CommandBufferCreate,
            Op::PushDescriptorSet { .. } => OpCode::PushDescriptorSet,
            Op::CopyBuffer { .. } => OpCode::CopyBuffer,
            Op::Dispatch { .. } => OpCode::Dispatch,
            Op::ExecutionBarrier { .. } => OpCode::ExecutionBarrier,
            Op::CommandBufferFinalize { .. } => OpCode::CommandBufferFinalize,
            Op::DescriptorSetLayoutCreate { .. } => OpCode::DescriptorSetLayoutCreate,
            Op::PipelineLayoutCreate { .. } => OpCode::PipelineLayoutCreate,
            Op::GlobalLoad { .. } => OpCode::GlobalLoad,
            Op::GlobalStore { .. } => OpCode::GlobalStore,
            Op::OptimizationBarrier { .. } => OpCode::OptimizationBarrier,
            Op::Generic { .. } => OpCode::Generic,
            Op::Branch { .. } => OpCode::Branch,
            Op::CondBranch { .. } => OpCode::CondBranch,
            Op::Return { .. } => OpCode::Return,
        }
    }

    /// Returns the display name; the op's own name for [`Op::Generic`].
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Op::Generic { name, .. } => name,
            other => other.opcode().mnemonic(),
        }
    }

    /// Returns `true` if this operation ends a block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.opcode().is_terminator()
    }

    /// Returns `true` if this operation records into a command buffer.
    #[must_use]
    pub fn is_command_stream(&self) -> bool {
        self.opcode().is_command_stream()
    }

    /// Returns the command buffer a command-stream operation records into.
    ///
    /// For [`Op::CommandBufferCreate`] this is the created buffer.
    #[must_use]
    pub fn command_buffer(&self) -> Option<ValueId> {
        match self {
            Op::CommandBufferCreate { dest, .. } => Some(*dest),
            Op::PushDescriptorSet { command_buffer, .. }
            | Op::CopyBuffer { command_buffer, .. }
            | Op::Dispatch { command_buffer, .. }
            | Op::ExecutionBarrier { command_buffer, .. }
            | Op::CommandBufferFinalize { command_buffer } => Some(*command_buffer),
            _ => None,
        }
    }

    /// Returns the values defined by this operation, in result order.
    #[must_use]
    pub fn defs(&self) -> Vec<ValueId> {
        match self {
            Op::Constant { dest, .. }
            | Op::AllocatorAllocate { dest, .. }
            | Op::CommandBufferCreate { dest, .. }
            | Op::DescriptorSetLayoutCreate { dest, .. }
            | Op::PipelineLayoutCreate { dest, .. }
            | Op::GlobalLoad { dest, .. } => vec![*dest],
            Op::OptimizationBarrier { dests, .. } | Op::Generic { dests, .. } => dests.clone(),
            _ => Vec::new(),
        }
    }

    /// Returns the values used by this operation, in operand order.
    #[must_use]
    pub fn uses(&self) -> Vec<ValueId> {
        let mut uses = Vec::new();
        // Cloning is cheap: the visitor only reads.
        let mut this = self.clone();
        this.visit_uses_mut(|value| uses.push(*value));
        uses
    }

    /// Replaces every use of `from` with `to`.
    ///
    /// Returns the number of operands rewritten.
    pub fn replace_uses(&mut self, from: ValueId, to: ValueId) -> usize {
        let mut replaced = 0;
        self.visit_uses_mut(|value| {
            if *value == from {
                *value = to;
                replaced += 1;
            }
        });
        replaced
    }

    /// Returns the successor blocks of a terminator, in edge order.
    #[must_use]
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Op::Branch { target, .. } => vec![*target],
            Op::CondBranch {
                true_target,
                false_target,
                ..
            } => vec![*true_target, *false_target],
            _ => Vec::new(),
        }
    }

    /// Calls `f` on every operand slot, in operand order.
    fn visit_uses_mut<F: FnMut(&mut ValueId)>(&mut self, mut f: F) {
        match self {
            Op::Constant { .. } | Op::GlobalLoad { .. } => {}
            Op::AllocatorAllocate {
                allocator, size, ..
            } => {
                f(allocator);
                f(size);
            }
            Op::CommandBufferCreate { device, .. } => f(device),
            Op::PushDescriptorSet {
                command_buffer,
                pipeline_layout,
                bindings,
                ..
            } => {
                f(command_buffer);
                f(pipeline_layout);
                for binding in bindings {
                    f(&mut binding.buffer);
                    f(&mut binding.offset);
                    f(&mut binding.length);
                }
            }
            Op::CopyBuffer {
                command_buffer,
                source,
                source_offset,
                target,
                target_offset,
                length,
            } => {
                f(command_buffer);
                f(source);
                f(source_offset);
                f(target);
                f(target_offset);
                f(length);
            }
            Op::Dispatch {
                command_buffer,
                executable,
                workgroups,
                ..
            } => {
                f(command_buffer);
                f(executable);
                workgroups.iter_mut().for_each(&mut f);
            }
            Op::ExecutionBarrier { command_buffer, .. }
            | Op::CommandBufferFinalize { command_buffer } => f(command_buffer),
            Op::DescriptorSetLayoutCreate { device, .. } => f(device),
            Op::PipelineLayoutCreate {
                device,
                set_layouts,
                ..
            } => {
                f(device);
                set_layouts.iter_mut().for_each(&mut f);
            }
            Op::GlobalStore { value, .. } => f(value),
            Op::OptimizationBarrier { operands, .. } | Op::Generic { operands, .. } => {
                operands.iter_mut().for_each(&mut f);
            }
            Op::Branch { args, .. } => args.iter_mut().for_each(&mut f),
            Op::CondBranch {
                condition,
                true_args,
                false_args,
                ..
            } => {
                f(condition);
                true_args.iter_mut().for_each(&mut f);
                false_args.iter_mut().for_each(&mut f);
            }
            Op::Return { values } => values.iter_mut().for_each(&mut f),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, values: &[ValueId]) -> fmt::Result {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{value}")?;
    }
    Ok(())
}

fn write_successor(f: &mut fmt::Formatter<'_>, target: BlockId, args: &[ValueId]) -> fmt::Result {
    write!(f, "{target}")?;
    if !args.is_empty() {
        f.write_str("(")?;
        write_list(f, args)?;
        f.write_str(")")?;
    }
    Ok(())
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let defs = self.defs();
        if !defs.is_empty() {
            write_list(f, &defs)?;
            f.write_str(" = ")?;
        }
        f.write_str(self.name())?;

        match self {
            Op::Constant { value, .. } => write!(f, " {value}"),
            Op::AllocatorAllocate {
                allocator,
                memory_types,
                buffer_usage,
                size,
                ..
            } => write!(
                f,
                " {allocator} type({:#x}) usage({:#x}) size {size}",
                memory_types.bits(),
                buffer_usage.bits()
            ),
            Op::PushDescriptorSet {
                command_buffer,
                pipeline_layout,
                set,
                bindings,
            } => {
                write!(f, " {command_buffer} layout {pipeline_layout}[{set}] bindings [")?;
                for (i, binding) in bindings.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(
                        f,
                        "{} = ({}, {}, {})",
                        binding.ordinal, binding.buffer, binding.offset, binding.length
                    )?;
                }
                f.write_str("]")
            }
            Op::Dispatch {
                command_buffer,
                executable,
                entry_point,
                workgroups,
            } => write!(
                f,
                " {command_buffer} target {executable}[{entry_point}] workgroups [{}, {}, {}]",
                workgroups[0], workgroups[1], workgroups[2]
            ),
            Op::ExecutionBarrier {
                command_buffer,
                source_stages,
                target_stages,
                flags,
            } => write!(
                f,
                " {command_buffer} source({:#x}) target({:#x}) flags({:#x})",
                source_stages.bits(),
                target_stages.bits(),
                flags.bits()
            ),
            Op::DescriptorSetLayoutCreate {
                device, bindings, ..
            } => {
                write!(f, " {device} bindings [")?;
                for (i, binding) in bindings.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "#{}", binding.ordinal)?;
                    if !binding.is_writable() {
                        f.write_str(" read_only")?;
                    }
                }
                f.write_str("]")
            }
            Op::GlobalLoad { global, .. } => write!(f, " @{global}"),
            Op::GlobalStore { value, global } => write!(f, " {value}, @{global}"),
            Op::Branch { target, args } => {
                f.write_str(" ")?;
                write_successor(f, *target, args)
            }
            Op::CondBranch {
                condition,
                true_target,
                true_args,
                false_target,
                false_args,
            } => {
                write!(f, " {condition}, ")?;
                write_successor(f, *true_target, true_args)?;
                f.write_str(", ")?;
                write_successor(f, *false_target, false_args)
            }
            other => {
                let uses = other.uses();
                if !uses.is_empty() {
                    f.write_str(" ")?;
                    write_list(f, &uses)?;
                }
                Ok(())
            }
        }
    }
}
