//! Value types of the command-recording IR.
//!
//! The type set is deliberately small: scalar types for offsets, lengths and
//! workgroup counts, plus opaque handle types for the device objects that the
//! command-stream operations create and consume.

use std::fmt;

/// The type of an SSA value.
///
/// Handle types (`Device`, `Buffer`, `CommandBuffer`, ...) are opaque: the IR
/// only tracks identity, never contents. Scalar types carry their bit width
/// where it matters for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// Target-sized integer used for offsets, lengths and counts.
    Index,
    /// Fixed-width integer (`i1`, `i32`, `i64`, ...).
    Integer(u16),
    /// Floating point value of the given width.
    Float(u16),
    /// Device handle.
    Device,
    /// Buffer allocator handle.
    Allocator,
    /// Device buffer handle.
    Buffer,
    /// Command buffer handle.
    CommandBuffer,
    /// Descriptor-set layout handle.
    DescriptorSetLayout,
    /// Pipeline layout handle.
    PipelineLayout,
    /// Compiled executable handle.
    Executable,
}

impl Type {
    /// Returns `true` for the scalar index type.
    #[must_use]
    pub const fn is_index(self) -> bool {
        matches!(self, Type::Index)
    }

    /// Returns `true` for the pipeline-layout handle type.
    #[must_use]
    pub const fn is_pipeline_layout(self) -> bool {
        matches!(self, Type::PipelineLayout)
    }

    /// Returns `true` for scalar (non-handle) types.
    #[must_use]
    pub const fn is_scalar(self) -> bool {
        matches!(self, Type::Index | Type::Integer(_) | Type::Float(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Index => f.write_str("index"),
            Type::Integer(bits) => write!(f, "i{bits}"),
            Type::Float(bits) => write!(f, "f{bits}"),
            Type::Device => f.write_str("!hal.device"),
            Type::Allocator => f.write_str("!hal.allocator"),
            Type::Buffer => f.write_str("!hal.buffer"),
            Type::CommandBuffer => f.write_str("!hal.command_buffer"),
            Type::DescriptorSetLayout => f.write_str("!hal.descriptor_set_layout"),
            Type::PipelineLayout => f.write_str("!hal.pipeline_layout"),
            Type::Executable => f.write_str("!hal.executable"),
        }
    }
}
