//! Basic blocks and operation identifiers.

use std::fmt;

use crate::ir::ValueId;

/// Unique identifier of a basic block within a function.
///
/// Blocks are numbered in layout order; block `0` is the entry block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

impl BlockId {
    /// Creates a new block identifier.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^bb{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^bb{}", self.0)
    }
}

/// Unique identifier of an operation slot within a function.
///
/// Identifiers stay valid across moves and insertions. Once an operation is
/// erased its identifier is dead and is never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(usize);

impl OpId {
    /// Creates a new operation identifier.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0)
    }
}

/// A basic block: parameters plus an ordered list of operations.
///
/// The last operation of a well-formed block is its terminator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub(crate) params: Vec<ValueId>,
    pub(crate) ops: Vec<OpId>,
}

impl Block {
    /// Returns the block parameters.
    #[must_use]
    pub fn params(&self) -> &[ValueId] {
        &self.params
    }

    /// Returns the operations of this block, in order.
    #[must_use]
    pub fn ops(&self) -> &[OpId] {
        &self.ops
    }

    /// Returns the number of operations in the block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` if the block holds no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
