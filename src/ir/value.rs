//! SSA values.
//!
//! Every value is defined exactly once, either as a result of an operation or as
//! a block parameter. Values live in the value table of their [`Function`] and
//! are addressed by [`ValueId`].
//!
//! [`Function`]: crate::ir::Function

use std::fmt;

use crate::ir::{BlockId, OpId, Type};

/// Unique identifier of an SSA value within a function.
///
/// # Examples
///
/// ```rust
/// use halfix::ir::ValueId;
///
/// let value = ValueId::new(7);
/// assert_eq!(value.index(), 7);
/// assert_eq!(value.to_string(), "%7");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(usize);

impl ValueId {
    /// Creates a new value identifier.
    ///
    /// # Arguments
    ///
    /// * `index` - The index into the value table
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

impl fmt::Debug for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Where a value is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueDef {
    /// Result `index` of operation `op`.
    Result {
        /// Defining operation.
        op: OpId,
        /// Result position.
        index: usize,
    },
    /// Parameter `index` of block `block`.
    BlockParam {
        /// Owning block.
        block: BlockId,
        /// Parameter position.
        index: usize,
    },
}

/// An entry of the value table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    ty: Type,
    def: Option<ValueDef>,
}

impl Value {
    pub(crate) const fn new(ty: Type, def: Option<ValueDef>) -> Self {
        Self { ty, def }
    }

    /// Returns the value's type.
    #[must_use]
    pub const fn ty(&self) -> Type {
        self.ty
    }

    /// Returns the definition site, or `None` if the value is not (or no longer)
    /// defined by anything in the function.
    #[must_use]
    pub const fn def(&self) -> Option<ValueDef> {
        self.def
    }

    pub(crate) fn set_def(&mut self, def: Option<ValueDef>) {
        self.def = def;
    }
}
