//! Function representation: blocks, an operation arena and a value table.
//!
//! # Structure
//!
//! ```text
//! Function
//! ├── blocks: Vec<Block>            // layout order, Block 0 is the entry
//! ├── ops: Vec<Option<Op>>          // arena addressed by OpId, None = erased
//! ├── placement: Vec<Option<BlockId>>
//! └── values: Vec<Value>            // SSA value table addressed by ValueId
//! ```
//!
//! Blocks refer to operations by [`OpId`], so moving an operation between
//! blocks only rewrites two id lists and never invalidates other ids. Passes
//! collect ids first and mutate afterwards; none of the mutation primitives
//! may be called while iterating the structure they change.
//!
//! # Thread Safety
//!
//! `Function` is `Send` and `Sync`.

use std::fmt;

use crate::{
    ir::{Block, BlockId, Op, OpCode, OpId, Type, Value, ValueDef, ValueId},
    Error, Result,
};

/// A routine in SSA form with an explicit control-flow graph.
///
/// # Examples
///
/// ```rust
/// use halfix::ir::{Function, Op, Type};
///
/// let mut function = Function::new("main");
/// let entry = function.add_block();
/// let zero = function.new_value(Type::Index);
/// function.append_op(entry, Op::Constant { dest: zero, value: 0 })?;
/// function.append_op(entry, Op::Return { values: vec![zero] })?;
///
/// assert_eq!(function.constant_int(zero), Some(0));
/// assert!(function.terminator(entry).is_some());
/// # Ok::<(), halfix::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Function {
    name: String,
    blocks: Vec<Block>,
    ops: Vec<Option<Op>>,
    placement: Vec<Option<BlockId>>,
    values: Vec<Value>,
}

impl Function {
    /// Creates an empty function with the given symbol name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the function's symbol name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the blocks in layout order.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the block with the given id.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.index())
    }

    /// Returns all block ids in layout order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.blocks.len()).map(BlockId::new)
    }

    /// Appends an empty block and returns its id.
    pub fn add_block(&mut self) -> BlockId {
        self.blocks.push(Block::default());
        BlockId::new(self.blocks.len() - 1)
    }

    /// Appends a parameter of type `ty` to `block`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBlock`] if `block` does not exist.
    pub fn add_block_param(&mut self, block: BlockId, ty: Type) -> Result<ValueId> {
        let index = self
            .blocks
            .get(block.index())
            .map(|b| b.params.len())
            .ok_or(Error::InvalidBlock(block.index()))?;

        let value = self.alloc_value(ty, Some(ValueDef::BlockParam { block, index }));
        self.blocks[block.index()].params.push(value);
        Ok(value)
    }

    /// Allocates a value of type `ty` that an operation appended later will define.
    pub fn new_value(&mut self, ty: Type) -> ValueId {
        self.alloc_value(ty, None)
    }

    fn alloc_value(&mut self, ty: Type, def: Option<ValueDef>) -> ValueId {
        self.values.push(Value::new(ty, def));
        ValueId::new(self.values.len() - 1)
    }

    /// Returns the value table entry for `value`.
    #[must_use]
    pub fn value(&self, value: ValueId) -> Option<&Value> {
        self.values.get(value.index())
    }

    /// Returns the type of `value`.
    #[must_use]
    pub fn value_type(&self, value: ValueId) -> Option<Type> {
        self.value(value).map(Value::ty)
    }

    /// Returns the number of values in the value table.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Returns the live operation with the given id.
    #[must_use]
    pub fn op(&self, id: OpId) -> Option<&Op> {
        self.ops.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns the live operation with the given id, mutably.
    pub fn op_mut(&mut self, id: OpId) -> Option<&mut Op> {
        self.ops.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Returns the block currently holding `op`.
    #[must_use]
    pub fn block_of(&self, op: OpId) -> Option<BlockId> {
        self.placement.get(op.index()).copied().flatten()
    }

    /// Returns the number of live operations.
    #[must_use]
    pub fn op_count(&self) -> usize {
        self.ops.iter().filter(|slot| slot.is_some()).count()
    }

    /// Returns a snapshot of all live operation ids in block layout order.
    #[must_use]
    pub fn op_ids(&self) -> Vec<OpId> {
        self.blocks
            .iter()
            .flat_map(|block| block.ops.iter().copied())
            .collect()
    }

    /// Returns the ids of all live operations of kind `opcode`, in layout order.
    #[must_use]
    pub fn find_ops(&self, opcode: OpCode) -> Vec<OpId> {
        self.op_ids()
            .into_iter()
            .filter(|&id| self.op(id).is_some_and(|op| op.opcode() == opcode))
            .collect()
    }

    /// Returns the terminator of `block`, if its last operation is one.
    #[must_use]
    pub fn terminator(&self, block: BlockId) -> Option<OpId> {
        let last = *self.block(block)?.ops.last()?;
        self.op(last)
            .filter(|op| op.is_terminator())
            .map(|_| last)
    }

    /// Returns the successor blocks of `block`, in edge order.
    #[must_use]
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.terminator(block)
            .and_then(|term| self.op(term))
            .map(Op::successors)
            .unwrap_or_default()
    }

    /// Returns the live operation defining `value`.
    #[must_use]
    pub fn defining_op(&self, value: ValueId) -> Option<OpId> {
        match self.value(value)?.def()? {
            ValueDef::Result { op, .. } if self.op(op).is_some() => Some(op),
            _ => None,
        }
    }

    /// Returns the operation defining `value`.
    #[must_use]
    pub fn defining(&self, value: ValueId) -> Option<&Op> {
        self.defining_op(value).and_then(|id| self.op(id))
    }

    /// Returns the integer constant held by `value`, if it is defined by a
    /// constant operation.
    #[must_use]
    pub fn constant_int(&self, value: ValueId) -> Option<i64> {
        match self.defining(value)? {
            Op::Constant { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Appends `op` at the end of `block`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBlock`] if `block` does not exist, or
    /// [`Error::InvalidValue`] if `op` mentions a value outside the value table.
    pub fn append_op(&mut self, block: BlockId, op: Op) -> Result<OpId> {
        if block.index() >= self.blocks.len() {
            return Err(Error::InvalidBlock(block.index()));
        }
        self.check_values(&op)?;
        Ok(self.push_op(block, op))
    }

    /// Appends without validation; callers guarantee `block` and all values exist.
    pub(crate) fn push_op(&mut self, block: BlockId, op: Op) -> OpId {
        let id = self.alloc_op(op, block);
        self.blocks[block.index()].ops.push(id);
        id
    }

    /// Inserts `op` immediately before `anchor`, in the anchor's block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if `anchor` is not a live operation,
    /// [`Error::InvalidValue`] if `op` mentions an unknown value, or
    /// [`Error::Malformed`] if the anchor is not placed in any block.
    pub fn insert_before(&mut self, anchor: OpId, op: Op) -> Result<OpId> {
        self.check_live(anchor)?;
        self.check_values(&op)?;

        let block = self
            .block_of(anchor)
            .ok_or_else(|| malformed_error!("Operation {} is not placed in a block", anchor))?;
        let position = self.position_in(block, anchor)?;

        let id = self.alloc_op(op, block);
        self.blocks[block.index()].ops.insert(position, id);
        Ok(id)
    }

    /// Moves `op` to immediately before the terminator of `target`.
    ///
    /// Moving an operation that already sits in `target` places it directly
    /// before the terminator as well.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for a dead `op`,
    /// [`Error::InvalidBlock`] for an unknown `target`, and
    /// [`Error::Malformed`] if `target` has no terminator or `op` is itself a
    /// terminator.
    pub fn move_before_terminator(&mut self, op: OpId, target: BlockId) -> Result<()> {
        let is_terminator = self.check_live(op)?.is_terminator();
        if target.index() >= self.blocks.len() {
            return Err(Error::InvalidBlock(target.index()));
        }
        if is_terminator {
            return Err(malformed_error!("Cannot move terminator {} into {}", op, target));
        }
        if self.terminator(target).is_none() {
            return Err(malformed_error!("Block {} has no terminator", target));
        }

        let source = self
            .block_of(op)
            .ok_or_else(|| malformed_error!("Operation {} is not placed in a block", op))?;
        let position = self.position_in(source, op)?;
        self.blocks[source.index()].ops.remove(position);

        let ops = &mut self.blocks[target.index()].ops;
        // The terminator is still last after the removal above.
        let at = ops.len() - 1;
        ops.insert(at, op);
        self.placement[op.index()] = Some(target);
        Ok(())
    }

    /// Removes `op` from its block and returns it.
    ///
    /// The slot is tombstoned and the op's results lose their definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if `op` is out of range or already erased.
    pub fn erase(&mut self, op: OpId) -> Result<Op> {
        self.check_live(op)?;

        if let Some(block) = self.block_of(op) {
            let position = self.position_in(block, op)?;
            self.blocks[block.index()].ops.remove(position);
        }
        self.placement[op.index()] = None;

        let removed = self.ops[op.index()]
            .take()
            .ok_or(Error::InvalidOperation(op.index()))?;
        for def in removed.defs() {
            if let Some(value) = self.values.get_mut(def.index()) {
                value.set_def(None);
            }
        }
        Ok(removed)
    }

    /// Replaces every use of `from` with `to` across all live operations.
    ///
    /// Returns the number of operands rewritten.
    pub fn replace_all_uses(&mut self, from: ValueId, to: ValueId) -> usize {
        if from == to {
            return 0;
        }
        self.ops
            .iter_mut()
            .flatten()
            .map(|op| op.replace_uses(from, to))
            .sum()
    }

    fn alloc_op(&mut self, op: Op, block: BlockId) -> OpId {
        let id = OpId::new(self.ops.len());
        for (index, def) in op.defs().into_iter().enumerate() {
            if let Some(value) = self.values.get_mut(def.index()) {
                value.set_def(Some(ValueDef::Result { op: id, index }));
            }
        }
        self.ops.push(Some(op));
        self.placement.push(Some(block));
        id
    }

    fn check_live(&self, op: OpId) -> Result<&Op> {
        self.op(op).ok_or(Error::InvalidOperation(op.index()))
    }

    fn check_values(&self, op: &Op) -> Result<()> {
        match op
            .defs()
            .into_iter()
            .chain(op.uses())
            .find(|value| value.index() >= self.values.len())
        {
            Some(value) => Err(Error::InvalidValue(value.index())),
            None => Ok(()),
        }
    }

    fn position_in(&self, block: BlockId, op: OpId) -> Result<usize> {
        self.blocks[block.index()]
            .ops
            .iter()
            .position(|&id| id == op)
            .ok_or_else(|| malformed_error!("Operation {} is not listed in {}", op, block))
    }

    fn write_params(&self, f: &mut fmt::Formatter<'_>, params: &[ValueId]) -> fmt::Result {
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match self.value_type(*param) {
                Some(ty) => write!(f, "{param}: {ty}")?,
                None => write!(f, "{param}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func @{}(", self.name)?;
        if let Some(entry) = self.blocks.first() {
            self.write_params(f, &entry.params)?;
        }
        writeln!(f, ") {{")?;

        for (index, block) in self.blocks.iter().enumerate() {
            write!(f, "{}", BlockId::new(index))?;
            if index > 0 && !block.params.is_empty() {
                f.write_str("(")?;
                self.write_params(f, &block.params)?;
                f.write_str(")")?;
            }
            writeln!(f, ":")?;
            for &id in &block.ops {
                if let Some(op) = self.op(id) {
                    writeln!(f, "  {op}")?;
                }
            }
        }
        writeln!(f, "}}")
    }
}
