//! Hazard detection and execution-barrier insertion.
//!
//! Push-descriptor-set operations bind buffer ranges to a command buffer. Two
//! bindings of the same buffer whose ranges overlap, at least one of them
//! writable, may not execute concurrently. This module scans a function once,
//! in block layout order, and inserts an execution barrier in front of any
//! push that would conflict with an access still in flight on its command
//! buffer.
//!
//! # Algorithm
//!
//! A [`HazardTracker`] keeps, per command buffer, the [`AccessRecord`]s seen
//! since the last barrier on it.
//!
//! - An execution barrier on `C` clears `C`'s live set.
//! - A push on `C` walks its bindings in order. Bindings whose offset or
//!   length is not a constant are skipped. Every other binding becomes a
//!   candidate record; if it overlaps a live record a barrier is inserted
//!   before the push, the live set is reset to just the candidate, and the
//!   remaining bindings of that push are not examined. Otherwise the
//!   candidate joins the live set.
//!
//! The policy is greedy: it never looks ahead and never drops individual
//! records, so a conflict clears everything in flight on that command buffer.
//!
//! # Example
//!
//! ```text
//! hal.command_buffer.push_descriptor_set %cb, %layout, 0, [%buf[0, 64)]
//! hal.command_buffer.execution_barrier %cb, CommandRetire|Dispatch|Transfer, CommandIssue|Dispatch|Transfer   // inserted
//! hal.command_buffer.push_descriptor_set %cb, %layout, 0, [%buf[32, 96)]
//! ```

use std::collections::HashMap;

use crate::{
    analysis::LayoutBindings,
    compiler::{EventKind, EventLog},
    ir::{ExecutionBarrierFlags, ExecutionStage, Function, Op, OpId, ValueId},
    Result,
};

/// Stages a synthesized barrier waits on.
pub const HAZARD_SOURCE_STAGES: ExecutionStage = ExecutionStage::COMMAND_RETIRE
    .union(ExecutionStage::DISPATCH)
    .union(ExecutionStage::TRANSFER);

/// Stages a synthesized barrier holds back.
pub const HAZARD_TARGET_STAGES: ExecutionStage = ExecutionStage::COMMAND_ISSUE
    .union(ExecutionStage::DISPATCH)
    .union(ExecutionStage::TRANSFER);

/// Builds the execution barrier inserted in front of a conflicting push.
#[must_use]
pub fn hazard_barrier(command_buffer: ValueId) -> Op {
    Op::ExecutionBarrier {
        command_buffer,
        source_stages: HAZARD_SOURCE_STAGES,
        target_stages: HAZARD_TARGET_STAGES,
        flags: ExecutionBarrierFlags::empty(),
    }
}

/// One buffer range bound to a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRecord {
    /// The accessed buffer.
    pub buffer: ValueId,
    /// Whether the binding permits writes.
    pub is_write: bool,
    /// First byte of the range.
    pub begin: i64,
    /// One past the last byte of the range.
    pub end: i64,
}

impl AccessRecord {
    /// Creates a record covering `[offset, offset + length)`.
    #[must_use]
    pub fn new(buffer: ValueId, is_write: bool, offset: i64, length: i64) -> Self {
        Self {
            buffer,
            is_write,
            begin: offset,
            end: offset.saturating_add(length),
        }
    }

    /// Returns `true` if the two accesses conflict.
    ///
    /// Both ends of the range comparison are inclusive, so ranges that only
    /// touch at an endpoint conflict as well.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use halfix::compiler::passes::AccessRecord;
    /// use halfix::ir::ValueId;
    ///
    /// let buffer = ValueId::new(0);
    /// let read = AccessRecord::new(buffer, false, 0, 32);
    /// let write = AccessRecord::new(buffer, true, 32, 32);
    /// assert!(read.overlaps(&write));
    /// assert!(!read.overlaps(&AccessRecord::new(buffer, false, 16, 32)));
    /// ```
    #[must_use]
    pub fn overlaps(&self, other: &AccessRecord) -> bool {
        self.buffer == other.buffer
            && (self.is_write || other.is_write)
            && self.begin.max(other.begin) <= self.end.min(other.end)
    }
}

/// Per-command-buffer accesses in flight since the last barrier.
///
/// Returned by [`insert_barriers`] with the state at the end of the scan.
#[derive(Debug, Clone, Default)]
pub struct HazardTracker {
    live: HashMap<ValueId, Vec<AccessRecord>>,
    inserted: Vec<OpId>,
}

impl HazardTracker {
    /// Creates a tracker with nothing in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the records live on `command_buffer`.
    #[must_use]
    pub fn live(&self, command_buffer: ValueId) -> &[AccessRecord] {
        self.live
            .get(&command_buffer)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns every command buffer the tracker has seen.
    pub fn command_buffers(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.live.keys().copied()
    }

    /// Returns the first live record of `command_buffer` conflicting with `candidate`.
    #[must_use]
    pub fn conflict(
        &self,
        command_buffer: ValueId,
        candidate: &AccessRecord,
    ) -> Option<&AccessRecord> {
        self.live(command_buffer)
            .iter()
            .find(|record| record.overlaps(candidate))
    }

    /// Adds `record` to the live set of `command_buffer`.
    pub fn record(&mut self, command_buffer: ValueId, record: AccessRecord) {
        self.live.entry(command_buffer).or_default().push(record);
    }

    /// Forgets everything in flight on `command_buffer`.
    pub fn clear(&mut self, command_buffer: ValueId) {
        self.live.entry(command_buffer).or_default().clear();
    }

    /// Returns the barriers inserted so far, in insertion order.
    #[must_use]
    pub fn inserted_barriers(&self) -> &[OpId] {
        &self.inserted
    }

    /// Returns `true` if no live set holds two conflicting records.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.live.values().all(|records| {
            records
                .iter()
                .enumerate()
                .all(|(i, a)| records[i + 1..].iter().all(|b| !a.overlaps(b)))
        })
    }
}

/// Inserts execution barriers in front of conflicting push operations.
///
/// # Arguments
///
/// * `function` - The function to scan; barriers are inserted in place
/// * `layouts` - Binding table used to classify bindings as writable
/// * `events` - Receives one `BarrierInserted` event per synthesized barrier
///
/// # Returns
///
/// The tracker state at the end of the scan.
///
/// # Errors
///
/// Returns an error if a push operation is not placed in a block.
pub fn insert_barriers(
    function: &mut Function,
    layouts: &LayoutBindings,
    events: &EventLog,
) -> Result<HazardTracker> {
    let name = function.name().to_string();
    let mut tracker = HazardTracker::new();

    for id in function.op_ids() {
        let (command_buffer, candidates) = match function.op(id) {
            Some(Op::ExecutionBarrier { command_buffer, .. }) => {
                tracker.clear(*command_buffer);
                continue;
            }
            Some(Op::PushDescriptorSet {
                command_buffer,
                pipeline_layout,
                bindings,
                ..
            }) => {
                let lookup = layouts.lookup(function, *pipeline_layout);
                let candidates: Vec<AccessRecord> = bindings
                    .iter()
                    .enumerate()
                    .filter_map(|(index, binding)| {
                        let offset = function.constant_int(binding.offset)?;
                        let length = function.constant_int(binding.length)?;
                        Some(AccessRecord::new(
                            binding.buffer,
                            lookup.is_writable(index),
                            offset,
                            length,
                        ))
                    })
                    .collect();
                (*command_buffer, candidates)
            }
            _ => continue,
        };

        for candidate in candidates {
            let Some(existing) = tracker.conflict(command_buffer, &candidate).copied() else {
                tracker.record(command_buffer, candidate);
                continue;
            };

            let barrier = function.insert_before(id, hazard_barrier(command_buffer))?;
            tracker.inserted.push(barrier);
            tracker.clear(command_buffer);
            tracker.record(command_buffer, candidate);

            events
                .record(EventKind::BarrierInserted)
                .at(name.as_str(), barrier.index())
                .message(format!(
                    "{} [{}, {}) conflicts with [{}, {}) on {command_buffer}",
                    candidate.buffer, candidate.begin, candidate.end, existing.begin, existing.end
                ));
            break;
        }
    }

    Ok(tracker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{DescriptorSetBinding, FunctionBuilder, Module, OpCode, Type},
        test::{layout_init, LAYOUT_GLOBAL},
    };

    fn layouts_for(bindings: &[DescriptorSetBinding]) -> LayoutBindings {
        let mut module = Module::new();
        module.add_function(layout_init(bindings));
        LayoutBindings::scan(&module, &EventLog::new())
    }

    /// Two pushes of one buffer on one command buffer, at the given ranges.
    fn two_pushes(first: (i64, i64), second: (i64, i64), barrier_between: bool) -> Function {
        FunctionBuilder::new("record", &[Type::Device, Type::Buffer]).build_with(|f| {
            let device = f.arg(0);
            let buffer = f.arg(1);
            f.block(0, |b| {
                let layout = b.global_load(LAYOUT_GLOBAL, Type::PipelineLayout);
                let cb = b.command_buffer_create(device);
                let (o1, l1) = (b.const_index(first.0), b.const_index(first.1));
                let (o2, l2) = (b.const_index(second.0), b.const_index(second.1));
                b.push_descriptor_set(cb, layout, 0, &[(buffer, o1, l1)]);
                if barrier_between {
                    b.execution_barrier(cb);
                }
                b.push_descriptor_set(cb, layout, 0, &[(buffer, o2, l2)]);
                b.finalize(cb);
                b.ret();
            });
        })
    }

    fn command_buffer_of(function: &Function) -> ValueId {
        let create = function.find_ops(OpCode::CommandBufferCreate)[0];
        function.op(create).and_then(Op::command_buffer).unwrap()
    }

    #[test]
    fn test_overlap_rules() {
        let buffer = ValueId::new(0);
        let other = ValueId::new(1);
        let write = AccessRecord::new(buffer, true, 0, 64);

        assert!(write.overlaps(&AccessRecord::new(buffer, false, 32, 64)));
        assert!(write.overlaps(&AccessRecord::new(buffer, false, 64, 8)));
        assert!(!write.overlaps(&AccessRecord::new(buffer, false, 65, 8)));
        assert!(!write.overlaps(&AccessRecord::new(other, true, 0, 64)));
        assert!(!AccessRecord::new(buffer, false, 0, 64)
            .overlaps(&AccessRecord::new(buffer, false, 0, 64)));
    }

    #[test]
    fn test_overlapping_write_inserts_one_barrier() {
        let layouts = layouts_for(&[DescriptorSetBinding::storage(0)]);
        let mut function = two_pushes((0, 64), (32, 64), false);
        let events = EventLog::new();

        let tracker = insert_barriers(&mut function, &layouts, &events).unwrap();

        assert_eq!(tracker.inserted_barriers().len(), 1);
        let pushes = function.find_ops(OpCode::PushDescriptorSet);
        let order = function.op_ids();
        let barrier = tracker.inserted_barriers()[0];
        let at = order.iter().position(|&id| id == barrier).unwrap();
        assert_eq!(order[at + 1], pushes[1]);

        let cb = command_buffer_of(&function);
        let buffer = ValueId::new(1);
        assert_eq!(tracker.live(cb), &[AccessRecord::new(buffer, true, 32, 64)]);
        assert_eq!(events.count_kind(EventKind::BarrierInserted), 1);
        assert!(tracker.is_consistent());
    }

    #[test]
    fn test_synthesized_barrier_stages() {
        let layouts = layouts_for(&[DescriptorSetBinding::storage(0)]);
        let mut function = two_pushes((0, 16), (0, 16), false);
        let tracker = insert_barriers(&mut function, &layouts, &EventLog::new()).unwrap();

        match function.op(tracker.inserted_barriers()[0]) {
            Some(Op::ExecutionBarrier {
                source_stages,
                target_stages,
                flags,
                ..
            }) => {
                assert_eq!(*source_stages, HAZARD_SOURCE_STAGES);
                assert_eq!(*target_stages, HAZARD_TARGET_STAGES);
                assert!(flags.is_empty());
            }
            other => panic!("expected a barrier, found {other:?}"),
        }
    }

    #[test]
    fn test_read_only_pair_needs_no_barrier() {
        let layouts = layouts_for(&[DescriptorSetBinding::read_only(0)]);
        let mut function = two_pushes((0, 64), (32, 64), false);

        let tracker = insert_barriers(&mut function, &layouts, &EventLog::new()).unwrap();

        assert!(tracker.inserted_barriers().is_empty());
        assert_eq!(tracker.live(command_buffer_of(&function)).len(), 2);
    }

    #[test]
    fn test_existing_barrier_clears_live_set() {
        let layouts = layouts_for(&[DescriptorSetBinding::storage(0)]);
        let mut function = two_pushes((0, 64), (32, 64), true);

        let tracker = insert_barriers(&mut function, &layouts, &EventLog::new()).unwrap();

        assert!(tracker.inserted_barriers().is_empty());
        assert_eq!(function.find_ops(OpCode::ExecutionBarrier).len(), 1);
        assert_eq!(tracker.live(command_buffer_of(&function)).len(), 1);
    }

    #[test]
    fn test_unresolved_layout_is_writable() {
        let mut function = two_pushes((0, 64), (32, 64), false);
        let tracker =
            insert_barriers(&mut function, &LayoutBindings::new(), &EventLog::new()).unwrap();
        assert_eq!(tracker.inserted_barriers().len(), 1);
    }

    #[test]
    fn test_dynamic_offset_is_skipped() {
        let layouts = layouts_for(&[DescriptorSetBinding::storage(0)]);
        let mut function =
            FunctionBuilder::new("dynamic", &[Type::Device, Type::Buffer, Type::Index]).build_with(
                |f| {
                    let device = f.arg(0);
                    let buffer = f.arg(1);
                    let dynamic = f.arg(2);
                    f.block(0, |b| {
                        let layout = b.global_load(LAYOUT_GLOBAL, Type::PipelineLayout);
                        let cb = b.command_buffer_create(device);
                        let zero = b.const_index(0);
                        let len = b.const_index(64);
                        b.push_descriptor_set(cb, layout, 0, &[(buffer, zero, len)]);
                        b.push_descriptor_set(cb, layout, 0, &[(buffer, dynamic, len)]);
                        b.push_descriptor_set(cb, layout, 0, &[(buffer, zero, dynamic)]);
                        b.ret();
                    });
                },
            );

        let tracker = insert_barriers(&mut function, &layouts, &EventLog::new()).unwrap();

        assert!(tracker.inserted_barriers().is_empty());
        assert_eq!(tracker.live(command_buffer_of(&function)).len(), 1);
    }

    #[test]
    fn test_command_buffers_are_tracked_separately() {
        let layouts = layouts_for(&[DescriptorSetBinding::storage(0)]);
        let mut function = FunctionBuilder::new("two_cbs", &[Type::Device, Type::Buffer])
            .build_with(|f| {
                let device = f.arg(0);
                let buffer = f.arg(1);
                f.block(0, |b| {
                    let layout = b.global_load(LAYOUT_GLOBAL, Type::PipelineLayout);
                    let first = b.command_buffer_create(device);
                    let second = b.command_buffer_create(device);
                    let zero = b.const_index(0);
                    let len = b.const_index(64);
                    b.push_descriptor_set(first, layout, 0, &[(buffer, zero, len)]);
                    b.push_descriptor_set(second, layout, 0, &[(buffer, zero, len)]);
                    b.ret();
                });
            });

        let tracker = insert_barriers(&mut function, &layouts, &EventLog::new()).unwrap();

        assert!(tracker.inserted_barriers().is_empty());
        assert_eq!(tracker.command_buffers().count(), 2);
    }

    #[test]
    fn test_bindings_after_conflict_are_not_recorded() {
        let layouts = layouts_for(&[
            DescriptorSetBinding::storage(0),
            DescriptorSetBinding::storage(1),
        ]);
        let mut function = FunctionBuilder::new("multi", &[Type::Device, Type::Buffer, Type::Buffer])
            .build_with(|f| {
                let device = f.arg(0);
                let a = f.arg(1);
                let other = f.arg(2);
                f.block(0, |b| {
                    let layout = b.global_load(LAYOUT_GLOBAL, Type::PipelineLayout);
                    let cb = b.command_buffer_create(device);
                    let zero = b.const_index(0);
                    let len = b.const_index(16);
                    b.push_descriptor_set(cb, layout, 0, &[(a, zero, len)]);
                    b.push_descriptor_set(cb, layout, 0, &[(a, zero, len), (other, zero, len)]);
                    b.ret();
                });
            });

        let tracker = insert_barriers(&mut function, &layouts, &EventLog::new()).unwrap();
        let live = tracker.live(command_buffer_of(&function));

        assert_eq!(tracker.inserted_barriers().len(), 1);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].buffer, ValueId::new(1));
    }
}
