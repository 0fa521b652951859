//! Fixup pipeline integration tests.
//!
//! These tests drive the passes through the public API only:
//! 1. Build functions with `FunctionBuilder`
//! 2. Run `hal-pre-fixup` / `hal-fixup`, or their building blocks directly
//! 3. Verify block contents, inserted barriers, tracker state and events

use halfix::{
    analysis::{LayoutBindings, LayoutLookup, LoopAnalysis},
    compiler::{
        passes::{hoist_allocations, hoist_command_ops, insert_barriers, AccessRecord},
        EventKind, EventLog, PassPipeline, PipelineConfig,
    },
    ir::{
        BlockId, DescriptorSetBinding, Function, FunctionBuilder, Module, Op, OpCode, Type,
        ValueId,
    },
    run_fixup, run_fixup_with, Result,
};

/// A function that stores a pipeline layout with `bindings` to `@{global}`.
fn layout_store(global: &str, bindings: &[DescriptorSetBinding]) -> Function {
    FunctionBuilder::new(format!("init_{global}"), &[Type::Device]).build_with(|f| {
        let device = f.arg(0);
        f.block(0, |b| {
            let dsl = b.descriptor_set_layout(device, bindings);
            let layout = b.pipeline_layout(device, &[dsl]);
            b.global_store(layout, global);
            b.ret();
        });
    })
}

fn module_with(functions: Vec<Function>) -> Module {
    let mut module = Module::new();
    for function in functions {
        module.add_function(function);
    }
    module
}

/// Lists the opcodes of `block`, in order.
fn opcodes(function: &Function, block: usize) -> Vec<OpCode> {
    function
        .block(BlockId::new(block))
        .map(|b| {
            b.ops()
                .iter()
                .filter_map(|&id| function.op(id))
                .map(Op::opcode)
                .collect()
        })
        .unwrap_or_default()
}

/// The command buffer created by the first `hal.command_buffer.create`.
fn first_command_buffer(function: &Function) -> ValueId {
    let create = function.find_ops(OpCode::CommandBufferCreate)[0];
    function
        .op(create)
        .and_then(Op::command_buffer)
        .expect("create defines a command buffer")
}

/// Two pushes of one buffer, the first through `@{first_layout}` at
/// `first`, the second through `@{second_layout}` at `second`.
fn two_pushes(
    first_layout: &str,
    first: (i64, i64),
    second_layout: &str,
    second: (i64, i64),
) -> Function {
    FunctionBuilder::new("record", &[Type::Device, Type::Buffer]).build_with(|f| {
        let device = f.arg(0);
        let buffer = f.arg(1);
        f.block(0, |b| {
            let l1 = b.global_load(first_layout, Type::PipelineLayout);
            let l2 = b.global_load(second_layout, Type::PipelineLayout);
            let cb = b.command_buffer_create(device);
            let (o1, n1) = (b.const_index(first.0), b.const_index(first.1));
            let (o2, n2) = (b.const_index(second.0), b.const_index(second.1));
            b.push_descriptor_set(cb, l1, 0, &[(buffer, o1, n1)]);
            b.push_descriptor_set(cb, l2, 0, &[(buffer, o2, n2)]);
            b.finalize(cb);
            b.ret();
        });
    })
}

/// bb0 -> bb1 (self loop) -> bb2 with one allocation and a full recording
/// sequence in the loop.
fn single_loop() -> Function {
    FunctionBuilder::new(
        "single_loop",
        &[
            Type::Device,
            Type::Allocator,
            Type::Executable,
            Type::Index,
            Type::Integer(1),
        ],
    )
    .build_with(|f| {
        let device = f.arg(0);
        let allocator = f.arg(1);
        let executable = f.arg(2);
        let size = f.arg(3);
        let cond = f.arg(4);
        f.block(0, |b| b.jump(1));
        f.block(1, |b| {
            b.allocate(allocator, size);
            let cb = b.command_buffer_create(device);
            b.dispatch(cb, executable, 0, [size, size, size]);
            b.finalize(cb);
            b.branch(cond, 1, 2);
        });
        f.block(2, |b| b.ret());
    })
}

#[test]
fn test_single_loop_is_hoisted_to_preheader() -> Result<()> {
    let mut module = module_with(vec![single_loop()]);

    let events = run_fixup(&mut module)?;

    let function = &module.functions[0];
    assert_eq!(
        opcodes(function, 0),
        vec![
            OpCode::AllocatorAllocate,
            OpCode::CommandBufferCreate,
            OpCode::Dispatch,
            OpCode::CommandBufferFinalize,
            OpCode::Branch,
        ]
    );
    assert_eq!(opcodes(function, 1), vec![OpCode::CondBranch]);
    assert_eq!(events.count_kind(EventKind::OperationHoisted), 4);
    assert_eq!(events.count_kind(EventKind::BarrierInserted), 0);
    Ok(())
}

#[test]
fn test_fixup_is_idempotent() -> Result<()> {
    let mut module = module_with(vec![single_loop()]);

    run_fixup(&mut module)?;
    let once = module.to_string();

    let events = run_fixup(&mut module)?;
    assert_eq!(module.to_string(), once);
    assert_eq!(events.transformations().count(), 0);
    Ok(())
}

#[test]
fn test_hoisted_command_ops_keep_order_across_blocks() -> Result<()> {
    // Two loop blocks each record into their own command buffer; all
    // recording lands in bb0 in original layout order.
    let mut function = FunctionBuilder::new("two_block_loop", &[Type::Device, Type::Integer(1)])
        .build_with(|f| {
            let device = f.arg(0);
            let cond = f.arg(1);
            f.block(0, |b| b.jump(1));
            f.block(1, |b| {
                let cb = b.command_buffer_create(device);
                b.finalize(cb);
                b.jump(2);
            });
            f.block(2, |b| {
                let cb = b.command_buffer_create(device);
                b.execution_barrier(cb);
                b.finalize(cb);
                b.branch(cond, 1, 3);
            });
            f.block(3, |b| b.ret());
        });
    let before: Vec<_> = function
        .op_ids()
        .into_iter()
        .filter(|&id| function.op(id).is_some_and(Op::is_command_stream))
        .collect();

    let loops = LoopAnalysis::new(&function)?;
    let events = EventLog::new();
    assert_eq!(hoist_command_ops(&mut function, &loops, &events)?, 5);

    let preheader = function.block(BlockId::new(0)).map(|b| b.ops().to_vec());
    let mut expected = before;
    expected.push(function.terminator(BlockId::new(0)).expect("bb0 keeps its jump"));
    assert_eq!(preheader, Some(expected));
    Ok(())
}

#[test]
fn test_loop_without_preheader_is_untouched() -> Result<()> {
    let arg_types = [Type::Allocator, Type::Index, Type::Integer(1)];
    let mut function = FunctionBuilder::new("two_entries", &arg_types).build_with(|f| {
        let allocator = f.arg(0);
        let size = f.arg(1);
        let cond = f.arg(2);
        f.block(0, |b| b.branch(cond, 1, 2));
        f.block(1, |b| b.jump(2));
        f.block(2, |b| {
            b.allocate(allocator, size);
            b.branch(cond, 2, 3);
        });
        f.block(3, |b| b.ret());
    });

    let loops = LoopAnalysis::new(&function)?;
    assert_eq!(loops.hoist_target(BlockId::new(2)), None);
    assert_eq!(hoist_allocations(&mut function, &loops, &EventLog::new())?, 0);
    assert_eq!(
        opcodes(&function, 2),
        vec![OpCode::AllocatorAllocate, OpCode::CondBranch]
    );
    Ok(())
}

#[test]
fn test_loop_after_loop_stays_in_place() -> Result<()> {
    // bb0 -> bb1 (self loop) -> bb2 (self loop) -> bb3; the second loop's
    // only outside predecessor is the first loop's body.
    let mut function = FunctionBuilder::new("sequential", &[Type::Device, Type::Integer(1)])
        .build_with(|f| {
            let device = f.arg(0);
            let cond = f.arg(1);
            f.block(0, |b| b.jump(1));
            f.block(1, |b| {
                let cb = b.command_buffer_create(device);
                b.finalize(cb);
                b.branch(cond, 1, 2);
            });
            f.block(2, |b| {
                let cb = b.command_buffer_create(device);
                b.finalize(cb);
                b.branch(cond, 2, 3);
            });
            f.block(3, |b| b.ret());
        });

    for _ in 0..2 {
        let loops = LoopAnalysis::new(&function)?;
        let events = EventLog::new();
        hoist_allocations(&mut function, &loops, &events)?;
        hoist_command_ops(&mut function, &loops, &events)?;
    }

    assert_eq!(
        opcodes(&function, 0),
        vec![
            OpCode::CommandBufferCreate,
            OpCode::CommandBufferFinalize,
            OpCode::Branch,
        ]
    );
    assert_eq!(opcodes(&function, 1), vec![OpCode::CondBranch]);
    assert_eq!(
        opcodes(&function, 2),
        vec![
            OpCode::CommandBufferCreate,
            OpCode::CommandBufferFinalize,
            OpCode::CondBranch,
        ]
    );

    let mut module = module_with(vec![function]);
    let events = run_fixup(&mut module)?;
    assert_eq!(events.transformations().count(), 0);
    Ok(())
}

#[test]
fn test_nested_loops_hoist_to_outermost_preheader() -> Result<()> {
    // bb0 -> bb1 (outer header) -> bb2 (inner self loop) -> bb3 (outer latch) -> bb4
    let arg_types = [Type::Allocator, Type::Index, Type::Integer(1)];
    let function = FunctionBuilder::new("nested", &arg_types).build_with(|f| {
        let allocator = f.arg(0);
        let size = f.arg(1);
        let cond = f.arg(2);
        f.block(0, |b| b.jump(1));
        f.block(1, |b| b.jump(2));
        f.block(2, |b| {
            b.allocate(allocator, size);
            b.branch(cond, 2, 3);
        });
        f.block(3, |b| b.branch(cond, 1, 4));
        f.block(4, |b| b.ret());
    });
    let mut module = module_with(vec![function]);

    run_fixup(&mut module)?;

    let function = &module.functions[0];
    assert_eq!(
        opcodes(function, 0),
        vec![OpCode::AllocatorAllocate, OpCode::Branch]
    );
    assert_eq!(opcodes(function, 2), vec![OpCode::CondBranch]);
    Ok(())
}

#[test]
fn test_overlapping_write_gets_exactly_one_barrier() -> Result<()> {
    let module = module_with(vec![layout_store("rw", &[DescriptorSetBinding::storage(0)])]);
    let layouts = LayoutBindings::scan(&module, &EventLog::new());
    let mut function = two_pushes("rw", (0, 64), "rw", (32, 64));

    let tracker = insert_barriers(&mut function, &layouts, &EventLog::new())?;

    assert_eq!(tracker.inserted_barriers().len(), 1);
    assert_eq!(function.find_ops(OpCode::ExecutionBarrier).len(), 1);

    let order = function.op_ids();
    let pushes = function.find_ops(OpCode::PushDescriptorSet);
    let barrier = tracker.inserted_barriers()[0];
    let at = order.iter().position(|&id| id == barrier).expect("barrier is placed");
    assert_eq!(order.get(at + 1), Some(&pushes[1]));
    assert!(at > order.iter().position(|&id| id == pushes[0]).expect("push is placed"));

    let cb = first_command_buffer(&function);
    assert_eq!(tracker.live(cb), &[AccessRecord::new(ValueId::new(1), true, 32, 64)]);
    Ok(())
}

#[test]
fn test_adjacent_ranges_are_treated_as_overlapping() -> Result<()> {
    let module = module_with(vec![
        layout_store("ro", &[DescriptorSetBinding::read_only(0)]),
        layout_store("rw", &[DescriptorSetBinding::storage(0)]),
    ]);
    let layouts = LayoutBindings::scan(&module, &EventLog::new());
    let mut function = two_pushes("ro", (0, 32), "rw", (32, 32));

    let events = EventLog::new();
    let tracker = insert_barriers(&mut function, &layouts, &events)?;

    assert_eq!(tracker.inserted_barriers().len(), 1);
    assert_eq!(events.count_kind(EventKind::BarrierInserted), 1);
    Ok(())
}

#[test]
fn test_disjoint_ranges_need_no_barrier() -> Result<()> {
    let module = module_with(vec![layout_store("rw", &[DescriptorSetBinding::storage(0)])]);
    let layouts = LayoutBindings::scan(&module, &EventLog::new());
    let mut function = two_pushes("rw", (0, 32), "rw", (33, 32));

    let tracker = insert_barriers(&mut function, &layouts, &EventLog::new())?;

    assert!(tracker.inserted_barriers().is_empty());
    assert_eq!(tracker.live(first_command_buffer(&function)).len(), 2);
    Ok(())
}

#[test]
fn test_live_sets_never_hold_conflicts() -> Result<()> {
    let module = module_with(vec![layout_store("rw", &[DescriptorSetBinding::storage(0)])]);
    let layouts = LayoutBindings::scan(&module, &EventLog::new());

    let ranges = [(0, 16), (8, 16), (64, 8), (100, 4), (70, 40), (200, 1), (0, 300)];
    let mut function = FunctionBuilder::new("many", &[Type::Device, Type::Buffer, Type::Buffer])
        .build_with(|f| {
            let device = f.arg(0);
            let a = f.arg(1);
            let c = f.arg(2);
            f.block(0, |b| {
                let layout = b.global_load("rw", Type::PipelineLayout);
                let cb = b.command_buffer_create(device);
                for (i, &(offset, length)) in ranges.iter().enumerate() {
                    let buffer = if i % 2 == 0 { a } else { c };
                    let o = b.const_index(offset);
                    let n = b.const_index(length);
                    b.push_descriptor_set(cb, layout, 0, &[(buffer, o, n)]);
                }
                b.ret();
            });
        });

    let tracker = insert_barriers(&mut function, &layouts, &EventLog::new())?;

    assert!(tracker.is_consistent());
    for cb in tracker.command_buffers() {
        let live = tracker.live(cb);
        for (i, a) in live.iter().enumerate() {
            for b in &live[i + 1..] {
                assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
            }
        }
    }
    Ok(())
}

#[test]
fn test_broken_layout_indirection_is_unresolved() -> Result<()> {
    let broken = FunctionBuilder::new("init", &[Type::Device]).build_with(|f| {
        let device = f.arg(0);
        f.block(0, |b| {
            let layout = b.generic("test.opaque_layout", &[device], &[Type::PipelineLayout]);
            b.global_store(layout[0], "rw");
            b.ret();
        });
    });
    let mut module = module_with(vec![broken, two_pushes("rw", (0, 64), "rw", (32, 64))]);

    let events = EventLog::new();
    let layouts = LayoutBindings::scan(&module, &events);
    assert!(layouts.get("rw").is_none());
    assert_eq!(events.warnings().count(), 1);

    let user = &module.functions[1];
    let loaded = user.find_ops(OpCode::GlobalLoad)[0];
    let loaded = user.op(loaded).map(Op::defs).expect("load is live")[0];
    assert_eq!(layouts.lookup(user, loaded), LayoutLookup::Unresolved);

    let tracker = insert_barriers(&mut module.functions[1], &layouts, &EventLog::new())?;
    assert_eq!(tracker.inserted_barriers().len(), 1);
    Ok(())
}

#[test]
fn test_existing_barrier_clears_live_set() -> Result<()> {
    let module = module_with(vec![layout_store("rw", &[DescriptorSetBinding::storage(0)])]);
    let layouts = LayoutBindings::scan(&module, &EventLog::new());
    let arg_types = [Type::Device, Type::Buffer];
    let mut function = FunctionBuilder::new("fenced", &arg_types).build_with(|f| {
        let device = f.arg(0);
        let buffer = f.arg(1);
        f.block(0, |b| {
            let layout = b.global_load("rw", Type::PipelineLayout);
            let cb = b.command_buffer_create(device);
            let zero = b.const_index(0);
            let len = b.const_index(64);
            b.push_descriptor_set(cb, layout, 0, &[(buffer, zero, len)]);
            b.execution_barrier(cb);
            b.push_descriptor_set(cb, layout, 0, &[(buffer, zero, len)]);
            b.ret();
        });
    });

    let tracker = insert_barriers(&mut function, &layouts, &EventLog::new())?;

    assert!(tracker.inserted_barriers().is_empty());
    assert_eq!(tracker.live(first_command_buffer(&function)).len(), 1);
    Ok(())
}

#[test]
fn test_dynamic_ranges_are_skipped() -> Result<()> {
    let module = module_with(vec![layout_store("rw", &[DescriptorSetBinding::storage(0)])]);
    let layouts = LayoutBindings::scan(&module, &EventLog::new());
    let mut function = FunctionBuilder::new("dynamic", &[Type::Device, Type::Buffer, Type::Index])
        .build_with(|f| {
            let device = f.arg(0);
            let buffer = f.arg(1);
            let offset = f.arg(2);
            f.block(0, |b| {
                let layout = b.global_load("rw", Type::PipelineLayout);
                let cb = b.command_buffer_create(device);
                let len = b.const_index(64);
                b.push_descriptor_set(cb, layout, 0, &[(buffer, offset, len)]);
                b.push_descriptor_set(cb, layout, 0, &[(buffer, offset, len)]);
                b.ret();
            });
        });

    let tracker = insert_barriers(&mut function, &layouts, &EventLog::new())?;

    assert!(tracker.inserted_barriers().is_empty());
    assert!(tracker.live(first_command_buffer(&function)).is_empty());
    Ok(())
}

#[test]
fn test_scalar_barrier_chain_collapses() -> Result<()> {
    let function = FunctionBuilder::new("chain", &[Type::Index]).build_with(|f| {
        let root = f.arg(0);
        f.block(0, |b| {
            let first = b.optimization_barrier(&[root]);
            let second = b.optimization_barrier(&first);
            let third = b.optimization_barrier(&second);
            b.ret_vals(&third);
        });
    });
    let mut module = module_with(vec![function]);

    let events = run_fixup(&mut module)?;

    let function = &module.functions[0];
    assert!(function.find_ops(OpCode::OptimizationBarrier).is_empty());
    let ret = function.terminator(BlockId::new(0)).expect("block is terminated");
    assert_eq!(function.op(ret).map(Op::uses), Some(vec![ValueId::new(0)]));
    assert_eq!(events.count_kind(EventKind::BarrierElided), 3);
    Ok(())
}

#[test]
fn test_mixed_type_barrier_is_kept() -> Result<()> {
    let function = FunctionBuilder::new("mixed", &[Type::Index, Type::Buffer]).build_with(|f| {
        let index = f.arg(0);
        let buffer = f.arg(1);
        f.block(0, |b| {
            let out = b.optimization_barrier(&[index, buffer]);
            b.ret_vals(&out);
        });
    });
    let mut module = module_with(vec![function]);

    let events = run_fixup(&mut module)?;

    assert_eq!(module.functions[0].find_ops(OpCode::OptimizationBarrier).len(), 1);
    assert!(!events.has(EventKind::BarrierElided));
    Ok(())
}

#[test]
fn test_pipeline_config_toggles_passes() -> Result<()> {
    let build = || {
        let chain = FunctionBuilder::new("chain", &[Type::Index]).build_with(|f| {
            let root = f.arg(0);
            f.block(0, |b| {
                let out = b.optimization_barrier(&[root]);
                b.ret_vals(&out);
            });
        });
        module_with(vec![chain, single_loop()])
    };

    let mut module = build();
    let config = PipelineConfig {
        enable_fixup: false,
        ..Default::default()
    };
    let events = run_fixup_with(&mut module, &config)?;
    assert_eq!(events.count_kind(EventKind::BarrierElided), 1);
    assert!(!events.has(EventKind::OperationHoisted));

    let mut module = build();
    let config = PipelineConfig {
        enable_pre_fixup: false,
        ..Default::default()
    };
    let events = run_fixup_with(&mut module, &config)?;
    assert!(!events.has(EventKind::BarrierElided));
    assert_eq!(events.count_kind(EventKind::OperationHoisted), 4);

    let mut module = build();
    let before = module.to_string();
    let pipeline = PassPipeline::from_config(&PipelineConfig::none());
    let changed = pipeline.run(&mut module, &EventLog::new())?;
    assert!(!changed);
    assert_eq!(module.to_string(), before);
    Ok(())
}

#[test]
fn test_layout_resolved_across_functions() -> Result<()> {
    // The layout is created in one function and used inside a loop in
    // another; after hoisting, the read-only pushes need no barrier.
    let user = FunctionBuilder::new("user", &[Type::Device, Type::Buffer, Type::Integer(1)])
        .build_with(|f| {
            let device = f.arg(0);
            let buffer = f.arg(1);
            let cond = f.arg(2);
            let mut consts = Vec::new();
            f.block(0, |b| {
                consts.push(b.const_index(0));
                consts.push(b.const_index(64));
                b.jump(1);
            });
            let (zero, len) = (consts[0], consts[1]);
            f.block(1, |b| {
                let layout = b.global_load("ro", Type::PipelineLayout);
                let cb = b.command_buffer_create(device);
                b.push_descriptor_set(cb, layout, 0, &[(buffer, zero, len)]);
                b.push_descriptor_set(cb, layout, 0, &[(buffer, zero, len)]);
                b.finalize(cb);
                b.branch(cond, 1, 2);
            });
            f.block(2, |b| b.ret());
        });
    let mut module = module_with(vec![
        layout_store("ro", &[DescriptorSetBinding::read_only(0)]),
        user,
    ]);

    let events = run_fixup(&mut module)?;

    assert!(events.has(EventKind::LayoutResolved));
    assert_eq!(events.count_kind(EventKind::OperationHoisted), 4);
    assert!(!events.has(EventKind::BarrierInserted));
    Ok(())
}
