use crate::ir::{BlockId, DescriptorSetBinding, Function, FunctionBuilder, OpCode, Type};

/// Name of the global the layout fixtures store their pipeline layout to.
pub const LAYOUT_GLOBAL: &str = "layout";

/// Builds an `init` function that stores a pipeline layout with `bindings` to `@layout`.
pub fn layout_init(bindings: &[DescriptorSetBinding]) -> Function {
    FunctionBuilder::new("init", &[Type::Device]).build_with(|f| {
        let device = f.arg(0);
        f.block(0, |b| {
            let dsl = b.descriptor_set_layout(device, bindings);
            let layout = b.pipeline_layout(device, &[dsl]);
            b.global_store(layout, LAYOUT_GLOBAL);
            b.ret();
        });
    })
}

/// Lists the opcodes of `block`, in order.
pub fn opcodes(function: &Function, block: usize) -> Vec<OpCode> {
    function
        .block(BlockId::new(block))
        .map(|b| {
            b.ops()
                .iter()
                .filter_map(|&id| function.op(id))
                .map(|op| op.opcode())
                .collect()
        })
        .unwrap_or_default()
}
