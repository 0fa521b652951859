//! Pipeline-layout binding resolution.
//!
//! Push-descriptor-set operations reference their pipeline layout through a
//! module global: the layout is created once, stored to a global, and loaded
//! wherever it is used. This module precomputes, per global, the ordered
//! descriptor-set bindings of the layout stored there, so the hazard scan can
//! ask whether a binding permits writes.
//!
//! The traced chain is
//!
//! ```text
//! %dsl = hal.descriptor_set_layout.create ...   (bindings)
//! %pl  = hal.pipeline_layout.create %dev, [%dsl, ...]
//!        util.global.store %pl, @layout
//! ...
//! %l   = util.global.load @layout
//!        hal.command_buffer.push_descriptor_set %cb, %l, ...
//! ```
//!
//! Only the first set layout of a pipeline layout is consulted.

use std::collections::HashMap;

use crate::{
    compiler::{EventKind, EventLog},
    ir::{DescriptorSetBinding, Function, Module, Op, OpCode, Type, ValueDef, ValueId},
    Error, Result,
};

/// Outcome of looking up the layout used by a push operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutLookup<'a> {
    /// The layout was traced to its descriptor-set bindings.
    Resolved(&'a [DescriptorSetBinding]),
    /// The layout operand could not be traced to a recorded global.
    Unresolved,
}

impl LayoutLookup<'_> {
    /// Returns `true` if the binding at position `index` may be written.
    ///
    /// Unresolved layouts, and positions beyond the declared bindings, are
    /// treated as writable.
    #[must_use]
    pub fn is_writable(&self, index: usize) -> bool {
        match self {
            Self::Resolved(bindings) => bindings
                .get(index)
                .map_or(true, DescriptorSetBinding::is_writable),
            Self::Unresolved => true,
        }
    }

    /// Returns `true` if the layout was resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// Descriptor-set bindings of every pipeline layout stored to a global.
///
/// Built fresh for each use by [`LayoutBindings::scan`]; nothing is cached
/// across invocations.
///
/// # Examples
///
/// ```rust
/// use halfix::analysis::LayoutBindings;
/// use halfix::compiler::EventLog;
/// use halfix::ir::{DescriptorSetBinding, FunctionBuilder, Module, Type};
///
/// let init = FunctionBuilder::new("init", &[Type::Device]).build_with(|f| {
///     let device = f.arg(0);
///     f.block(0, |b| {
///         let dsl = b.descriptor_set_layout(
///             device,
///             &[DescriptorSetBinding::read_only(0), DescriptorSetBinding::storage(1)],
///         );
///         let layout = b.pipeline_layout(device, &[dsl]);
///         b.global_store(layout, "layout");
///         b.ret();
///     });
/// });
///
/// let mut module = Module::new();
/// module.add_global("layout", Type::PipelineLayout);
/// module.add_function(init);
///
/// let bindings = LayoutBindings::scan(&module, &EventLog::new());
/// let resolved = bindings.get("layout").unwrap();
/// assert!(!resolved[0].is_writable());
/// assert!(resolved[1].is_writable());
/// ```
#[derive(Debug, Clone, Default)]
pub struct LayoutBindings {
    layouts: HashMap<String, Vec<DescriptorSetBinding>>,
}

impl LayoutBindings {
    /// Creates an empty binding table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans every global store of a pipeline-layout value in `module`.
    ///
    /// Stores whose value does not trace back to a descriptor-set layout are
    /// skipped with a `Warning` event. When several stores target the same
    /// global, the last one in module order wins.
    #[must_use]
    pub fn scan(module: &Module, events: &EventLog) -> Self {
        let mut table = Self::new();

        for function in &module.functions {
            for store in function.find_ops(OpCode::GlobalStore) {
                let Some(Op::GlobalStore { value, global }) = function.op(store) else {
                    continue;
                };
                if function.value_type(*value) != Some(Type::PipelineLayout) {
                    continue;
                }

                match Self::resolve_chain(function, *value) {
                    Ok(bindings) => {
                        events
                            .record(EventKind::LayoutResolved)
                            .at(function.name(), store.index())
                            .message(format!("@{global}: {} binding(s)", bindings.len()));
                        table.layouts.insert(global.clone(), bindings.to_vec());
                    }
                    Err(err) => {
                        events
                            .record(EventKind::Warning)
                            .at(function.name(), store.index())
                            .message(format!("skipping layout stored to @{global}: {err}"));
                    }
                }
            }
        }

        table
    }

    /// Traces a pipeline-layout value to the bindings of its first set layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedShape`] if `layout` is not produced by a
    /// pipeline-layout creation, the creation has no set layouts, or its first
    /// set layout is not produced by a descriptor-set-layout creation.
    pub fn resolve_chain(function: &Function, layout: ValueId) -> Result<&[DescriptorSetBinding]> {
        let set_layouts = match function.defining(layout) {
            Some(Op::PipelineLayoutCreate { set_layouts, .. }) => set_layouts,
            other => return Err(shape(OpCode::PipelineLayoutCreate, function, layout, other)),
        };

        let first = *set_layouts.first().ok_or_else(|| Error::UnexpectedShape {
            expected: OpCode::DescriptorSetLayoutCreate.mnemonic(),
            found: "pipeline layout without set layouts".to_string(),
        })?;

        match function.defining(first) {
            Some(Op::DescriptorSetLayoutCreate { bindings, .. }) => Ok(bindings),
            other => Err(shape(OpCode::DescriptorSetLayoutCreate, function, first, other)),
        }
    }

    /// Returns the bindings recorded for `global`.
    #[must_use]
    pub fn get(&self, global: &str) -> Option<&[DescriptorSetBinding]> {
        self.layouts.get(global).map(Vec::as_slice)
    }

    /// Returns the number of recorded globals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Looks up the layout referenced by `layout` inside `function`.
    ///
    /// The value must be produced by a global load of a recorded global;
    /// anything else is [`LayoutLookup::Unresolved`].
    #[must_use]
    pub fn lookup(&self, function: &Function, layout: ValueId) -> LayoutLookup<'_> {
        match function.defining(layout) {
            Some(Op::GlobalLoad { global, .. }) => self
                .get(global)
                .map_or(LayoutLookup::Unresolved, LayoutLookup::Resolved),
            _ => LayoutLookup::Unresolved,
        }
    }
}

fn shape(expected: OpCode, function: &Function, value: ValueId, found: Option<&Op>) -> Error {
    let found = match found {
        Some(op) => op.name().to_string(),
        None => match function.value(value).and_then(|v| v.def()) {
            Some(ValueDef::BlockParam { .. }) => "block parameter".to_string(),
            _ => format!("undefined value {value}"),
        },
    };
    Error::UnexpectedShape {
        expected: expected.mnemonic(),
        found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::FunctionBuilder,
        test::{layout_init, LAYOUT_GLOBAL},
    };

    #[test]
    fn test_scan_records_bindings() {
        let mut module = Module::new();
        module.add_function(layout_init(&[
            DescriptorSetBinding::read_only(0),
            DescriptorSetBinding::storage(1),
        ]));

        let events = EventLog::new();
        let table = LayoutBindings::scan(&module, &events);

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(LAYOUT_GLOBAL).map(<[_]>::len), Some(2));
        assert_eq!(events.count_kind(EventKind::LayoutResolved), 1);
    }

    #[test]
    fn test_non_layout_store_is_ignored() {
        let function = FunctionBuilder::new("init", &[]).build_with(|f| {
            f.block(0, |b| {
                let size = b.const_index(16);
                b.global_store(size, "size");
                b.ret();
            });
        });
        let mut module = Module::new();
        module.add_function(function);

        let events = EventLog::new();
        let table = LayoutBindings::scan(&module, &events);
        assert!(table.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn test_broken_chain_is_skipped_with_warning() {
        let function = FunctionBuilder::new("init", &[Type::PipelineLayout]).build_with(|f| {
            let opaque = f.arg(0);
            f.block(0, |b| {
                b.global_store(opaque, "layout");
                b.ret();
            });
        });
        let mut module = Module::new();
        module.add_function(function);

        let events = EventLog::new();
        let table = LayoutBindings::scan(&module, &events);
        assert!(table.is_empty());
        assert_eq!(events.warnings().count(), 1);
    }

    #[test]
    fn test_resolve_chain_reports_shape() {
        let function = FunctionBuilder::new("f", &[Type::Device]).build_with(|f| {
            let device = f.arg(0);
            f.block(0, |b| {
                let layouts = b.generic("test.make_layouts", &[device], &[Type::DescriptorSetLayout]);
                let layout = b.pipeline_layout(device, &layouts);
                b.global_store(layout, "layout");
                b.ret();
            });
        });

        let layout = match function.op(function.find_ops(OpCode::GlobalStore)[0]) {
            Some(Op::GlobalStore { value, .. }) => *value,
            _ => unreachable!(),
        };
        match LayoutBindings::resolve_chain(&function, layout) {
            Err(Error::UnexpectedShape { expected, found }) => {
                assert_eq!(expected, "hal.descriptor_set_layout.create");
                assert_eq!(found, "test.make_layouts");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_lookup_through_global_load() {
        let user = FunctionBuilder::new("user", &[Type::PipelineLayout]).build_with(|f| {
            let direct = f.arg(0);
            f.block(0, |b| {
                let loaded = b.global_load("layout", Type::PipelineLayout);
                let missing = b.global_load("other", Type::PipelineLayout);
                b.generic("test.use", &[loaded, missing, direct], &[]);
                b.ret();
            });
        });

        let mut module = Module::new();
        module.add_function(layout_init(&[DescriptorSetBinding::read_only(0)]));
        module.add_function(user);

        let table = LayoutBindings::scan(&module, &EventLog::new());
        let user = &module.functions[1];

        let loaded = LayoutLookup::Resolved(table.get(LAYOUT_GLOBAL).unwrap());
        assert_eq!(table.lookup(user, ValueId::new(1)), loaded);
        assert!(!loaded.is_writable(0));
        assert!(loaded.is_writable(1));

        assert_eq!(table.lookup(user, ValueId::new(2)), LayoutLookup::Unresolved);
        assert_eq!(table.lookup(user, ValueId::new(0)), LayoutLookup::Unresolved);
        assert!(LayoutLookup::Unresolved.is_writable(0));
    }

    #[test]
    fn test_last_store_wins() {
        let mut module = Module::new();
        module.add_function(layout_init(&[DescriptorSetBinding::storage(0)]));
        module.add_function(layout_init(&[DescriptorSetBinding::read_only(0)]));

        let table = LayoutBindings::scan(&module, &EventLog::new());
        assert!(!table.get(LAYOUT_GLOBAL).unwrap()[0].is_writable());
    }
}
