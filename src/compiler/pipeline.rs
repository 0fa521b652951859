//! Ordered pass pipeline and its configuration.
//!
//! The `PassPipeline` runs a fixed sequence of [`ModulePass`]es over a module,
//! each exactly once, and brackets every pass with `PassStarted` /
//! `PassCompleted` events.

use crate::{
    compiler::{
        pass::ModulePass,
        passes::{FixupPass, PreFixupPass},
        EventKind, EventLog,
    },
    ir::Module,
    Result,
};

/// Configuration for the standard fixup pipeline.
///
/// # Examples
///
/// ```rust
/// use halfix::compiler::{PassPipeline, PipelineConfig};
///
/// let config = PipelineConfig {
///     enable_pre_fixup: false,
///     ..Default::default()
/// };
/// let pipeline = PassPipeline::from_config(&config);
/// assert_eq!(pipeline.pass_names(), vec!["hal-fixup"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Run scalar optimization-barrier elision (default: true).
    pub enable_pre_fixup: bool,

    /// Run loop hoisting and hazard-barrier insertion (default: true).
    pub enable_fixup: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_pre_fixup: true,
            enable_fixup: true,
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with every pass disabled.
    #[must_use]
    pub fn none() -> Self {
        Self {
            enable_pre_fixup: false,
            enable_fixup: false,
        }
    }
}

/// Runs module passes once each, in insertion order.
#[derive(Default)]
pub struct PassPipeline {
    passes: Vec<Box<dyn ModulePass>>,
}

impl PassPipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the standard pipeline: pre-fixup, then fixup, each if enabled.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut pipeline = Self::new();
        if config.enable_pre_fixup {
            pipeline.add(PreFixupPass::new());
        }
        if config.enable_fixup {
            pipeline.add(FixupPass::new());
        }
        pipeline
    }

    /// Appends a pass.
    pub fn add<P: ModulePass + 'static>(&mut self, pass: P) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Returns the number of passes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Returns true if the pipeline has no passes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Returns the pass names, in execution order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Runs every pass once over `module`.
    ///
    /// # Arguments
    ///
    /// * `module` - The module to transform in place.
    /// * `events` - Log receiving pass bracketing events and everything the passes record.
    ///
    /// # Returns
    ///
    /// `true` if any pass changed the module, `false` otherwise.
    ///
    /// # Errors
    ///
    /// Returns the first error a pass reports; later passes are not run. The
    /// failure is also recorded as an [`EventKind::Error`] event.
    pub fn run(&self, module: &mut Module, events: &EventLog) -> Result<bool> {
        let mut changed = false;

        for pass in &self.passes {
            if !pass.should_run(module) {
                continue;
            }

            events
                .record(EventKind::PassStarted)
                .pass(pass.name())
                .message(pass.description());

            let pass_changed = match pass.run(module, events) {
                Ok(pass_changed) => pass_changed,
                Err(error) => {
                    events
                        .record(EventKind::Error)
                        .pass(pass.name())
                        .message(error.to_string());
                    return Err(error);
                }
            };
            changed |= pass_changed;

            events
                .record(EventKind::PassCompleted)
                .pass(pass.name())
                .message(if pass_changed { "changed" } else { "unchanged" });
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingPass {
        name: &'static str,
        runs: AtomicUsize,
        changes: bool,
    }

    impl CountingPass {
        fn new(name: &'static str, changes: bool) -> Self {
            Self {
                name,
                runs: AtomicUsize::new(0),
                changes,
            }
        }
    }

    impl ModulePass for CountingPass {
        fn name(&self) -> &'static str {
            self.name
        }

        fn run(&self, _module: &mut Module, _events: &EventLog) -> Result<bool> {
            self.runs.fetch_add(1, Ordering::Relaxed);
            Ok(self.changes)
        }
    }

    struct FailingPass;

    impl ModulePass for FailingPass {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn run(&self, _module: &mut Module, _events: &EventLog) -> Result<bool> {
            Err(malformed_error!("Block {} has no terminator", 3))
        }
    }

    struct SkippedPass;

    impl ModulePass for SkippedPass {
        fn name(&self) -> &'static str {
            "skipped"
        }

        fn should_run(&self, _module: &Module) -> bool {
            false
        }

        fn run(&self, _module: &mut Module, _events: &EventLog) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_default_config_order() {
        let pipeline = PassPipeline::from_config(&PipelineConfig::default());
        assert_eq!(pipeline.pass_names(), vec!["hal-pre-fixup", "hal-fixup"]);
    }

    #[test]
    fn test_disabled_config_is_empty() {
        let pipeline = PassPipeline::from_config(&PipelineConfig::none());
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_passes_run_in_order_and_are_bracketed() {
        let mut pipeline = PassPipeline::new();
        pipeline
            .add(CountingPass::new("first", false))
            .add(CountingPass::new("second", true));

        let mut module = Module::new();
        let events = EventLog::new();
        let changed = pipeline.run(&mut module, &events).unwrap();

        assert!(changed);
        assert_eq!(events.count_kind(EventKind::PassStarted), 2);
        assert_eq!(events.count_kind(EventKind::PassCompleted), 2);

        let started: Vec<_> = events
            .filter_kind(EventKind::PassStarted)
            .filter_map(|e| e.pass.clone())
            .collect();
        assert_eq!(started, vec!["first", "second"]);
    }

    #[test]
    fn test_failing_pass_records_error_and_stops() {
        let mut pipeline = PassPipeline::new();
        pipeline
            .add(FailingPass)
            .add(CountingPass::new("after", true));

        let mut module = Module::new();
        let events = EventLog::new();
        assert!(pipeline.run(&mut module, &events).is_err());
        assert_eq!(events.count_kind(EventKind::PassStarted), 1);

        let error = events.filter_kind(EventKind::Error).next().unwrap();
        assert_eq!(error.pass.as_deref(), Some("failing"));
        assert!(error.message.contains("has no terminator"));
        assert!(!events.has(EventKind::PassCompleted));
    }

    #[test]
    fn test_should_run_false_skips_pass() {
        let mut pipeline = PassPipeline::new();
        pipeline.add(SkippedPass);

        let mut module = Module::new();
        let events = EventLog::new();
        assert!(!pipeline.run(&mut module, &events).unwrap());
        assert!(events.is_empty());
    }
}
