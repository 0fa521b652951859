//! Modules: named globals plus functions.

use std::fmt;

use crate::ir::{Function, Type};

/// A module-level global variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    /// Symbol name, referenced by global load/store operations.
    pub name: String,
    /// Type of the stored value.
    pub ty: Type,
}

/// A compilation unit: globals and functions.
///
/// Passes receive the module mutably and rewrite its functions in place.
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Declared globals.
    pub globals: Vec<Global>,
    /// Functions, in declaration order.
    pub functions: Vec<Function>,
}

impl Module {
    /// Creates an empty module.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a global and returns its name.
    pub fn add_global(&mut self, name: impl Into<String>, ty: Type) -> &str {
        self.globals.push(Global {
            name: name.into(),
            ty,
        });
        &self.globals[self.globals.len() - 1].name
    }

    /// Adds a function and returns its index.
    pub fn add_function(&mut self, function: Function) -> usize {
        self.functions.push(function);
        self.functions.len() - 1
    }

    /// Looks up a global by name.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Looks up a function by name.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name() == name)
    }

    /// Looks up a function by name, mutably.
    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name() == name)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for global in &self.globals {
            writeln!(f, "util.global @{} : {}", global.name, global.ty)?;
        }
        for (i, function) in self.functions.iter().enumerate() {
            if i > 0 || !self.globals.is_empty() {
                writeln!(f)?;
            }
            write!(f, "{function}")?;
        }
        Ok(())
    }
}
