//! Fixup passes for command-recording IR.
//!
//! # Available Passes
//!
//! | Pass | Name | Effect |
//! |------|------|--------|
//! | [`PreFixupPass`] | `hal-pre-fixup` | Removes optimization barriers over index values |
//! | [`FixupPass`] | `hal-fixup` | Hoists command recording out of loops, inserts hazard barriers |
//!
//! The building blocks of `hal-fixup` are exposed as free functions so they
//! can be driven and inspected individually:
//!
//! - [`hoist_allocations`] / [`hoist_command_ops`] - loop-invariant hoisting
//! - [`insert_barriers`] - hazard scan returning a [`HazardTracker`]
//! - [`elide_scalar_barriers`] - the body of `hal-pre-fixup`

mod barriers;
mod elide;
mod fixup;
mod hoist;

pub use barriers::{
    hazard_barrier, insert_barriers, AccessRecord, HazardTracker, HAZARD_SOURCE_STAGES,
    HAZARD_TARGET_STAGES,
};
pub use elide::{elide_scalar_barriers, PreFixupPass};
pub use fixup::FixupPass;
pub use hoist::{hoist_allocations, hoist_command_ops};
