//! Load-time patching of method bodies.
//!
//! A [`PatchDescriptor`] names a target method and a [`Transpiler`] that rewrites it.
//! Descriptors are collected in a [`PatchCatalog`] and applied together, once, before
//! the host starts serving.
//!
//! # Organization
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`descriptor`] | [`Transpiler`] trait and [`PatchDescriptor`] |
//! | [`transpilers`] | [`EventPatch`], [`ReturnHook`], [`CallRedirect`] |
//! | [`catalog`] | [`PatchCatalog`] |
//! | [`report`] | [`PatchReport`] and [`PatchEvent`] |
//!
//! # Isolation
//!
//! ```text
//! original ──clone──► copy ──transpile──► validate ──verify──► install
//!     ▲                  │ any failure
//!     └── kept ◄─────────┘ logged + PatchEvent::Failed
//! ```

pub mod catalog;
pub mod descriptor;
pub mod report;
pub mod transpilers;

pub use catalog::PatchCatalog;
pub use descriptor::{PatchDescriptor, Transpiler};
pub use report::{PatchEvent, PatchReport};
pub use transpilers::{CallRedirect, EventPatch, ReturnHook};
