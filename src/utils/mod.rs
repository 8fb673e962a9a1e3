//! Shared helpers.
//!
//! - [`arena`] - Generational arena backing the reference host's object heap
//! - [`suggest`] - Edit-distance "did you mean" suggestions for resolution errors

pub mod arena;
pub mod suggest;
