//! Reference host for executing instrumented method bodies.
//!
//! The host is deliberately small: enough of a stack machine to run the bodies the
//! patch engine produces, including the dispatch call it emits, so that
//! instrumentation can be checked end to end.
//!
//! # Organization
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`value`] | [`Value`], the dynamically typed slot and stack value |
//! | [`object`] | [`HostObject`] and [`HeapObject`] |
//! | [`frame`] | [`Frame`], one activation |
//! | [`method_table`] | [`MethodTable`] of interpreted and native methods |
//! | [`interpreter`] | [`Runtime`] and its dispatch loop |
//! | [`error`] | [`ExecutionError`] |
//!
//! # Execution Flow
//!
//! ```text
//! Runtime::invoke(id, args)
//!     │
//!     ├─► MethodTable::resolve ──► Native ──► fn(&[Value])
//!     │
//!     └─► Body ──► Frame::new ──► step ... step ──► ret
//!                                   │
//!                                   └─► call Handlers::InvokeSafely
//!                                           └─► HandlerRegistry::invoke
//! ```

pub mod error;
pub mod frame;
pub mod interpreter;
pub mod method_table;
pub mod object;
pub mod value;

pub use error::ExecutionError;
pub use frame::Frame;
pub use interpreter::{Runtime, StepResult};
pub use method_table::{MethodImpl, MethodTable, NativeFn};
pub use object::{HeapObject, HostObject, ObjectRef};
pub use value::Value;
