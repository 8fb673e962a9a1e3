//! Code emitters for event hooks.
//!
//! Each emitter produces a short, stack-neutral instruction sequence in the host calling
//! convention. They are used by transpilers at load time and never at runtime.
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`source`] | [`ValueSource`] loads and [`HostSlot`] stores |
//! | [`args`] | [`EventArgsEmitter`], event value construction |
//! | [`dispatch`] | Dispatch call, cancellation gate and early-return blocks |
//! | [`feedback`] | [`FeedbackEmitter`], copying mutable fields back to the host |
//! | [`hook`] | [`EventHook`], all of the above spliced around one anchor |

pub mod args;
pub mod dispatch;
pub mod feedback;
pub mod hook;
pub mod source;

pub use args::{ArgsStorage, EmittedArgs, EventArgsEmitter};
pub use dispatch::{
    emit_early_return, handlers_field, invoke_safely_method, Allowed, CancelTarget, Constructed,
    Dispatched, HANDLERS_TYPE, INVOKE_SAFELY, SUBSCRIBERS_TYPE,
};
pub use feedback::FeedbackEmitter;
pub use hook::{EventHook, HookSite};
pub use source::{load_default, Constant, HostSlot, ValueSource};
