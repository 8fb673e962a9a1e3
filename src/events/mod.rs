//! Event kinds, event values, and the subscriber side of dispatch.
//!
//! This is the runtime half of the pipeline. Patched host methods build an
//! [`EventArgs`] value and hand it to the safe invoker, which walks the
//! [`HandlerRegistry`] list for its kind.
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`schema`] | [`EventSchema`], [`EventKind`] and the [`EventCatalog`] registration table |
//! | [`args`] | [`EventArgs`], the per-invocation value |
//! | [`registry`] | [`HandlerRegistry`] with snapshot subscription lists |
//! | [`invoker`] | [`invoke_safely`] and [`DispatchOutcome`] |
//!
//! # Dispatch Flow
//!
//! ```text
//! patched method ──► newobj <kind> ──► Handlers::InvokeSafely(list, ev)
//!                                              │
//!                         snapshot of list ◄───┘
//!                                │
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!       subscriber 1        subscriber 2  ...   subscriber N
//!   (Err / panic caught, logged, recorded; the next one still runs)
//!                                │
//!                                ▼
//!                  ldfld IsAllowed ──► brfalse cancel
//! ```

pub mod args;
pub mod invoker;
pub mod registry;
pub mod schema;

pub use args::EventArgs;
pub use invoker::{active_depth, invoke_safely, DispatchOutcome, SubscriberFailure};
pub use registry::{Callback, HandlerRegistry, RegistryStats, Subscription, SubscriptionId};
pub use schema::{EventCatalog, EventField, EventKind, EventSchema, FieldFlags, IS_ALLOWED};
