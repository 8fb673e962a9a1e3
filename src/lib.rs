// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # ilweave
//!
//! Load-time method instrumentation and cancellable events for game-server plugins.
//!
//! `ilweave` rewrites the bodies of host methods before the server starts serving, so
//! that interesting points (a door opening, a player taking damage, a round ending)
//! raise typed events. Plugins subscribe to those events, read and mutate their fields,
//! and may cancel the host action. A reference interpreter executes the rewritten
//! bodies so that all of this can be exercised without a real engine.
//!
//! ## Features
//!
//! - **Structural anchors** - find injection points by what instructions do, never by offset
//! - **Label-safe splicing** - inserted code takes over the labels branches target
//! - **Typed events** - schemas with ordered fields, mutability and a cancellation flag
//! - **Cancellation and feedback** - subscribers can deny an action or rewrite its inputs
//! - **Isolation** - a failing subscriber or a failing patch never takes down the rest
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use ilweave::prelude::*;
//!
//! // Door::Open(this) { this.IsOpen = true; }
//! let is_open = FieldRef::instance("Door", "IsOpen", TypeSig::Bool);
//! let mut body = MethodBody::new(MethodRef::instance_method("Door", "Open", vec![], TypeSig::Void));
//! body.extend([
//!     Instruction::ldarg(0),
//!     Instruction::ldc_i4(1),
//!     Instruction::store_field(is_open.clone()),
//!     Instruction::ret(),
//! ]);
//! let target = body.id().clone();
//! let mut methods = MethodTable::new();
//! methods.insert_body(body);
//!
//! // Raise "OpeningDoor" on entry; subscribers may cancel.
//! let opening = EventKind::new(
//!     EventSchema::new("OpeningDoor").actor("Door", TypeSig::named("Door")).cancellable(),
//! )?;
//! let hook = EventHook::new(opening.clone())
//!     .bind("Door", ValueSource::Argument(0))
//!     .cancel_to(CancelTarget::default());
//!
//! let mut catalog = PatchCatalog::new();
//! catalog.register(PatchDescriptor::new("door-open", target.clone(), EventPatch::prologue(hook)));
//! assert!(catalog.apply_all(&mut methods)?.is_clean());
//!
//! let registry = Arc::new(HandlerRegistry::new());
//! registry.subscribe(&opening, "lockdown", |ev| Ok(ev.deny()?));
//!
//! let mut runtime = Runtime::with_registry(methods, registry);
//! let door = runtime.alloc(HostObject::new("Door"));
//! runtime.invoke(&target, vec![Value::Object(door)])?;
//! assert_eq!(runtime.object(door).and_then(|d| d.field("IsOpen")), None);
//! # Ok::<(), ilweave::Error>(())
//! ```
//!
//! ## Architecture
//!
//! | Module | Role |
//! |--------|------|
//! | [`assembly`] | Instruction model, method bodies, anchors, splicing, stack verification |
//! | [`events`] | Event schemas, event values, handler registry, safe invocation |
//! | [`emit`] | Code generation for construct, dispatch, cancellation gate and feedback |
//! | [`patch`] | Transpilers, patch descriptors, the catalog and its report |
//! | [`runtime`] | Reference host interpreter |
//! | [`config`] | Dispatch, patching and execution settings |
//!
//! ```text
//! PatchCatalog::apply_all
//!     │ per descriptor, on a copy of the body
//!     ├─► Anchor::resolve ──► EventHook::emit_at ──► MethodBody::validate ──► stack::verify
//!     └─► MethodTable::install
//!
//! Runtime::invoke ──► newobj <event> ──► Handlers::InvokeSafely ──► subscribers
//!                                             │
//!                                  IsAllowed? ├─ no ──► early return
//!                                             └─ yes ─► feedback ──► original code
//! ```
//!
//! ## Logging
//!
//! `ilweave` emits [`tracing`] events and never installs a subscriber. Applied patches
//! log at `info`, failed patches and failing subscribers at `error`, reentrancy
//! cut-offs and slow subscribers at `warn`, dispatch at `debug`.
//!
//! ## Error Handling
//!
//! Load-time failures are [`Error`] values and are fatal for one patch only; the
//! catalog reports them and keeps the original body. Subscriber failures never become
//! errors; they are collected in [`events::DispatchOutcome`].
//!
//! ```rust
//! use ilweave::{assembly::MethodId, runtime::MethodTable, Error};
//!
//! let methods = MethodTable::new();
//! match methods.resolve(&MethodId::new("Round", "End", vec![])) {
//!     Err(Error::MethodNotFound { method, .. }) => assert_eq!(method, "Round::End()"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types.
///
/// ```rust
/// use ilweave::prelude::*;
///
/// let kind = EventKind::new(EventSchema::new("RoundEnded"))?;
/// assert!(!kind.is_cancellable());
/// # Ok::<(), ilweave::Error>(())
/// ```
pub mod prelude;

pub mod assembly;
pub mod config;
pub mod emit;
pub mod events;
pub mod patch;
pub mod runtime;
pub mod utils;

/// `ilweave` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `ilweave` Error type
///
/// The main error type for all operations in this crate. Load-time authoring errors,
/// lookup failures and reference-host execution errors are variants of it.
pub use error::Error;
