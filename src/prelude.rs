//! # ilweave Prelude
//!
//! The types needed to define events, write patches, subscribe and run the reference
//! host, in one glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all ilweave operations
pub use crate::Error;

/// The result type used throughout ilweave
pub use crate::Result;

/// Configuration
pub use crate::config::{DispatchConfig, ExecutionLimits, FrameworkConfig, PatchConfig};

// ================================================================================================
// Instruction Model
// ================================================================================================

/// Instructions, method bodies and references
pub use crate::assembly::{
    FieldRef, Instruction, Label, MethodBody, MethodId, MethodRef, OpCode, Operand, TypeSig,
};

/// Structural anchors
pub use crate::assembly::{Anchor, CodeMatch, Locator};

// ================================================================================================
// Events
// ================================================================================================

/// Event kinds, values and subscription
pub use crate::events::{
    DispatchOutcome, EventArgs, EventCatalog, EventKind, EventSchema, HandlerRegistry,
    SubscriptionId,
};

// ================================================================================================
// Instrumentation
// ================================================================================================

/// Hook construction
pub use crate::emit::{CancelTarget, Constant, EventHook, HostSlot, ValueSource};

/// Patches
pub use crate::patch::{
    CallRedirect, EventPatch, PatchCatalog, PatchDescriptor, PatchReport, ReturnHook, Transpiler,
};

// ================================================================================================
// Reference Host
// ================================================================================================

/// Interpreter and its values
pub use crate::runtime::{HostObject, MethodTable, ObjectRef, Runtime, Value};
