//! Instruction model, anchor lookup and label-preserving splicing.
//!
//! This module is the load-time half of the instrumentation pipeline. It provides a
//! value representation of a method's instruction stream and the tools a transpiler
//! uses to rewrite it without breaking control flow.
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Type signatures and method / field identities |
//! | [`opcodes`] | The [`OpCode`] set and its static metadata |
//! | [`instruction`] | [`Instruction`], [`Operand`] and [`Label`] |
//! | [`body`] | [`MethodBody`] and its validation |
//! | [`stack`] | Evaluation-stack depth analysis |
//! | [`matcher`] | Structural instruction queries |
//! | [`locator`] | [`Locator`] and [`Anchor`] |
//! | [`splicer`] | Insert, remove and replace with label retargeting |
//!
//! # Rewrite Flow
//!
//! ```text
//! MethodBody ──► Anchor::resolve ──► index
//!                                      │
//!                     emitters build   ▼
//!                  Vec<Instruction> ──► splicer::insert / replace
//!                                      │
//!                                      ▼
//!                    MethodBody::validate + stack::verify
//! ```
//!
//! # Examples
//!
//! ```rust
//! use ilweave::assembly::{splicer, Anchor, CodeMatch, Instruction, MethodBody, MethodRef, TypeSig};
//!
//! let mut body = MethodBody::new(MethodRef::static_method("Host", "Tick", vec![], TypeSig::Void));
//! body.extend([Instruction::nop(), Instruction::ret()]);
//!
//! let at = Anchor::last(CodeMatch::Return).resolve(&body)?;
//! splicer::insert_taking_labels(&mut body, at, vec![Instruction::ldc_i4(1), Instruction::pop()])?;
//! body.validate()?;
//! assert_eq!(body.len(), 4);
//! # Ok::<(), ilweave::Error>(())
//! ```

pub mod body;
pub mod instruction;
pub mod locator;
pub mod matcher;
pub mod opcodes;
pub mod splicer;
pub mod stack;
pub mod types;

pub use body::{LocalVariable, MethodBody};
pub use instruction::{
    FlowType, Instruction, InstructionCategory, Label, Operand, OperandKind, StackBehavior,
};
pub use locator::{Anchor, Direction, Locator};
pub use matcher::{CodeMatch, InstructionMatcher, InstructionPredicate};
pub use opcodes::OpCode;
pub use types::{FieldRef, MethodId, MethodRef, TypeSig};
