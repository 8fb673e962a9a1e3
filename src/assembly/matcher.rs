//! Structural instruction predicates used to locate patch anchors.
//!
//! Anchors are never literal offsets counted from a landmark. A patch names the
//! instruction it is looking for ("the call to `Inventory::Drop`", "the store to
//! `Player::Health`") and the [`crate::assembly::Locator`] scans for it, failing loudly
//! if the host binary no longer contains it.
//!
//! # Available Matchers
//!
//! | Matcher | Description |
//! |---------|-------------|
//! | [`CodeMatch::Opcode`] | Any instruction with the given opcode |
//! | [`CodeMatch::Calls`] | `call` / `callvirt` / `newobj` of a method identity |
//! | [`CodeMatch::LoadsField`] / [`CodeMatch::StoresField`] | Field access, instance or static |
//! | [`CodeMatch::LoadsLocal`] / [`CodeMatch::StoresLocal`] | Local slot access |
//! | [`CodeMatch::LoadsArg`] / [`CodeMatch::StoresArg`] | Argument slot access |
//! | [`CodeMatch::Branch`] | Any branch instruction |
//! | [`CodeMatch::Return`] | `ret` |
//! | [`CodeMatch::HasLabel`] | The instruction a label is attached to |
//! | [`CodeMatch::AnyOf`] / [`CodeMatch::AllOf`] / [`CodeMatch::Not`] | Combinators |
//! | [`CodeMatch::custom`] | Closure predicate with a description |
//!
//! # Combining Matchers
//!
//! ```rust
//! use ilweave::assembly::{CodeMatch, FieldRef, Instruction, InstructionMatcher, TypeSig};
//!
//! let health = FieldRef::instance("Player", "Health", TypeSig::F64);
//! let query = CodeMatch::any_of([CodeMatch::LoadsField(health.clone()), CodeMatch::Return]);
//!
//! assert!(query.matches(&Instruction::load_field(health)));
//! assert!(query.matches(&Instruction::ret()));
//! assert!(!query.matches(&Instruction::nop()));
//! assert_eq!(query.description(), "(ldfld float64 Player::Health | ret)");
//! ```

use std::{fmt, sync::Arc};

use crate::assembly::{
    instruction::{Instruction, Label, Operand},
    opcodes::OpCode,
    types::{FieldRef, MethodId},
};

/// Type alias for closure predicates.
pub type InstructionPredicate = dyn Fn(&Instruction) -> bool + Send + Sync;

/// Trait for implementing instruction matchers.
///
/// Matchers must be `Send + Sync` so patch descriptors holding them can live in a
/// process-wide catalog.
pub trait InstructionMatcher: Send + Sync {
    /// Checks if this matcher matches the given instruction.
    fn matches(&self, instruction: &Instruction) -> bool;

    /// Returns a concise description of the query, used in anchor-not-found errors.
    fn description(&self) -> String;
}

/// Composable structural instruction query.
#[derive(Clone)]
pub enum CodeMatch {
    /// Matches any instruction with this opcode
    Opcode(OpCode),
    /// Matches `call`, `callvirt` and `newobj` of the given method
    Calls(MethodId),
    /// Matches `ldfld` / `ldsfld` of the given field
    LoadsField(FieldRef),
    /// Matches `stfld` / `stsfld` of the given field
    StoresField(FieldRef),
    /// Matches `ldloc` of the given slot
    LoadsLocal(u16),
    /// Matches `stloc` of the given slot
    StoresLocal(u16),
    /// Matches `ldarg` of the given slot
    LoadsArg(u16),
    /// Matches `starg` of the given slot
    StoresArg(u16),
    /// Matches any branch
    Branch,
    /// Matches `ret`
    Return,
    /// Matches the instruction the label is attached to
    HasLabel(Label),
    /// Matches if any inner matcher matches
    AnyOf(Vec<CodeMatch>),
    /// Matches if every inner matcher matches
    AllOf(Vec<CodeMatch>),
    /// Matches if the inner matcher does not
    Not(Box<CodeMatch>),
    /// Closure predicate plus its description
    Custom(Arc<InstructionPredicate>, String),
}

impl CodeMatch {
    /// Disjunction of `matchers`.
    #[must_use]
    pub fn any_of(matchers: impl IntoIterator<Item = CodeMatch>) -> Self {
        CodeMatch::AnyOf(matchers.into_iter().collect())
    }

    /// Conjunction of `matchers`.
    #[must_use]
    pub fn all_of(matchers: impl IntoIterator<Item = CodeMatch>) -> Self {
        CodeMatch::AllOf(matchers.into_iter().collect())
    }

    /// Negation of `matcher`.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(matcher: CodeMatch) -> Self {
        CodeMatch::Not(Box::new(matcher))
    }

    /// Closure predicate.
    #[must_use]
    pub fn custom<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Instruction) -> bool + Send + Sync + 'static,
    {
        CodeMatch::Custom(Arc::new(predicate), description.into())
    }
}

impl InstructionMatcher for CodeMatch {
    fn matches(&self, instruction: &Instruction) -> bool {
        match self {
            CodeMatch::Opcode(opcode) => instruction.opcode == *opcode,
            CodeMatch::Calls(id) => {
                matches!(
                    instruction.opcode,
                    OpCode::Call | OpCode::Callvirt | OpCode::Newobj
                ) && matches!(&instruction.operand, Operand::Method(m) if m.id == *id)
            }
            CodeMatch::LoadsField(field) => {
                matches!(instruction.opcode, OpCode::Ldfld | OpCode::Ldsfld)
                    && instruction
                        .operand
                        .as_field()
                        .is_some_and(|f| f.same_field(field))
            }
            CodeMatch::StoresField(field) => {
                matches!(instruction.opcode, OpCode::Stfld | OpCode::Stsfld)
                    && instruction
                        .operand
                        .as_field()
                        .is_some_and(|f| f.same_field(field))
            }
            CodeMatch::LoadsLocal(slot) => {
                instruction.opcode == OpCode::Ldloc && instruction.operand == Operand::Local(*slot)
            }
            CodeMatch::StoresLocal(slot) => {
                instruction.opcode == OpCode::Stloc && instruction.operand == Operand::Local(*slot)
            }
            CodeMatch::LoadsArg(slot) => {
                instruction.opcode == OpCode::Ldarg
                    && instruction.operand == Operand::Argument(*slot)
            }
            CodeMatch::StoresArg(slot) => {
                instruction.opcode == OpCode::Starg
                    && instruction.operand == Operand::Argument(*slot)
            }
            CodeMatch::Branch => instruction.is_branch(),
            CodeMatch::Return => instruction.opcode == OpCode::Ret,
            CodeMatch::HasLabel(label) => instruction.has_label(*label),
            CodeMatch::AnyOf(inner) => inner.iter().any(|m| m.matches(instruction)),
            CodeMatch::AllOf(inner) => inner.iter().all(|m| m.matches(instruction)),
            CodeMatch::Not(inner) => !inner.matches(instruction),
            CodeMatch::Custom(predicate, _) => predicate(instruction),
        }
    }

    fn description(&self) -> String {
        let join = |inner: &[CodeMatch], sep: &str| {
            let parts: Vec<String> = inner.iter().map(InstructionMatcher::description).collect();
            format!("({})", parts.join(sep))
        };
        match self {
            CodeMatch::Opcode(opcode) => opcode.to_string(),
            CodeMatch::Calls(id) => format!("call {id}"),
            CodeMatch::LoadsField(field) => {
                let op = if field.is_static { "ldsfld" } else { "ldfld" };
                format!("{op} {field}")
            }
            CodeMatch::StoresField(field) => {
                let op = if field.is_static { "stsfld" } else { "stfld" };
                format!("{op} {field}")
            }
            CodeMatch::LoadsLocal(slot) => format!("ldloc V_{slot}"),
            CodeMatch::StoresLocal(slot) => format!("stloc V_{slot}"),
            CodeMatch::LoadsArg(slot) => format!("ldarg A_{slot}"),
            CodeMatch::StoresArg(slot) => format!("starg A_{slot}"),
            CodeMatch::Branch => "any branch".to_string(),
            CodeMatch::Return => "ret".to_string(),
            CodeMatch::HasLabel(label) => format!("label {label}"),
            CodeMatch::AnyOf(inner) => join(inner, " | "),
            CodeMatch::AllOf(inner) => join(inner, " & "),
            CodeMatch::Not(inner) => format!("!{}", inner.description()),
            CodeMatch::Custom(_, description) => description.clone(),
        }
    }
}

impl fmt::Debug for CodeMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodeMatch({})", self.description())
    }
}

impl fmt::Display for CodeMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::types::{MethodRef, TypeSig};

    #[test]
    fn test_calls_matches_identity_only() {
        let drop = MethodRef::instance_method("Inventory", "Drop", vec![TypeSig::I32], TypeSig::Void);
        let other = MethodRef::instance_method("Inventory", "Drop", vec![], TypeSig::Void);
        let query = CodeMatch::Calls(drop.id.clone());
        assert!(query.matches(&Instruction::callvirt(drop)));
        assert!(!query.matches(&Instruction::callvirt(other)));
    }

    #[test]
    fn test_field_matchers_respect_direction() {
        let field = FieldRef::static_field("Round", "Ended", TypeSig::Bool);
        let load = Instruction::load_field(field.clone());
        let store = Instruction::store_field(field.clone());
        assert!(CodeMatch::LoadsField(field.clone()).matches(&load));
        assert!(!CodeMatch::LoadsField(field.clone()).matches(&store));
        assert!(CodeMatch::StoresField(field).matches(&store));
    }

    #[test]
    fn test_slot_matchers() {
        assert!(CodeMatch::LoadsArg(1).matches(&Instruction::ldarg(1)));
        assert!(!CodeMatch::LoadsArg(1).matches(&Instruction::ldarg(2)));
        assert!(!CodeMatch::LoadsArg(1).matches(&Instruction::ldloc(1)));
        assert!(CodeMatch::StoresLocal(0).matches(&Instruction::stloc(0)));
    }

    #[test]
    fn test_combinators() {
        let not_ret = CodeMatch::not(CodeMatch::Return);
        assert!(not_ret.matches(&Instruction::nop()));
        assert!(!not_ret.matches(&Instruction::ret()));

        let both = CodeMatch::all_of([CodeMatch::Opcode(OpCode::LdcI4), CodeMatch::custom("positive", |i| {
            matches!(i.operand, Operand::Int32(v) if v > 0)
        })]);
        assert!(both.matches(&Instruction::ldc_i4(3)));
        assert!(!both.matches(&Instruction::ldc_i4(-3)));
        assert_eq!(both.description(), "(ldc.i4 & positive)");
    }
}
