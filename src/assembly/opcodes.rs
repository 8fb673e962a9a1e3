//! Operation codes of the machine-independent instruction set.
//!
//! The set mirrors the subset of CIL that instrumentation patches read and write:
//! argument, local and field access, constants, arithmetic and comparison, branches,
//! calls, object construction and method exit. Every opcode knows its control-flow
//! class, its functional category, the operand kind it expects and its fixed stack
//! effect (call-like opcodes derive theirs from the operand).

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::assembly::instruction::{FlowType, InstructionCategory, OperandKind, StackBehavior};

/// Operation code of an [`crate::assembly::Instruction`].
///
/// The `Display` form is the textual mnemonic (`ldarg`, `ldc.i4`, `brtrue`, ...).
///
/// # Examples
///
/// ```rust
/// use ilweave::assembly::{FlowType, OpCode};
///
/// assert_eq!(OpCode::LdcI4.to_string(), "ldc.i4");
/// assert_eq!(OpCode::Brfalse.flow_type(), FlowType::ConditionalBranch);
/// assert!(OpCode::Ret.is_terminal());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum OpCode {
    /// Do nothing
    Nop,
    /// Duplicate the top stack value
    Dup,
    /// Discard the top stack value
    Pop,
    /// Load argument
    Ldarg,
    /// Store argument
    Starg,
    /// Load local
    Ldloc,
    /// Store local
    Stloc,
    /// Load 32-bit integer constant
    #[strum(serialize = "ldc.i4")]
    LdcI4,
    /// Load 64-bit integer constant
    #[strum(serialize = "ldc.i8")]
    LdcI8,
    /// Load 64-bit float constant
    #[strum(serialize = "ldc.r8")]
    LdcR8,
    /// Load string literal
    Ldstr,
    /// Load null reference
    Ldnull,
    /// Load instance field
    Ldfld,
    /// Store instance field
    Stfld,
    /// Load static field
    Ldsfld,
    /// Store static field
    Stsfld,
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Division
    Div,
    /// Remainder
    Rem,
    /// Negation
    Neg,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise xor
    Xor,
    /// Bitwise not
    Not,
    /// Compare equal
    Ceq,
    /// Compare greater than
    Cgt,
    /// Compare less than
    Clt,
    /// Unconditional branch
    Br,
    /// Branch if true / non-zero / non-null
    Brtrue,
    /// Branch if false / zero / null
    Brfalse,
    /// Branch if equal
    Beq,
    /// Branch if not equal
    #[strum(serialize = "bne.un")]
    Bne,
    /// Branch if greater or equal
    Bge,
    /// Branch if greater than
    Bgt,
    /// Branch if less or equal
    Ble,
    /// Branch if less than
    Blt,
    /// Jump table
    Switch,
    /// Call a method
    Call,
    /// Call an instance method through its receiver
    Callvirt,
    /// Construct an object or an event-argument value
    Newobj,
    /// Return from the method
    Ret,
    /// Throw the top stack value
    Throw,
}

impl OpCode {
    /// Returns the mnemonic of this opcode.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// How this opcode affects control flow.
    #[must_use]
    pub const fn flow_type(self) -> FlowType {
        match self {
            OpCode::Br => FlowType::UnconditionalBranch,
            OpCode::Brtrue
            | OpCode::Brfalse
            | OpCode::Beq
            | OpCode::Bne
            | OpCode::Bge
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Blt => FlowType::ConditionalBranch,
            OpCode::Switch => FlowType::Switch,
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj => FlowType::Call,
            OpCode::Ret => FlowType::Return,
            OpCode::Throw => FlowType::Throw,
            _ => FlowType::Sequential,
        }
    }

    /// Functional classification of this opcode.
    #[must_use]
    pub const fn category(self) -> InstructionCategory {
        match self {
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Rem | OpCode::Neg => {
                InstructionCategory::Arithmetic
            }
            OpCode::And | OpCode::Or | OpCode::Xor | OpCode::Not => {
                InstructionCategory::BitwiseLogical
            }
            OpCode::Ceq | OpCode::Cgt | OpCode::Clt => InstructionCategory::Comparison,
            OpCode::Br
            | OpCode::Brtrue
            | OpCode::Brfalse
            | OpCode::Beq
            | OpCode::Bne
            | OpCode::Bge
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Blt
            | OpCode::Switch
            | OpCode::Call
            | OpCode::Callvirt
            | OpCode::Ret
            | OpCode::Throw => InstructionCategory::ControlFlow,
            OpCode::Ldarg
            | OpCode::Starg
            | OpCode::Ldloc
            | OpCode::Stloc
            | OpCode::LdcI4
            | OpCode::LdcI8
            | OpCode::LdcR8
            | OpCode::Ldstr
            | OpCode::Ldnull
            | OpCode::Ldsfld
            | OpCode::Stsfld => InstructionCategory::LoadStore,
            OpCode::Ldfld | OpCode::Stfld | OpCode::Newobj => InstructionCategory::ObjectModel,
            OpCode::Nop | OpCode::Dup | OpCode::Pop => InstructionCategory::Misc,
        }
    }

    /// The operand kind this opcode requires.
    ///
    /// `newobj` accepts either a constructor method or an event kind, reported here as
    /// [`OperandKind::Method`]; [`crate::assembly::Instruction::is_well_formed`] handles
    /// the event case.
    #[must_use]
    pub const fn operand_kind(self) -> OperandKind {
        match self {
            OpCode::Ldarg | OpCode::Starg => OperandKind::Argument,
            OpCode::Ldloc | OpCode::Stloc => OperandKind::Local,
            OpCode::LdcI4 => OperandKind::Int32,
            OpCode::LdcI8 => OperandKind::Int64,
            OpCode::LdcR8 => OperandKind::Float64,
            OpCode::Ldstr => OperandKind::String,
            OpCode::Ldfld | OpCode::Stfld | OpCode::Ldsfld | OpCode::Stsfld => OperandKind::Field,
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj => OperandKind::Method,
            OpCode::Br
            | OpCode::Brtrue
            | OpCode::Brfalse
            | OpCode::Beq
            | OpCode::Bne
            | OpCode::Bge
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Blt => OperandKind::Label,
            OpCode::Switch => OperandKind::Switch,
            _ => OperandKind::None,
        }
    }

    /// Fixed stack effect of this opcode.
    ///
    /// Returns `None` for opcodes whose effect depends on the operand or the enclosing
    /// method (`call`, `callvirt`, `newobj`, `ret`).
    #[must_use]
    pub const fn fixed_stack_behavior(self) -> Option<StackBehavior> {
        let (pops, pushes) = match self {
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj | OpCode::Ret => return None,
            OpCode::Nop | OpCode::Br => (0, 0),
            OpCode::Dup => (1, 2),
            OpCode::Pop
            | OpCode::Starg
            | OpCode::Stloc
            | OpCode::Stsfld
            | OpCode::Brtrue
            | OpCode::Brfalse
            | OpCode::Switch
            | OpCode::Throw => (1, 0),
            OpCode::Ldarg
            | OpCode::Ldloc
            | OpCode::LdcI4
            | OpCode::LdcI8
            | OpCode::LdcR8
            | OpCode::Ldstr
            | OpCode::Ldnull
            | OpCode::Ldsfld => (0, 1),
            OpCode::Ldfld | OpCode::Neg | OpCode::Not => (1, 1),
            OpCode::Stfld
            | OpCode::Beq
            | OpCode::Bne
            | OpCode::Bge
            | OpCode::Bgt
            | OpCode::Ble
            | OpCode::Blt => (2, 0),
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Rem
            | OpCode::And
            | OpCode::Or
            | OpCode::Xor
            | OpCode::Ceq
            | OpCode::Cgt
            | OpCode::Clt => (2, 1),
        };
        Some(StackBehavior::new(pops, pushes))
    }

    /// Returns `true` if execution never falls through to the next instruction.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::UnconditionalBranch | FlowType::Return | FlowType::Throw
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_mnemonics_round_trip_through_from_str() {
        for op in OpCode::iter() {
            assert_eq!(OpCode::from_str(op.mnemonic()).unwrap(), op);
        }
        assert_eq!(OpCode::Bne.mnemonic(), "bne.un");
        assert_eq!(OpCode::Callvirt.mnemonic(), "callvirt");
    }

    #[test]
    fn test_branch_opcodes_take_labels() {
        for op in OpCode::iter() {
            let branches = matches!(
                op.flow_type(),
                FlowType::ConditionalBranch | FlowType::UnconditionalBranch
            );
            assert_eq!(branches, op.operand_kind() == OperandKind::Label, "{op}");
        }
    }

    #[test]
    fn test_dynamic_stack_effects() {
        assert!(OpCode::Call.fixed_stack_behavior().is_none());
        assert!(OpCode::Ret.fixed_stack_behavior().is_none());
        let dup = OpCode::Dup.fixed_stack_behavior().unwrap();
        assert_eq!(dup.net_effect, 1);
        let stfld = OpCode::Stfld.fixed_stack_behavior().unwrap();
        assert_eq!((stfld.pops, stfld.pushes), (2, 0));
    }
}
