//! Instruction representation, operand types, and control-flow metadata.
//!
//! This module defines the value model every other component works on. An
//! [`Instruction`] is an [`OpCode`], an [`Operand`], and the set of [`Label`]s currently
//! attached to it. Labels are identity handles, not positions: a branch names its
//! destination by label, and the label travels with whichever instruction represents
//! that destination. Inserting or removing instructions therefore never invalidates a
//! branch, which is what makes splicing safe.
//!
//! # Key Components
//!
//! - [`Instruction`] - One step of a method's instruction stream
//! - [`Operand`] - Type-safe operand representation
//! - [`Label`] - Opaque branch-target handle
//! - [`FlowType`] - Control flow behavior classification
//! - [`InstructionCategory`] - Functional instruction grouping
//! - [`StackBehavior`] - Stack effect metadata
//!
//! # Usage Examples
//!
//! ```rust
//! use ilweave::assembly::{Instruction, MethodBody, MethodRef, OpCode, TypeSig};
//!
//! let mut body = MethodBody::new(MethodRef::static_method("Host", "Run", vec![], TypeSig::Void));
//! let exit = body.define_label();
//!
//! let branch = Instruction::br(exit);
//! assert!(branch.is_branch());
//! assert_eq!(branch.branch_targets(), vec![exit]);
//!
//! let ret = Instruction::ret().with_label(exit);
//! assert!(ret.has_label(exit));
//! assert_eq!(ret.opcode, OpCode::Ret);
//! ```

use std::fmt;

use crate::{
    assembly::{
        opcodes::OpCode,
        types::{FieldRef, MethodRef, TypeSig},
    },
    events::EventKind,
};

/// Opaque branch-target handle.
///
/// A label owns no position. It is attached to whichever instruction currently
/// represents its destination, and it is allocated by the
/// [`crate::assembly::MethodBody`] it belongs to via
/// [`crate::assembly::MethodBody::define_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);

impl Label {
    pub(crate) const fn new(id: u32) -> Self {
        Label(id)
    }

    /// Returns the numeric identity of this label within its body.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Kinds of operands an opcode can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand present
    None,
    /// 32-bit integer literal
    Int32,
    /// 64-bit integer literal
    Int64,
    /// 64-bit float literal
    Float64,
    /// String literal
    String,
    /// Local variable slot
    Local,
    /// Argument slot
    Argument,
    /// Field reference
    Field,
    /// Method reference
    Method,
    /// Type reference
    Type,
    /// Event-argument kind
    Event,
    /// Branch label
    Label,
    /// Switch table of labels
    Switch,
}

/// An instruction operand.
///
/// # Examples
///
/// ```rust
/// use ilweave::assembly::{Operand, OperandKind};
///
/// let operand = Operand::Int32(42);
/// assert_eq!(operand.kind(), OperandKind::Int32);
/// assert_eq!(operand.to_string(), "42");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// 32-bit integer literal
    Int32(i32),
    /// 64-bit integer literal
    Int64(i64),
    /// 64-bit float literal
    Float64(f64),
    /// String literal
    String(String),
    /// Local variable slot
    Local(u16),
    /// Argument slot (slot 0 is `this` for instance methods)
    Argument(u16),
    /// Field reference
    Field(FieldRef),
    /// Method reference
    Method(MethodRef),
    /// Type reference
    Type(TypeSig),
    /// Event-argument kind constructed by `newobj`
    Event(EventKind),
    /// Branch label
    Label(Label),
    /// Switch table of labels
    Switch(Vec<Label>),
}

impl Operand {
    /// Returns the kind of this operand.
    #[must_use]
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::Int32(_) => OperandKind::Int32,
            Operand::Int64(_) => OperandKind::Int64,
            Operand::Float64(_) => OperandKind::Float64,
            Operand::String(_) => OperandKind::String,
            Operand::Local(_) => OperandKind::Local,
            Operand::Argument(_) => OperandKind::Argument,
            Operand::Field(_) => OperandKind::Field,
            Operand::Method(_) => OperandKind::Method,
            Operand::Type(_) => OperandKind::Type,
            Operand::Event(_) => OperandKind::Event,
            Operand::Label(_) => OperandKind::Label,
            Operand::Switch(_) => OperandKind::Switch,
        }
    }

    /// Labels referenced by this operand.
    #[must_use]
    pub fn labels(&self) -> Vec<Label> {
        match self {
            Operand::Label(label) => vec![*label],
            Operand::Switch(labels) => labels.clone(),
            _ => Vec::new(),
        }
    }

    /// Returns the field reference, if this is a field operand.
    #[must_use]
    pub fn as_field(&self) -> Option<&FieldRef> {
        match self {
            Operand::Field(field) => Some(field),
            _ => None,
        }
    }

    /// Returns the method reference, if this is a method operand.
    #[must_use]
    pub fn as_method(&self) -> Option<&MethodRef> {
        match self {
            Operand::Method(method) => Some(method),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Int32(v) => write!(f, "{v}"),
            Operand::Int64(v) => write!(f, "{v}"),
            Operand::Float64(v) => write!(f, "{v:?}"),
            Operand::String(s) => write!(f, "{s:?}"),
            Operand::Local(slot) => write!(f, "V_{slot}"),
            Operand::Argument(slot) => write!(f, "A_{slot}"),
            Operand::Field(field) => write!(f, "{field}"),
            Operand::Method(method) => write!(f, "{method}"),
            Operand::Type(ty) => write!(f, "{ty}"),
            Operand::Event(kind) => write!(f, "event {kind}"),
            Operand::Label(label) => write!(f, "{label}"),
            Operand::Switch(labels) => {
                f.write_str("(")?;
                for (i, label) in labels.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{label}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch
    Switch,
    /// Exception throwing
    Throw,
}

/// Stack effect of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of items popped from stack
    pub pops: u16,
    /// Number of items pushed to stack
    pub pushes: u16,
    /// Net effect on stack depth (pushes - pops)
    pub net_effect: i32,
}

impl StackBehavior {
    /// Creates a stack behavior from its pop and push counts.
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn new(pops: u16, pushes: u16) -> Self {
        Self {
            pops,
            pushes,
            net_effect: pushes as i32 - pops as i32,
        }
    }
}

/// Categorization of instructions by their primary function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionCategory {
    /// Arithmetic operations (add, sub, mul, div, rem, neg)
    Arithmetic,
    /// Bitwise and logical operations (and, or, xor, not)
    BitwiseLogical,
    /// Comparison operations (ceq, cgt, clt)
    Comparison,
    /// Control flow operations (br, switch, ret, call)
    ControlFlow,
    /// Load and store operations (ldloc, stsfld, ldarg)
    LoadStore,
    /// Object model operations (newobj, ldfld, stfld)
    ObjectModel,
    /// Miscellaneous operations (nop, dup, pop)
    Misc,
}

/// One step of a method's instruction stream.
///
/// Identity is immutable except through the splicer: the opcode and operand describe
/// what the instruction does, and `labels` records which branch targets currently
/// resolve to it. `labels` has set semantics, attaching a label twice is a no-op.
#[derive(Clone, PartialEq)]
pub struct Instruction {
    /// Operation code
    pub opcode: OpCode,
    /// Operand, [`Operand::None`] when the opcode takes none
    pub operand: Operand,
    /// Branch labels attached to this instruction
    pub labels: Vec<Label>,
}

impl Instruction {
    /// Creates an instruction without an operand.
    #[must_use]
    pub fn new(opcode: OpCode) -> Self {
        Self::with_operand(opcode, Operand::None)
    }

    /// Creates an instruction with the given operand.
    #[must_use]
    pub fn with_operand(opcode: OpCode, operand: Operand) -> Self {
        Self {
            opcode,
            operand,
            labels: Vec::new(),
        }
    }

    /// `nop`
    #[must_use]
    pub fn nop() -> Self {
        Self::new(OpCode::Nop)
    }

    /// `dup`
    #[must_use]
    pub fn dup() -> Self {
        Self::new(OpCode::Dup)
    }

    /// `pop`
    #[must_use]
    pub fn pop() -> Self {
        Self::new(OpCode::Pop)
    }

    /// `ldarg <slot>`
    #[must_use]
    pub fn ldarg(slot: u16) -> Self {
        Self::with_operand(OpCode::Ldarg, Operand::Argument(slot))
    }

    /// `starg <slot>`
    #[must_use]
    pub fn starg(slot: u16) -> Self {
        Self::with_operand(OpCode::Starg, Operand::Argument(slot))
    }

    /// `ldloc <slot>`
    #[must_use]
    pub fn ldloc(slot: u16) -> Self {
        Self::with_operand(OpCode::Ldloc, Operand::Local(slot))
    }

    /// `stloc <slot>`
    #[must_use]
    pub fn stloc(slot: u16) -> Self {
        Self::with_operand(OpCode::Stloc, Operand::Local(slot))
    }

    /// `ldc.i4 <value>`
    #[must_use]
    pub fn ldc_i4(value: i32) -> Self {
        Self::with_operand(OpCode::LdcI4, Operand::Int32(value))
    }

    /// `ldc.i8 <value>`
    #[must_use]
    pub fn ldc_i8(value: i64) -> Self {
        Self::with_operand(OpCode::LdcI8, Operand::Int64(value))
    }

    /// `ldc.r8 <value>`
    #[must_use]
    pub fn ldc_r8(value: f64) -> Self {
        Self::with_operand(OpCode::LdcR8, Operand::Float64(value))
    }

    /// `ldstr <value>`
    #[must_use]
    pub fn ldstr(value: impl Into<String>) -> Self {
        Self::with_operand(OpCode::Ldstr, Operand::String(value.into()))
    }

    /// `ldnull`
    #[must_use]
    pub fn ldnull() -> Self {
        Self::new(OpCode::Ldnull)
    }

    /// `ldfld` or `ldsfld`, depending on whether the field is static.
    #[must_use]
    pub fn load_field(field: FieldRef) -> Self {
        let opcode = if field.is_static {
            OpCode::Ldsfld
        } else {
            OpCode::Ldfld
        };
        Self::with_operand(opcode, Operand::Field(field))
    }

    /// `stfld` or `stsfld`, depending on whether the field is static.
    #[must_use]
    pub fn store_field(field: FieldRef) -> Self {
        let opcode = if field.is_static {
            OpCode::Stsfld
        } else {
            OpCode::Stfld
        };
        Self::with_operand(opcode, Operand::Field(field))
    }

    /// `call <method>`
    #[must_use]
    pub fn call(method: MethodRef) -> Self {
        Self::with_operand(OpCode::Call, Operand::Method(method))
    }

    /// `callvirt <method>`
    #[must_use]
    pub fn callvirt(method: MethodRef) -> Self {
        Self::with_operand(OpCode::Callvirt, Operand::Method(method))
    }

    /// `newobj <constructor>`
    #[must_use]
    pub fn newobj(ctor: MethodRef) -> Self {
        Self::with_operand(OpCode::Newobj, Operand::Method(ctor))
    }

    /// `newobj <event kind>`: builds an event-argument value from its fields.
    #[must_use]
    pub fn new_event(kind: EventKind) -> Self {
        Self::with_operand(OpCode::Newobj, Operand::Event(kind))
    }

    /// Any single-target branch opcode to `target`.
    #[must_use]
    pub fn branch(opcode: OpCode, target: Label) -> Self {
        Self::with_operand(opcode, Operand::Label(target))
    }

    /// `br <target>`
    #[must_use]
    pub fn br(target: Label) -> Self {
        Self::branch(OpCode::Br, target)
    }

    /// `brtrue <target>`
    #[must_use]
    pub fn brtrue(target: Label) -> Self {
        Self::branch(OpCode::Brtrue, target)
    }

    /// `brfalse <target>`
    #[must_use]
    pub fn brfalse(target: Label) -> Self {
        Self::branch(OpCode::Brfalse, target)
    }

    /// `switch (<targets>)`
    #[must_use]
    pub fn switch(targets: Vec<Label>) -> Self {
        Self::with_operand(OpCode::Switch, Operand::Switch(targets))
    }

    /// `ret`
    #[must_use]
    pub fn ret() -> Self {
        Self::new(OpCode::Ret)
    }

    /// `throw`
    #[must_use]
    pub fn throw() -> Self {
        Self::new(OpCode::Throw)
    }

    /// Returns this instruction with `label` attached.
    #[must_use]
    pub fn with_label(mut self, label: Label) -> Self {
        self.attach_label(label);
        self
    }

    /// Attaches `label` to this instruction. Attaching an already present label is a no-op.
    pub fn attach_label(&mut self, label: Label) {
        if !self.labels.contains(&label) {
            self.labels.push(label);
        }
    }

    /// Detaches and returns all labels of this instruction.
    pub fn take_labels(&mut self) -> Vec<Label> {
        std::mem::take(&mut self.labels)
    }

    /// Returns `true` if `label` is attached to this instruction.
    #[must_use]
    pub fn has_label(&self, label: Label) -> bool {
        self.labels.contains(&label)
    }

    /// How this instruction affects control flow.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        self.opcode.flow_type()
    }

    /// Functional category of this instruction.
    #[must_use]
    pub fn category(&self) -> InstructionCategory {
        self.opcode.category()
    }

    /// Check if this instruction is a branch instruction (conditional, unconditional, switch).
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Switch
        )
    }

    /// Check if execution never falls through past this instruction.
    ///
    /// This is the condition the final instruction of a method body must satisfy:
    /// a return, a throw, or an unconditional branch.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.opcode.is_terminal()
    }

    /// Labels this instruction can transfer control to. Empty for non-branches.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<Label> {
        if self.is_branch() {
            self.operand.labels()
        } else {
            Vec::new()
        }
    }

    /// Stack effect of this instruction.
    ///
    /// `returns_value` describes the enclosing method and only matters for `ret`.
    /// Calls derive their effect from the method operand, event construction from the
    /// number of fields the event kind declares.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn stack_behavior(&self, returns_value: bool) -> StackBehavior {
        if let Some(fixed) = self.opcode.fixed_stack_behavior() {
            return fixed;
        }
        match (self.opcode, &self.operand) {
            (OpCode::Ret, _) => StackBehavior::new(u16::from(returns_value), 0),
            (OpCode::Newobj, Operand::Event(kind)) => {
                StackBehavior::new(kind.schema().fields().len() as u16, 1)
            }
            (OpCode::Newobj, Operand::Method(ctor)) => {
                StackBehavior::new(ctor.id.params.len() as u16, 1)
            }
            (_, Operand::Method(method)) => StackBehavior::new(
                method.arg_count() as u16,
                u16::from(method.returns_value()),
            ),
            _ => StackBehavior::new(0, 0),
        }
    }

    /// Returns `true` if the operand kind matches what the opcode requires.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        let actual = self.operand.kind();
        match self.opcode {
            OpCode::Newobj => matches!(actual, OperandKind::Method | OperandKind::Event),
            OpCode::Ldfld | OpCode::Stfld => {
                matches!(&self.operand, Operand::Field(field) if !field.is_static)
            }
            OpCode::Ldsfld | OpCode::Stsfld => {
                matches!(&self.operand, Operand::Field(field) if field.is_static)
            }
            opcode => opcode.operand_kind() == actual,
        }
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.labels {
            write!(f, "{label}: ")?;
        }
        f.write_str(self.opcode.mnemonic())?;
        if !matches!(self.operand, Operand::None) {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}
