//! Method bodies: the unit a patch rewrites.
//!
//! A [`MethodBody`] is the ordered instruction list of one host method together with
//! its signature, its local-variable declarations and the allocator for its branch
//! labels. It is owned by the patch catalog for the duration of a rewrite and handed
//! back to the method table afterwards.
//!
//! # Invariants
//!
//! [`MethodBody::validate`] checks everything a body must satisfy before it may be
//! installed:
//!
//! - every instruction's operand fits its opcode
//! - every label is attached to at most one instruction
//! - every label used as a branch operand is attached to exactly one instruction
//! - local and argument slots referenced by operands are declared
//! - the body is non-empty and its last instruction is terminal

use std::collections::{HashMap, HashSet};

use crate::{
    assembly::{
        instruction::{Instruction, Label, Operand},
        types::{MethodId, MethodRef, TypeSig},
    },
    Error, Result,
};

/// A declared local variable slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    /// Slot index used by `ldloc` / `stloc`
    pub slot: u16,
    /// Declared type
    pub ty: TypeSig,
}

/// The instruction stream of one method plus its declarations.
///
/// # Examples
///
/// ```rust
/// use ilweave::assembly::{Instruction, MethodBody, MethodRef, TypeSig};
///
/// let method = MethodRef::static_method("Round", "Score", vec![TypeSig::I32], TypeSig::I32);
/// let mut body = MethodBody::new(method);
/// body.push(Instruction::ldarg(0));
/// body.push(Instruction::ret());
/// body.validate()?;
/// assert_eq!(body.len(), 2);
/// # Ok::<(), ilweave::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    method: MethodRef,
    instructions: Vec<Instruction>,
    locals: Vec<LocalVariable>,
    next_label: u32,
}

impl MethodBody {
    /// Creates an empty body for `method`.
    #[must_use]
    pub fn new(method: MethodRef) -> Self {
        Self {
            method,
            instructions: Vec::new(),
            locals: Vec::new(),
            next_label: 0,
        }
    }

    /// Appends an instruction.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Appends several instructions.
    pub fn extend(&mut self, instructions: impl IntoIterator<Item = Instruction>) {
        self.instructions.extend(instructions);
    }

    /// The instruction stream, in execution order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub(crate) fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the body holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instruction at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Declared locals.
    #[must_use]
    pub fn locals(&self) -> &[LocalVariable] {
        &self.locals
    }

    /// Declares a fresh local of type `ty` and returns its slot.
    #[allow(clippy::cast_possible_truncation)]
    pub fn declare_local(&mut self, ty: TypeSig) -> u16 {
        let slot = self.locals.len() as u16;
        self.locals.push(LocalVariable { slot, ty });
        slot
    }

    /// Allocates a new label. The label is attached to nothing until the caller does so.
    pub fn define_label(&mut self) -> Label {
        let label = Label::new(self.next_label);
        self.next_label += 1;
        label
    }

    /// The method this body belongs to.
    #[must_use]
    pub fn method(&self) -> &MethodRef {
        &self.method
    }

    /// Identity of the method this body belongs to.
    #[must_use]
    pub fn id(&self) -> &MethodId {
        &self.method.id
    }

    /// Declared return type.
    #[must_use]
    pub fn returns(&self) -> &TypeSig {
        &self.method.returns
    }

    /// Returns `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.method.is_static
    }

    /// Number of argument slots, including `this` for instance methods.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.method.arg_count()
    }

    /// Maps every attached label to the index of its instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateLabel`] if a label is attached to more than one instruction.
    pub fn label_positions(&self) -> Result<HashMap<Label, usize>> {
        let mut positions = HashMap::new();
        for (index, instr) in self.instructions.iter().enumerate() {
            for &label in &instr.labels {
                if positions.insert(label, index).is_some() {
                    return Err(Error::DuplicateLabel(label));
                }
            }
        }
        Ok(positions)
    }

    /// Every label used as a branch operand in this body.
    #[must_use]
    pub fn referenced_labels(&self) -> HashSet<Label> {
        self.instructions
            .iter()
            .flat_map(|instr| instr.operand.labels())
            .collect()
    }

    /// Referenced labels that are not attached to any instruction, in sorted order.
    #[must_use]
    pub fn unattached_labels(&self) -> Vec<Label> {
        let attached: HashSet<Label> = self
            .instructions
            .iter()
            .flat_map(|instr| instr.labels.iter().copied())
            .collect();
        let mut dangling: Vec<Label> = self
            .referenced_labels()
            .into_iter()
            .filter(|label| !attached.contains(label))
            .collect();
        dangling.sort_unstable();
        dangling
    }

    /// Checks the structural invariants of this body.
    ///
    /// # Errors
    ///
    /// - [`Error::Malformed`] for an operand that does not fit its opcode or an undeclared slot
    /// - [`Error::DuplicateLabel`] for a label attached twice
    /// - [`Error::DanglingLabel`] for a branch to an unattached label
    /// - [`Error::InvalidTerminal`] for an empty body or a non-terminal last instruction
    pub fn validate(&self) -> Result<()> {
        let arg_count = self.arg_count();
        for (index, instr) in self.instructions.iter().enumerate() {
            if !instr.is_well_formed() {
                return Err(malformed_error!(
                    "instruction {} '{}' has an operand of kind {:?}",
                    index,
                    instr,
                    instr.operand.kind()
                ));
            }
            match instr.operand {
                Operand::Local(slot) if usize::from(slot) >= self.locals.len() => {
                    return Err(malformed_error!(
                        "instruction {} uses undeclared local {}",
                        index,
                        slot
                    ));
                }
                Operand::Argument(slot) if usize::from(slot) >= arg_count => {
                    return Err(malformed_error!(
                        "instruction {} uses argument {} but {} takes {}",
                        index,
                        slot,
                        self.method.id,
                        arg_count
                    ));
                }
                _ => {}
            }
        }

        self.label_positions()?;
        if let Some(&label) = self.unattached_labels().first() {
            return Err(Error::DanglingLabel(label));
        }

        match self.instructions.last() {
            Some(last) if last.is_terminal() => Ok(()),
            _ => Err(Error::InvalidTerminal {
                method: self.method.id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::types::FieldRef;

    fn store_method() -> MethodBody {
        let mut body = MethodBody::new(MethodRef::static_method(
            "Host",
            "Store",
            vec![TypeSig::I32],
            TypeSig::Void,
        ));
        body.push(Instruction::ldarg(0));
        body.push(Instruction::store_field(FieldRef::static_field(
            "Host",
            "A",
            TypeSig::I32,
        )));
        body.push(Instruction::ret());
        body
    }

    #[test]
    fn test_valid_body() {
        assert!(store_method().validate().is_ok());
    }

    #[test]
    fn test_missing_terminal() {
        let mut body = store_method();
        body.instructions_mut().pop();
        assert!(matches!(body.validate(), Err(Error::InvalidTerminal { .. })));

        let empty = MethodBody::new(body.method().clone());
        assert!(matches!(empty.validate(), Err(Error::InvalidTerminal { .. })));
    }

    #[test]
    fn test_dangling_label() {
        let mut body = store_method();
        let target = body.define_label();
        body.instructions_mut().insert(0, Instruction::br(target));
        assert!(matches!(body.validate(), Err(Error::DanglingLabel(l)) if l == target));
        assert_eq!(body.unattached_labels(), vec![target]);

        body.instructions_mut()[3].attach_label(target);
        assert!(body.validate().is_ok());
    }

    #[test]
    fn test_duplicate_label() {
        let mut body = store_method();
        let label = body.define_label();
        body.instructions_mut()[0].attach_label(label);
        body.instructions_mut()[2].attach_label(label);
        assert!(matches!(body.validate(), Err(Error::DuplicateLabel(_))));
    }

    #[test]
    fn test_undeclared_slots() {
        let mut body = store_method();
        body.instructions_mut().insert(0, Instruction::ldloc(0));
        body.instructions_mut().insert(1, Instruction::pop());
        assert!(matches!(body.validate(), Err(Error::Malformed { .. })));

        body.declare_local(TypeSig::I32);
        assert!(body.validate().is_ok());

        body.instructions_mut().insert(0, Instruction::starg(1));
        assert!(matches!(body.validate(), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_labels_are_unique() {
        let mut body = store_method();
        let a = body.define_label();
        let b = body.define_label();
        assert_ne!(a, b);
    }
}
