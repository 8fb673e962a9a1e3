//! Where emitted code reads host values from and writes them back to.
//!
//! [`ValueSource`] describes a load (event-argument construction), [`HostSlot`] a store
//! (value feedback). Both expand to plain instruction sequences that follow the host
//! calling convention: argument 0 is `this` for instance methods, and instance fields
//! are addressed through an owner value loaded first.

use crate::{
    assembly::{
        instruction::Instruction,
        types::{FieldRef, MethodRef, TypeSig},
    },
    Result,
};

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `ldnull`
    Null,
    /// `ldc.i4 0 / 1`
    Bool(bool),
    /// `ldc.i4`
    I32(i32),
    /// `ldc.i8`
    I64(i64),
    /// `ldc.r8`
    F64(f64),
    /// `ldstr`
    Str(String),
}

impl Constant {
    /// The load instruction for this constant.
    #[must_use]
    pub fn load(&self) -> Instruction {
        match self {
            Constant::Null => Instruction::ldnull(),
            Constant::Bool(b) => Instruction::ldc_i4(i32::from(*b)),
            Constant::I32(v) => Instruction::ldc_i4(*v),
            Constant::I64(v) => Instruction::ldc_i8(*v),
            Constant::F64(v) => Instruction::ldc_r8(*v),
            Constant::Str(s) => Instruction::ldstr(s.as_str()),
        }
    }

    /// Returns `true` if this constant can be stored in a slot of type `ty`.
    #[must_use]
    pub fn fits(&self, ty: &TypeSig) -> bool {
        match self {
            Constant::Null => ty.is_reference(),
            Constant::Bool(_) => matches!(ty, TypeSig::Bool | TypeSig::I32),
            Constant::I32(_) => matches!(ty, TypeSig::I32 | TypeSig::Bool),
            Constant::I64(_) => *ty == TypeSig::I64,
            Constant::F64(_) => *ty == TypeSig::F64,
            Constant::Str(_) => matches!(ty, TypeSig::String | TypeSig::Object),
        }
    }
}

/// The instruction that loads the default value of `ty`, or `None` for `void`.
#[must_use]
pub fn load_default(ty: &TypeSig) -> Option<Instruction> {
    match ty {
        TypeSig::Void => None,
        TypeSig::Bool | TypeSig::I32 => Some(Instruction::ldc_i4(0)),
        TypeSig::I64 => Some(Instruction::ldc_i8(0)),
        TypeSig::F64 => Some(Instruction::ldc_r8(0.0)),
        TypeSig::String | TypeSig::Object | TypeSig::Named(_) => Some(Instruction::ldnull()),
    }
}

/// A host value to load.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    /// A local slot of the host method
    Local(u16),
    /// An argument slot of the host method
    Argument(u16),
    /// An instance field of the object produced by `owner`
    InstanceField {
        /// Source of the owning object
        owner: Box<ValueSource>,
        /// The field
        field: FieldRef,
    },
    /// A static field
    StaticField(FieldRef),
    /// A literal
    Constant(Constant),
    /// The result of calling `method` with `args`, evaluated left to right
    Call {
        /// Called method; must return a value
        method: MethodRef,
        /// Argument sources
        args: Vec<ValueSource>,
    },
    /// The value the host left on top of the evaluation stack, copied with `dup`
    Stack,
}

impl ValueSource {
    /// An instance field of `this` (argument 0).
    #[must_use]
    pub fn this_field(field: FieldRef) -> Self {
        ValueSource::InstanceField {
            owner: Box::new(ValueSource::Argument(0)),
            field,
        }
    }

    /// A call source.
    #[must_use]
    pub fn call(method: MethodRef, args: Vec<ValueSource>) -> Self {
        ValueSource::Call { method, args }
    }

    /// Returns `true` if this source reads the host's evaluation stack.
    #[must_use]
    pub fn reads_stack(&self) -> bool {
        match self {
            ValueSource::Stack => true,
            ValueSource::InstanceField { owner, .. } => owner.reads_stack(),
            ValueSource::Call { args, .. } => args.iter().any(ValueSource::reads_stack),
            _ => false,
        }
    }

    /// Walks the loads of this source in emission order and returns `false` if a
    /// [`ValueSource::Stack`] leaf follows a load of anything else.
    ///
    /// `leading` is `true` while every load so far has been a `dup` of the host value;
    /// only then does another `dup` still copy what the host left on the stack.
    pub(crate) fn stack_reads_lead(&self, leading: &mut bool) -> bool {
        match self {
            ValueSource::Stack => *leading,
            ValueSource::InstanceField { owner, .. } => {
                let ok = owner.stack_reads_lead(leading);
                *leading = false;
                ok
            }
            ValueSource::Call { args, .. } => {
                let ok = args.iter().all(|arg| arg.stack_reads_lead(leading));
                *leading = false;
                ok
            }
            _ => {
                *leading = false;
                true
            }
        }
    }

    /// Appends the instructions loading this value to `out`. Net stack effect is +1.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Malformed`] for a static field addressed as instance field (or the
    /// reverse), a void call, or a call with the wrong argument count.
    pub fn emit_load(&self, out: &mut Vec<Instruction>) -> Result<()> {
        match self {
            ValueSource::Local(slot) => out.push(Instruction::ldloc(*slot)),
            ValueSource::Argument(slot) => out.push(Instruction::ldarg(*slot)),
            ValueSource::InstanceField { owner, field } => {
                if field.is_static {
                    return Err(malformed_error!("{} is static, not an instance field", field));
                }
                owner.emit_load(out)?;
                out.push(Instruction::load_field(field.clone()));
            }
            ValueSource::StaticField(field) => {
                if !field.is_static {
                    return Err(malformed_error!("{} is an instance field", field));
                }
                out.push(Instruction::load_field(field.clone()));
            }
            ValueSource::Constant(constant) => out.push(constant.load()),
            ValueSource::Call { method, args } => {
                if !method.returns_value() {
                    return Err(malformed_error!("{} returns no value", method));
                }
                if args.len() != method.arg_count() {
                    return Err(malformed_error!(
                        "{} takes {} argument(s), {} given",
                        method,
                        method.arg_count(),
                        args.len()
                    ));
                }
                for arg in args {
                    arg.emit_load(out)?;
                }
                if method.is_static {
                    out.push(Instruction::call(method.clone()));
                } else {
                    out.push(Instruction::callvirt(method.clone()));
                }
            }
            ValueSource::Stack => out.push(Instruction::dup()),
        }
        Ok(())
    }
}

/// A host location value feedback writes to.
#[derive(Debug, Clone, PartialEq)]
pub enum HostSlot {
    /// A local slot
    Local(u16),
    /// An argument slot
    Argument(u16),
    /// An instance field of the object produced by `owner`
    InstanceField {
        /// Source of the owning object
        owner: ValueSource,
        /// The field
        field: FieldRef,
    },
    /// A static field
    StaticField(FieldRef),
}

impl HostSlot {
    /// An instance field of `this` (argument 0).
    #[must_use]
    pub fn this_field(field: FieldRef) -> Self {
        HostSlot::InstanceField {
            owner: ValueSource::Argument(0),
            field,
        }
    }

    /// Instructions storing the value produced by `value` into this slot. Net stack
    /// effect is 0 when `value` pushes exactly one value.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Malformed`] for a field of the wrong static-ness, or an owner that
    /// reads the evaluation stack.
    pub fn emit_store(&self, value: Vec<Instruction>) -> Result<Vec<Instruction>> {
        let mut out = Vec::with_capacity(value.len() + 2);
        match self {
            HostSlot::Local(slot) => {
                out.extend(value);
                out.push(Instruction::stloc(*slot));
            }
            HostSlot::Argument(slot) => {
                out.extend(value);
                out.push(Instruction::starg(*slot));
            }
            HostSlot::InstanceField { owner, field } => {
                if field.is_static {
                    return Err(malformed_error!("{} is static, not an instance field", field));
                }
                if owner.reads_stack() {
                    return Err(malformed_error!("feedback owner of {} reads the stack", field));
                }
                owner.emit_load(&mut out)?;
                out.extend(value);
                out.push(Instruction::store_field(field.clone()));
            }
            HostSlot::StaticField(field) => {
                if !field.is_static {
                    return Err(malformed_error!("{} is an instance field", field));
                }
                out.extend(value);
                out.push(Instruction::store_field(field.clone()));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assembly::OpCode, Error};

    #[test]
    fn test_nested_instance_field() {
        let owner = FieldRef::instance("Player", "Inventory", TypeSig::named("Inventory"));
        let count = FieldRef::instance("Inventory", "Count", TypeSig::I32);
        let source = ValueSource::InstanceField {
            owner: Box::new(ValueSource::this_field(owner)),
            field: count,
        };
        let mut out = Vec::new();
        source.emit_load(&mut out).unwrap();
        let ops: Vec<OpCode> = out.iter().map(|i| i.opcode).collect();
        assert_eq!(ops, vec![OpCode::Ldarg, OpCode::Ldfld, OpCode::Ldfld]);
    }

    #[test]
    fn test_call_source_checks_shape() {
        let void = MethodRef::static_method("Host", "Log", vec![], TypeSig::Void);
        let mut out = Vec::new();
        assert!(matches!(
            ValueSource::call(void, vec![]).emit_load(&mut out),
            Err(Error::Malformed { .. })
        ));

        let next = MethodRef::static_method("Host", "Next", vec![TypeSig::I32], TypeSig::I32);
        assert!(ValueSource::call(next.clone(), vec![]).emit_load(&mut out).is_err());
        out.clear();
        ValueSource::call(next, vec![ValueSource::Constant(Constant::I32(4))])
            .emit_load(&mut out)
            .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_stack_reads_must_lead() {
        let add = MethodRef::static_method("Math", "Add", vec![TypeSig::I32, TypeSig::I32], TypeSig::I32);
        let thousand = ValueSource::Constant(Constant::I32(1000));

        let late = ValueSource::call(add.clone(), vec![thousand.clone(), ValueSource::Stack]);
        assert!(!late.stack_reads_lead(&mut true));

        let early = ValueSource::call(add.clone(), vec![ValueSource::Stack, thousand]);
        assert!(early.stack_reads_lead(&mut true));
        assert!(!early.stack_reads_lead(&mut false));

        let twice = ValueSource::call(add, vec![ValueSource::Stack, ValueSource::Stack]);
        assert!(twice.stack_reads_lead(&mut true));
    }

    #[test]
    fn test_store_shapes() {
        let value = vec![Instruction::ldc_i4(1)];
        let stat = FieldRef::static_field("Round", "Lock", TypeSig::Bool);
        let store = HostSlot::StaticField(stat.clone()).emit_store(value.clone()).unwrap();
        assert_eq!(store.last().unwrap().opcode, OpCode::Stsfld);

        assert!(HostSlot::this_field(stat).emit_store(value.clone()).is_err());

        let inst = FieldRef::instance("Door", "Open", TypeSig::Bool);
        let store = HostSlot::this_field(inst).emit_store(value).unwrap();
        let ops: Vec<OpCode> = store.iter().map(|i| i.opcode).collect();
        assert_eq!(ops, vec![OpCode::Ldarg, OpCode::LdcI4, OpCode::Stfld]);
    }

    #[test]
    fn test_defaults() {
        assert!(load_default(&TypeSig::Void).is_none());
        assert_eq!(load_default(&TypeSig::F64).unwrap().opcode, OpCode::LdcR8);
        assert_eq!(load_default(&TypeSig::named("X")).unwrap().opcode, OpCode::Ldnull);
    }
}
