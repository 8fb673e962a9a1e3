//! Event-argument construction.
//!
//! Emits one load per bound source in declared order, then `newobj <kind>`, which
//! consumes the values positionally. The bindings must name the schema's fields
//! exactly and in schema order; nothing is reordered, so side effects of the sources
//! (calls in particular) happen in the order the patch author wrote them.

use crate::{
    assembly::{body::MethodBody, instruction::Instruction},
    emit::source::{Constant, ValueSource},
    events::EventKind,
    Error, Result,
};

/// Where the constructed event value ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgsStorage {
    /// `stloc` into a fresh local; nothing remains on the stack
    #[default]
    Local,
    /// `dup; stloc` into a fresh local; the value also remains on the stack
    LocalAndStack,
    /// Left on the stack only
    StackOnly,
}

/// Output of [`EventArgsEmitter::emit`].
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedArgs {
    /// The construction sequence
    pub instructions: Vec<Instruction>,
    /// Local holding the event value, unless stored [`ArgsStorage::StackOnly`]
    pub local: Option<u16>,
}

/// Builds the construction sequence of one event value.
#[derive(Debug, Clone)]
pub struct EventArgsEmitter {
    kind: EventKind,
    bindings: Vec<(String, ValueSource)>,
    storage: ArgsStorage,
}

impl EventArgsEmitter {
    /// Starts an emitter for `kind` with no bindings.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            bindings: Vec::new(),
            storage: ArgsStorage::default(),
        }
    }

    /// Binds the next field to `source`.
    #[must_use]
    pub fn bind(mut self, field: impl Into<String>, source: ValueSource) -> Self {
        self.bindings.push((field.into(), source));
        self
    }

    /// Sets where the constructed value is kept.
    #[must_use]
    pub fn storage(mut self, storage: ArgsStorage) -> Self {
        self.storage = storage;
        self
    }

    /// The event kind.
    #[must_use]
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Bindings in declared order.
    #[must_use]
    pub fn bindings(&self) -> &[(String, ValueSource)] {
        &self.bindings
    }

    /// Returns `true` if a binding reads the host's evaluation stack.
    #[must_use]
    pub fn reads_stack(&self) -> bool {
        self.bindings.iter().any(|(_, source)| source.reads_stack())
    }

    /// Checks the bindings against the schema without emitting anything.
    ///
    /// # Errors
    ///
    /// [`Error::SchemaMismatch`] if the bound fields differ from the schema's fields or
    /// their order, or a [`ValueSource::Stack`] source, nested ones included, is emitted
    /// after a load of another value.
    /// [`Error::TypeMismatch`] for a constant that does not fit its field.
    pub fn check(&self) -> Result<()> {
        let fields = self.kind.schema().fields();
        let bound: Vec<&str> = self.bindings.iter().map(|(name, _)| name.as_str()).collect();
        let declared: Vec<&str> = fields.iter().map(|field| field.name.as_str()).collect();
        if bound != declared {
            return Err(Error::SchemaMismatch {
                event: self.kind.id().to_string(),
                message: format!(
                    "bindings [{}] do not match fields [{}]",
                    bound.join(", "),
                    declared.join(", ")
                ),
            });
        }

        let mut leading = true;
        for ((name, source), field) in self.bindings.iter().zip(fields) {
            if !source.stack_reads_lead(&mut leading) {
                return Err(Error::SchemaMismatch {
                    event: self.kind.id().to_string(),
                    message: format!("field '{name}' reads the stack after another value was loaded"),
                });
            }
            if let ValueSource::Constant(constant) = source {
                if !constant.fits(&field.ty) {
                    return Err(Error::TypeMismatch {
                        expected: format!("{} for field '{}'", field.ty, name),
                        found: constant_type(constant).to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Emits the construction sequence, declaring the event local in `body` when the
    /// storage mode needs one.
    ///
    /// # Errors
    ///
    /// Any error of [`EventArgsEmitter::check`] or [`ValueSource::emit_load`].
    pub fn emit(&self, body: &mut MethodBody) -> Result<EmittedArgs> {
        self.check()?;

        let mut instructions = Vec::new();
        for (_, source) in &self.bindings {
            source.emit_load(&mut instructions)?;
        }
        instructions.push(Instruction::new_event(self.kind.clone()));

        let local = match self.storage {
            ArgsStorage::StackOnly => None,
            ArgsStorage::Local => {
                let slot = body.declare_local(self.kind.type_sig());
                instructions.push(Instruction::stloc(slot));
                Some(slot)
            }
            ArgsStorage::LocalAndStack => {
                let slot = body.declare_local(self.kind.type_sig());
                instructions.push(Instruction::dup());
                instructions.push(Instruction::stloc(slot));
                Some(slot)
            }
        };

        Ok(EmittedArgs {
            instructions,
            local,
        })
    }
}

fn constant_type(constant: &Constant) -> &'static str {
    match constant {
        Constant::Null => "null",
        Constant::Bool(_) => "bool",
        Constant::I32(_) => "int32",
        Constant::I64(_) => "int64",
        Constant::F64(_) => "float64",
        Constant::Str(_) => "string",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{
            stack, FieldRef, MethodRef, OpCode, TypeSig,
        },
        events::EventSchema,
    };

    fn healing() -> EventKind {
        EventKind::new(
            EventSchema::new("Healing")
                .actor("Player", TypeSig::named("Player"))
                .mutable_field("Amount", TypeSig::F64)
                .cancellable(),
        )
        .unwrap()
    }

    fn host() -> MethodBody {
        MethodBody::new(MethodRef::instance_method(
            "Player",
            "Heal",
            vec![TypeSig::F64],
            TypeSig::Void,
        ))
    }

    #[test]
    fn test_emits_in_declared_order() {
        let mut body = host();
        let emitted = EventArgsEmitter::new(healing())
            .bind("Player", ValueSource::Argument(0))
            .bind("Amount", ValueSource::Argument(1))
            .emit(&mut body)
            .unwrap();

        let ops: Vec<OpCode> = emitted.instructions.iter().map(|i| i.opcode).collect();
        assert_eq!(ops, vec![OpCode::Ldarg, OpCode::Ldarg, OpCode::Newobj, OpCode::Stloc]);
        assert_eq!(emitted.local, Some(0));
        assert_eq!(body.locals()[0].ty, healing().type_sig());

        body.extend(emitted.instructions);
        body.push(Instruction::ret());
        assert_eq!(stack::verify(&body).unwrap(), 2);
    }

    #[test]
    fn test_rejects_reordered_or_partial_bindings() {
        let mut body = host();
        let swapped = EventArgsEmitter::new(healing())
            .bind("Amount", ValueSource::Argument(1))
            .bind("Player", ValueSource::Argument(0));
        assert!(matches!(swapped.emit(&mut body), Err(Error::SchemaMismatch { .. })));

        let partial = EventArgsEmitter::new(healing()).bind("Player", ValueSource::Argument(0));
        assert!(matches!(partial.emit(&mut body), Err(Error::SchemaMismatch { .. })));
        assert!(body.locals().is_empty());
    }

    #[test]
    fn test_stack_source_must_come_first() {
        let late = EventArgsEmitter::new(healing())
            .bind("Player", ValueSource::Argument(0))
            .bind("Amount", ValueSource::Stack);
        assert!(matches!(late.check(), Err(Error::SchemaMismatch { .. })));
    }

    #[test]
    fn test_nested_stack_source_after_other_load_rejected() {
        let scale = MethodRef::static_method("Math", "Scale", vec![TypeSig::F64, TypeSig::F64], TypeSig::F64);
        let nested = |args| {
            EventArgsEmitter::new(healing())
                .bind("Player", ValueSource::Stack)
                .bind("Amount", ValueSource::call(scale.clone(), args))
        };

        let late = nested(vec![ValueSource::Constant(Constant::F64(2.0)), ValueSource::Stack]);
        assert!(matches!(late.check(), Err(Error::SchemaMismatch { .. })));

        let after_player = nested(vec![ValueSource::Stack, ValueSource::Constant(Constant::F64(2.0))]);
        assert!(matches!(after_player.check(), Err(Error::SchemaMismatch { .. })));

        let lone = EventKind::new(EventSchema::new("Scaled").field("Value", TypeSig::F64)).unwrap();
        let first = EventArgsEmitter::new(lone).bind(
            "Value",
            ValueSource::call(scale.clone(), vec![ValueSource::Stack, ValueSource::Constant(Constant::F64(2.0))]),
        );
        first.check().unwrap();
    }

    #[test]
    fn test_constant_type_checked() {
        let wrong = EventArgsEmitter::new(healing())
            .bind("Player", ValueSource::Constant(Constant::Null))
            .bind("Amount", ValueSource::Constant(Constant::Str("x".into())));
        assert!(matches!(wrong.check(), Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn test_storage_modes() {
        let kind = EventKind::new(
            EventSchema::new("Tick").field("Round", TypeSig::I32),
        )
        .unwrap();
        let source = ValueSource::StaticField(FieldRef::static_field("Round", "Number", TypeSig::I32));

        let mut body = host();
        let kept = EventArgsEmitter::new(kind.clone())
            .bind("Round", source.clone())
            .storage(ArgsStorage::LocalAndStack)
            .emit(&mut body)
            .unwrap();
        assert_eq!(kept.instructions[2].opcode, OpCode::Dup);

        let stacked = EventArgsEmitter::new(kind)
            .bind("Round", source)
            .storage(ArgsStorage::StackOnly)
            .emit(&mut body)
            .unwrap();
        assert_eq!(stacked.local, None);
        assert_eq!(stacked.instructions.last().unwrap().opcode, OpCode::Newobj);
    }
}
