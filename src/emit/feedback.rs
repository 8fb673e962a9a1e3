//! Value feedback: copying subscriber-written fields back into host state.
//!
//! For each `(field, slot)` pair the emitter produces `ldloc ev; ldfld <field>` followed
//! by the store into the host slot. The sequences belong on the allowed path only, right
//! after the gate. Only mutable fields may be fed back.

use crate::{
    assembly::{body::MethodBody, instruction::Instruction, types::TypeSig},
    emit::source::HostSlot,
    events::EventKind,
    Error, Result,
};

/// Builds the feedback sequence of one event value.
#[derive(Debug, Clone)]
pub struct FeedbackEmitter {
    kind: EventKind,
    local: u16,
    pairs: Vec<(String, HostSlot)>,
}

impl FeedbackEmitter {
    /// Starts an emitter reading the event value held in `local`.
    #[must_use]
    pub fn new(kind: EventKind, local: u16) -> Self {
        Self {
            kind,
            local,
            pairs: Vec::new(),
        }
    }

    /// Copies event field `field` into `slot`.
    #[must_use]
    pub fn feed(mut self, field: impl Into<String>, slot: HostSlot) -> Self {
        self.pairs.push((field.into(), slot));
        self
    }

    /// Appends pairs collected elsewhere.
    #[must_use]
    pub fn with_pairs(mut self, pairs: impl IntoIterator<Item = (String, HostSlot)>) -> Self {
        self.pairs.extend(pairs);
        self
    }

    /// Emits the feedback sequence for `body`. Net stack effect is 0.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownField`] for a field the schema does not declare
    /// - [`Error::ReadOnlyField`] for a field that is not mutable
    /// - [`Error::TypeMismatch`] when the slot's type cannot hold the field's type
    /// - [`Error::Malformed`] for an undeclared local or argument slot
    pub fn emit(&self, body: &MethodBody) -> Result<Vec<Instruction>> {
        let mut out = Vec::new();
        for (name, slot) in &self.pairs {
            let field = self
                .kind
                .schema()
                .field_named(name)
                .ok_or_else(|| Error::UnknownField {
                    event: self.kind.id().to_string(),
                    field: name.clone(),
                })?;
            if !field.is_mutable() {
                return Err(Error::ReadOnlyField {
                    event: self.kind.id().to_string(),
                    field: name.clone(),
                });
            }

            let slot_ty = slot_type(body, slot)?;
            if !compatible(&field.ty, &slot_ty) {
                return Err(Error::TypeMismatch {
                    expected: slot_ty.to_string(),
                    found: format!("{} (field '{}')", field.ty, name),
                });
            }

            let value = vec![
                Instruction::ldloc(self.local),
                Instruction::load_field(self.kind.field_ref(name)?),
            ];
            out.extend(slot.emit_store(value)?);
        }
        Ok(out)
    }
}

fn slot_type(body: &MethodBody, slot: &HostSlot) -> Result<TypeSig> {
    match slot {
        HostSlot::Local(index) => body
            .locals()
            .get(usize::from(*index))
            .map(|local| local.ty.clone())
            .ok_or_else(|| malformed_error!("{} declares no local {}", body.id(), index)),
        HostSlot::Argument(index) => body
            .method()
            .arg_type(*index)
            .ok_or_else(|| malformed_error!("{} has no argument {}", body.id(), index)),
        HostSlot::InstanceField { field, .. } | HostSlot::StaticField(field) => Ok(field.ty.clone()),
    }
}

fn compatible(field: &TypeSig, slot: &TypeSig) -> bool {
    field == slot
        || matches!((field, slot), (TypeSig::Bool, TypeSig::I32) | (TypeSig::I32, TypeSig::Bool))
        || (field.is_reference() && *slot == TypeSig::Object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{FieldRef, MethodRef, OpCode},
        events::EventSchema,
    };

    fn hurting() -> EventKind {
        EventKind::new(
            EventSchema::new("Hurting")
                .actor("Target", TypeSig::named("Player"))
                .mutable_field("Amount", TypeSig::F64)
                .cancellable(),
        )
        .unwrap()
    }

    fn host() -> MethodBody {
        let mut body = MethodBody::new(MethodRef::instance_method(
            "Player",
            "Hurt",
            vec![TypeSig::F64],
            TypeSig::Void,
        ));
        body.declare_local(hurting().type_sig());
        body.declare_local(TypeSig::F64);
        body
    }

    #[test]
    fn test_feeds_argument_and_field() {
        let health = FieldRef::instance("Player", "Health", TypeSig::F64);
        let out = FeedbackEmitter::new(hurting(), 0)
            .feed("Amount", HostSlot::Argument(1))
            .feed("Amount", HostSlot::this_field(health))
            .emit(&host())
            .unwrap();
        let ops: Vec<OpCode> = out.iter().map(|i| i.opcode).collect();
        assert_eq!(
            ops,
            vec![
                OpCode::Ldloc,
                OpCode::Ldfld,
                OpCode::Starg,
                OpCode::Ldarg,
                OpCode::Ldloc,
                OpCode::Ldfld,
                OpCode::Stfld
            ]
        );
    }

    #[test]
    fn test_rejects_read_only_and_unknown() {
        let body = host();
        let read_only = FeedbackEmitter::new(hurting(), 0).feed("Target", HostSlot::Local(1));
        assert!(matches!(read_only.emit(&body), Err(Error::ReadOnlyField { .. })));

        let unknown = FeedbackEmitter::new(hurting(), 0).feed("Armor", HostSlot::Local(1));
        assert!(matches!(unknown.emit(&body), Err(Error::UnknownField { .. })));
    }

    #[test]
    fn test_slot_checks() {
        let body = host();
        let wrong_type = FeedbackEmitter::new(hurting(), 0).feed("Amount", HostSlot::Local(0));
        assert!(matches!(wrong_type.emit(&body), Err(Error::TypeMismatch { .. })));

        let missing = FeedbackEmitter::new(hurting(), 0).feed("Amount", HostSlot::Local(9));
        assert!(matches!(missing.emit(&body), Err(Error::Malformed { .. })));

        let ok = FeedbackEmitter::new(hurting(), 0).feed("Amount", HostSlot::Local(1));
        assert_eq!(ok.emit(&body).unwrap().len(), 3);
    }
}
