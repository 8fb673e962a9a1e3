//! Dispatch call and cancellation gate.
//!
//! The emitted code walks a small state machine, encoded here as types so a gate can
//! only be emitted after the dispatch call:
//!
//! ```text
//! Constructed ──dispatch()──► Dispatched ──gate(cancel)──► Allowed   (falls through)
//!                                  │                  └──► Disallowed (brfalse cancel)
//!                                  └──ungated()──────────► Allowed
//! ```
//!
//! The dispatch loads the kind's subscription list from `Handlers::<kind>`, loads the
//! event value and calls `Handlers::InvokeSafely`. The gate reads `IsAllowed` once and
//! branches to the cancel target on `false`. A kind that cannot be cancelled has no gate.

use crate::{
    assembly::{
        body::MethodBody,
        instruction::{Instruction, Label},
        types::{FieldRef, MethodRef, TypeSig},
    },
    emit::source::{load_default, Constant},
    events::EventKind,
    Error, Result,
};

/// Declaring type of the per-kind subscription-list statics and the invoker.
pub const HANDLERS_TYPE: &str = "ilweave.Handlers";

/// Name of the safe-invoker method on [`HANDLERS_TYPE`].
pub const INVOKE_SAFELY: &str = "InvokeSafely";

/// Type of a subscription-list value.
pub const SUBSCRIBERS_TYPE: &str = "ilweave.Subscribers";

/// The static field holding `kind`'s subscription list.
#[must_use]
pub fn handlers_field(kind: &EventKind) -> FieldRef {
    FieldRef::static_field(HANDLERS_TYPE, kind.id(), TypeSig::named(SUBSCRIBERS_TYPE))
}

/// `Handlers::InvokeSafely(Subscribers, object)`.
#[must_use]
pub fn invoke_safely_method() -> MethodRef {
    MethodRef::static_method(
        HANDLERS_TYPE,
        INVOKE_SAFELY,
        vec![TypeSig::named(SUBSCRIBERS_TYPE), TypeSig::Object],
        TypeSig::Void,
    )
}

/// Where a cancelled operation continues.
#[derive(Debug, Clone, PartialEq)]
pub enum CancelTarget {
    /// A label the body already carries, typically a return point or the first
    /// instruction past the guarded logic
    Existing(Label),
    /// A fresh exit block appended to the body that discards whatever the host left
    /// on the stack and returns `value` (or the return type's default when `None`)
    EarlyReturn {
        /// Value returned by a non-void method
        value: Option<Constant>,
    },
}

impl Default for CancelTarget {
    fn default() -> Self {
        CancelTarget::EarlyReturn { value: None }
    }
}

/// An event value stored in `local`, not yet dispatched.
#[derive(Debug, Clone)]
pub struct Constructed {
    kind: EventKind,
    local: u16,
}

impl Constructed {
    /// The value of `kind` held in `local`.
    #[must_use]
    pub fn new(kind: EventKind, local: u16) -> Self {
        Self { kind, local }
    }

    /// Emits `ldsfld Handlers::<kind>; ldloc ev; call Handlers::InvokeSafely`.
    #[must_use]
    pub fn dispatch(self, out: &mut Vec<Instruction>) -> Dispatched {
        out.push(Instruction::load_field(handlers_field(&self.kind)));
        out.push(Instruction::ldloc(self.local));
        out.push(Instruction::call(invoke_safely_method()));
        Dispatched {
            kind: self.kind,
            local: self.local,
        }
    }
}

/// Subscribers have run; the cancellation flag has not been read.
#[derive(Debug, Clone)]
pub struct Dispatched {
    kind: EventKind,
    local: u16,
}

impl Dispatched {
    /// Emits `ldloc ev; ldfld IsAllowed; brfalse cancel`.
    ///
    /// # Errors
    ///
    /// [`Error::NotCancellable`] if the kind has no `IsAllowed` flag.
    pub fn gate(self, cancel: Label, out: &mut Vec<Instruction>) -> Result<Allowed> {
        let flag = self.kind.is_allowed_field()?;
        out.push(Instruction::ldloc(self.local));
        out.push(Instruction::load_field(flag));
        out.push(Instruction::brfalse(cancel));
        Ok(Allowed {
            kind: self.kind,
            local: self.local,
        })
    }

    /// Continues without a gate, for kinds that cannot be cancelled.
    #[must_use]
    pub fn ungated(self) -> Allowed {
        Allowed {
            kind: self.kind,
            local: self.local,
        }
    }
}

/// The fall-through path after the gate: the operation is allowed.
#[derive(Debug, Clone)]
pub struct Allowed {
    kind: EventKind,
    local: u16,
}

impl Allowed {
    /// The event kind.
    #[must_use]
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Local holding the event value.
    #[must_use]
    pub fn local(&self) -> u16 {
        self.local
    }
}

/// Builds an early-return block: `depth` pops, the return value, `ret`.
///
/// # Errors
///
/// [`Error::Malformed`] for a value given to a void method, [`Error::TypeMismatch`] for a
/// value that does not fit the return type.
pub fn emit_early_return(
    body: &MethodBody,
    depth: u16,
    value: Option<&Constant>,
) -> Result<Vec<Instruction>> {
    let returns = body.returns();
    let mut out: Vec<Instruction> = (0..depth).map(|_| Instruction::pop()).collect();

    match (returns.has_value(), value) {
        (false, Some(_)) => {
            return Err(malformed_error!(
                "{} returns void, an early-return value makes no sense",
                body.id()
            ));
        }
        (false, None) => {}
        (true, Some(constant)) => {
            if !constant.fits(returns) {
                return Err(Error::TypeMismatch {
                    expected: returns.to_string(),
                    found: format!("{constant:?}"),
                });
            }
            out.push(constant.load());
        }
        (true, None) => out.extend(load_default(returns)),
    }

    out.push(Instruction::ret());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{MethodRef, OpCode},
        events::EventSchema,
    };

    fn kind(cancellable: bool) -> EventKind {
        let schema = EventSchema::new("Using").field("Item", TypeSig::I32);
        let schema = if cancellable { schema.cancellable() } else { schema };
        EventKind::new(schema).unwrap()
    }

    #[test]
    fn test_dispatch_then_gate() {
        let mut body = MethodBody::new(MethodRef::static_method("H", "M", vec![], TypeSig::Void));
        let cancel = body.define_label();
        let mut out = Vec::new();
        let allowed = Constructed::new(kind(true), 3)
            .dispatch(&mut out)
            .gate(cancel, &mut out)
            .unwrap();

        let ops: Vec<OpCode> = out.iter().map(|i| i.opcode).collect();
        assert_eq!(
            ops,
            vec![
                OpCode::Ldsfld,
                OpCode::Ldloc,
                OpCode::Call,
                OpCode::Ldloc,
                OpCode::Ldfld,
                OpCode::Brfalse
            ]
        );
        assert_eq!(out[0].operand.as_field().unwrap().name, "Using");
        assert_eq!(out[5].branch_targets(), vec![cancel]);
        assert_eq!(allowed.local(), 3);
    }

    #[test]
    fn test_gate_needs_cancellable_kind() {
        let mut out = Vec::new();
        let dispatched = Constructed::new(kind(false), 0).dispatch(&mut out);
        assert!(matches!(
            dispatched.clone().gate(Label::new(0), &mut out),
            Err(Error::NotCancellable(_))
        ));
        assert_eq!(out.len(), 3);
        assert_eq!(dispatched.ungated().kind().id(), "Using");
    }

    #[test]
    fn test_early_return_shapes() {
        let void = MethodBody::new(MethodRef::static_method("H", "V", vec![], TypeSig::Void));
        let block = emit_early_return(&void, 2, None).unwrap();
        let ops: Vec<OpCode> = block.iter().map(|i| i.opcode).collect();
        assert_eq!(ops, vec![OpCode::Pop, OpCode::Pop, OpCode::Ret]);
        assert!(emit_early_return(&void, 0, Some(&Constant::I32(1))).is_err());

        let int = MethodBody::new(MethodRef::static_method("H", "I", vec![], TypeSig::I32));
        let block = emit_early_return(&int, 0, None).unwrap();
        assert_eq!(block[0].to_string(), "ldc.i4 0");
        let block = emit_early_return(&int, 1, Some(&Constant::I32(-1))).unwrap();
        assert_eq!(block[1].to_string(), "ldc.i4 -1");
        assert!(matches!(
            emit_early_return(&int, 0, Some(&Constant::F64(1.0))),
            Err(Error::TypeMismatch { .. })
        ));
    }
}
