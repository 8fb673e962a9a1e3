//! One event hook: construction, dispatch, gate and feedback spliced at an index.
//!
//! [`EventHook`] composes the three emitters into the sequence injected before the
//! anchor instruction:
//!
//! ```text
//!   <load source 1> .. <load source n>
//!   newobj <kind>
//!   stloc ev
//!   ldsfld Handlers::<kind>
//!   ldloc ev
//!   call Handlers::InvokeSafely
//!   ldloc ev                       ┐
//!   ldfld IsAllowed                │ cancellable kinds only
//!   brfalse <cancel>               ┘
//!   <feedback stores>
//! anchor:
//!   <original instruction>
//!   ...
//! cancel:                          ┐ only for CancelTarget::EarlyReturn
//!   pop * depth; <value>; ret      ┘
//! ```
//!
//! The whole injected sequence is stack-neutral, so the host's code after the anchor
//! sees exactly the stack it saw before.

use crate::{
    assembly::{body::MethodBody, instruction::Label, splicer, stack},
    emit::{
        args::{ArgsStorage, EventArgsEmitter},
        dispatch::{emit_early_return, CancelTarget, Constructed},
        feedback::FeedbackEmitter,
        source::{HostSlot, ValueSource},
    },
    events::EventKind,
    Error, Result,
};

/// Where an [`EventHook`] landed in the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookSite {
    /// Index of the first injected instruction
    pub start: usize,
    /// Number of instructions injected before the anchor
    pub len: usize,
    /// Local holding the event value
    pub event_local: u16,
    /// Label cancelled operations branch to, `None` for kinds that cannot be cancelled
    pub cancel_label: Option<Label>,
}

/// A declarative event hook.
///
/// # Examples
///
/// ```rust
/// use ilweave::{
///     assembly::{FieldRef, Instruction, MethodBody, MethodRef, TypeSig},
///     emit::{EventHook, HostSlot, ValueSource},
///     events::{EventKind, EventSchema},
/// };
///
/// let kind = EventKind::new(
///     EventSchema::new("Healing").mutable_field("Amount", TypeSig::F64).cancellable(),
/// )?;
/// let health = FieldRef::instance("Player", "Health", TypeSig::F64);
///
/// let mut body = MethodBody::new(MethodRef::instance_method("Player", "Heal", vec![TypeSig::F64], TypeSig::Void));
/// body.extend([
///     Instruction::ldarg(0),
///     Instruction::ldarg(1),
///     Instruction::store_field(health),
///     Instruction::ret(),
/// ]);
///
/// let site = EventHook::new(kind)
///     .bind("Amount", ValueSource::Argument(1))
///     .feedback("Amount", HostSlot::Argument(1))
///     .emit_at(&mut body, 0)?;
///
/// assert!(site.cancel_label.is_some());
/// body.validate()?;
/// # Ok::<(), ilweave::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct EventHook {
    kind: EventKind,
    bindings: Vec<(String, ValueSource)>,
    feedback: Vec<(String, HostSlot)>,
    cancel: Option<CancelTarget>,
    take_labels: bool,
}

impl EventHook {
    /// Starts a hook for `kind`.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            bindings: Vec::new(),
            feedback: Vec::new(),
            cancel: None,
            take_labels: true,
        }
    }

    /// Binds the next schema field to a host value.
    #[must_use]
    pub fn bind(mut self, field: impl Into<String>, source: ValueSource) -> Self {
        self.bindings.push((field.into(), source));
        self
    }

    /// Copies a mutable event field back into a host slot on the allowed path.
    #[must_use]
    pub fn feedback(mut self, field: impl Into<String>, slot: HostSlot) -> Self {
        self.feedback.push((field.into(), slot));
        self
    }

    /// Sets where cancelled operations continue. Defaults to an early return of the
    /// return type's default value.
    #[must_use]
    pub fn cancel_to(mut self, target: CancelTarget) -> Self {
        self.cancel = Some(target);
        self
    }

    /// Whether branches into the anchor should run the hook (the default) or skip it.
    ///
    /// A [`CancelTarget::Existing`] label attached to the anchor always stays on it.
    #[must_use]
    pub fn take_labels(mut self, take: bool) -> Self {
        self.take_labels = take;
        self
    }

    /// The event kind.
    #[must_use]
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Emits the hook before the instruction at `index`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotCancellable`] for a cancel target on a kind that cannot be cancelled
    /// - [`Error::StackImbalance`] when a binding reads the stack but it is empty there,
    ///   or the index is unreachable
    /// - any error of the argument, dispatch and feedback emitters or the splicer
    pub fn emit_at(&self, body: &mut MethodBody, index: usize) -> Result<HookSite> {
        if self.cancel.is_some() && !self.kind.is_cancellable() {
            return Err(Error::NotCancellable(self.kind.id().to_string()));
        }

        let depth = stack::depth_at(body, index)?;
        let args = self
            .bindings
            .iter()
            .cloned()
            .fold(EventArgsEmitter::new(self.kind.clone()), |emitter, (field, source)| {
                emitter.bind(field, source)
            })
            .storage(ArgsStorage::Local);
        if args.reads_stack() && depth == 0 {
            return Err(Error::StackImbalance {
                index,
                message: format!("hook for {} reads an empty stack", self.kind),
            });
        }

        // Locals and labels are allocated on a copy so a failure leaves `body` as it was.
        let mut work = body.clone();
        let emitted = args.emit(&mut work)?;
        let Some(local) = emitted.local else {
            return Err(malformed_error!("event value for {} was not stored", self.kind));
        };
        let mut sequence = emitted.instructions;
        let dispatched = Constructed::new(self.kind.clone(), local).dispatch(&mut sequence);

        let mut exit_block = Vec::new();
        let mut cancel_label = None;
        let allowed = if self.kind.is_cancellable() {
            let label = match self.cancel.clone().unwrap_or_default() {
                CancelTarget::Existing(label) => label,
                CancelTarget::EarlyReturn { value } => {
                    let label = work.define_label();
                    exit_block = emit_early_return(&work, depth, value.as_ref())?;
                    if let Some(first) = exit_block.first_mut() {
                        first.attach_label(label);
                    }
                    label
                }
            };
            cancel_label = Some(label);
            dispatched.gate(label, &mut sequence)?
        } else {
            dispatched.ungated()
        };

        let feedback = FeedbackEmitter::new(self.kind.clone(), allowed.local())
            .with_pairs(self.feedback.clone());
        sequence.extend(feedback.emit(&work)?);

        let len = sequence.len();
        if self.take_labels {
            // A cancel label on the anchor stays there, or a cancel would rerun the hook.
            let keep: Vec<Label> = cancel_label.into_iter().collect();
            splicer::insert_taking_labels_except(&mut work, index, sequence, &keep)?;
        } else {
            splicer::insert(&mut work, index, sequence)?;
        }
        work.extend(exit_block);
        *body = work;

        Ok(HookSite {
            start: index,
            len,
            event_local: local,
            cancel_label,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{FieldRef, Instruction, MethodRef, OpCode, TypeSig};

    fn opening() -> EventKind {
        crate::events::EventKind::new(
            crate::events::EventSchema::new("Opening")
                .actor("Door", TypeSig::named("Door"))
                .cancellable(),
        )
        .unwrap()
    }

    fn toggle() -> MethodBody {
        let open = FieldRef::instance("Door", "Open", TypeSig::Bool);
        let mut body = MethodBody::new(MethodRef::instance_method("Door", "Toggle", vec![], TypeSig::Bool));
        let skip = body.define_label();
        body.extend([
            Instruction::ldarg(0),
            Instruction::load_field(open.clone()),
            Instruction::brtrue(skip),
            Instruction::ldarg(0),
            Instruction::ldc_i4(1),
            Instruction::store_field(open),
            Instruction::ldc_i4(1).with_label(skip),
            Instruction::ret(),
        ]);
        body
    }

    #[test]
    fn test_prologue_hook_is_stack_neutral() {
        let mut body = toggle();
        let site = EventHook::new(opening())
            .bind("Door", ValueSource::Argument(0))
            .emit_at(&mut body, 0)
            .unwrap();

        assert_eq!(site.start, 0);
        assert_eq!(site.len, 9);
        body.validate().unwrap();
        stack::verify(&body).unwrap();

        let tail: Vec<OpCode> = body.instructions()[body.len() - 2..]
            .iter()
            .map(|i| i.opcode)
            .collect();
        assert_eq!(tail, vec![OpCode::LdcI4, OpCode::Ret]);
        assert!(body.instructions()[body.len() - 2].has_label(site.cancel_label.unwrap()));
    }

    #[test]
    fn test_label_placement() {
        let mut taken = toggle();
        let skip = taken.instructions()[6].labels[0];
        let site = EventHook::new(opening())
            .bind("Door", ValueSource::Argument(0))
            .emit_at(&mut taken, 6)
            .unwrap();
        assert!(taken.instructions()[6].has_label(skip));
        assert!(!taken.instructions()[6 + site.len].has_label(skip));
        stack::verify(&taken).unwrap();

        // left in place, the branch skips the hook, and a cancel rejoins that path
        let mut kept = toggle();
        let site = EventHook::new(opening())
            .bind("Door", ValueSource::Argument(0))
            .cancel_to(CancelTarget::Existing(skip))
            .take_labels(false)
            .emit_at(&mut kept, 6)
            .unwrap();
        assert_eq!(site.cancel_label, Some(skip));
        assert!(kept.instructions()[6 + site.len].has_label(skip));
        kept.validate().unwrap();
        stack::verify(&kept).unwrap();
    }

    #[test]
    fn test_cancel_to_anchor_label_does_not_rerun_hook() {
        let mut body = toggle();
        let skip = body.instructions()[6].labels[0];
        let site = EventHook::new(opening())
            .bind("Door", ValueSource::Argument(0))
            .cancel_to(CancelTarget::Existing(skip))
            .emit_at(&mut body, 6)
            .unwrap();

        let anchor = &body.instructions()[6 + site.len];
        assert!(anchor.has_label(skip));
        assert!(!body.instructions()[6].has_label(skip));
        let gate = body.instructions()[6..6 + site.len]
            .iter()
            .position(|i| i.opcode == OpCode::Brfalse)
            .unwrap();
        assert_eq!(body.instructions()[6 + gate].branch_targets(), vec![skip]);
        body.validate().unwrap();
        stack::verify(&body).unwrap();
    }

    #[test]
    fn test_early_return_discards_stack() {
        let mut body = toggle();
        // before `brtrue`, the loaded field value is on the stack
        EventHook::new(opening())
            .bind("Door", ValueSource::Argument(0))
            .emit_at(&mut body, 2)
            .unwrap();
        body.validate().unwrap();
        stack::verify(&body).unwrap();
        let tail: Vec<OpCode> = body.instructions()[body.len() - 3..]
            .iter()
            .map(|i| i.opcode)
            .collect();
        assert_eq!(tail, vec![OpCode::Pop, OpCode::LdcI4, OpCode::Ret]);
    }

    #[test]
    fn test_not_cancellable_kind_has_no_gate() {
        let kind = crate::events::EventKind::new(
            crate::events::EventSchema::new("Toggled").field("Door", TypeSig::named("Door")),
        )
        .unwrap();
        let mut body = toggle();
        let before = body.len();
        let site = EventHook::new(kind.clone())
            .bind("Door", ValueSource::Argument(0))
            .emit_at(&mut body, 7)
            .unwrap();
        assert_eq!(site.cancel_label, None);
        assert_eq!(body.len(), before + site.len);

        let err = EventHook::new(kind)
            .bind("Door", ValueSource::Argument(0))
            .cancel_to(CancelTarget::EarlyReturn { value: None })
            .emit_at(&mut toggle(), 0);
        assert!(matches!(err, Err(Error::NotCancellable(_))));
    }

    #[test]
    fn test_failed_emit_leaves_body_untouched() {
        let mut body = toggle();
        let original = body.clone();
        let result = EventHook::new(opening())
            .bind("Door", ValueSource::Argument(0))
            .feedback("Door", HostSlot::Argument(0))
            .emit_at(&mut body, 0);
        assert!(matches!(result, Err(Error::ReadOnlyField { .. })));
        assert_eq!(body, original);
    }
}
