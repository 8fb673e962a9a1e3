//! Reusable transpilers.
//!
//! | Transpiler | Effect |
//! |------------|--------|
//! | [`EventPatch`] | One [`EventHook`] at a structural anchor; [`EventPatch::prologue`] anchors at the method start |
//! | [`ReturnHook`] | The same hook before every `ret` |
//! | [`CallRedirect`] | Retargets every call to one method at another with the same stack shape |

use crate::{
    assembly::{
        body::MethodBody,
        instruction::{Instruction, Operand},
        locator::{Anchor, Locator},
        matcher::{CodeMatch, InstructionMatcher},
        opcodes::OpCode,
        types::{MethodId, MethodRef},
    },
    emit::hook::EventHook,
    patch::descriptor::Transpiler,
    Error, Result,
};

/// Emits an [`EventHook`] before the instruction an [`Anchor`] resolves to.
#[derive(Debug, Clone)]
pub struct EventPatch {
    anchor: Anchor,
    hook: EventHook,
}

impl EventPatch {
    /// Hook at `anchor`.
    #[must_use]
    pub fn new(anchor: Anchor, hook: EventHook) -> Self {
        Self { anchor, hook }
    }

    /// Hook at the first instruction of the method.
    #[must_use]
    pub fn prologue(hook: EventHook) -> Self {
        Self::new(Anchor::start(), hook)
    }
}

impl Transpiler for EventPatch {
    fn transpile(&self, body: &mut MethodBody) -> Result<()> {
        let index = self.anchor.resolve(body)?;
        self.hook.emit_at(body, index)?;
        Ok(())
    }

    fn description(&self) -> String {
        format!("event {} at {}", self.hook.kind(), self.anchor)
    }
}

/// Emits an [`EventHook`] before every `ret` of the method.
///
/// For a non-void method the return value is on the stack at each site, so a
/// [`crate::emit::ValueSource::Stack`] binding observes it.
#[derive(Debug, Clone)]
pub struct ReturnHook {
    hook: EventHook,
}

impl ReturnHook {
    /// Hook before each return.
    #[must_use]
    pub fn new(hook: EventHook) -> Self {
        Self { hook }
    }
}

impl Transpiler for ReturnHook {
    fn transpile(&self, body: &mut MethodBody) -> Result<()> {
        let sites = Locator::new(body).find_all(&CodeMatch::Return);
        if sites.is_empty() {
            return Err(Error::AnchorNotFound {
                method: body.id().to_string(),
                query: CodeMatch::Return.description(),
            });
        }
        // Back to front, so earlier sites keep their index. Exit blocks are appended
        // after the last original instruction and are never revisited.
        for index in sites.into_iter().rev() {
            self.hook.emit_at(body, index)?;
        }
        Ok(())
    }

    fn description(&self) -> String {
        format!("event {} before every return", self.hook.kind())
    }
}

/// Retargets every call to `from` at `to`.
///
/// `to` must consume and produce the same number of stack values as `from`, so the
/// surrounding code stays balanced. Static targets are called with `call`, instance
/// targets with `callvirt`.
#[derive(Debug, Clone)]
pub struct CallRedirect {
    from: MethodId,
    to: MethodRef,
}

impl CallRedirect {
    /// Redirects calls of `from` to `to`.
    #[must_use]
    pub fn new(from: MethodId, to: MethodRef) -> Self {
        Self { from, to }
    }
}

impl Transpiler for CallRedirect {
    fn transpile(&self, body: &mut MethodBody) -> Result<()> {
        let matcher = CodeMatch::Calls(self.from.clone());
        let sites = Locator::new(body).find_all(&matcher);
        if sites.is_empty() {
            return Err(Error::AnchorNotFound {
                method: body.id().to_string(),
                query: matcher.description(),
            });
        }

        let instructions = body.instructions_mut();
        for &index in &sites {
            let instr = &instructions[index];
            let Operand::Method(original) = &instr.operand else {
                return Err(malformed_error!("'{}' matched a call without a method operand", instr));
            };
            if instr.opcode == OpCode::Newobj {
                return Err(malformed_error!("cannot redirect constructor call '{}'", instr));
            }
            if original.arg_count() != self.to.arg_count()
                || original.returns_value() != self.to.returns_value()
            {
                return Err(malformed_error!(
                    "{} has a different stack shape than {}",
                    self.to,
                    original
                ));
            }
        }

        for index in sites {
            let labels = instructions[index].take_labels();
            let mut redirected = if self.to.is_static {
                Instruction::call(self.to.clone())
            } else {
                Instruction::callvirt(self.to.clone())
            };
            redirected.labels = labels;
            instructions[index] = redirected;
        }
        Ok(())
    }

    fn description(&self) -> String {
        format!("redirect {} to {}", self.from, self.to.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{stack, TypeSig},
        emit::ValueSource,
        events::{EventKind, EventSchema},
    };

    fn score_body() -> MethodBody {
        let mut body = MethodBody::new(MethodRef::static_method(
            "Round",
            "Score",
            vec![TypeSig::I32],
            TypeSig::I32,
        ));
        let negative = body.define_label();
        body.extend([
            Instruction::ldarg(0),
            Instruction::ldc_i4(0),
            Instruction::branch(OpCode::Blt, negative),
            Instruction::ldarg(0),
            Instruction::ret(),
            Instruction::ldc_i4(0).with_label(negative),
            Instruction::ret(),
        ]);
        body
    }

    fn scored() -> EventKind {
        EventKind::new(EventSchema::new("Scored").field("Points", TypeSig::I32)).unwrap()
    }

    #[test]
    fn test_return_hook_covers_every_return() {
        let mut body = score_body();
        let hook = EventHook::new(scored()).bind("Points", ValueSource::Stack);
        ReturnHook::new(hook).transpile(&mut body).unwrap();

        body.validate().unwrap();
        stack::verify(&body).unwrap();
        let events = body
            .instructions()
            .iter()
            .filter(|i| matches!(i.operand, Operand::Event(_)))
            .count();
        assert_eq!(events, 2);
    }

    #[test]
    fn test_prologue_description() {
        let patch = EventPatch::prologue(
            EventHook::new(scored()).bind("Points", ValueSource::Argument(0)),
        );
        assert_eq!(patch.description(), "event Scored at start");
        let mut body = score_body();
        patch.transpile(&mut body).unwrap();
        assert!(matches!(body.instructions()[1].operand, Operand::Event(_)));
    }

    #[test]
    fn test_call_redirect() {
        let log = MethodRef::static_method("Host", "Log", vec![TypeSig::String], TypeSig::Void);
        let quiet = MethodRef::static_method("Plugin", "Quiet", vec![TypeSig::String], TypeSig::Void);
        let wrong = MethodRef::static_method("Plugin", "Count", vec![TypeSig::String], TypeSig::I32);

        let mut body = MethodBody::new(MethodRef::static_method("Host", "Tick", vec![], TypeSig::Void));
        body.extend([
            Instruction::ldstr("tick"),
            Instruction::call(log.clone()),
            Instruction::ret(),
        ]);

        let mut copy = body.clone();
        assert!(matches!(
            CallRedirect::new(log.id.clone(), wrong).transpile(&mut copy),
            Err(Error::Malformed { .. })
        ));
        assert_eq!(copy, body);

        CallRedirect::new(log.id.clone(), quiet.clone()).transpile(&mut body).unwrap();
        assert_eq!(body.instructions()[1].operand.as_method(), Some(&quiet));

        assert!(matches!(
            CallRedirect::new(log.id, quiet).transpile(&mut body),
            Err(Error::AnchorNotFound { .. })
        ));
    }
}
