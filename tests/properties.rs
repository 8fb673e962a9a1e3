//! Property tests for splicing and value feedback.

use std::sync::Arc;

use ilweave::{assembly::splicer, prelude::*};
use proptest::prelude::*;

/// One splice operation: `(kind, index, count, extra)`.
type SpliceOp = (u8, usize, usize, usize);

fn build_body(len: usize, labels: &[usize], branches: &[(usize, usize)]) -> MethodBody {
    let mut body = MethodBody::new(MethodRef::static_method("Host", "Spliced", vec![], TypeSig::Void));
    let defined: Vec<Label> = labels.iter().map(|_| body.define_label()).collect();

    let mut instrs: Vec<Instruction> = (0..len).map(|_| Instruction::nop()).collect();
    if !defined.is_empty() {
        for &(from, target) in branches {
            instrs[from % len] = Instruction::br(defined[target % defined.len()]);
        }
    }
    for (label, &at) in defined.iter().zip(labels) {
        instrs[at % len].attach_label(*label);
    }
    body.extend(instrs);
    body
}

fn attached_labels(body: &MethodBody) -> Vec<Label> {
    body.instructions()
        .iter()
        .flat_map(|instr| instr.labels.iter().copied())
        .collect()
}

/// New instructions; every third one branches to a label that is attached right now.
fn fresh(body: &MethodBody, count: usize, seed: usize) -> Vec<Instruction> {
    let attached = attached_labels(body);
    (0..count)
        .map(|i| match attached.len() {
            0 => Instruction::nop(),
            n if (seed + i) % 3 == 0 => Instruction::brtrue(attached[(seed + i) % n]),
            _ => Instruction::nop(),
        })
        .collect()
}

fn apply(body: &mut MethodBody, (kind, index, count, extra): SpliceOp) -> ilweave::Result<()> {
    let len = body.len();
    match kind % 4 {
        0 => splicer::insert(body, index % (len + 1), fresh(body, count + 1, extra)),
        1 => splicer::insert_taking_labels(body, index % (len + 1), fresh(body, count + 1, extra)),
        2 if len > 0 => {
            let at = index % len;
            splicer::remove(body, at, count.min(len - at)).map(|_| ())
        }
        3 if len > 0 => {
            let at = index % len;
            let replacement = fresh(body, extra % 3, extra);
            splicer::replace(body, at, count.min(len - at), replacement).map(|_| ())
        }
        _ => Ok(()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_splicing_never_leaves_dangling_labels(
        len in 1usize..12,
        labels in prop::collection::vec(0usize..64, 0..4),
        branches in prop::collection::vec((0usize..64, 0usize..64), 0..4),
        ops in prop::collection::vec((0u8..4, 0usize..64, 0usize..4, 0usize..16), 0..12),
    ) {
        let mut body = build_body(len, &labels, &branches);
        prop_assert!(body.unattached_labels().is_empty());

        for op in ops {
            let before = body.clone();
            match apply(&mut body, op) {
                Ok(()) => {}
                Err(Error::DanglingLabel(_) | Error::OutOfBounds { .. }) => {
                    prop_assert_eq!(&body, &before, "failed splice modified the body");
                }
                Err(e) => prop_assert!(false, "unexpected error {}", e),
            }
            prop_assert!(body.unattached_labels().is_empty(), "dangling after {:?}", op);
            prop_assert!(body.label_positions().is_ok());
        }
    }

    #[test]
    fn prop_feedback_writes_subscriber_value(original in any::<i32>(), assigned in any::<i32>(), same in any::<bool>()) {
        let assigned = if same { original } else { assigned };
        let slot = FieldRef::static_field("Host", "Slot", TypeSig::I32);

        // static void Host::Set(int32 x) { Host.Slot = x; }
        let mut body = MethodBody::new(MethodRef::static_method("Host", "Set", vec![TypeSig::I32], TypeSig::Void));
        body.extend([
            Instruction::ldarg(0),
            Instruction::store_field(slot.clone()),
            Instruction::ret(),
        ]);
        let target = body.id().clone();
        let mut methods = MethodTable::new();
        methods.insert_body(body);

        let kind = EventKind::new(EventSchema::new("Setting").mutable_field("Value", TypeSig::I32)).unwrap();
        let hook = EventHook::new(kind.clone())
            .bind("Value", ValueSource::Argument(0))
            .feedback("Value", HostSlot::Argument(0));
        let mut catalog = PatchCatalog::new();
        catalog.register(PatchDescriptor::new("set", target.clone(), EventPatch::prologue(hook)));
        prop_assert!(catalog.apply_all(&mut methods).unwrap().is_clean());

        let registry = Arc::new(HandlerRegistry::new());
        registry.subscribe(&kind, "assign", move |ev| {
            ev.set("Value", assigned)?;
            Ok(())
        });

        let mut runtime = Runtime::with_registry(methods, registry);
        runtime.invoke(&target, vec![Value::I32(original)]).unwrap();
        prop_assert_eq!(runtime.static_value(&slot), Value::I32(assigned));
    }
}
