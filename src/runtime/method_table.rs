//! The loaded-method table of the reference host.
//!
//! Methods are either interpreted [`MethodBody`]s or native Rust functions standing in
//! for engine code. Lookup is by exact [`MethodId`]: a name that exists with other
//! parameters is a [`Error::SignatureMismatch`], anything else a
//! [`Error::MethodNotFound`] with edit-distance suggestions.
//!
//! The table also remembers every event kind the installed bodies construct, which is
//! how the interpreter resolves `ldsfld Handlers::<kind>`.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    assembly::{
        body::MethodBody,
        instruction::Operand,
        types::{MethodId, MethodRef},
    },
    events::EventKind,
    runtime::value::Value,
    utils::suggest::similar_names,
    Error, Result,
};

/// Native method signature: receives the argument slots, `this` first for instance
/// methods, and returns the value of a non-void method.
pub type NativeFn = dyn Fn(&[Value]) -> anyhow::Result<Option<Value>> + Send + Sync;

/// One loaded method.
#[derive(Clone)]
pub enum MethodImpl {
    /// Interpreted body.
    Body(Arc<MethodBody>),
    /// Native implementation.
    Native {
        /// Signature
        method: MethodRef,
        /// Implementation
        func: Arc<NativeFn>,
    },
}

impl MethodImpl {
    /// Signature of the method.
    #[must_use]
    pub fn method(&self) -> &MethodRef {
        match self {
            MethodImpl::Body(body) => body.method(),
            MethodImpl::Native { method, .. } => method,
        }
    }

    /// Returns true for native methods.
    #[must_use]
    pub fn is_native(&self) -> bool {
        matches!(self, MethodImpl::Native { .. })
    }
}

impl fmt::Debug for MethodImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodImpl::Body(body) => write!(f, "Body({}, {} instructions)", body.id(), body.len()),
            MethodImpl::Native { method, .. } => write!(f, "Native({method})"),
        }
    }
}

/// All loaded methods, keyed by identity.
#[derive(Debug, Default, Clone)]
pub struct MethodTable {
    methods: HashMap<MethodId, MethodImpl>,
    kinds: HashMap<String, EventKind>,
}

impl MethodTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads an interpreted method, replacing any method with the same identity.
    pub fn insert_body(&mut self, body: MethodBody) {
        self.record_kinds(&body);
        self.methods
            .insert(body.id().clone(), MethodImpl::Body(Arc::new(body)));
    }

    /// Loads a native method, replacing any method with the same identity.
    pub fn insert_native<F>(&mut self, method: MethodRef, func: F)
    where
        F: Fn(&[Value]) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        self.methods.insert(
            method.id.clone(),
            MethodImpl::Native {
                method,
                func: Arc::new(func),
            },
        );
    }

    /// Exact lookup.
    ///
    /// # Errors
    ///
    /// [`Error::SignatureMismatch`] when only overloads with other parameters exist,
    /// [`Error::MethodNotFound`] otherwise.
    pub fn resolve(&self, id: &MethodId) -> Result<&MethodImpl> {
        if let Some(method) = self.methods.get(id) {
            return Ok(method);
        }

        let mut candidates: Vec<String> = self
            .methods
            .keys()
            .filter(|known| known.same_name(id))
            .map(ToString::to_string)
            .collect();
        if !candidates.is_empty() {
            candidates.sort();
            return Err(Error::SignatureMismatch {
                method: id.to_string(),
                candidates,
            });
        }

        let names: Vec<String> = self.methods.keys().map(MethodId::qualified_name).collect();
        Err(Error::MethodNotFound {
            method: id.to_string(),
            suggestions: similar_names(&id.qualified_name(), names.iter().map(String::as_str)),
        })
    }

    /// The interpreted body of a method.
    ///
    /// # Errors
    ///
    /// Lookup errors of [`MethodTable::resolve`], or [`Error::Malformed`] for a native method.
    pub fn body(&self, id: &MethodId) -> Result<Arc<MethodBody>> {
        match self.resolve(id)? {
            MethodImpl::Body(body) => Ok(Arc::clone(body)),
            MethodImpl::Native { method, .. } => {
                Err(malformed_error!("{} is native and has no body", method))
            }
        }
    }

    /// Replaces the body of an already loaded interpreted method.
    ///
    /// # Errors
    ///
    /// Lookup errors of [`MethodTable::resolve`], [`Error::Malformed`] if the loaded
    /// method is native or has another signature, or [`Error::SchemaMismatch`] if the
    /// body constructs an event kind whose identifier is already loaded with another
    /// layout.
    pub fn install(&mut self, body: MethodBody) -> Result<()> {
        self.check_kinds(&body)?;
        match self.resolve(body.id())? {
            MethodImpl::Body(existing) if existing.method() == body.method() => {}
            MethodImpl::Body(existing) => {
                return Err(malformed_error!(
                    "body for {} does not match the loaded signature {}",
                    body.method(),
                    existing.method()
                ));
            }
            MethodImpl::Native { method, .. } => {
                return Err(malformed_error!("cannot install a body over native {}", method));
            }
        }
        self.insert_body(body);
        Ok(())
    }

    /// Returns true if a method with this identity is loaded.
    #[must_use]
    pub fn contains(&self, id: &MethodId) -> bool {
        self.methods.contains_key(id)
    }

    /// Number of loaded methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Returns true if nothing is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Identities of all loaded methods, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = &MethodId> {
        self.methods.keys()
    }

    /// An event kind constructed by some installed body.
    #[must_use]
    pub fn event_kind(&self, id: &str) -> Option<&EventKind> {
        self.kinds.get(id)
    }

    fn check_kinds(&self, body: &MethodBody) -> Result<()> {
        for instr in body.instructions() {
            if let Operand::Event(kind) = &instr.operand {
                match self.kinds.get(kind.id()) {
                    Some(loaded) if loaded != kind => {
                        return Err(Error::SchemaMismatch {
                            event: kind.id().to_string(),
                            message: format!(
                                "{} in {} conflicts with the layout already loaded ({:?})",
                                kind.id(),
                                body.id(),
                                loaded
                            ),
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn record_kinds(&mut self, body: &MethodBody) {
        for instr in body.instructions() {
            if let Operand::Event(kind) = &instr.operand {
                self.kinds
                    .entry(kind.id().to_string())
                    .or_insert_with(|| kind.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Instruction, TypeSig},
        events::EventSchema,
    };

    fn body(name: &str, params: Vec<TypeSig>) -> MethodBody {
        let mut body = MethodBody::new(MethodRef::static_method("Round", name, params, TypeSig::Void));
        body.push(Instruction::ret());
        body
    }

    #[test]
    fn test_resolution_errors() {
        let mut table = MethodTable::new();
        table.insert_body(body("Restart", vec![TypeSig::I32]));

        let other = MethodId::new("Round", "Restart", vec![]);
        match table.resolve(&other) {
            Err(Error::SignatureMismatch { candidates, .. }) => {
                assert_eq!(candidates, vec!["Round::Restart(int32)".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let typo = MethodId::new("Round", "Restrat", vec![]);
        match table.resolve(&typo) {
            Err(Error::MethodNotFound { suggestions, .. }) => {
                assert_eq!(suggestions, vec!["Round::Restart".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_install_requires_loaded_body() {
        let mut table = MethodTable::new();
        assert!(table.install(body("End", vec![])).is_err());

        table.insert_body(body("End", vec![]));
        let mut patched = body("End", vec![]);
        patched.instructions_mut().insert(0, Instruction::nop());
        table.install(patched).unwrap();
        assert_eq!(table.body(&MethodId::new("Round", "End", vec![])).unwrap().len(), 2);

        let native = MethodRef::static_method("Round", "Now", vec![], TypeSig::I64);
        table.insert_native(native.clone(), |_| Ok(Some(Value::I64(0))));
        assert!(table.resolve(&native.id).unwrap().is_native());
        assert!(table.body(&native.id).is_err());
    }

    #[test]
    fn test_install_rejects_conflicting_event_layout() {
        let door = EventKind::new(EventSchema::new("Opening").field("Door", TypeSig::I32)).unwrap();
        let cost = EventKind::new(EventSchema::new("Opening").field("Cost", TypeSig::F64)).unwrap();
        let constructing = |name: &str, kind: &EventKind| {
            let mut body = body(name, vec![]);
            body.instructions_mut().insert(0, Instruction::new_event(kind.clone()));
            body
        };

        let mut table = MethodTable::new();
        table.insert_body(body("Open", vec![]));
        table.insert_body(body("Pay", vec![]));
        table.install(constructing("Open", &door)).unwrap();

        let same = EventKind::new(EventSchema::new("Opening").field("Door", TypeSig::I32)).unwrap();
        table.install(constructing("Open", &same)).unwrap();

        let before = table.body(&MethodId::new("Round", "Pay", vec![])).unwrap();
        assert!(matches!(
            table.install(constructing("Pay", &cost)),
            Err(Error::SchemaMismatch { .. })
        ));
        assert_eq!(table.body(&MethodId::new("Round", "Pay", vec![])).unwrap(), before);
        assert!(table.event_kind("Opening").unwrap().ptr_eq(&door));
    }
}
