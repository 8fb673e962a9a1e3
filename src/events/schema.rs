//! Event kinds and their declared field layouts.
//!
//! Every instrumentation point is an event kind with a stable identifier, an ordered
//! list of fields and a version. The field order is part of the contract: emitted code
//! builds event values positionally, and subscriber authors depend on names and order
//! staying stable across host versions.
//!
//! Kinds are registered explicitly in an [`EventCatalog`] at load time and looked up by
//! exact identifier. Near misses are reported with suggestions but never resolved.
//!
//! # Examples
//!
//! ```rust
//! use ilweave::{assembly::TypeSig, events::{EventCatalog, EventSchema}};
//!
//! let mut catalog = EventCatalog::new();
//! let hurting = catalog.register(
//!     EventSchema::new("PlayerHurting")
//!         .actor("Player", TypeSig::named("Player"))
//!         .mutable_field("Amount", TypeSig::F64)
//!         .cancellable()
//!         .version(2),
//! )?;
//!
//! assert!(hurting.is_cancellable());
//! assert_eq!(hurting.schema().field_index("Amount"), Some(1));
//! assert!(catalog.resolve("PlayerHurtng").is_err());
//! # Ok::<(), ilweave::Error>(())
//! ```

use std::{collections::HashMap, fmt, hash, sync::Arc};

use bitflags::bitflags;

use crate::{
    assembly::types::{FieldRef, TypeSig},
    utils::suggest::similar_names,
    Error, Result,
};

/// Name of the cancellation flag every cancellable kind exposes.
pub const IS_ALLOWED: &str = "IsAllowed";

/// Namespace of the synthetic types event values are instances of.
pub const EVENTS_NAMESPACE: &str = "ilweave.Events";

bitflags! {
    /// Per-field attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldFlags: u8 {
        /// Subscribers may overwrite the field, and value feedback may read it back
        const MUTABLE = 0b0000_0001;
        /// The field references the actor that triggered the event
        const ACTOR = 0b0000_0010;
    }
}

/// One declared field of an event kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventField {
    /// Field name
    pub name: String,
    /// Declared type
    pub ty: TypeSig,
    /// Attributes
    pub flags: FieldFlags,
}

impl EventField {
    /// Returns `true` if subscribers may write this field.
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        self.flags.contains(FieldFlags::MUTABLE)
    }

    /// Returns `true` if this field references the triggering actor.
    #[must_use]
    pub fn is_actor(&self) -> bool {
        self.flags.contains(FieldFlags::ACTOR)
    }
}

/// Declared layout of an event kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSchema {
    id: String,
    fields: Vec<EventField>,
    cancellable: bool,
    version: u32,
}

impl EventSchema {
    /// Starts a schema with no fields, version 1, not cancellable.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Vec::new(),
            cancellable: false,
            version: 1,
        }
    }

    /// Appends a read-only field.
    #[must_use]
    pub fn field(self, name: impl Into<String>, ty: TypeSig) -> Self {
        self.with_flags(name, ty, FieldFlags::empty())
    }

    /// Appends a mutable field.
    #[must_use]
    pub fn mutable_field(self, name: impl Into<String>, ty: TypeSig) -> Self {
        self.with_flags(name, ty, FieldFlags::MUTABLE)
    }

    /// Appends a read-only actor field.
    #[must_use]
    pub fn actor(self, name: impl Into<String>, ty: TypeSig) -> Self {
        self.with_flags(name, ty, FieldFlags::ACTOR)
    }

    /// Appends a field with explicit flags.
    #[must_use]
    pub fn with_flags(mut self, name: impl Into<String>, ty: TypeSig, flags: FieldFlags) -> Self {
        self.fields.push(EventField {
            name: name.into(),
            ty,
            flags,
        });
        self
    }

    /// Marks the kind cancellable, which adds the `IsAllowed` flag.
    #[must_use]
    pub fn cancellable(mut self) -> Self {
        self.cancellable = true;
        self
    }

    /// Sets the layout version.
    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Stable identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Declared fields in constructor order. `IsAllowed` is not part of the list.
    #[must_use]
    pub fn fields(&self) -> &[EventField] {
        &self.fields
    }

    /// Position of the named field.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// The named field.
    #[must_use]
    pub fn field_named(&self, name: &str) -> Option<&EventField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Returns `true` if subscribers can cancel the host operation.
    #[must_use]
    pub fn is_cancellable(&self) -> bool {
        self.cancellable
    }

    /// Layout version.
    #[must_use]
    pub fn layout_version(&self) -> u32 {
        self.version
    }
}

/// A registered event kind: a shared, validated [`EventSchema`].
///
/// Two kinds are equal when they share an allocation or declare the same schema, so a
/// kind re-created from an identical schema reaches the same subscribers. Kinds with one
/// identifier but different layouts are distinct.
#[derive(Clone)]
pub struct EventKind(Arc<EventSchema>);

impl EventKind {
    /// Validates `schema` and wraps it.
    ///
    /// # Errors
    ///
    /// [`Error::SchemaMismatch`] for an empty identifier, a field named `IsAllowed`, or a
    /// duplicated field name.
    pub fn new(schema: EventSchema) -> Result<Self> {
        let mismatch = |message: String| Error::SchemaMismatch {
            event: schema.id.clone(),
            message,
        };
        if schema.id.is_empty() {
            return Err(mismatch("event identifier is empty".to_string()));
        }
        for (index, field) in schema.fields.iter().enumerate() {
            if field.name == IS_ALLOWED {
                return Err(mismatch(format!("'{IS_ALLOWED}' is reserved")));
            }
            if schema.fields[..index].iter().any(|f| f.name == field.name) {
                return Err(mismatch(format!("field '{}' is declared twice", field.name)));
            }
        }
        Ok(Self(Arc::new(schema)))
    }

    /// The underlying schema.
    #[must_use]
    pub fn schema(&self) -> &EventSchema {
        &self.0
    }

    /// Stable identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.0.id()
    }

    /// Returns `true` if subscribers can cancel the host operation.
    #[must_use]
    pub fn is_cancellable(&self) -> bool {
        self.0.is_cancellable()
    }

    /// Name of the synthetic type event values of this kind are instances of.
    #[must_use]
    pub fn type_name(&self) -> String {
        format!("{EVENTS_NAMESPACE}.{}", self.id())
    }

    /// Type signature of event values of this kind.
    #[must_use]
    pub fn type_sig(&self) -> TypeSig {
        TypeSig::Named(self.type_name())
    }

    /// Field reference used by emitted `ldfld` instructions. `IsAllowed` resolves for
    /// cancellable kinds.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownField`] for undeclared names, [`Error::NotCancellable`] for
    /// `IsAllowed` on a kind that is not cancellable.
    pub fn field_ref(&self, name: &str) -> Result<FieldRef> {
        if name == IS_ALLOWED {
            return self.is_allowed_field();
        }
        let field = self
            .schema()
            .field_named(name)
            .ok_or_else(|| Error::UnknownField {
                event: self.id().to_string(),
                field: name.to_string(),
            })?;
        Ok(FieldRef::instance(self.type_name(), &field.name, field.ty.clone()))
    }

    /// Field reference of the cancellation flag.
    ///
    /// # Errors
    ///
    /// [`Error::NotCancellable`] if the kind is not cancellable.
    pub fn is_allowed_field(&self) -> Result<FieldRef> {
        if !self.is_cancellable() {
            return Err(Error::NotCancellable(self.id().to_string()));
        }
        Ok(FieldRef::instance(self.type_name(), IS_ALLOWED, TypeSig::Bool))
    }

    /// Returns `true` if both handles share one schema allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &EventKind) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for EventKind {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}

impl Eq for EventKind {}

impl hash::Hash for EventKind {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventKind({} v{})", self.id(), self.schema().layout_version())
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Load-time registration table of event kinds, keyed by identifier.
#[derive(Debug, Default)]
pub struct EventCatalog {
    kinds: HashMap<String, EventKind>,
    order: Vec<EventKind>,
}

impl EventCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers `schema`.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateEvent`] if the identifier is taken, or any error of [`EventKind::new`].
    pub fn register(&mut self, schema: EventSchema) -> Result<EventKind> {
        if self.kinds.contains_key(schema.id()) {
            return Err(Error::DuplicateEvent(schema.id().to_string()));
        }
        let kind = EventKind::new(schema)?;
        self.kinds.insert(kind.id().to_string(), kind.clone());
        self.order.push(kind.clone());
        Ok(kind)
    }

    /// Exact lookup.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&EventKind> {
        self.kinds.get(id)
    }

    /// Exact lookup that reports near misses on failure.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownEvent`] with up to three suggestions.
    pub fn resolve(&self, id: &str) -> Result<EventKind> {
        self.kinds.get(id).cloned().ok_or_else(|| Error::UnknownEvent {
            event: id.to_string(),
            suggestions: similar_names(id, self.kinds.keys().map(String::as_str)),
        })
    }

    /// Registered kinds in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &EventKind> {
        self.order.iter()
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_and_duplicate_fields() {
        let reserved = EventSchema::new("Door").field(IS_ALLOWED, TypeSig::Bool);
        assert!(matches!(EventKind::new(reserved), Err(Error::SchemaMismatch { .. })));

        let twice = EventSchema::new("Door")
            .field("Door", TypeSig::Object)
            .field("Door", TypeSig::Object);
        assert!(matches!(EventKind::new(twice), Err(Error::SchemaMismatch { .. })));
    }

    #[test]
    fn test_field_refs() {
        let kind = EventKind::new(
            EventSchema::new("Interacting")
                .actor("Player", TypeSig::named("Player"))
                .cancellable(),
        )
        .unwrap();
        let player = kind.field_ref("Player").unwrap();
        assert_eq!(player.declaring_type, "ilweave.Events.Interacting");
        assert!(!player.is_static);
        assert_eq!(kind.field_ref(IS_ALLOWED).unwrap().ty, TypeSig::Bool);
        assert!(matches!(kind.field_ref("Nope"), Err(Error::UnknownField { .. })));

        let plain = EventKind::new(EventSchema::new("Spawned")).unwrap();
        assert!(matches!(plain.is_allowed_field(), Err(Error::NotCancellable(_))));
    }

    #[test]
    fn test_catalog_registration() {
        let mut catalog = EventCatalog::new();
        catalog.register(EventSchema::new("RoundEnded")).unwrap();
        catalog.register(EventSchema::new("RoundStarted")).unwrap();
        assert!(matches!(
            catalog.register(EventSchema::new("RoundEnded")),
            Err(Error::DuplicateEvent(_))
        ));
        assert_eq!(catalog.len(), 2);

        match catalog.resolve("RoundEnde") {
            Err(Error::UnknownEvent { suggestions, .. }) => {
                assert_eq!(suggestions.first().map(String::as_str), Some("RoundEnded"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_kind_identity() {
        let a = EventKind::new(EventSchema::new("Spawned").version(1)).unwrap();
        let same = EventKind::new(EventSchema::new("Spawned").version(1)).unwrap();
        assert_eq!(a, same);
        assert!(!a.ptr_eq(&same));

        let map: HashMap<EventKind, u8> = [(a.clone(), 1)].into_iter().collect();
        assert_eq!(map.get(&same), Some(&1));

        let bumped = EventKind::new(EventSchema::new("Spawned").version(2)).unwrap();
        assert_ne!(a, bumped);
        assert_eq!(map.get(&bumped), None);
    }

    #[test]
    fn test_same_id_other_layout_is_distinct() {
        let door = EventKind::new(EventSchema::new("Opening").field("Door", TypeSig::I32)).unwrap();
        let cost = EventKind::new(
            EventSchema::new("Opening").field("Cost", TypeSig::F64).cancellable(),
        )
        .unwrap();
        assert_eq!(door.id(), cost.id());
        assert_ne!(door, cost);
    }
}
