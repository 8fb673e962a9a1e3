//! Event-argument values.
//!
//! An [`EventArgs`] is created fresh for every invocation of an instrumented method,
//! handed by reference to each subscriber in turn, read back by value feedback, and
//! dropped when the method returns. Subscribers see each other's writes.

use std::fmt;

use crate::{
    events::schema::{EventKind, IS_ALLOWED},
    runtime::Value,
    Error, Result,
};

/// The value passed to subscribers of one event kind.
///
/// # Examples
///
/// ```rust
/// use ilweave::{assembly::TypeSig, events::{EventArgs, EventKind, EventSchema}, runtime::Value};
///
/// let kind = EventKind::new(
///     EventSchema::new("Healing").mutable_field("Amount", TypeSig::F64).cancellable(),
/// )?;
/// let mut args = EventArgs::new(kind, vec![Value::F64(10.0)])?;
///
/// args.set("Amount", 25.0)?;
/// args.deny()?;
/// assert_eq!(args.get("Amount")?, Value::F64(25.0));
/// assert!(!args.is_allowed());
/// # Ok::<(), ilweave::Error>(())
/// ```
#[derive(Clone, PartialEq)]
pub struct EventArgs {
    kind: EventKind,
    values: Vec<Value>,
    is_allowed: bool,
}

impl EventArgs {
    /// Builds a value from field values given in schema order.
    ///
    /// # Errors
    ///
    /// [`Error::SchemaMismatch`] for a wrong value count, [`Error::TypeMismatch`] for a value
    /// that does not fit its field.
    pub fn new(kind: EventKind, values: Vec<Value>) -> Result<Self> {
        let fields = kind.schema().fields();
        if fields.len() != values.len() {
            return Err(Error::SchemaMismatch {
                event: kind.id().to_string(),
                message: format!("expected {} values, got {}", fields.len(), values.len()),
            });
        }
        let values = values
            .into_iter()
            .zip(fields)
            .map(|(value, field)| {
                let value = value.coerce(&field.ty);
                if value.is_assignable_to(&field.ty) {
                    Ok(value)
                } else {
                    Err(Error::TypeMismatch {
                        expected: format!("{} for field '{}'", field.ty, field.name),
                        found: value.type_name().to_string(),
                    })
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            kind,
            values,
            is_allowed: true,
        })
    }

    /// Builds a value with every field at its type's default.
    #[must_use]
    pub fn with_defaults(kind: EventKind) -> Self {
        let values = kind
            .schema()
            .fields()
            .iter()
            .map(|field| Value::default_for(&field.ty))
            .collect();
        Self {
            kind,
            values,
            is_allowed: true,
        }
    }

    /// The event kind.
    #[must_use]
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Field values in schema order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at a schema position.
    #[must_use]
    pub fn field_value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Reads a field by name. `IsAllowed` reads the cancellation flag.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownField`] for undeclared names, [`Error::NotCancellable`] for
    /// `IsAllowed` on a kind that is not cancellable.
    pub fn get(&self, name: &str) -> Result<Value> {
        if name == IS_ALLOWED {
            self.kind.is_allowed_field()?;
            return Ok(Value::Bool(self.is_allowed));
        }
        let index = self.index_of(name)?;
        Ok(self.values[index].clone())
    }

    /// Writes a field by name. `IsAllowed` writes the cancellation flag.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownField`], [`Error::ReadOnlyField`], [`Error::TypeMismatch`], or
    /// [`Error::NotCancellable`] for `IsAllowed` on a kind that is not cancellable.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if name == IS_ALLOWED {
            let allowed = value.as_bool().ok_or_else(|| Error::TypeMismatch {
                expected: "bool".to_string(),
                found: value.type_name().to_string(),
            })?;
            return self.set_allowed(allowed);
        }

        let index = self.index_of(name)?;
        let field = &self.kind.schema().fields()[index];
        if !field.is_mutable() {
            return Err(Error::ReadOnlyField {
                event: self.kind.id().to_string(),
                field: name.to_string(),
            });
        }
        let value = value.coerce(&field.ty);
        if !value.is_assignable_to(&field.ty) {
            return Err(Error::TypeMismatch {
                expected: field.ty.to_string(),
                found: value.type_name().to_string(),
            });
        }
        self.values[index] = value;
        Ok(())
    }

    /// Current value of the cancellation flag. Always `true` for kinds that cannot be
    /// cancelled.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.is_allowed
    }

    /// Sets the cancellation flag.
    ///
    /// # Errors
    ///
    /// [`Error::NotCancellable`] if the kind is not cancellable.
    pub fn set_allowed(&mut self, allowed: bool) -> Result<()> {
        if !self.kind.is_cancellable() {
            return Err(Error::NotCancellable(self.kind.id().to_string()));
        }
        self.is_allowed = allowed;
        Ok(())
    }

    /// Cancels the host operation.
    ///
    /// # Errors
    ///
    /// [`Error::NotCancellable`] if the kind is not cancellable.
    pub fn deny(&mut self) -> Result<()> {
        self.set_allowed(false)
    }

    /// Re-allows a previously denied operation.
    ///
    /// # Errors
    ///
    /// [`Error::NotCancellable`] if the kind is not cancellable.
    pub fn allow(&mut self) -> Result<()> {
        self.set_allowed(true)
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.kind
            .schema()
            .field_index(name)
            .ok_or_else(|| Error::UnknownField {
                event: self.kind.id().to_string(),
                field: name.to_string(),
            })
    }
}

impl fmt::Debug for EventArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.kind.id());
        for (field, value) in self.kind.schema().fields().iter().zip(&self.values) {
            s.field(&field.name, value);
        }
        if self.kind.is_cancellable() {
            s.field(IS_ALLOWED, &self.is_allowed);
        }
        s.finish()
    }
}
