//! Type and member identities used by instruction operands.
//!
//! The instrumentation core never sees the host's real metadata. It works on a small,
//! self-describing vocabulary instead: a [`TypeSig`] for value types, a [`MethodId`] for
//! the `(declaring type, name, parameter types)` tuple that identifies a patch target,
//! and [`MethodRef`] / [`FieldRef`] for call and field operands.
//!
//! # Key Components
//!
//! - [`TypeSig`] - Primitive and named types
//! - [`MethodId`] - Stable method identity, the key of the host method table
//! - [`MethodRef`] - A method identity plus what a call site needs (return type, static-ness)
//! - [`FieldRef`] - A field reference, instance or static

use std::fmt;

/// A type as seen by the instruction model.
///
/// Only the distinctions the emitters and the reference host need are kept: the
/// evaluation-stack shape of primitives, strings, and opaque named object types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSig {
    /// No value (method return only)
    Void,
    /// Boolean, carried as a 32-bit integer on the evaluation stack
    Bool,
    /// Signed 32-bit integer
    I32,
    /// Signed 64-bit integer
    I64,
    /// 64-bit floating point
    F64,
    /// Immutable string reference
    String,
    /// Any object reference
    Object,
    /// A named host type (e.g. `Player`, `Vector3`)
    Named(String),
}

impl TypeSig {
    /// Creates a named type.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        TypeSig::Named(name.into())
    }

    /// Returns `true` for every type except [`TypeSig::Void`].
    #[must_use]
    pub fn has_value(&self) -> bool {
        !matches!(self, TypeSig::Void)
    }

    /// Returns `true` for reference types (strings, objects and named types).
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, TypeSig::String | TypeSig::Object | TypeSig::Named(_))
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Void => f.write_str("void"),
            TypeSig::Bool => f.write_str("bool"),
            TypeSig::I32 => f.write_str("int32"),
            TypeSig::I64 => f.write_str("int64"),
            TypeSig::F64 => f.write_str("float64"),
            TypeSig::String => f.write_str("string"),
            TypeSig::Object => f.write_str("object"),
            TypeSig::Named(name) => f.write_str(name),
        }
    }
}

/// Identity of a host method: declaring type, name and parameter type list.
///
/// This is the key used to resolve patch targets against the host's loaded-method
/// table. Two overloads differ only in `params`, which is why a name match with a
/// different parameter list is reported as a signature mismatch rather than a
/// missing method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodId {
    /// Fully qualified declaring type
    pub declaring_type: String,
    /// Method name
    pub name: String,
    /// Declared parameter types, excluding the implicit `this`
    pub params: Vec<TypeSig>,
}

impl MethodId {
    /// Creates a new method identity.
    #[must_use]
    pub fn new(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        params: Vec<TypeSig>,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            params,
        }
    }

    /// Returns `true` if `other` names the same method, ignoring parameters.
    #[must_use]
    pub fn same_name(&self, other: &MethodId) -> bool {
        self.declaring_type == other.declaring_type && self.name == other.name
    }

    /// Returns the `Type::Name` form without parameters.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.declaring_type, self.name)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}(", self.declaring_type, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}

/// A method reference as used by call operands and method bodies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// The method identity
    pub id: MethodId,
    /// Declared return type
    pub returns: TypeSig,
    /// Static methods take no implicit `this` argument
    pub is_static: bool,
}

impl MethodRef {
    /// Creates a reference to a static method.
    #[must_use]
    pub fn static_method(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        params: Vec<TypeSig>,
        returns: TypeSig,
    ) -> Self {
        Self {
            id: MethodId::new(declaring_type, name, params),
            returns,
            is_static: true,
        }
    }

    /// Creates a reference to an instance method. Argument slot 0 is `this`.
    #[must_use]
    pub fn instance_method(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        params: Vec<TypeSig>,
        returns: TypeSig,
    ) -> Self {
        Self {
            id: MethodId::new(declaring_type, name, params),
            returns,
            is_static: false,
        }
    }

    /// Number of argument slots, including `this` for instance methods.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.id.params.len() + usize::from(!self.is_static)
    }

    /// Returns `true` if a call leaves a value on the evaluation stack.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        self.returns.has_value()
    }

    /// Type of the given argument slot, accounting for the implicit `this`.
    #[must_use]
    pub fn arg_type(&self, slot: u16) -> Option<TypeSig> {
        let slot = usize::from(slot);
        if self.is_static {
            self.id.params.get(slot).cloned()
        } else if slot == 0 {
            Some(TypeSig::Named(self.id.declaring_type.clone()))
        } else {
            self.id.params.get(slot - 1).cloned()
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static {
            f.write_str("static ")?;
        }
        write!(f, "{} {}", self.returns, self.id)
    }
}

/// A field reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Declaring type
    pub declaring_type: String,
    /// Field name
    pub name: String,
    /// Field type
    pub ty: TypeSig,
    /// Static fields are loaded with `ldsfld` and stored with `stsfld`
    pub is_static: bool,
}

impl FieldRef {
    /// Creates an instance field reference.
    #[must_use]
    pub fn instance(declaring_type: impl Into<String>, name: impl Into<String>, ty: TypeSig) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            ty,
            is_static: false,
        }
    }

    /// Creates a static field reference.
    #[must_use]
    pub fn static_field(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        ty: TypeSig,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            ty,
            is_static: true,
        }
    }

    /// Returns `true` if both references name the same field, ignoring the declared type.
    #[must_use]
    pub fn same_field(&self, other: &FieldRef) -> bool {
        self.declaring_type == other.declaring_type && self.name == other.name
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.ty, self.declaring_type, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_id_display() {
        let id = MethodId::new("Player", "Hurt", vec![TypeSig::F64, TypeSig::named("Attacker")]);
        assert_eq!(id.to_string(), "Player::Hurt(float64, Attacker)");
        assert_eq!(id.qualified_name(), "Player::Hurt");
    }

    #[test]
    fn test_arg_slots_account_for_this() {
        let instance =
            MethodRef::instance_method("Door", "Open", vec![TypeSig::Bool], TypeSig::Void);
        assert_eq!(instance.arg_count(), 2);
        assert_eq!(instance.arg_type(0), Some(TypeSig::named("Door")));
        assert_eq!(instance.arg_type(1), Some(TypeSig::Bool));
        assert_eq!(instance.arg_type(2), None);

        let stat = MethodRef::static_method("Round", "End", vec![TypeSig::I32], TypeSig::Void);
        assert_eq!(stat.arg_count(), 1);
        assert_eq!(stat.arg_type(0), Some(TypeSig::I32));
    }

    #[test]
    fn test_same_name_ignores_params() {
        let a = MethodId::new("Item", "Use", vec![]);
        let b = MethodId::new("Item", "Use", vec![TypeSig::I32]);
        assert!(a.same_name(&b));
        assert_ne!(a, b);
    }
}
