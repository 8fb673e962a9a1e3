//! Runtime values of the reference host.
//!
//! | Host type | Representation |
//! |-----------|----------------|
//! | `bool` | [`Value::Bool`] (coerced from `int32` on store) |
//! | `int32` | [`Value::I32`] |
//! | `int64` | [`Value::I64`] |
//! | `float64` | [`Value::F64`] |
//! | `string` | [`Value::Str`] |
//! | objects and event values | [`Value::Object`], a heap handle |
//! | `null` | [`Value::Null`] |
//! | subscription list | [`Value::Subscribers`] |

use std::{fmt, sync::Arc};

use crate::{
    assembly::types::TypeSig,
    events::EventKind,
    runtime::object::ObjectRef,
};

/// A value on the evaluation stack, in a slot, or in an event field.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Null reference.
    Null,
    /// Boolean.
    Bool(bool),
    /// 32-bit signed integer.
    I32(i32),
    /// 64-bit signed integer.
    I64(i64),
    /// 64-bit float.
    F64(f64),
    /// Immutable string.
    Str(Arc<str>),
    /// Reference to a heap object (host object or event value).
    Object(ObjectRef),
    /// The subscription list of an event kind, as loaded by `ldsfld Handlers::<kind>`.
    Subscribers(EventKind),
}

impl Value {
    /// Default value of a slot of type `ty`: zero for numerics, `false`, or null.
    #[must_use]
    pub fn default_for(ty: &TypeSig) -> Self {
        match ty {
            TypeSig::Bool => Value::Bool(false),
            TypeSig::I32 => Value::I32(0),
            TypeSig::I64 => Value::I64(0),
            TypeSig::F64 => Value::F64(0.0),
            TypeSig::Void
            | TypeSig::String
            | TypeSig::Object
            | TypeSig::Named(_) => Value::Null,
        }
    }

    /// Short type name for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I32(_) => "int32",
            Value::I64(_) => "int64",
            Value::F64(_) => "float64",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Subscribers(_) => "subscribers",
        }
    }

    /// Returns `true` if this value may be stored into a slot of type `ty`.
    #[must_use]
    pub fn is_assignable_to(&self, ty: &TypeSig) -> bool {
        match (self, ty) {
            (Value::Null, ty) => ty.is_reference(),
            (Value::Bool(_), TypeSig::Bool)
            | (Value::I32(_), TypeSig::I32)
            | (Value::I64(_), TypeSig::I64)
            | (Value::F64(_), TypeSig::F64)
            | (Value::Str(_), TypeSig::String | TypeSig::Object)
            | (Value::Object(_) | Value::Subscribers(_), TypeSig::Object | TypeSig::Named(_)) => {
                true
            }
            _ => false,
        }
    }

    /// Applies the stack-to-slot widening the host calling convention allows: `int32`
    /// into `bool` slots and `bool` into `int32` slots.
    #[must_use]
    pub fn coerce(self, ty: &TypeSig) -> Self {
        match (self, ty) {
            (Value::I32(v), TypeSig::Bool) => Value::Bool(v != 0),
            (Value::Bool(b), TypeSig::I32) => Value::I32(i32::from(b)),
            (value, _) => value,
        }
    }

    /// Branch condition semantics: non-zero, non-null, `true`.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::I32(v) => *v != 0,
            Value::I64(v) => *v != 0,
            Value::F64(v) => *v != 0.0,
            Value::Str(_) | Value::Object(_) | Value::Subscribers(_) => true,
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view, including `bool` as 0 / 1.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            Value::Bool(b) => Some(i32::from(*b)),
            _ => None,
        }
    }

    /// 64-bit integer view.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            Value::I32(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Float view.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean view, including non-zero `int32`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::I32(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// String view.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Heap handle view.
    #[must_use]
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(handle) => Some(*handle),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}L"),
            Value::F64(v) => write!(f, "{v:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(handle) => write!(f, "obj{handle:?}"),
            Value::Subscribers(kind) => write!(f, "Handlers::{kind}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Object(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignability() {
        assert!(Value::Null.is_assignable_to(&TypeSig::named("Player")));
        assert!(!Value::Null.is_assignable_to(&TypeSig::I32));
        assert!(Value::from("x").is_assignable_to(&TypeSig::String));
        assert!(!Value::I32(1).is_assignable_to(&TypeSig::I64));
        assert!(!Value::I32(1).is_assignable_to(&TypeSig::Bool));
        assert!(Value::I32(1).coerce(&TypeSig::Bool).is_assignable_to(&TypeSig::Bool));
    }

    #[test]
    fn test_defaults_and_truthiness() {
        assert_eq!(Value::default_for(&TypeSig::F64), Value::F64(0.0));
        assert_eq!(Value::default_for(&TypeSig::String), Value::Null);
        assert!(!Value::default_for(&TypeSig::Bool).is_truthy());
        assert!(Value::I64(-1).is_truthy());
        assert_eq!(Value::Bool(true).as_i32(), Some(1));
    }
}
