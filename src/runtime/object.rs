//! Heap objects of the reference host.
//!
//! Every object lives in the runtime's [`crate::utils::arena::Arena`] and is addressed by
//! an [`ObjectRef`]. Event values are heap objects too: `newobj <event kind>` allocates
//! one, the method keeps its handle in a local, and the frame destroys it on exit.

use std::collections::HashMap;

use crate::{
    events::EventArgs,
    runtime::value::Value,
    utils::arena::Handle,
};

/// Handle of a heap object.
pub type ObjectRef = Handle<HeapObject>;

/// A plain host object: a type name and named fields.
#[derive(Debug, Clone, PartialEq)]
pub struct HostObject {
    type_name: String,
    fields: HashMap<String, Value>,
}

impl HostObject {
    /// Creates an object without fields.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: HashMap::new(),
        }
    }

    /// Returns this object with `name` set to `value`.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Field value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Sets a field, creating it if needed.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }
}

/// Anything the runtime heap can hold.
#[derive(Debug)]
pub enum HeapObject {
    /// A host object.
    Host(HostObject),
    /// An event-argument value under construction or dispatch.
    Event(EventArgs),
}

impl HeapObject {
    /// Type name for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            HeapObject::Host(object) => object.type_name().to_string(),
            HeapObject::Event(args) => args.kind().type_name(),
        }
    }
}
