//! Per-invocation state: argument slots, locals and the evaluation stack.

use crate::{
    assembly::{body::MethodBody, types::TypeSig},
    runtime::{error::ExecutionError, object::ObjectRef, value::Value},
};

/// One activation of an interpreted method.
#[derive(Debug)]
pub struct Frame {
    args: Vec<Value>,
    arg_types: Vec<TypeSig>,
    locals: Vec<Value>,
    local_types: Vec<TypeSig>,
    stack: Vec<Value>,
    max_stack: usize,
    /// Event values allocated by this frame, destroyed when it exits
    pub(crate) events: Vec<ObjectRef>,
}

impl Frame {
    /// Sets up a frame for `body`, coercing `args` to the declared argument types.
    ///
    /// # Errors
    ///
    /// [`ExecutionError::ArgumentCountMismatch`] if `args` does not fill every slot.
    pub fn new(body: &MethodBody, args: Vec<Value>, max_stack: usize) -> Result<Self, ExecutionError> {
        let method = body.method();
        if args.len() != method.arg_count() {
            return Err(ExecutionError::ArgumentCountMismatch {
                method: method.id.to_string(),
                expected: method.arg_count(),
                found: args.len(),
            });
        }

        let arg_types: Vec<TypeSig> = (0..args.len())
            .map(|slot| {
                u16::try_from(slot)
                    .ok()
                    .and_then(|slot| method.arg_type(slot))
                    .unwrap_or(TypeSig::Object)
            })
            .collect();
        let args = args
            .into_iter()
            .zip(&arg_types)
            .map(|(value, ty)| value.coerce(ty))
            .collect();

        let local_types: Vec<TypeSig> = body.locals().iter().map(|local| local.ty.clone()).collect();
        let locals = local_types.iter().map(Value::default_for).collect();

        Ok(Self {
            args,
            arg_types,
            locals,
            local_types,
            stack: Vec::new(),
            max_stack,
            events: Vec::new(),
        })
    }

    /// Pushes onto the evaluation stack.
    ///
    /// # Errors
    ///
    /// [`ExecutionError::StackOverflow`] past the configured limit.
    pub fn push(&mut self, value: Value) -> Result<(), ExecutionError> {
        if self.stack.len() >= self.max_stack {
            return Err(ExecutionError::StackOverflow {
                limit: self.max_stack,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pops the top of the evaluation stack. `index` is the executing instruction.
    ///
    /// # Errors
    ///
    /// [`ExecutionError::StackUnderflow`] on an empty stack.
    pub fn pop(&mut self, index: usize) -> Result<Value, ExecutionError> {
        self.stack.pop().ok_or(ExecutionError::StackUnderflow { index })
    }

    /// Pops `count` values and returns them in push order.
    ///
    /// # Errors
    ///
    /// [`ExecutionError::StackUnderflow`] if fewer values are present.
    pub fn pop_n(&mut self, count: usize, index: usize) -> Result<Vec<Value>, ExecutionError> {
        if self.stack.len() < count {
            return Err(ExecutionError::StackUnderflow { index });
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    /// The top of the evaluation stack.
    ///
    /// # Errors
    ///
    /// [`ExecutionError::StackUnderflow`] on an empty stack.
    pub fn peek(&self, index: usize) -> Result<&Value, ExecutionError> {
        self.stack.last().ok_or(ExecutionError::StackUnderflow { index })
    }

    /// Current stack depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Reads an argument slot.
    ///
    /// # Errors
    ///
    /// [`ExecutionError::ArgumentIndexOutOfBounds`].
    pub fn arg(&self, slot: u16) -> Result<&Value, ExecutionError> {
        self.args
            .get(usize::from(slot))
            .ok_or(ExecutionError::ArgumentIndexOutOfBounds {
                index: usize::from(slot),
                count: self.args.len(),
            })
    }

    /// Writes an argument slot, coercing to its declared type.
    ///
    /// # Errors
    ///
    /// [`ExecutionError::ArgumentIndexOutOfBounds`].
    pub fn set_arg(&mut self, slot: u16, value: Value) -> Result<(), ExecutionError> {
        let count = self.args.len();
        let index = usize::from(slot);
        match (self.args.get_mut(index), self.arg_types.get(index)) {
            (Some(arg), Some(ty)) => {
                *arg = value.coerce(ty);
                Ok(())
            }
            _ => Err(ExecutionError::ArgumentIndexOutOfBounds { index, count }),
        }
    }

    /// Reads a local slot.
    ///
    /// # Errors
    ///
    /// [`ExecutionError::LocalIndexOutOfBounds`].
    pub fn local(&self, slot: u16) -> Result<&Value, ExecutionError> {
        self.locals
            .get(usize::from(slot))
            .ok_or(ExecutionError::LocalIndexOutOfBounds {
                index: usize::from(slot),
                count: self.locals.len(),
            })
    }

    /// Writes a local slot, coercing to its declared type.
    ///
    /// # Errors
    ///
    /// [`ExecutionError::LocalIndexOutOfBounds`].
    pub fn set_local(&mut self, slot: u16, value: Value) -> Result<(), ExecutionError> {
        let count = self.locals.len();
        let index = usize::from(slot);
        match (self.locals.get_mut(index), self.local_types.get(index)) {
            (Some(local), Some(ty)) => {
                *local = value.coerce(ty);
                Ok(())
            }
            _ => Err(ExecutionError::LocalIndexOutOfBounds { index, count }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::types::MethodRef;

    fn body() -> MethodBody {
        let mut body = MethodBody::new(MethodRef::instance_method(
            "Door",
            "Lock",
            vec![TypeSig::Bool],
            TypeSig::Void,
        ));
        body.declare_local(TypeSig::I32);
        body
    }

    #[test]
    fn test_slots_are_coerced() {
        let mut frame = Frame::new(&body(), vec![Value::Null, Value::I32(1)], 8).unwrap();
        assert_eq!(frame.arg(1).unwrap(), &Value::Bool(true));
        frame.set_local(0, Value::Bool(true)).unwrap();
        assert_eq!(frame.local(0).unwrap(), &Value::I32(1));
        assert!(frame.local(1).is_err());
        assert!(frame.set_arg(2, Value::Null).is_err());
    }

    #[test]
    fn test_stack_limits() {
        let mut frame = Frame::new(&body(), vec![Value::Null, Value::Bool(false)], 2).unwrap();
        frame.push(Value::I32(1)).unwrap();
        frame.push(Value::I32(2)).unwrap();
        assert!(matches!(frame.push(Value::I32(3)), Err(ExecutionError::StackOverflow { limit: 2 })));
        assert_eq!(frame.pop_n(2, 0).unwrap(), vec![Value::I32(1), Value::I32(2)]);
        assert!(matches!(frame.pop(7), Err(ExecutionError::StackUnderflow { index: 7 })));
    }

    #[test]
    fn test_argument_count() {
        assert!(matches!(
            Frame::new(&body(), vec![Value::Null], 8),
            Err(ExecutionError::ArgumentCountMismatch { expected: 2, found: 1, .. })
        ));
    }
}
