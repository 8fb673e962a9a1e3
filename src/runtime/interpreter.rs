//! The reference host interpreter.
//!
//! [`Runtime`] executes method bodies from a [`MethodTable`] with the host calling
//! convention: argument 0 is `this` for instance methods, and a non-void method leaves
//! exactly one value on the stack at `ret`. Two members of `ilweave.Handlers` are built
//! in:
//!
//! - `ldsfld Handlers::<kind>` pushes the subscription list of that event kind
//! - `call Handlers::InvokeSafely(list, ev)` dispatches the event value through the
//!   runtime's [`HandlerRegistry`]
//!
//! Event values are heap objects owned by the frame that constructed them and are
//! destroyed when that frame exits, however it exits.
//!
//! # Example
//!
//! ```rust
//! use ilweave::{
//!     assembly::{FieldRef, Instruction, MethodBody, MethodRef, TypeSig},
//!     runtime::{MethodTable, Runtime, Value},
//! };
//!
//! let counter = FieldRef::static_field("Round", "Count", TypeSig::I32);
//! let mut body = MethodBody::new(MethodRef::static_method("Round", "Bump", vec![TypeSig::I32], TypeSig::Void));
//! body.extend([
//!     Instruction::load_field(counter.clone()),
//!     Instruction::ldarg(0),
//!     Instruction::new(ilweave::assembly::OpCode::Add),
//!     Instruction::store_field(counter.clone()),
//!     Instruction::ret(),
//! ]);
//! let id = body.id().clone();
//!
//! let mut methods = MethodTable::new();
//! methods.insert_body(body);
//! let mut runtime = Runtime::new(methods);
//! runtime.invoke(&id, vec![Value::I32(5)])?;
//! runtime.invoke(&id, vec![Value::I32(2)])?;
//! assert_eq!(runtime.static_value(&counter), Value::I32(7));
//! # Ok::<(), ilweave::Error>(())
//! ```

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use tracing::trace;

use crate::{
    assembly::{
        body::MethodBody,
        instruction::{Instruction, Label, Operand, OperandKind},
        opcodes::OpCode,
        types::{FieldRef, MethodId, MethodRef, TypeSig},
    },
    config::{ExecutionLimits, FrameworkConfig},
    emit::dispatch::{HANDLERS_TYPE, INVOKE_SAFELY},
    events::{EventArgs, HandlerRegistry},
    runtime::{
        error::ExecutionError,
        frame::Frame,
        method_table::{MethodImpl, MethodTable, NativeFn},
        object::{HeapObject, HostObject, ObjectRef},
        value::Value,
    },
    utils::arena::Arena,
    Error, Result,
};

/// What the dispatch loop does after one instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// Continue with the next instruction.
    Continue,
    /// Continue at the instruction carrying the label.
    Branch(Label),
    /// Leave the method.
    Return(Option<Value>),
}

/// Reference host: loaded methods, heap, static fields and the handler registry.
pub struct Runtime {
    methods: MethodTable,
    heap: Arena<HeapObject>,
    statics: HashMap<(String, String), Value>,
    registry: Arc<HandlerRegistry>,
    limits: ExecutionLimits,
    executed: u64,
    depth: usize,
}

impl Runtime {
    /// Creates a runtime dispatching through [`HandlerRegistry::global`].
    #[must_use]
    pub fn new(methods: MethodTable) -> Self {
        Self::with_registry(methods, HandlerRegistry::global())
    }

    /// Creates a runtime dispatching through `registry`.
    #[must_use]
    pub fn with_registry(methods: MethodTable, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            methods,
            heap: Arena::new(),
            statics: HashMap::new(),
            registry,
            limits: ExecutionLimits::default(),
            executed: 0,
            depth: 0,
        }
    }

    /// Creates a runtime with its own registry, both set up from `config`.
    #[must_use]
    pub fn with_config(methods: MethodTable, config: &FrameworkConfig) -> Self {
        let registry = Arc::new(HandlerRegistry::with_config(config.dispatch.clone()));
        Self::with_registry(methods, registry).with_limits(config.limits.clone())
    }

    /// Replaces the execution limits.
    #[must_use]
    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Loaded methods.
    #[must_use]
    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    /// Loaded methods, for patching.
    pub fn methods_mut(&mut self) -> &mut MethodTable {
        &mut self.methods
    }

    /// The registry `InvokeSafely` dispatches through.
    #[must_use]
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Execution limits.
    #[must_use]
    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Instructions executed by the most recent top-level [`Runtime::invoke`].
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Allocates a host object.
    pub fn alloc(&mut self, object: HostObject) -> ObjectRef {
        self.heap.insert(HeapObject::Host(object))
    }

    /// A live host object.
    #[must_use]
    pub fn object(&self, handle: ObjectRef) -> Option<&HostObject> {
        match self.heap.get(handle)? {
            HeapObject::Host(object) => Some(object),
            HeapObject::Event(_) => None,
        }
    }

    /// A live host object, mutably.
    pub fn object_mut(&mut self, handle: ObjectRef) -> Option<&mut HostObject> {
        match self.heap.get_mut(handle)? {
            HeapObject::Host(object) => Some(object),
            HeapObject::Event(_) => None,
        }
    }

    /// Destroys a heap object. Later uses of `handle` fail with
    /// [`ExecutionError::InvalidHeapReference`].
    pub fn destroy(&mut self, handle: ObjectRef) -> Option<HeapObject> {
        self.heap.remove(handle)
    }

    /// Live host objects.
    pub fn objects(&self) -> impl Iterator<Item = (ObjectRef, &HostObject)> {
        self.heap.iter().filter_map(|(handle, object)| match object {
            HeapObject::Host(object) => Some((handle, object)),
            HeapObject::Event(_) => None,
        })
    }

    /// Number of live heap objects, event values included.
    #[must_use]
    pub fn heap_len(&self) -> usize {
        self.heap.len()
    }

    /// Current value of a static field; the type's default if never written.
    #[must_use]
    pub fn static_value(&self, field: &FieldRef) -> Value {
        self.statics
            .get(&(field.declaring_type.clone(), field.name.clone()))
            .cloned()
            .unwrap_or_else(|| Value::default_for(&field.ty))
    }

    /// Writes a static field.
    pub fn set_static(&mut self, field: &FieldRef, value: Value) {
        self.statics.insert(
            (field.declaring_type.clone(), field.name.clone()),
            value.coerce(&field.ty),
        );
    }

    /// Runs a method to completion and returns its value.
    ///
    /// # Errors
    ///
    /// Lookup errors of [`MethodTable::resolve`], [`Error::Execution`] for anything the
    /// interpreter refuses to run, [`Error::HostException`] for an executed `throw`.
    pub fn invoke(&mut self, id: &MethodId, args: Vec<Value>) -> Result<Option<Value>> {
        if self.depth == 0 {
            self.executed = 0;
        }
        self.call(id, args)
    }

    fn call(&mut self, id: &MethodId, args: Vec<Value>) -> Result<Option<Value>> {
        if self.depth >= self.limits.max_call_depth {
            return Err(ExecutionError::CallDepthExceeded {
                depth: self.depth + 1,
                limit: self.limits.max_call_depth,
            }
            .into());
        }
        let method = self.methods.resolve(id)?.clone();
        trace!(method = %id, depth = self.depth, "call");

        self.depth += 1;
        let result = match method {
            MethodImpl::Body(body) => self.execute(&body, args),
            MethodImpl::Native { method, func } => Self::call_native(&method, func.as_ref(), &args),
        };
        self.depth -= 1;
        result
    }

    fn call_native(method: &MethodRef, func: &NativeFn, args: &[Value]) -> Result<Option<Value>> {
        if args.len() != method.arg_count() {
            return Err(ExecutionError::ArgumentCountMismatch {
                method: method.id.to_string(),
                expected: method.arg_count(),
                found: args.len(),
            }
            .into());
        }
        let value = func(args).map_err(|e| ExecutionError::NativeFailed {
            method: method.id.to_string(),
            message: format!("{e:#}"),
        })?;
        Ok(match (method.returns_value(), value) {
            (true, Some(value)) => Some(value.coerce(&method.returns)),
            (true, None) => Some(Value::default_for(&method.returns)),
            (false, _) => None,
        })
    }

    fn execute(&mut self, body: &MethodBody, args: Vec<Value>) -> Result<Option<Value>> {
        let positions = body.label_positions()?;
        let mut frame = Frame::new(body, args, self.limits.max_stack)?;
        let result = self.run(body, &positions, &mut frame);
        for handle in frame.events.drain(..) {
            self.heap.remove(handle);
        }
        result
    }

    fn run(
        &mut self,
        body: &MethodBody,
        positions: &HashMap<Label, usize>,
        frame: &mut Frame,
    ) -> Result<Option<Value>> {
        let instructions = body.instructions();
        let returns = body.returns();
        let mut pc = 0;
        loop {
            let Some(instr) = instructions.get(pc) else {
                return Err(ExecutionError::FellOffEnd.into());
            };
            self.executed += 1;
            if self.executed > self.limits.max_instructions {
                return Err(ExecutionError::InstructionLimitExceeded {
                    executed: self.executed,
                    limit: self.limits.max_instructions,
                }
                .into());
            }

            match self.step(frame, instr, pc, returns)? {
                StepResult::Continue => pc += 1,
                StepResult::Branch(label) => {
                    pc = *positions
                        .get(&label)
                        .ok_or_else(|| ExecutionError::InvalidBranchTarget {
                            label: label.to_string(),
                        })?;
                }
                StepResult::Return(value) => return Ok(value),
            }
        }
    }

    /// Executes one instruction of the current frame.
    fn step(
        &mut self,
        frame: &mut Frame,
        instr: &Instruction,
        index: usize,
        returns: &TypeSig,
    ) -> Result<StepResult> {
        match (instr.opcode, &instr.operand) {
            (OpCode::Nop, _) => {}
            (OpCode::Dup, _) => {
                let value = frame.peek(index)?.clone();
                frame.push(value)?;
            }
            (OpCode::Pop, _) => {
                frame.pop(index)?;
            }
            (OpCode::Ldarg, Operand::Argument(slot)) => {
                let value = frame.arg(*slot)?.clone();
                frame.push(value)?;
            }
            (OpCode::Starg, Operand::Argument(slot)) => {
                let value = frame.pop(index)?;
                frame.set_arg(*slot, value)?;
            }
            (OpCode::Ldloc, Operand::Local(slot)) => {
                let value = frame.local(*slot)?.clone();
                frame.push(value)?;
            }
            (OpCode::Stloc, Operand::Local(slot)) => {
                let value = frame.pop(index)?;
                frame.set_local(*slot, value)?;
            }
            (OpCode::LdcI4, Operand::Int32(v)) => frame.push(Value::I32(*v))?,
            (OpCode::LdcI8, Operand::Int64(v)) => frame.push(Value::I64(*v))?,
            (OpCode::LdcR8, Operand::Float64(v)) => frame.push(Value::F64(*v))?,
            (OpCode::Ldstr, Operand::String(s)) => frame.push(Value::from(s.as_str()))?,
            (OpCode::Ldnull, _) => frame.push(Value::Null)?,

            (OpCode::Ldfld, Operand::Field(field)) => {
                let owner = frame.pop(index)?;
                let value = self.load_field(&owner, field)?;
                frame.push(value)?;
            }
            (OpCode::Stfld, Operand::Field(field)) => {
                let value = frame.pop(index)?;
                let owner = frame.pop(index)?;
                self.store_field(&owner, field, value)?;
            }
            (OpCode::Ldsfld, Operand::Field(field)) => {
                let value = self.load_static(field)?;
                frame.push(value)?;
            }
            (OpCode::Stsfld, Operand::Field(field)) => {
                let value = frame.pop(index)?;
                self.set_static(field, value);
            }

            (
                op @ (OpCode::Add
                | OpCode::Sub
                | OpCode::Mul
                | OpCode::Div
                | OpCode::Rem
                | OpCode::And
                | OpCode::Or
                | OpCode::Xor),
                _,
            ) => {
                let b = frame.pop(index)?;
                let a = frame.pop(index)?;
                frame.push(binary(op, &a, &b)?)?;
            }
            (op @ (OpCode::Neg | OpCode::Not), _) => {
                let a = frame.pop(index)?;
                frame.push(unary(op, &a)?)?;
            }
            (op @ (OpCode::Ceq | OpCode::Cgt | OpCode::Clt), _) => {
                let b = frame.pop(index)?;
                let a = frame.pop(index)?;
                frame.push(Value::Bool(compare(op, &a, &b)?))?;
            }

            (OpCode::Br, Operand::Label(target)) => return Ok(StepResult::Branch(*target)),
            (OpCode::Brtrue, Operand::Label(target)) => {
                if frame.pop(index)?.is_truthy() {
                    return Ok(StepResult::Branch(*target));
                }
            }
            (OpCode::Brfalse, Operand::Label(target)) => {
                if !frame.pop(index)?.is_truthy() {
                    return Ok(StepResult::Branch(*target));
                }
            }
            (
                op @ (OpCode::Beq
                | OpCode::Bne
                | OpCode::Bge
                | OpCode::Bgt
                | OpCode::Ble
                | OpCode::Blt),
                Operand::Label(target),
            ) => {
                let b = frame.pop(index)?;
                let a = frame.pop(index)?;
                if compare(op, &a, &b)? {
                    return Ok(StepResult::Branch(*target));
                }
            }
            (OpCode::Switch, Operand::Switch(targets)) => {
                let selector = frame.pop(index)?;
                let selector = selector.as_i32().ok_or(ExecutionError::TypeMismatch {
                    operation: "switch",
                    expected: "int32",
                    found: selector.type_name(),
                })?;
                if let Some(target) = usize::try_from(selector).ok().and_then(|i| targets.get(i)) {
                    return Ok(StepResult::Branch(*target));
                }
            }

            (OpCode::Call | OpCode::Callvirt, Operand::Method(method)) => {
                let args = frame.pop_n(method.arg_count(), index)?;
                if let Some(value) = self.call_method(method, args)? {
                    frame.push(value)?;
                }
            }
            (OpCode::Newobj, Operand::Event(kind)) => {
                let values = frame.pop_n(kind.schema().fields().len(), index)?;
                let args = EventArgs::new(kind.clone(), values)?;
                let handle = self.heap.insert(HeapObject::Event(args));
                frame.events.push(handle);
                frame.push(Value::Object(handle))?;
            }
            (OpCode::Newobj, Operand::Method(ctor)) => {
                let params = frame.pop_n(ctor.id.params.len(), index)?;
                let handle = self.alloc(HostObject::new(ctor.id.declaring_type.clone()));
                if self.methods.contains(&ctor.id) {
                    let mut args = Vec::with_capacity(params.len() + 1);
                    args.push(Value::Object(handle));
                    args.extend(params);
                    self.call(&ctor.id, args)?;
                }
                frame.push(Value::Object(handle))?;
            }

            (OpCode::Ret, _) => {
                let expected = usize::from(returns.has_value());
                if frame.depth() != expected {
                    return Err(ExecutionError::UnbalancedReturn {
                        depth: frame.depth(),
                        expected,
                    }
                    .into());
                }
                let value = if expected == 1 {
                    Some(frame.pop(index)?.coerce(returns))
                } else {
                    None
                };
                return Ok(StepResult::Return(value));
            }
            (OpCode::Throw, _) => {
                let value = frame.pop(index)?;
                return Err(Error::HostException(value.to_string()));
            }

            _ => return Err(invalid_operand(instr)),
        }
        Ok(StepResult::Continue)
    }

    fn call_method(&mut self, method: &MethodRef, args: Vec<Value>) -> Result<Option<Value>> {
        if method.id.declaring_type == HANDLERS_TYPE && method.id.name == INVOKE_SAFELY {
            self.dispatch(&args)?;
            return Ok(None);
        }
        self.call(&method.id, args)
    }

    fn dispatch(&mut self, args: &[Value]) -> Result<()> {
        let (kind, handle) = match args {
            [Value::Subscribers(kind), Value::Object(handle)] => (kind, *handle),
            [Value::Subscribers(_), Value::Null] => return Err(ExecutionError::NullReference.into()),
            [list, event] => {
                return Err(ExecutionError::TypeMismatch {
                    operation: INVOKE_SAFELY,
                    expected: "subscribers, event",
                    found: if matches!(list, Value::Subscribers(_)) {
                        event.type_name()
                    } else {
                        list.type_name()
                    },
                }
                .into());
            }
            _ => {
                return Err(ExecutionError::ArgumentCountMismatch {
                    method: format!("{HANDLERS_TYPE}::{INVOKE_SAFELY}"),
                    expected: 2,
                    found: args.len(),
                }
                .into());
            }
        };

        let registry = Arc::clone(&self.registry);
        match self.heap.get_mut(handle) {
            Some(HeapObject::Event(event)) => {
                registry.invoke(kind, event);
                Ok(())
            }
            Some(HeapObject::Host(_)) => Err(ExecutionError::TypeMismatch {
                operation: INVOKE_SAFELY,
                expected: "event",
                found: "object",
            }
            .into()),
            None => Err(ExecutionError::InvalidHeapReference.into()),
        }
    }

    fn load_static(&self, field: &FieldRef) -> Result<Value> {
        if field.declaring_type == HANDLERS_TYPE {
            return self
                .methods
                .event_kind(&field.name)
                .cloned()
                .map(Value::Subscribers)
                .ok_or_else(|| {
                    ExecutionError::FieldNotFound {
                        field: field.to_string(),
                    }
                    .into()
                });
        }
        Ok(self.static_value(field))
    }

    fn load_field(&self, owner: &Value, field: &FieldRef) -> Result<Value> {
        let handle = object_handle(owner, "ldfld")?;
        match self.heap.get(handle) {
            Some(HeapObject::Host(object)) => Ok(object
                .field(&field.name)
                .cloned()
                .unwrap_or_else(|| Value::default_for(&field.ty))),
            Some(HeapObject::Event(args)) => args.get(&field.name),
            None => Err(ExecutionError::InvalidHeapReference.into()),
        }
    }

    fn store_field(&mut self, owner: &Value, field: &FieldRef, value: Value) -> Result<()> {
        let handle = object_handle(owner, "stfld")?;
        match self.heap.get_mut(handle) {
            Some(HeapObject::Host(object)) => {
                object.set_field(field.name.clone(), value.coerce(&field.ty));
                Ok(())
            }
            Some(HeapObject::Event(args)) => args.set(&field.name, value),
            None => Err(ExecutionError::InvalidHeapReference.into()),
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("methods", &self.methods.len())
            .field("heap", &self.heap.len())
            .field("statics", &self.statics.len())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

fn invalid_operand(instr: &Instruction) -> Error {
    ExecutionError::InvalidOperand {
        instruction: instr.to_string(),
        expected: match instr.opcode.operand_kind() {
            OperandKind::None => "no operand",
            OperandKind::Int32 => "int32",
            OperandKind::Int64 => "int64",
            OperandKind::Float64 => "float64",
            OperandKind::String => "string",
            OperandKind::Local => "local slot",
            OperandKind::Argument => "argument slot",
            OperandKind::Field => "field",
            OperandKind::Method => "method",
            OperandKind::Type => "type",
            OperandKind::Event => "event kind",
            OperandKind::Label => "label",
            OperandKind::Switch => "switch table",
        },
    }
    .into()
}

fn object_handle(owner: &Value, operation: &'static str) -> Result<ObjectRef> {
    match owner {
        Value::Object(handle) => Ok(*handle),
        Value::Null => Err(ExecutionError::NullReference.into()),
        other => Err(ExecutionError::TypeMismatch {
            operation,
            expected: "object",
            found: other.type_name(),
        }
        .into()),
    }
}

/// `bool` participates in arithmetic and comparisons as `int32`.
fn widen(value: &Value) -> Value {
    match value {
        Value::Bool(b) => Value::I32(i32::from(*b)),
        other => other.clone(),
    }
}

macro_rules! int_binary {
    ($op:expr, $x:expr, $y:expr) => {
        match $op {
            OpCode::Add => Ok($x.wrapping_add($y)),
            OpCode::Sub => Ok($x.wrapping_sub($y)),
            OpCode::Mul => Ok($x.wrapping_mul($y)),
            OpCode::Div if $y == 0 => Err(ExecutionError::DivisionByZero),
            OpCode::Div => Ok($x.wrapping_div($y)),
            OpCode::Rem if $y == 0 => Err(ExecutionError::DivisionByZero),
            OpCode::Rem => Ok($x.wrapping_rem($y)),
            OpCode::And => Ok($x & $y),
            OpCode::Or => Ok($x | $y),
            _ => Ok($x ^ $y),
        }
    };
}

fn binary(op: OpCode, a: &Value, b: &Value) -> std::result::Result<Value, ExecutionError> {
    match (widen(a), widen(b)) {
        (Value::I32(x), Value::I32(y)) => int_binary!(op, x, y).map(Value::I32),
        (Value::I64(x), Value::I64(y)) => int_binary!(op, x, y).map(Value::I64),
        (Value::F64(x), Value::F64(y)) => match op {
            OpCode::Add => Ok(Value::F64(x + y)),
            OpCode::Sub => Ok(Value::F64(x - y)),
            OpCode::Mul => Ok(Value::F64(x * y)),
            OpCode::Div => Ok(Value::F64(x / y)),
            OpCode::Rem => Ok(Value::F64(x % y)),
            _ => Err(ExecutionError::TypeMismatch {
                operation: op.mnemonic(),
                expected: "integer",
                found: "float64",
            }),
        },
        (x, y) => Err(ExecutionError::TypeMismatch {
            operation: op.mnemonic(),
            expected: x.type_name(),
            found: y.type_name(),
        }),
    }
}

fn unary(op: OpCode, a: &Value) -> std::result::Result<Value, ExecutionError> {
    match (op, a) {
        (OpCode::Neg, Value::I32(x)) => Ok(Value::I32(x.wrapping_neg())),
        (OpCode::Neg, Value::I64(x)) => Ok(Value::I64(x.wrapping_neg())),
        (OpCode::Neg, Value::F64(x)) => Ok(Value::F64(-x)),
        (OpCode::Not, Value::I32(x)) => Ok(Value::I32(!x)),
        (OpCode::Not, Value::I64(x)) => Ok(Value::I64(!x)),
        (OpCode::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (op, other) => Err(ExecutionError::TypeMismatch {
            operation: op.mnemonic(),
            expected: "number",
            found: other.type_name(),
        }),
    }
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (widen(a), widen(b)) {
        (Value::I32(x), Value::I32(y)) => Some(x.cmp(&y)),
        (Value::I64(x), Value::I64(y)) => Some(x.cmp(&y)),
        (Value::F64(x), Value::F64(y)) => x.partial_cmp(&y),
        _ => None,
    }
}

/// Evaluates a comparison or compare-and-branch opcode.
fn compare(op: OpCode, a: &Value, b: &Value) -> std::result::Result<bool, ExecutionError> {
    match op {
        OpCode::Ceq | OpCode::Beq => return Ok(widen(a) == widen(b)),
        OpCode::Bne => return Ok(widen(a) != widen(b)),
        _ => {}
    }
    let ord = ordering(a, b).ok_or(ExecutionError::TypeMismatch {
        operation: op.mnemonic(),
        expected: a.type_name(),
        found: b.type_name(),
    })?;
    Ok(match op {
        OpCode::Cgt | OpCode::Bgt => ord == Ordering::Greater,
        OpCode::Clt | OpCode::Blt => ord == Ordering::Less,
        OpCode::Bge => ord != Ordering::Less,
        _ => ord != Ordering::Greater,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, EventSchema};

    fn runtime_with(body: MethodBody) -> (Runtime, MethodId) {
        let id = body.id().clone();
        let mut methods = MethodTable::new();
        methods.insert_body(body);
        (
            Runtime::with_registry(methods, Arc::new(HandlerRegistry::new())),
            id,
        )
    }

    #[test]
    fn test_branches_and_arithmetic() {
        // max(a, b) * 2
        let mut body = MethodBody::new(MethodRef::static_method(
            "M",
            "Max2",
            vec![TypeSig::I32, TypeSig::I32],
            TypeSig::I32,
        ));
        let second = body.define_label();
        let done = body.define_label();
        body.extend([
            Instruction::ldarg(0),
            Instruction::ldarg(1),
            Instruction::branch(OpCode::Blt, second),
            Instruction::ldarg(0),
            Instruction::br(done),
            Instruction::ldarg(1).with_label(second),
            Instruction::ldc_i4(2).with_label(done),
            Instruction::new(OpCode::Mul),
            Instruction::ret(),
        ]);
        let (mut runtime, id) = runtime_with(body);
        assert_eq!(
            runtime.invoke(&id, vec![Value::I32(3), Value::I32(9)]).unwrap(),
            Some(Value::I32(18))
        );
        assert_eq!(
            runtime.invoke(&id, vec![Value::I32(4), Value::I32(-1)]).unwrap(),
            Some(Value::I32(8))
        );
    }

    #[test]
    fn test_unbalanced_return_and_throw() {
        let mut body = MethodBody::new(MethodRef::static_method("M", "Bad", vec![], TypeSig::Void));
        body.extend([Instruction::ldc_i4(1), Instruction::ret()]);
        let (mut runtime, id) = runtime_with(body);
        assert!(matches!(
            runtime.invoke(&id, vec![]),
            Err(Error::Execution(ExecutionError::UnbalancedReturn { depth: 1, expected: 0 }))
        ));

        let mut body = MethodBody::new(MethodRef::static_method("M", "Throws", vec![], TypeSig::Void));
        body.extend([Instruction::ldstr("denied"), Instruction::throw()]);
        let (mut runtime, id) = runtime_with(body);
        assert!(matches!(runtime.invoke(&id, vec![]), Err(Error::HostException(m)) if m == "\"denied\""));
    }

    #[test]
    fn test_instruction_limit() {
        let mut body = MethodBody::new(MethodRef::static_method("M", "Spin", vec![], TypeSig::Void));
        let top = body.define_label();
        body.push(Instruction::br(top).with_label(top));
        let (runtime, id) = runtime_with(body);
        let mut runtime = runtime.with_limits(ExecutionLimits::default().with_max_instructions(50));
        assert!(matches!(
            runtime.invoke(&id, vec![]),
            Err(Error::Execution(ExecutionError::InstructionLimitExceeded { executed: 51, limit: 50 }))
        ));
    }

    #[test]
    fn test_native_calls_and_objects() {
        let get = MethodRef::instance_method("Player", "get_Health", vec![], TypeSig::F64);
        let mut body = MethodBody::new(MethodRef::static_method(
            "M",
            "Read",
            vec![TypeSig::named("Player")],
            TypeSig::F64,
        ));
        body.extend([Instruction::ldarg(0), Instruction::callvirt(get.clone()), Instruction::ret()]);
        let (mut runtime, id) = runtime_with(body);
        runtime
            .methods_mut()
            .insert_native(get, |args| Ok(Some(Value::F64(if args[0].is_null() { 0.0 } else { 50.0 }))));

        let player = runtime.alloc(HostObject::new("Player"));
        assert_eq!(runtime.invoke(&id, vec![Value::Object(player)]).unwrap(), Some(Value::F64(50.0)));
        assert_eq!(runtime.objects().count(), 1);

        runtime.destroy(player);
        assert!(runtime.object(player).is_none());
    }

    #[test]
    fn test_event_values_are_freed_on_exit() {
        let kind = EventKind::new(EventSchema::new("Ping").field("N", TypeSig::I32)).unwrap();
        let mut body = MethodBody::new(MethodRef::static_method("M", "Ping", vec![], TypeSig::Void));
        let ev = body.declare_local(kind.type_sig());
        body.extend([
            Instruction::ldc_i4(7),
            Instruction::new_event(kind.clone()),
            Instruction::stloc(ev),
            Instruction::load_field(crate::emit::handlers_field(&kind)),
            Instruction::ldloc(ev),
            Instruction::call(crate::emit::invoke_safely_method()),
            Instruction::ret(),
        ]);
        let (mut runtime, id) = runtime_with(body);
        let seen = Arc::new(std::sync::atomic::AtomicI32::new(0));
        let sink = Arc::clone(&seen);
        runtime.registry().subscribe(&kind, "probe", move |args| {
            sink.store(args.get("N")?.as_i32().unwrap_or(-1), std::sync::atomic::Ordering::SeqCst);
            Ok(())
        });

        runtime.invoke(&id, vec![]).unwrap();
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 7);
        assert_eq!(runtime.heap_len(), 0);
    }
}
