//! Reference host execution errors.
//!
//! These cover every way the interpreter can refuse to run a body. They are wrapped
//! into [`crate::Error::Execution`] at the crate boundary.

use std::fmt;

/// Errors that can occur while the reference host executes a method body.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// Evaluation stack grew past the configured limit.
    StackOverflow {
        /// The configured limit.
        limit: usize,
    },
    /// Pop from an empty evaluation stack.
    StackUnderflow {
        /// Index of the instruction that popped.
        index: usize,
    },
    /// A `ret` found the wrong number of values on the stack.
    UnbalancedReturn {
        /// Values left on the stack.
        depth: usize,
        /// Values the method returns (0 or 1).
        expected: usize,
    },
    /// Operand value of the wrong type.
    TypeMismatch {
        /// Operation being performed.
        operation: &'static str,
        /// Expected type.
        expected: &'static str,
        /// Actual type found.
        found: &'static str,
    },
    /// Local variable index out of bounds.
    LocalIndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// Number of locals available.
        count: usize,
    },
    /// Argument index out of bounds.
    ArgumentIndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// Number of arguments available.
        count: usize,
    },
    /// Wrong number of arguments passed to a method.
    ArgumentCountMismatch {
        /// Display form of the method.
        method: String,
        /// Declared argument slots.
        expected: usize,
        /// Arguments supplied.
        found: usize,
    },
    /// Handle of a destroyed or never-created host object.
    InvalidHeapReference,
    /// Field access through a null reference.
    NullReference,
    /// Integer division by zero.
    DivisionByZero,
    /// The object or static storage has no such field.
    FieldNotFound {
        /// Display form of the field.
        field: String,
    },
    /// A branch targets a label no instruction carries.
    InvalidBranchTarget {
        /// Display form of the label.
        label: String,
    },
    /// Execution ran past the last instruction.
    FellOffEnd,
    /// Nested invocations exceeded the configured limit.
    CallDepthExceeded {
        /// Depth reached.
        depth: usize,
        /// The configured limit.
        limit: usize,
    },
    /// Instruction budget exhausted.
    InstructionLimitExceeded {
        /// Instructions executed.
        executed: u64,
        /// The configured limit.
        limit: u64,
    },
    /// Operand unsuitable for the opcode.
    InvalidOperand {
        /// Display form of the instruction.
        instruction: String,
        /// What was expected.
        expected: &'static str,
    },
    /// A native method returned an error.
    NativeFailed {
        /// Display form of the method.
        method: String,
        /// Rendered error.
        message: String,
    },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::StackOverflow { limit } => {
                write!(f, "evaluation stack overflow (limit: {limit})")
            }
            ExecutionError::StackUnderflow { index } => {
                write!(f, "evaluation stack underflow at instruction {index}")
            }
            ExecutionError::UnbalancedReturn { depth, expected } => {
                write!(f, "return with {depth} stack value(s), expected {expected}")
            }
            ExecutionError::TypeMismatch {
                operation,
                expected,
                found,
            } => write!(
                f,
                "type mismatch in {operation}: expected {expected}, found {found}"
            ),
            ExecutionError::LocalIndexOutOfBounds { index, count } => {
                write!(f, "local {index} out of bounds ({count} declared)")
            }
            ExecutionError::ArgumentIndexOutOfBounds { index, count } => {
                write!(f, "argument {index} out of bounds ({count} passed)")
            }
            ExecutionError::ArgumentCountMismatch {
                method,
                expected,
                found,
            } => write!(f, "{method} takes {expected} argument(s), {found} supplied"),
            ExecutionError::InvalidHeapReference => f.write_str("invalid heap reference"),
            ExecutionError::NullReference => f.write_str("null reference"),
            ExecutionError::DivisionByZero => f.write_str("division by zero"),
            ExecutionError::FieldNotFound { field } => write!(f, "field not found: {field}"),
            ExecutionError::InvalidBranchTarget { label } => {
                write!(f, "invalid branch target: {label}")
            }
            ExecutionError::FellOffEnd => f.write_str("execution ran past the last instruction"),
            ExecutionError::CallDepthExceeded { depth, limit } => {
                write!(f, "call depth exceeded: {depth} (limit: {limit})")
            }
            ExecutionError::InstructionLimitExceeded { executed, limit } => {
                write!(f, "instruction limit exceeded: {executed} (limit: {limit})")
            }
            ExecutionError::InvalidOperand {
                instruction,
                expected,
            } => write!(f, "invalid operand for {instruction}: expected {expected}"),
            ExecutionError::NativeFailed { method, message } => {
                write!(f, "native method {method} failed: {message}")
            }
        }
    }
}

impl std::error::Error for ExecutionError {}
