use thiserror::Error;

use crate::{assembly::Label, runtime::ExecutionError};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// Renders a "did you mean" tail for resolution errors.
fn suggestion_tail(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {}?)", suggestions.join(", "))
    }
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors fall into three groups. Load-time errors are raised while a patch rewrites a
/// method body; each one is fatal for that single patch and the catalog moves on to the
/// next descriptor. Registration errors come from the event catalog. Execution errors
/// come from the reference host when it runs a (patched) body.
///
/// Subscriber failures are deliberately absent: the safe invoker swallows and reports them
/// through [`crate::events::DispatchOutcome`], they never surface as an `Error`. Cancellation
/// is not an error either, it is plain control flow.
///
/// # Error Categories
///
/// ## Load-time (per patch)
/// - [`Error::AnchorNotFound`] - A structural anchor query matched nothing
/// - [`Error::MethodNotFound`] / [`Error::SignatureMismatch`] - Target resolution failed
/// - [`Error::DanglingLabel`] / [`Error::DuplicateLabel`] - Label invariants broken
/// - [`Error::InvalidTerminal`] - Body does not end in a return or unconditional transfer
/// - [`Error::StackImbalance`] - Stack verification failed
/// - [`Error::SchemaMismatch`] / [`Error::ReadOnlyField`] / [`Error::NotCancellable`] - Emitter misuse
/// - [`Error::OutOfBounds`] - Splice or locator index outside the body
///
/// ## Registration
/// - [`Error::UnknownEvent`] / [`Error::DuplicateEvent`]
///
/// ## Execution
/// - [`Error::Execution`] - Reference host interpreter failure
/// - [`Error::HostException`] - Host code executed a `throw`
///
/// # Examples
///
/// ```rust
/// use ilweave::{assembly::{MethodBody, MethodRef, TypeSig, Locator, CodeMatch, Direction}, Error};
///
/// let body = MethodBody::new(MethodRef::static_method("Host", "Tick", vec![], TypeSig::Void));
/// match Locator::new(&body).find(&CodeMatch::Return, Direction::Forward, 0) {
///     Err(Error::AnchorNotFound { method, query }) => {
///         eprintln!("no anchor '{query}' in {method}");
///     }
///     other => panic!("unexpected: {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Internal structure is inconsistent.
    ///
    /// Raised when a caller builds something the rest of the pipeline cannot represent,
    /// such as an instruction whose operand does not fit its opcode. Carries the source
    /// location where the problem was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An index fell outside the instruction sequence.
    #[error("Index {index} is out of bounds for a body of {len} instructions")]
    OutOfBounds {
        /// The offending index
        index: isize,
        /// Number of instructions in the body
        len: usize,
    },

    /// The anchor a patch searches for is not present in the target body.
    ///
    /// Always fatal for the patch: splicing at a guessed location would corrupt the
    /// host method.
    #[error("Anchor not found in {method}: {query}")]
    AnchorNotFound {
        /// Display form of the method that was searched
        method: String,
        /// Description of the matcher query
        query: String,
    },

    /// No method with the requested identity is loaded.
    #[error("Method not found: {method}{}", suggestion_tail(.suggestions))]
    MethodNotFound {
        /// Display form of the requested method identity
        method: String,
        /// Closest known identities, for diagnostics only
        suggestions: Vec<String>,
    },

    /// A method with the requested name exists, but with different parameters.
    #[error("Signature mismatch for {method}; loaded overloads: {}", .candidates.join(", "))]
    SignatureMismatch {
        /// Display form of the requested method identity
        method: String,
        /// Signatures of the overloads that do exist
        candidates: Vec<String>,
    },

    /// A branch references a label that is not attached to any instruction.
    #[error("Label {0} is referenced by a branch but attached to no instruction")]
    DanglingLabel(Label),

    /// A label is attached to more than one instruction.
    #[error("Label {0} is attached to more than one instruction")]
    DuplicateLabel(Label),

    /// The final instruction of a body is not a valid terminal instruction.
    #[error("Method {method} does not end with a return or unconditional transfer")]
    InvalidTerminal {
        /// Display form of the method
        method: String,
    },

    /// Stack verification found inconsistent or insufficient evaluation stack depth.
    #[error("Stack imbalance at instruction {index}: {message}")]
    StackImbalance {
        /// Index of the instruction where the problem was found
        index: usize,
        /// What went wrong
        message: String,
    },

    /// Emitted bindings do not line up with the event kind's declared layout.
    #[error("Schema mismatch for event {event}: {message}")]
    SchemaMismatch {
        /// Event kind identifier
        event: String,
        /// What went wrong
        message: String,
    },

    /// The event kind declares no field with this name.
    #[error("Event {event} has no field named '{field}'")]
    UnknownField {
        /// Event kind identifier
        event: String,
        /// Requested field name
        field: String,
    },

    /// A write targeted a field the event kind declares read-only.
    #[error("Field '{field}' of event {event} is read-only")]
    ReadOnlyField {
        /// Event kind identifier
        event: String,
        /// Field name
        field: String,
    },

    /// A value does not fit the declared type of its destination.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Declared type
        expected: String,
        /// Type of the offered value
        found: String,
    },

    /// A cancellation gate was requested for an event kind that cannot be cancelled.
    #[error("Event {0} is not cancellable")]
    NotCancellable(String),

    /// The requested event identifier is not registered.
    #[error("Unknown event kind: {event}{}", suggestion_tail(.suggestions))]
    UnknownEvent {
        /// Requested identifier
        event: String,
        /// Closest registered identifiers, for diagnostics only
        suggestions: Vec<String>,
    },

    /// An event identifier was registered twice.
    #[error("Event kind {0} is already registered")]
    DuplicateEvent(String),

    /// The patch catalog has already been applied in this process.
    #[error("Patch catalog has already been applied")]
    AlreadyApplied,

    /// A transpiler panicked while rewriting its target.
    #[error("Transpiler of patch '{patch}' panicked: {message}")]
    TranspilerPanic {
        /// Patch name
        patch: String,
        /// Panic payload rendered as text
        message: String,
    },

    /// The reference host failed to execute a body.
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// Host code raised an exception with the given value.
    #[error("Host exception: {0}")]
    HostException(String),
}
