use thiserror::Error;

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

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The passes in this crate are best-effort transformations over front-end generated IR, so
/// most irregularities are skipped rather than reported. What remains here are structural
/// violations that make an in-place mutation impossible, and the "unexpected shape" outcome
/// used while tracing defining-operation chains.
///
/// # Error Categories
///
/// ## Structural Errors
/// - [`Error::Malformed`] - The IR violates a structural invariant (e.g. block without terminator)
/// - [`Error::InvalidBlock`] - A block id is out of range
/// - [`Error::InvalidOperation`] - An operation id is out of range or refers to an erased slot
/// - [`Error::InvalidValue`] - A value id is out of range
/// - [`Error::GraphError`] - A graph edge refers to a node that does not exist
///
/// ## Analysis Errors
/// - [`Error::UnexpectedShape`] - A defining operation was not of the expected kind
///
/// # Examples
///
/// ```rust
/// use halfix::{ir::{Function, OpId}, Error};
///
/// let mut function = Function::new("empty");
/// match function.erase(OpId::new(3)) {
///     Err(Error::InvalidOperation(index)) => assert_eq!(index, 3),
///     other => panic!("unexpected result: {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The IR is structurally damaged and could not be transformed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A block index does not name a block of the function.
    #[error("Block index {0} is out of range")]
    InvalidBlock(usize),

    /// An operation index does not name a live operation of the function.
    ///
    /// Raised both for indices past the end of the operation arena and for
    /// operations that have already been erased.
    #[error("Operation index {0} is out of range or erased")]
    InvalidOperation(usize),

    /// A value index does not name a value of the function.
    #[error("Value index {0} is out of range")]
    InvalidValue(usize),

    /// A graph operation referred to a node that does not exist.
    #[error("Graph error: {0}")]
    GraphError(String),

    /// A defining-operation chain did not have the expected shape.
    ///
    /// Used while tracing pipeline layouts back to their descriptor-set layout
    /// declarations. Callers decide whether this is fatal; the binding resolver
    /// records a warning and skips the offending store.
    #[error("Expected {expected}, found {found}")]
    UnexpectedShape {
        /// Mnemonic of the operation kind that was expected
        expected: &'static str,
        /// Mnemonic (or description) of what was found instead
        found: String,
    },
}
