use thiserror::Error;

use crate::metadata::token::Token;

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

macro_rules! not_supported_error {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::NotSupported(format!($fmt $(, $arg)*))
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors from decoding, importing and relinking are never retried or swallowed internally. They
/// propagate to the caller of [`crate::transplant()`] or [`crate::relink::Relink::relink`], which
/// is expected to leave the previously running method untouched.
///
/// # Error Categories
///
/// ## Input shape errors
/// - [`Error::NotSupported`] - A metadata shape that is intentionally not modelled
/// - [`Error::Malformed`] - Structural inconsistency in decoded data
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of a buffer
/// - [`Error::RecursionLimit`] - Nesting exceeded the configured depth
///
/// ## Transplant and relink errors
/// - [`Error::BodyLess`] - The method has no retrievable instruction stream
/// - [`Error::RelinkTargetNotFound`] - A reference could not be bound in the supplied context
/// - [`Error::MemberMissing`] - A token did not resolve inside the live module
/// - [`Error::Disposed`] - The document module was already released
///
/// ## I/O and synchronisation
/// - [`Error::FileError`] - Filesystem I/O errors from the on-disk fallback
/// - [`Error::LockError`] - Poisoned lock
///
/// # Examples
///
/// ```rust,no_run
/// use cilgraft::{transplant, Error};
/// # fn demo(method: &cilgraft::live::LiveMethodRc) {
/// match transplant(method) {
///     Ok(document) => {
///         if let Ok(method) = document.definition() {
///             println!("{} instructions", method.body.instructions.len());
///         }
///     }
///     Err(Error::BodyLess(name)) => eprintln!("{name} has no body"),
///     Err(Error::RelinkTargetNotFound { reference, context }) => {
///         eprintln!("could not bind {reference} in {context}")
///     }
///     Err(e) => eprintln!("transplant failed: {e}"),
/// }
/// # }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input uses a metadata shape the engine intentionally does not model.
    ///
    /// Generic element types inside a raw signature blob and function-pointer identity
    /// comparisons are the prominent examples. The message names the offending shape.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// Attempted to transplant a method that has no retrievable instruction stream.
    ///
    /// Abstract, extern, runtime-implemented and internal-call methods fall into this category.
    /// The associated value is the display name of the method.
    #[error("Method has no body - {0}")]
    BodyLess(String),

    /// A reference could not be resolved against the supplied context.
    ///
    /// Most commonly a generic parameter whose owner is not part of the active generic
    /// context.
    #[error("Relink target not found - {reference} (context: {context})")]
    RelinkTargetNotFound {
        /// Display form of the reference that failed to resolve
        reference: String,
        /// Display form of the context it was resolved against
        context: String,
    },

    /// The data is damaged and could not be decoded.
    ///
    /// Includes the source location where the malformation was detected for debugging purposes.
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

    /// An out of bound access was attempted while decoding.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// A metadata token did not resolve to any member of the live module.
    ///
    /// This is the one error the instruction decoder may catch and substitute with the
    /// on-disk token lookup, see [`crate::config::DecoderConfig::disk_fallback`].
    #[error("Member missing for token {0}")]
    MemberMissing(Token),

    /// Recursion limit reached.
    ///
    /// The associated value shows the recursion limit that was reached.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// The document module was disposed and its references are no longer valid.
    #[error("Document module has been disposed")]
    Disposed,

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Builds a [`Error::RelinkTargetNotFound`] from anything displayable.
    pub(crate) fn relink_target(
        reference: impl std::fmt::Display,
        context: impl std::fmt::Display,
    ) -> Self {
        Error::RelinkTargetNotFound {
            reference: reference.to_string(),
            context: context.to_string(),
        }
    }
}
