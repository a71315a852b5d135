//! Stream Adapter Error Types
//!
//! The adapters implement `std::io` traits, so most failures surface as
//! [`std::io::Error`] through `Read`/`Write`/`Seek`. This module provides
//! the structured `exn` error used by the convenience methods that sit
//! outside those traits, following the same pattern as the storage crate.

use derive_more::{Display, Error};

/// A stream adapter error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The underlying source or sink failed.
    #[display("I/O error: {_0}")]
    Io(std::io::Error),
    /// A seek target the adapter cannot honor (e.g. writing at a nonzero
    /// position on a forward-only sink).
    #[display("unsupported seek to position {_0}")]
    UnsupportedSeek(#[error(not(source))] u64),
}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
