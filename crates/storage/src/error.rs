//! Storage Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Every backend maps its native failures into this one
//! taxonomy so callers can branch on the category without knowing which
//! backend served the path.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Item does not exist at the given path
    #[display("item not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Item already exists (for operations that require new items)
    #[display("item already exists: {_0}")]
    AlreadyExists(#[error(not(source))] String),
    /// Access denied (permissions or credentials)
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// The backend serving this path cannot perform the operation
    #[display("{operation} is not supported by the {backend} backend")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },
    /// Remote endpoint unreachable or rejected the session
    #[display("connection failed: {_0}")]
    ConnectionFailed(#[error(not(source))] String),
    /// Path is malformed for the backend that claimed it
    #[display("invalid path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// Stored bytes could not be decoded (corrupt archive, bad listing line)
    #[display("invalid data: {_0}")]
    InvalidData(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}
impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ConnectionFailed(_))
    }
}

/// Map a raw I/O error onto the taxonomy, attributing it to `path`.
///
/// Not-found, permission, and already-exists conditions become their own
/// categories; everything else stays an [`ErrorKind::Io`].
#[track_caller]
pub fn map_io_error(err: IoError, path: &str) -> Error {
    let kind = match err.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_owned()),
        std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_owned()),
        std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists(path.to_owned()),
        _ => ErrorKind::Io(err),
    };
    exn::Exn::from(kind)
}
