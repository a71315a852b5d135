//! Random-access adapters over forward-only byte streams.
//!
//! Several storage protocols only hand out forward-only I/O (an FTP data
//! connection, an inflating archive entry), while stream consumers expect
//! to seek. This crate bridges the two with explicit adapter types instead
//! of inheritance games:
//!
//! - [`StagedReader`] fakes `Read + Seek` over any forward-only source by
//!   staging drained bytes in a monotonically growing buffer. Backward
//!   seeks are free; forward reads drain the source further.
//! - [`SinkWriter`] exposes a `Write + Seek` surface over a forward-only
//!   sink, where position 0 is the only legal seek target and `flush` is a
//!   one-time terminal operation.
//!
//! Both adapters take an optional disposal callback, invoked exactly once
//! when the adapter is dropped, so the owning backend can release a
//! connection or file handle on both the success and the error path.

pub mod error;
mod read;
mod write;

pub use crate::read::StagedReader;
pub use crate::write::SinkWriter;

/// Callback run exactly once when an adapter is dropped.
pub(crate) type DisposeFn = Box<dyn FnOnce() + Send>;
