//! Random-access-shaped writes into a forward-only sink.

use crate::DisposeFn;
use crate::error::ErrorKind;
use std::io::{Error as IoError, ErrorKind as IoErrorKind, Seek, SeekFrom, Write};

/// A `Write + Seek` adapter over a forward-only sink.
///
/// Writes pass straight through to the sink; the adapter only tracks how
/// many bytes went by. Position 0 is the only legal explicit seek target,
/// and only before the first byte has been written; there are no true
/// random writes. `flush` is a one-time terminal operation against the
/// sink: the first call flushes, every later call is a no-op that still
/// reports success so buffered wrappers above can flush freely.
///
/// # Examples
///
/// ```
/// use quay_streams::SinkWriter;
/// use std::io::Write;
///
/// let mut writer = SinkWriter::new(Vec::new());
/// writer.write_all(b"payload").unwrap();
/// writer.flush().unwrap();
/// assert_eq!(writer.bytes_written(), 7);
/// ```
pub struct SinkWriter<W> {
    sink: W,
    written: u64,
    flushed: bool,
    on_dispose: Option<DisposeFn>,
}

impl<W: Write> SinkWriter<W> {
    /// Wrap a forward-only sink.
    pub fn new(sink: W) -> Self {
        Self { sink, written: 0, flushed: false, on_dispose: None }
    }

    /// Register a callback run exactly once when this adapter is dropped,
    /// however the adapter's life ends.
    pub fn on_dispose(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_dispose = Some(Box::new(callback));
        self
    }

    /// Total bytes accepted by the sink so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Whether the terminal flush has already happened.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Access the wrapped sink.
    pub fn sink(&self) -> &W {
        &self.sink
    }
}

impl<W: Write> Write for SinkWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.sink.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if self.flushed {
            return Ok(());
        }
        self.sink.flush()?;
        self.flushed = true;
        tracing::trace!(bytes = self.written, "sink flushed");
        Ok(())
    }
}

impl<W: Write> Seek for SinkWriter<W> {
    fn seek(&mut self, target: SeekFrom) -> std::io::Result<u64> {
        match target {
            // stream_position() probes with Current(0); always answer.
            SeekFrom::Current(0) => Ok(self.written),
            SeekFrom::Start(0) if self.written == 0 => Ok(0),
            SeekFrom::Start(position) => Err(reject_seek(position)),
            // The write cursor is both the current position and the end.
            SeekFrom::Current(delta) | SeekFrom::End(delta) => {
                Err(reject_seek(self.written.saturating_add_signed(delta)))
            }
        }
    }
}

fn reject_seek(position: u64) -> IoError {
    IoError::new(IoErrorKind::Unsupported, ErrorKind::UnsupportedSeek(position))
}

impl<W> Drop for SinkWriter<W> {
    fn drop(&mut self) {
        if let Some(callback) = self.on_dispose.take() {
            callback();
        }
    }
}
