//! Random-access reads over a forward-only source.

use crate::DisposeFn;
use crate::error::{ErrorKind, Result};
use std::io::{Error as IoError, ErrorKind as IoErrorKind, Read, Seek, SeekFrom};

/// Chunk size used when draining the source into the staging buffer.
const DRAIN_CHUNK: usize = 16 * 1024;

/// A `Read + Seek` view over a forward-only source.
///
/// Bytes drained from the source accumulate in an internal staging buffer,
/// so any position that has already been passed can be revisited for free.
/// A read past the staged high-water mark drains the source until enough
/// bytes are buffered (or the source is exhausted). The buffer only ever
/// grows for the lifetime of one adapter; these handles are meant to be
/// short-lived, not a cache.
///
/// # Examples
///
/// ```
/// use quay_streams::StagedReader;
/// use std::io::{Cursor, Read, Seek, SeekFrom};
///
/// // Cursor stands in for a network stream here.
/// let mut reader = StagedReader::new(Cursor::new(b"hello world".to_vec()));
/// let mut word = [0u8; 5];
/// reader.seek(SeekFrom::Start(6)).unwrap();
/// reader.read_exact(&mut word).unwrap();
/// assert_eq!(&word, b"world");
/// // Backward seek replays the staging buffer, no source involvement.
/// reader.seek(SeekFrom::Start(0)).unwrap();
/// reader.read_exact(&mut word).unwrap();
/// assert_eq!(&word, b"hello");
/// ```
pub struct StagedReader<R> {
    source: R,
    staged: Vec<u8>,
    pos: u64,
    declared_len: Option<u64>,
    exhausted: bool,
    on_dispose: Option<DisposeFn>,
}

impl<R: Read> StagedReader<R> {
    /// Wrap a forward-only source of unknown length.
    pub fn new(source: R) -> Self {
        Self {
            source,
            staged: Vec::new(),
            pos: 0,
            declared_len: None,
            exhausted: false,
            on_dispose: None,
        }
    }

    /// Wrap a forward-only source whose total length is already known
    /// (e.g. from directory metadata), enabling `SeekFrom::End` without
    /// draining the whole source first.
    pub fn with_len(source: R, len: u64) -> Self {
        let mut staged = Self::new(source);
        staged.declared_len = Some(len);
        staged
    }

    /// Register a callback run exactly once when this adapter is dropped,
    /// however the adapter's life ends. This is where the owning backend
    /// releases its connection or file handle.
    pub fn on_dispose(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_dispose = Some(Box::new(callback));
        self
    }

    /// Bytes staged so far. Monotonically non-decreasing.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Total length, if known: either declared up front or discovered by
    /// exhausting the source.
    pub fn len(&self) -> Option<u64> {
        match (self.declared_len, self.exhausted) {
            (Some(len), _) => Some(len),
            (None, true) => Some(self.staged.len() as u64),
            (None, false) => None,
        }
    }

    /// Drain the remaining source and return the complete staged contents.
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        self.stage_to(u64::MAX).map_err(ErrorKind::Io)?;
        Ok(std::mem::take(&mut self.staged))
    }

    /// Drain the source until at least `target` bytes are staged or the
    /// source is exhausted.
    fn stage_to(&mut self, target: u64) -> std::io::Result<()> {
        let mut chunk = [0u8; DRAIN_CHUNK];
        while !self.exhausted && (self.staged.len() as u64) < target {
            let n = self.source.read(&mut chunk)?;
            if n == 0 {
                self.exhausted = true;
                break;
            }
            self.staged.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }
}

impl<R: Read> Read for StagedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let wanted = self.pos.saturating_add(buf.len() as u64);
        self.stage_to(wanted)?;
        let start = usize::try_from(self.pos).unwrap_or(usize::MAX).min(self.staged.len());
        let n = buf.len().min(self.staged.len() - start);
        buf[..n].copy_from_slice(&self.staged[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read> Seek for StagedReader<R> {
    fn seek(&mut self, target: SeekFrom) -> std::io::Result<u64> {
        // Seeking only moves the virtual cursor; staging happens lazily on
        // the next read. Seeking past the end is legal (reads return 0).
        let next = match target {
            SeekFrom::Start(pos) => pos,
            SeekFrom::Current(delta) => self
                .pos
                .checked_add_signed(delta)
                .ok_or_else(|| IoError::new(IoErrorKind::InvalidInput, "seek before start"))?,
            SeekFrom::End(delta) => {
                if self.declared_len.is_none() {
                    // Unknown length: the only way to honor End is to
                    // finish draining the source.
                    self.stage_to(u64::MAX)?;
                }
                let len = self.len().unwrap_or(self.staged.len() as u64);
                len.checked_add_signed(delta)
                    .ok_or_else(|| IoError::new(IoErrorKind::InvalidInput, "seek before start"))?
            },
        };
        self.pos = next;
        Ok(self.pos)
    }
}

impl<R> Drop for StagedReader<R> {
    fn drop(&mut self) {
        if let Some(callback) = self.on_dispose.take() {
            callback();
        }
    }
}
