//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which gives every
//! storage location the same item-oriented surface: resolve a path to
//! metadata, list a folder, open byte streams, and mutate. Implementations
//! cover the plain filesystem (indexed and native flavours), the shell
//! virtual namespace, FTP servers, and ZIP archives addressed as folders.

mod archive;
mod ftp;
mod indexed;
mod native;
mod shell;

pub use self::archive::ArchiveBackend;
pub use self::ftp::FtpBackend;
pub use self::indexed::IndexedBackend;
pub use self::native::NativeBackend;
pub use self::shell::ShellBackend;
use crate::error::{ErrorKind, Result};
use crate::item::{BasicProperties, CollisionPolicy, DeleteMode, ItemInfo};
use async_trait::async_trait;
use futures::Stream;
use std::io::{Read, Seek, Write};
use std::pin::Pin;
use std::sync::Arc;

/// Blocking readable+seekable byte stream.
pub trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}
/// Blocking writable+seekable byte stream.
pub trait WriteSeek: Write + Seek + Send {}
impl<T: Write + Seek + Send> WriteSeek for T {}
/// Blocking read-write byte stream, for in-place edits.
pub trait ReadWriteSeek: Read + Write + Seek + Send {}
impl<T: Read + Write + Seek + Send> ReadWriteSeek for T {}

/// Boxed stream returned by [`StorageBackend::open_read`], `'static` and
/// suitable for use inside [`spawn_blocking`](tokio::task::spawn_blocking).
pub type BoxReadSeek = Box<dyn ReadSeek + 'static>;
/// Boxed stream returned by [`StorageBackend::open_write`].
pub type BoxWriteSeek = Box<dyn WriteSeek + 'static>;
/// Boxed stream returned by [`StorageBackend::open_read_write`].
pub type BoxReadWriteSeek = Box<dyn ReadWriteSeek + 'static>;

/// Stream of item listings yielded incrementally.
pub type ItemInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<ItemInfo>> + Send + 'a>>;

/// Shared handle to a backend.
pub type BackendHandle = Arc<dyn StorageBackend>;

/// Run a blocking storage task on the Tokio blocking pool.
pub(crate) async fn run_blocking<T: Send + 'static>(
    task: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T> {
    match tokio::task::spawn_blocking(task).await {
        Ok(result) => result,
        Err(e) => Err(exn::Exn::from(ErrorKind::Io(std::io::Error::other(e)))),
    }
}

/// Unified interface for storage backends.
///
/// All operations are asynchronous; backends over blocking transports
/// (local filesystem, FTP, archives) run the blocking part on the Tokio
/// blocking pool. Item handles returned by `resolve` and `list` are
/// metadata snapshots; every operation takes the path again and touches
/// live state only for the duration of the call.
///
/// # Examples
///
/// ```no_run
/// use quay_storage::backend::StorageBackend;
/// use quay_storage::error::Result;
///
/// async fn size_of(backend: &dyn StorageBackend, path: &str) -> Result<u64> {
///     Ok(backend.properties(path).await?.size)
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs and `Unsupported` errors.
    fn name(&self) -> &'static str;

    /// Whether this backend serves `path`. Dispatch asks backends in
    /// priority order and hands the path to the first claimant; this must
    /// be a cheap shape check, not a full resolution.
    fn claims(&self, path: &str) -> bool;

    /// Resolve a path to an item snapshot.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) when
    /// nothing exists at the path. A successful claim followed by a
    /// failed resolve is final; dispatch does not fall through to a
    /// lower-priority backend.
    async fn resolve(&self, path: &str) -> Result<ItemInfo>;

    /// Fetch size and modification metadata for an item.
    async fn properties(&self, path: &str) -> Result<BasicProperties>;

    /// List the immediate children of a folder.
    async fn list(&self, path: &str) -> Result<Vec<ItemInfo>>;

    /// List a window of `count` children starting at `start`.
    ///
    /// The default lists everything and slices; backends whose transport
    /// pages natively (the shell enumerator) override it.
    async fn list_range(&self, path: &str, start: usize, count: usize) -> Result<Vec<ItemInfo>> {
        let mut items = self.list(path).await?;
        let start = start.min(items.len());
        let end = start.saturating_add(count).min(items.len());
        items.drain(..start);
        items.truncate(end - start);
        Ok(items)
    }

    /// Stream the immediate children of a folder.
    ///
    /// The default implementation lists eagerly and replays the results;
    /// backends with naturally incremental transports override it.
    fn list_stream<'a>(&'a self, path: &'a str) -> ItemInfoStream<'a> {
        Box::pin(async_stream::try_stream! {
            for info in self.list(path).await? {
                yield info;
            }
        })
    }

    /// Open an item for reading.
    async fn open_read(&self, path: &str) -> Result<BoxReadSeek>;

    /// Open an item for writing. Content written becomes visible to other
    /// observers no later than the stream's flush.
    async fn open_write(&self, path: &str) -> Result<BoxWriteSeek>;

    /// Open an item for in-place read-write access. Only backends with
    /// true random-access storage support this; the default declines.
    async fn open_read_write(&self, path: &str) -> Result<BoxReadWriteSeek> {
        let _ = path;
        Err(exn::Exn::from(ErrorKind::Unsupported {
            backend: self.name(),
            operation: "open_read_write",
        }))
    }

    /// Create an empty file under `parent`.
    ///
    /// Returns `Ok(None)` when the policy resolved the collision by not
    /// creating anything ([`Skip`](CollisionPolicy::Skip), and backends
    /// that cannot atomically detect a collision under
    /// [`FailIfExists`](CollisionPolicy::FailIfExists)).
    async fn create_file(&self, parent: &str, name: &str, policy: CollisionPolicy) -> Result<Option<ItemInfo>>;

    /// Create a subfolder under `parent`. Same collision contract as
    /// [`create_file`](Self::create_file).
    async fn create_folder(&self, parent: &str, name: &str, policy: CollisionPolicy) -> Result<Option<ItemInfo>>;

    /// Create a file under `parent` with content drained from `reader`.
    ///
    /// Capability probe: backends that can ingest a stream directly
    /// override this, letting cross-backend copies skip the buffer-all
    /// fallback. The default declines.
    async fn create_file_from_reader(
        &self,
        parent: &str,
        name: &str,
        _reader: Box<dyn Read + Send>,
        _policy: CollisionPolicy,
    ) -> Result<Option<ItemInfo>> {
        let _ = (parent, name);
        Err(exn::Exn::from(ErrorKind::Unsupported {
            backend: self.name(),
            operation: "create_file_from_reader",
        }))
    }

    /// Rename an item in place.
    async fn rename(&self, path: &str, new_name: &str, policy: CollisionPolicy) -> Result<ItemInfo>;

    /// Move an item to another folder served by the same backend. Backends
    /// without a native move decline and let the caller copy-and-delete.
    async fn move_item(&self, path: &str, dest_parent: &str, _policy: CollisionPolicy) -> Result<ItemInfo> {
        let _ = (path, dest_parent);
        Err(exn::Exn::from(ErrorKind::Unsupported {
            backend: self.name(),
            operation: "move_item",
        }))
    }

    /// Delete an item. Folders are removed recursively.
    async fn delete(&self, path: &str, mode: DeleteMode) -> Result<()>;
}
