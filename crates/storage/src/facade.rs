//! The storage facade: one entry point over every backend.
//!
//! A path is handed to the first backend that claims it, in fixed
//! priority order: archive, shell, FTP, native, indexed. The claim is a
//! string-shape check only; once a backend claims a path, its answer is
//! final: a failed resolution is reported, never retried against a
//! lower-priority backend. The single exception belongs to dispatch
//! itself, which sets aside an archive claim whose container is really a
//! directory named `*.zip` so the path falls through to the filesystem.

use crate::assoc::{AssocProbe, DefaultAppCache};
use crate::backend::{
    ArchiveBackend, BackendHandle, BoxReadSeek, BoxReadWriteSeek, BoxWriteSeek, FtpBackend,
    IndexedBackend, NativeBackend, ShellBackend, StorageBackend,
};
use crate::credentials::{CredentialStoreHandle, MemoryCredentialStore};
use crate::error::{ErrorKind, Result};
use crate::item::{BasicProperties, CollisionPolicy, DeleteMode, ItemInfo};
use crate::path;
use crate::query::{FolderDepth, QueryOptions};
use crate::shell_api::ShellEnumeratorHandle;
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::instrument;

/// Builder for [`StorageFacade`].
///
/// Everything is optional: without a shell enumerator the shell backend
/// is simply absent, without a credential store FTP logs in anonymously,
/// and without an association probe the archive backend assumes it is
/// the default `.zip` handler.
#[derive(Default)]
pub struct StorageFacadeBuilder {
    credentials: Option<CredentialStoreHandle>,
    shell: Option<ShellEnumeratorHandle>,
    assoc: Option<DefaultAppCache>,
}

impl StorageFacadeBuilder {
    pub fn with_credential_store(mut self, store: CredentialStoreHandle) -> Self {
        self.credentials = Some(store);
        self
    }

    pub fn with_shell_enumerator(mut self, enumerator: ShellEnumeratorHandle) -> Self {
        self.shell = Some(enumerator);
        self
    }

    pub fn with_default_app_probe(mut self, probe: AssocProbe) -> Self {
        self.assoc = Some(DefaultAppCache::new(probe));
        self
    }

    pub fn build(self) -> StorageFacade {
        let assoc = self.assoc.unwrap_or_else(DefaultAppCache::assume_ours);
        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let mut backends: Vec<BackendHandle> = Vec::with_capacity(5);
        backends.push(Arc::new(ArchiveBackend::new(assoc)));
        if let Some(enumerator) = self.shell {
            backends.push(Arc::new(ShellBackend::new(enumerator)));
        }
        backends.push(Arc::new(FtpBackend::new(credentials)));
        backends.push(Arc::new(NativeBackend::new()));
        backends.push(Arc::new(IndexedBackend::new()));
        StorageFacade { backends }
    }
}

/// Facade over all configured backends.
pub struct StorageFacade {
    /// Claim order is priority order; the indexed backend at the end
    /// claims everything.
    backends: Vec<BackendHandle>,
}

impl StorageFacade {
    pub fn builder() -> StorageFacadeBuilder {
        StorageFacadeBuilder::default()
    }

    /// Facade with default wiring for every backend.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// The backend that claims `path`.
    ///
    /// Claims themselves never touch storage; the one on-disk look
    /// happens here. A real directory named `*.zip` is not a container,
    /// so its archive claim is set aside and the path falls through to
    /// the filesystem backends. A missing container stays claimed;
    /// resolution reports it.
    pub async fn backend_for(&self, item_path: &str) -> Result<&BackendHandle> {
        let container_is_dir = match path::split_archive(item_path) {
            Some((container, _)) => tokio::fs::metadata(container)
                .await
                .map(|metadata| metadata.is_dir())
                .unwrap_or(false),
            None => false,
        };
        self.backends
            .iter()
            .find(|b| b.claims(item_path) && !(container_is_dir && b.name() == "archive"))
            .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidPath(item_path.to_owned())))
    }

    /// Resolve a path into an item handle.
    #[instrument(skip(self))]
    pub async fn resolve(&self, item_path: &str) -> Result<Entry> {
        let backend = self.backend_for(item_path).await?;
        let info = backend.resolve(item_path).await?;
        Ok(Entry { backend: Arc::clone(backend), info })
    }

    /// Whether anything exists at `path`. Only `NotFound` maps to
    /// `false`; other failures propagate.
    pub async fn exists(&self, item_path: &str) -> Result<bool> {
        match self.resolve(item_path).await {
            Ok(_) => Ok(true),
            Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Create an empty file under the folder at `parent`.
    pub async fn create_file(&self, parent: &str, name: &str, policy: CollisionPolicy) -> Result<Option<Entry>> {
        let backend = self.backend_for(parent).await?;
        let info = backend.create_file(parent, name, policy).await?;
        Ok(info.map(|info| Entry { backend: Arc::clone(backend), info }))
    }

    /// Create a subfolder under the folder at `parent`.
    pub async fn create_folder(&self, parent: &str, name: &str, policy: CollisionPolicy) -> Result<Option<Entry>> {
        let backend = self.backend_for(parent).await?;
        let info = backend.create_folder(parent, name, policy).await?;
        Ok(info.map(|info| Entry { backend: Arc::clone(backend), info }))
    }

    /// Run a shaped query against the folder at `path`.
    ///
    /// Deep queries walk subfolders of the same backend; the filter and
    /// sort clauses of `options` shape the result, which supports
    /// windowed access for incremental consumers.
    #[instrument(skip(self, options))]
    pub async fn query(&self, folder_path: &str, options: &QueryOptions) -> Result<QueryResult> {
        let backend = self.backend_for(folder_path).await?;
        let mut matched = Vec::new();
        let mut stack = vec![folder_path.to_owned()];
        while let Some(current) = stack.pop() {
            let mut listing = backend.list_stream(&current);
            while let Some(info) = listing.try_next().await? {
                if info.is_folder() && options.depth == FolderDepth::Deep {
                    stack.push(info.path.clone());
                }
                if options.matches(&info) {
                    matched.push(info);
                }
            }
        }
        options.sort_items(&mut matched);
        let entries = matched
            .into_iter()
            .map(|info| Entry { backend: Arc::clone(backend), info })
            .collect();
        Ok(QueryResult { entries })
    }
}

impl Default for StorageFacade {
    fn default() -> Self {
        Self::new()
    }
}

/// A resolved storage item: a metadata snapshot plus the backend that
/// produced it. Handles are cheap to clone and hold no live resource;
/// each operation re-addresses the item by path.
#[derive(Clone)]
pub struct Entry {
    backend: BackendHandle,
    info: ItemInfo,
}

impl Entry {
    pub fn info(&self) -> &ItemInfo {
        &self.info
    }

    pub fn path(&self) -> &str {
        &self.info.path
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn is_folder(&self) -> bool {
        self.info.is_folder()
    }

    /// Name of the backend serving this item.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn properties(&self) -> Result<BasicProperties> {
        self.backend.properties(self.path()).await
    }

    pub async fn list(&self) -> Result<Vec<ItemInfo>> {
        self.backend.list(self.path()).await
    }

    /// List a window of `count` children starting at `start`.
    pub async fn list_range(&self, start: usize, count: usize) -> Result<Vec<ItemInfo>> {
        self.backend.list_range(self.path(), start, count).await
    }

    pub async fn open_read(&self) -> Result<BoxReadSeek> {
        self.backend.open_read(self.path()).await
    }

    pub async fn open_write(&self) -> Result<BoxWriteSeek> {
        self.backend.open_write(self.path()).await
    }

    /// Open for in-place read-write access; backends without true
    /// random-access storage decline.
    pub async fn open_read_write(&self) -> Result<BoxReadWriteSeek> {
        self.backend.open_read_write(self.path()).await
    }

    /// Read the whole item into memory.
    pub async fn read_to_vec(&self) -> Result<Vec<u8>> {
        let reader = self.open_read().await?;
        crate::backend::run_blocking(move || {
            let mut reader = reader;
            let mut bytes = Vec::new();
            std::io::Read::read_to_end(&mut reader, &mut bytes).map_err(ErrorKind::Io)?;
            Ok(bytes)
        })
        .await
    }

    pub async fn create_file(&self, name: &str, policy: CollisionPolicy) -> Result<Option<Entry>> {
        let info = self.backend.create_file(self.path(), name, policy).await?;
        Ok(info.map(|info| Entry { backend: Arc::clone(&self.backend), info }))
    }

    pub async fn create_folder(&self, name: &str, policy: CollisionPolicy) -> Result<Option<Entry>> {
        let info = self.backend.create_folder(self.path(), name, policy).await?;
        Ok(info.map(|info| Entry { backend: Arc::clone(&self.backend), info }))
    }

    pub async fn rename(&self, new_name: &str, policy: CollisionPolicy) -> Result<Entry> {
        let info = self.backend.rename(self.path(), new_name, policy).await?;
        Ok(Entry { backend: Arc::clone(&self.backend), info })
    }

    pub async fn delete(&self, mode: DeleteMode) -> Result<()> {
        self.backend.delete(self.path(), mode).await
    }

    /// Copy this file into `dest_folder`, possibly served by a different
    /// backend.
    ///
    /// The destination backend is first probed for direct stream
    /// ingestion; a backend that declines gets the slow path of an
    /// explicit create-then-write.
    #[instrument(skip(self, dest_folder), fields(src = %self.path(), dest = %dest_folder.path()))]
    pub async fn copy_to(&self, dest_folder: &Entry, name: &str, policy: CollisionPolicy) -> Result<Option<Entry>> {
        let reader = self.open_read().await?;
        let attempt = dest_folder
            .backend
            .create_file_from_reader(dest_folder.path(), name, Box::new(reader), policy)
            .await;
        let info = match attempt {
            Ok(info) => info,
            Err(err) if matches!(&*err, ErrorKind::Unsupported { .. }) => {
                // Declined the stream; reopen the source and do it by hand.
                let Some(created) = dest_folder
                    .backend
                    .create_file(dest_folder.path(), name, policy)
                    .await?
                else {
                    return Ok(None);
                };
                let reader = self.open_read().await?;
                let writer = dest_folder.backend.open_write(&created.path).await?;
                crate::backend::run_blocking(move || {
                    let mut reader = reader;
                    let mut writer = writer;
                    std::io::copy(&mut reader, &mut writer).map_err(ErrorKind::Io)?;
                    std::io::Write::flush(&mut writer).map_err(ErrorKind::Io)?;
                    Ok(())
                })
                .await?;
                Some(dest_folder.backend.resolve(&created.path).await?)
            }
            Err(err) => return Err(err),
        };
        Ok(info.map(|info| Entry { backend: Arc::clone(&dest_folder.backend), info }))
    }

    /// Move this item into `dest_folder`.
    ///
    /// A same-backend move uses the backend's native rename when it has
    /// one; everything else degrades to copy-then-delete, with the
    /// delete always permanent (the original was asked to go away, not
    /// to be recycled).
    pub async fn move_to(&self, dest_folder: &Entry, policy: CollisionPolicy) -> Result<Option<Entry>> {
        if self.backend.name() == dest_folder.backend.name() {
            match self.backend.move_item(self.path(), dest_folder.path(), policy).await {
                Ok(info) => {
                    return Ok(Some(Entry { backend: Arc::clone(&self.backend), info }));
                }
                Err(err) if matches!(&*err, ErrorKind::Unsupported { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        let name = self.name().to_owned();
        let Some(copied) = self.copy_to(dest_folder, &name, policy).await? else {
            return Ok(None);
        };
        self.delete(DeleteMode::Permanent).await?;
        Ok(Some(copied))
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("backend", &self.backend.name())
            .field("path", &self.info.path)
            .finish()
    }
}

/// The shaped outcome of a folder query, with windowed access.
pub struct QueryResult {
    entries: Vec<Entry>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// A window of `count` entries starting at `start`, clamped to the
    /// result's bounds.
    pub fn page(&self, start: usize, count: usize) -> &[Entry] {
        let start = start.min(self.entries.len());
        let end = start.saturating_add(count).min(self.entries.len());
        &self.entries[start..end]
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{SortKey, SortSpec};
    use crate::shell_api::{ShellEntry, ShellEnumerator, ShellFolderListing};
    use async_trait::async_trait;
    use std::io::Write as _;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    struct EmptyShell;

    #[async_trait]
    impl ShellEnumerator for EmptyShell {
        async fn list_folder(&self, _path: &str, _start: usize, _count: usize) -> Result<ShellFolderListing> {
            Ok(ShellFolderListing::default())
        }

        async fn item(&self, _path: &str) -> Result<Option<ShellEntry>> {
            Ok(None)
        }
    }

    fn facade() -> StorageFacade {
        StorageFacade::builder()
            .with_shell_enumerator(Arc::new(EmptyShell))
            .build()
    }

    fn dir_path(dir: &tempfile::TempDir) -> String {
        dir.path().to_string_lossy().into_owned()
    }

    fn write_zip(dir: &tempfile::TempDir, entries: &[(&str, &str)]) -> String {
        let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        let bytes = writer.finish().unwrap().into_inner();
        let container = path::join(&dir_path(dir), "pack.zip");
        std::fs::write(&container, bytes).unwrap();
        container
    }

    #[tokio::test]
    async fn test_dispatch_priority() {
        let dir = tempfile::tempdir().unwrap();
        let container = write_zip(&dir, &[("a.txt", "x")]);
        let facade = facade();

        async fn routed(facade: &StorageFacade, p: &str) -> &'static str {
            facade.backend_for(p).await.unwrap().name()
        }
        assert_eq!(routed(&facade, &format!("{container}/a.txt")).await, "archive");
        assert_eq!(routed(&facade, &container).await, "indexed");
        assert_eq!(routed(&facade, "shell:RecycleBinFolder").await, "shell");
        assert_eq!(routed(&facade, "ftp://host/pub/file.txt").await, "ftp");
        assert_eq!(routed(&facade, "/home/u/editor.lnk").await, "native");
        assert_eq!(routed(&facade, "/home/u/plain.txt").await, "indexed");
    }

    #[tokio::test]
    async fn test_zip_named_directory_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("data.zip");
        std::fs::create_dir(&fake).unwrap();
        std::fs::write(fake.join("inside.txt"), "content").unwrap();

        let facade = facade();
        let inner = format!("{}/inside.txt", fake.to_string_lossy());
        assert_eq!(facade.backend_for(&inner).await.unwrap().name(), "indexed");
        let entry = facade.resolve(&inner).await.unwrap();
        assert_eq!(entry.backend_name(), "indexed");
        assert_eq!(entry.read_to_vec().await.unwrap(), b"content");
    }

    #[tokio::test]
    async fn test_missing_container_does_not_fall_through() {
        let dir = tempfile::tempdir().unwrap();
        let facade = facade();
        let inner = format!("{}/absent.zip/file.txt", dir_path(&dir));
        assert_eq!(facade.backend_for(&inner).await.unwrap().name(), "archive");
        let err = facade.resolve(&inner).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_entry_roundtrip_on_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let facade = facade();
        let root = facade.resolve(&dir_path(&dir)).await.unwrap();
        assert!(root.is_folder());

        let file = root
            .create_file("notes.txt", CollisionPolicy::FailIfExists)
            .await
            .unwrap()
            .unwrap();
        let mut writer = file.open_write().await.unwrap();
        writer.write_all(b"facade bytes").unwrap();
        writer.flush().unwrap();
        drop(writer);

        assert_eq!(file.read_to_vec().await.unwrap(), b"facade bytes");
        assert_eq!(file.properties().await.unwrap().size, 12);

        let renamed = file.rename("kept.txt", CollisionPolicy::FailIfExists).await.unwrap();
        assert_eq!(renamed.name(), "kept.txt");
        renamed.delete(DeleteMode::Permanent).await.unwrap();
        assert!(!facade.exists(renamed.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_into_archive_cross_backend() {
        let dir = tempfile::tempdir().unwrap();
        let container = write_zip(&dir, &[("keep.txt", "keep")]);
        let facade = facade();

        let src_dir = facade.resolve(&dir_path(&dir)).await.unwrap();
        let source = src_dir.create_file("fresh.txt", CollisionPolicy::FailIfExists).await.unwrap().unwrap();
        let mut writer = source.open_write().await.unwrap();
        writer.write_all(b"payload").unwrap();
        writer.flush().unwrap();
        drop(writer);

        let archive_root = facade.resolve(&format!("{container}/")).await.unwrap();
        assert_eq!(archive_root.backend_name(), "archive");
        let copied = source
            .copy_to(&archive_root, "fresh.txt", CollisionPolicy::FailIfExists)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(copied.backend_name(), "archive");
        assert_eq!(copied.read_to_vec().await.unwrap(), b"payload");
        // Source untouched.
        assert!(facade.exists(source.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_fallback_when_stream_ingest_declined() {
        let dir = tempfile::tempdir().unwrap();
        let root_path = dir_path(&dir);
        let facade = facade();
        let root = facade.resolve(&root_path).await.unwrap();
        let source = root.create_file("src.txt", CollisionPolicy::FailIfExists).await.unwrap().unwrap();
        let mut writer = source.open_write().await.unwrap();
        writer.write_all(b"special").unwrap();
        writer.flush().unwrap();
        drop(writer);

        // The native backend has no stream ingestion, so this copy takes
        // the explicit create-then-write path.
        let native_dest = Entry {
            backend: Arc::new(NativeBackend::new()),
            info: crate::item::ItemInfo::folder(&root_path, crate::item::UNKNOWN_DATE),
        };
        let copied = source
            .copy_to(&native_dest, "copy.url", CollisionPolicy::FailIfExists)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(copied.backend_name(), "native");
        assert_eq!(copied.read_to_vec().await.unwrap(), b"special");
    }

    #[tokio::test]
    async fn test_move_from_archive_to_folder() {
        let dir = tempfile::tempdir().unwrap();
        let container = write_zip(&dir, &[("inner.txt", "escape")]);
        let facade = facade();

        let inner = facade.resolve(&format!("{container}/inner.txt")).await.unwrap();
        let dest = facade.resolve(&dir_path(&dir)).await.unwrap();
        let moved = inner.move_to(&dest, CollisionPolicy::FailIfExists).await.unwrap().unwrap();
        assert_eq!(moved.backend_name(), "indexed");
        assert_eq!(moved.read_to_vec().await.unwrap(), b"escape");
        assert!(!facade.exists(inner.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_query_deep_filter_sort_window() {
        let dir = tempfile::tempdir().unwrap();
        let root_path = dir_path(&dir);
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("beta.txt"), "b").unwrap();
        std::fs::write(dir.path().join("alpha.txt"), "a").unwrap();
        std::fs::write(dir.path().join("image.png"), "p").unwrap();
        std::fs::write(dir.path().join("sub/gamma.txt"), "g").unwrap();

        let facade = facade();
        let options = QueryOptions::new()
            .deep()
            .with_filter(".txt")
            .unwrap()
            .sorted_by(SortSpec::ascending(SortKey::Name));
        let result = facade.query(&root_path, &options).await.unwrap();

        let names: Vec<_> = result.entries().iter().map(|e| e.name()).collect();
        assert_eq!(names, ["alpha.txt", "beta.txt", "gamma.txt"]);

        let window: Vec<_> = result.page(1, 1).iter().map(|e| e.name()).collect();
        assert_eq!(window, ["beta.txt"]);
        assert!(result.page(5, 2).is_empty());
    }

    #[tokio::test]
    async fn test_skip_collision_reports_no_entry() {
        let dir = tempfile::tempdir().unwrap();
        let facade = facade();
        let root = facade.resolve(&dir_path(&dir)).await.unwrap();
        root.create_file("a.txt", CollisionPolicy::FailIfExists).await.unwrap();
        let skipped = root.create_file("a.txt", CollisionPolicy::Skip).await.unwrap();
        assert!(skipped.is_none());
    }
}
