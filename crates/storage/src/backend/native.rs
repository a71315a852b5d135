//! Native special-item backend.
//!
//! Handles the filesystem items the indexed backend cannot: shortcut
//! files (`.lnk`, `.url`) whose metadata comes from parsing the file, and
//! alternate data streams addressed as `file.ext:stream`. Streams have no
//! directory entry of their own, so renames are a read-rewrite-delete
//! dance and trash disposal is refused.

use crate::backend::indexed::IndexedBackend;
use crate::backend::run_blocking;
use crate::backend::{BoxReadSeek, BoxReadWriteSeek, BoxWriteSeek, StorageBackend};
use crate::error::{ErrorKind, Result, map_io_error};
use crate::item::{BasicProperties, CollisionPolicy, DeleteMode, ItemInfo, UNKNOWN_DATE};
use crate::path;
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::fs;

/// Backend for shortcuts and alternate data streams.
#[derive(Debug, Default, Clone)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }

    /// Extract the target of a `.url` internet shortcut (INI format).
    fn url_target(content: &str) -> Option<String> {
        content
            .lines()
            .find_map(|line| line.trim().strip_prefix("URL="))
            .map(str::to_owned)
    }

    async fn resolve_shortcut(path: &str) -> Result<ItemInfo> {
        let metadata = fs::metadata(path).await.map_err(|e| map_io_error(e, path))?;
        let created = metadata
            .created()
            .map(OffsetDateTime::from)
            .unwrap_or(UNKNOWN_DATE);
        let mut info = ItemInfo::file(path, created);
        if info.extension.eq_ignore_ascii_case(".url") {
            let content = fs::read_to_string(path).await.map_err(|e| map_io_error(e, path))?;
            if let Some(target) = Self::url_target(&content) {
                info = info.with_extra("link_target", target);
            }
        }
        Ok(info.with_extra("is_shortcut", "true"))
    }

    async fn resolve_stream(path: &str) -> Result<ItemInfo> {
        // The stream address doubles as the open path; its base file
        // provides the dates.
        let (base, _stream) = path::split_stream(path)
            .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidPath(path.to_owned())))?;
        fs::metadata(base).await.map_err(|e| map_io_error(e, base))?;
        let metadata = fs::metadata(path).await.map_err(|e| map_io_error(e, path))?;
        let created = metadata
            .created()
            .map(OffsetDateTime::from)
            .unwrap_or(UNKNOWN_DATE);
        Ok(ItemInfo::file(path, created))
    }
}

#[async_trait]
impl StorageBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn claims(&self, path: &str) -> bool {
        path::is_native_special(path)
    }

    async fn resolve(&self, path: &str) -> Result<ItemInfo> {
        if path::split_stream(path).is_some() {
            Self::resolve_stream(path).await
        } else {
            Self::resolve_shortcut(path).await
        }
    }

    async fn properties(&self, path: &str) -> Result<BasicProperties> {
        let metadata = fs::metadata(path).await.map_err(|e| map_io_error(e, path))?;
        let modified = metadata
            .modified()
            .map(OffsetDateTime::from)
            .unwrap_or(UNKNOWN_DATE);
        Ok(BasicProperties::new(metadata.len(), modified))
    }

    async fn list(&self, _path: &str) -> Result<Vec<ItemInfo>> {
        // Special items are leaves; nothing to enumerate.
        Err(exn::Exn::from(ErrorKind::Unsupported {
            backend: self.name(),
            operation: "list",
        }))
    }

    async fn open_read(&self, path: &str) -> Result<BoxReadSeek> {
        let owned = path.to_owned();
        run_blocking(move || {
            let file = std::fs::File::open(&owned).map_err(|e| map_io_error(e, &owned))?;
            Ok(Box::new(file) as BoxReadSeek)
        })
        .await
    }

    async fn open_write(&self, path: &str) -> Result<BoxWriteSeek> {
        let owned = path.to_owned();
        run_blocking(move || {
            let file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .open(&owned)
                .map_err(|e| map_io_error(e, &owned))?;
            Ok(Box::new(file) as BoxWriteSeek)
        })
        .await
    }

    async fn open_read_write(&self, path: &str) -> Result<BoxReadWriteSeek> {
        let owned = path.to_owned();
        run_blocking(move || {
            let file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(&owned)
                .map_err(|e| map_io_error(e, &owned))?;
            Ok(Box::new(file) as BoxReadWriteSeek)
        })
        .await
    }

    async fn create_file(&self, parent: &str, name: &str, policy: CollisionPolicy) -> Result<Option<ItemInfo>> {
        let Some(target) = IndexedBackend::creation_target(parent, name, policy).await? else {
            return Ok(None);
        };
        fs::write(&target, b"").await.map_err(|e| map_io_error(e, &target))?;
        self.resolve(&target).await.map(Some)
    }

    async fn create_folder(&self, _parent: &str, _name: &str, _policy: CollisionPolicy) -> Result<Option<ItemInfo>> {
        Err(exn::Exn::from(ErrorKind::Unsupported {
            backend: self.name(),
            operation: "create_folder",
        }))
    }

    async fn rename(&self, path: &str, new_name: &str, policy: CollisionPolicy) -> Result<ItemInfo> {
        let policy = match policy {
            CollisionPolicy::Skip => CollisionPolicy::FailIfExists,
            other => other,
        };
        if let Some((base, _stream)) = path::split_stream(path) {
            // A stream has no directory entry to rename. Copy the bytes
            // into the new stream address and drop the old one.
            let target = match path::split_stream(new_name) {
                Some((_, stream)) => format!("{base}:{stream}"),
                None => {
                    let parent = path::parent(base)
                        .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidPath(path.to_owned())))?;
                    path::join(parent, new_name)
                }
            };
            let occupied = fs::try_exists(&target).await.map_err(|e| map_io_error(e, &target))?;
            if occupied && policy == CollisionPolicy::FailIfExists {
                exn::bail!(ErrorKind::AlreadyExists(target));
            }
            let bytes = fs::read(path).await.map_err(|e| map_io_error(e, path))?;
            fs::write(&target, &bytes).await.map_err(|e| map_io_error(e, &target))?;
            fs::remove_file(path).await.map_err(|e| map_io_error(e, path))?;
            return self.resolve(&target).await;
        }
        let parent = path::parent(path)
            .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidPath(path.to_owned())))?;
        let target = IndexedBackend::creation_target(parent, new_name, policy)
            .await?
            .ok_or_else(|| exn::Exn::from(ErrorKind::AlreadyExists(path::join(parent, new_name))))?;
        fs::rename(path, &target).await.map_err(|e| map_io_error(e, path))?;
        self.resolve(&target).await
    }

    async fn delete(&self, path: &str, mode: DeleteMode) -> Result<()> {
        if mode == DeleteMode::Trash && path::split_stream(path).is_some() {
            // Streams cannot be recycled; only the base file can.
            exn::bail!(ErrorKind::Unsupported { backend: self.name(), operation: "delete to trash" });
        }
        match mode {
            DeleteMode::Trash => {
                let owned = path.to_owned();
                run_blocking(move || {
                    trash::delete(&owned)
                        .map_err(|e| exn::Exn::from(ErrorKind::Io(std::io::Error::other(e))))
                })
                .await
            }
            DeleteMode::Permanent => {
                fs::remove_file(path).await.map_err(|e| map_io_error(e, path))?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    fn dir_path(dir: &tempfile::TempDir) -> String {
        dir.path().to_string_lossy().into_owned()
    }

    #[test]
    fn test_claims_only_special_paths() {
        let backend = NativeBackend::new();
        assert!(backend.claims("/home/u/editor.lnk"));
        assert!(backend.claims("/home/u/site.url"));
        assert!(backend.claims("/home/u/doc.txt:zone"));
        assert!(!backend.claims("/home/u/doc.txt"));
    }

    #[tokio::test]
    async fn test_url_shortcut_exposes_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = path::join(&dir_path(&dir), "site.url");
        tokio::fs::write(&target, "[InternetShortcut]\nURL=https://example.com/\n")
            .await
            .unwrap();
        let backend = NativeBackend::new();
        let info = backend.resolve(&target).await.unwrap();
        let extra = info.extra.unwrap();
        assert_eq!(extra["link_target"], "https://example.com/");
        assert_eq!(extra["is_shortcut"], "true");
    }

    #[tokio::test]
    async fn test_stream_requires_base_file() {
        let dir = tempfile::tempdir().unwrap();
        let stream = path::join(&dir_path(&dir), "doc.txt:meta");
        let backend = NativeBackend::new();
        let err = backend.resolve(&stream).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stream_write_read_rename() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir_path(&dir);
        let backend = NativeBackend::new();
        let base = path::join(&root, "doc.txt");
        tokio::fs::write(&base, "body").await.unwrap();

        let stream = format!("{base}:meta");
        tokio::fs::write(&stream, "stream bytes").await.unwrap();
        assert_eq!(backend.resolve(&stream).await.unwrap().name, "doc.txt:meta");

        let mut reader = backend.open_read(&stream).await.unwrap();
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "stream bytes");

        // Rename replays the bytes under the new stream name.
        let renamed = backend.rename(&stream, "doc.txt:meta2", CollisionPolicy::FailIfExists).await.unwrap();
        assert!(renamed.path.ends_with(":meta2"));
        assert!(backend.resolve(&stream).await.is_err());
        let kept = tokio::fs::read_to_string(&renamed.path).await.unwrap();
        assert_eq!(kept, "stream bytes");
    }

    #[tokio::test]
    async fn test_stream_trash_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir_path(&dir);
        let backend = NativeBackend::new();
        let base = path::join(&root, "doc.txt");
        tokio::fs::write(&base, "body").await.unwrap();
        let stream = format!("{base}:meta");
        tokio::fs::write(&stream, "x").await.unwrap();

        let err = backend.delete(&stream, DeleteMode::Trash).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unsupported { .. }));
        backend.delete(&stream, DeleteMode::Permanent).await.unwrap();
        assert!(backend.resolve(&stream).await.is_err());
    }

    #[tokio::test]
    async fn test_list_is_unsupported() {
        let backend = NativeBackend::new();
        let err = backend.list("/any/editor.lnk").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unsupported { .. }));
    }
}
