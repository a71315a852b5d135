//! System-indexed filesystem backend.
//!
//! The general-purpose filesystem backend and the dispatcher's catch-all:
//! it claims every path the specialized backends decline. Metadata and
//! directory walks go through `tokio::fs`; byte streams and trash disposal
//! run on the blocking pool.

use crate::backend::{BoxReadSeek, BoxReadWriteSeek, BoxWriteSeek, StorageBackend, run_blocking};
use crate::error::{ErrorKind, Result, map_io_error};
use crate::item::{
    Attributes, BasicProperties, CollisionPolicy, DeleteMode, ItemInfo, UNKNOWN_DATE,
};
use crate::path;
use async_trait::async_trait;
use std::fs::Metadata;
use std::io::{Error as IoError, Read};
use time::OffsetDateTime;
use tokio::fs;

/// Indexed filesystem backend.
#[derive(Debug, Default, Clone)]
pub struct IndexedBackend;

impl IndexedBackend {
    pub fn new() -> Self {
        Self
    }

    fn snapshot(path: &str, metadata: &Metadata) -> ItemInfo {
        let created = metadata
            .created()
            .map(OffsetDateTime::from)
            .unwrap_or(UNKNOWN_DATE);
        let mut info = if metadata.is_dir() {
            ItemInfo::folder(path, created)
        } else {
            ItemInfo::file(path, created)
        };
        let mut attributes = info.attributes;
        if metadata.permissions().readonly() {
            attributes = attributes | Attributes::READ_ONLY;
        }
        if info.name.starts_with('.') {
            attributes = attributes | Attributes::HIDDEN;
        }
        info.attributes = attributes;
        info
    }

    /// Resolve a creation target under the collision policy.
    ///
    /// Returns the free (or to-be-replaced) path, or `None` when the
    /// policy says to leave the existing item alone.
    pub(super) async fn creation_target(
        parent: &str,
        name: &str,
        policy: CollisionPolicy,
    ) -> Result<Option<String>> {
        let candidate = path::join(parent, name);
        let occupied = fs::try_exists(&candidate)
            .await
            .map_err(|e| map_io_error(e, &candidate))?;
        match (policy, occupied) {
            (_, false) => Ok(Some(candidate)),
            (CollisionPolicy::ReplaceExisting, true) => Ok(Some(candidate)),
            (CollisionPolicy::Skip, true) => Ok(None),
            (CollisionPolicy::FailIfExists, true) => {
                Err(exn::Exn::from(ErrorKind::AlreadyExists(candidate)))
            }
            (CollisionPolicy::GenerateUniqueName, true) => {
                for n in 2..u32::MAX {
                    let probe = path::join(parent, &path::unique_name(name, n));
                    let occupied = fs::try_exists(&probe)
                        .await
                        .map_err(|e| map_io_error(e, &probe))?;
                    if !occupied {
                        return Ok(Some(probe));
                    }
                }
                Err(exn::Exn::from(ErrorKind::AlreadyExists(candidate)))
            }
        }
    }

    async fn resolve_path(path: &str) -> Result<ItemInfo> {
        let metadata = fs::metadata(path).await.map_err(|e| map_io_error(e, path))?;
        Ok(Self::snapshot(path, &metadata))
    }
}

#[async_trait]
impl StorageBackend for IndexedBackend {
    fn name(&self) -> &'static str {
        "indexed"
    }

    fn claims(&self, _path: &str) -> bool {
        true
    }

    async fn resolve(&self, path: &str) -> Result<ItemInfo> {
        Self::resolve_path(path).await
    }

    async fn properties(&self, path: &str) -> Result<BasicProperties> {
        let metadata = fs::metadata(path).await.map_err(|e| map_io_error(e, path))?;
        let modified = metadata
            .modified()
            .map(OffsetDateTime::from)
            .unwrap_or(UNKNOWN_DATE);
        let size = if metadata.is_dir() { 0 } else { metadata.len() };
        Ok(BasicProperties::new(size, modified))
    }

    async fn list(&self, path: &str) -> Result<Vec<ItemInfo>> {
        let mut entries = fs::read_dir(path).await.map_err(|e| map_io_error(e, path))?;
        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
            let child = path::join(path, &entry.file_name().to_string_lossy());
            let metadata = entry.metadata().await.map_err(|e| map_io_error(e, &child))?;
            items.push(Self::snapshot(&child, &metadata));
        }
        Ok(items)
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
        let Some(target) = Self::creation_target(parent, name, policy).await? else {
            return Ok(None);
        };
        fs::write(&target, b"").await.map_err(|e| map_io_error(e, &target))?;
        tracing::debug!(path = %target, "created file");
        Ok(Some(Self::resolve_path(&target).await?))
    }

    async fn create_folder(&self, parent: &str, name: &str, policy: CollisionPolicy) -> Result<Option<ItemInfo>> {
        let Some(target) = Self::creation_target(parent, name, policy).await? else {
            return Ok(None);
        };
        if !fs::try_exists(&target).await.map_err(|e| map_io_error(e, &target))? {
            fs::create_dir(&target).await.map_err(|e| map_io_error(e, &target))?;
        }
        tracing::debug!(path = %target, "created folder");
        Ok(Some(Self::resolve_path(&target).await?))
    }

    async fn create_file_from_reader(
        &self,
        parent: &str,
        name: &str,
        reader: Box<dyn Read + Send>,
        policy: CollisionPolicy,
    ) -> Result<Option<ItemInfo>> {
        let Some(target) = Self::creation_target(parent, name, policy).await? else {
            return Ok(None);
        };
        let owned = target.clone();
        run_blocking(move || {
            let mut reader = reader;
            let mut file = std::fs::File::create(&owned).map_err(|e| map_io_error(e, &owned))?;
            std::io::copy(&mut reader, &mut file).map_err(|e| map_io_error(e, &owned))?;
            Ok(())
        })
        .await?;
        Ok(Some(Self::resolve_path(&target).await?))
    }

    async fn rename(&self, path: &str, new_name: &str, policy: CollisionPolicy) -> Result<ItemInfo> {
        let parent = path::parent(path)
            .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidPath(path.to_owned())))?;
        // Renames never skip; an occupied target under Skip is a failure.
        let policy = match policy {
            CollisionPolicy::Skip => CollisionPolicy::FailIfExists,
            other => other,
        };
        let target = Self::creation_target(parent, new_name, policy)
            .await?
            .ok_or_else(|| exn::Exn::from(ErrorKind::AlreadyExists(path::join(parent, new_name))))?;
        fs::rename(path, &target).await.map_err(|e| map_io_error(e, path))?;
        Self::resolve_path(&target).await
    }

    async fn move_item(&self, path: &str, dest_parent: &str, policy: CollisionPolicy) -> Result<ItemInfo> {
        let name = path::leaf(path).to_owned();
        let policy = match policy {
            CollisionPolicy::Skip => CollisionPolicy::FailIfExists,
            other => other,
        };
        let target = Self::creation_target(dest_parent, &name, policy)
            .await?
            .ok_or_else(|| exn::Exn::from(ErrorKind::AlreadyExists(path::join(dest_parent, &name))))?;
        fs::rename(path, &target).await.map_err(|e| map_io_error(e, path))?;
        Self::resolve_path(&target).await
    }

    async fn delete(&self, path: &str, mode: DeleteMode) -> Result<()> {
        match mode {
            DeleteMode::Trash => {
                let owned = path.to_owned();
                run_blocking(move || {
                    trash::delete(&owned)
                        .map_err(|e| exn::Exn::from(ErrorKind::Io(IoError::other(e))))
                })
                .await?;
            }
            DeleteMode::Permanent => {
                let metadata = fs::metadata(path).await.map_err(|e| map_io_error(e, path))?;
                if metadata.is_dir() {
                    fs::remove_dir_all(path).await.map_err(|e| map_io_error(e, path))?;
                } else {
                    fs::remove_file(path).await.map_err(|e| map_io_error(e, path))?;
                }
            }
        }
        tracing::debug!(path = %path, ?mode, "deleted item");
        Ok(())
    }
}
