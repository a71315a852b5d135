//! ZIP archive backend.
//!
//! Addresses entries inside a `.zip` container as if the container were a
//! folder. Reads inflate the entry into memory; every mutation is a
//! repack: the central directory is copied raw entry-by-entry into a new
//! archive in memory with the patch applied, the result is written to a
//! sibling temporary file, and an atomic rename swaps it in. The window
//! where a crash could lose the container is the rename alone.
//!
//! Folder entries inside an archive are frequently implicit (present only
//! as prefixes of entry names); listings synthesize them. Renaming or
//! deleting folders would mean rewriting every child entry and is
//! refused.

use crate::assoc::DefaultAppCache;
use crate::backend::run_blocking;
use crate::backend::{BoxReadSeek, BoxWriteSeek, StorageBackend};
use crate::error::{Error, ErrorKind, Result, map_io_error};
use crate::item::{BasicProperties, CollisionPolicy, DeleteMode, ItemInfo, UNKNOWN_DATE};
use crate::path;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::io::{Cursor, Read, Write};
use time::OffsetDateTime;
use tracing::instrument;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// One mutation applied during a repack.
enum Patch {
    /// Write `bytes` at `name`, replacing any existing entry
    Put { name: String, bytes: Vec<u8> },
    /// Add an explicit directory entry
    PutDir { name: String },
    /// Rename the file entry `from` to `to`, displacing any entry
    /// already stored at `to`
    Rename { from: String, to: String },
    /// Drop the file entry `name`
    Remove { name: String },
}

/// Metadata for one entry, read while the container is open.
#[derive(Debug, Clone)]
struct EntryRecord {
    /// Normalized name, forward slashes, no trailing slash
    name: String,
    is_dir: bool,
    size: u64,
    modified: OffsetDateTime,
}

fn map_zip_error(err: zip::result::ZipError, container: &str) -> Error {
    match err {
        zip::result::ZipError::FileNotFound => {
            exn::Exn::from(ErrorKind::NotFound(container.to_owned()))
        }
        zip::result::ZipError::Io(e) => map_io_error(e, container),
        other => exn::Exn::from(ErrorKind::InvalidData(format!("{container}: {other}"))),
    }
}

/// Archive entry names as stored may use either separator; everything in
/// this module works on the normalized form.
fn normalize(name: &str) -> String {
    name.replace('\\', "/").trim_matches('/').to_owned()
}

fn read_records(container: &str) -> Result<Vec<EntryRecord>> {
    let file = std::fs::File::open(container).map_err(|e| map_io_error(e, container))?;
    let mut archive = ZipArchive::new(file).map_err(|e| map_zip_error(e, container))?;
    let mut records = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index).map_err(|e| map_zip_error(e, container))?;
        let modified = entry
            .last_modified()
            .and_then(|stamp| stamp.to_time().ok())
            .unwrap_or(UNKNOWN_DATE);
        records.push(EntryRecord {
            name: normalize(entry.name()),
            is_dir: entry.is_dir(),
            size: entry.size(),
            modified,
        });
    }
    Ok(records)
}

/// Rewrite the container with `patch` applied.
///
/// Every surviving entry is copied raw (no inflate/deflate round-trip)
/// into an in-memory archive, which then replaces the container via a
/// sibling temp file and an atomic rename.
#[instrument(skip(patch))]
fn repack(container: &str, patch: &Patch) -> Result<()> {
    let file = std::fs::File::open(container).map_err(|e| map_io_error(e, container))?;
    let mut archive = ZipArchive::new(file).map_err(|e| map_zip_error(e, container))?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index).map_err(|e| map_zip_error(e, container))?;
        let name = normalize(entry.name());
        match patch {
            Patch::Put { name: target, .. } if name == *target => continue,
            Patch::Remove { name: target } if name == *target => continue,
            Patch::Rename { from, to } if name == *to && name != *from => continue,
            Patch::Rename { from, to } if name == *from => {
                writer
                    .raw_copy_file_rename(entry, to.as_str())
                    .map_err(|e| map_zip_error(e, container))?;
            }
            _ => {
                writer.raw_copy_file(entry).map_err(|e| map_zip_error(e, container))?;
            }
        }
    }
    match patch {
        Patch::Put { name, bytes } => {
            writer
                .start_file(name.as_str(), SimpleFileOptions::default())
                .map_err(|e| map_zip_error(e, container))?;
            writer.write_all(bytes).map_err(|e| map_io_error(e, container))?;
        }
        Patch::PutDir { name } => {
            writer
                .add_directory(name.as_str(), SimpleFileOptions::default())
                .map_err(|e| map_zip_error(e, container))?;
        }
        Patch::Rename { .. } | Patch::Remove { .. } => {}
    }
    let cursor = writer.finish().map_err(|e| map_zip_error(e, container))?;

    let parent = path::parent(container)
        .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidPath(container.to_owned())))?;
    let mut staged = tempfile::NamedTempFile::new_in(parent).map_err(|e| map_io_error(e, parent))?;
    staged
        .write_all(&cursor.into_inner())
        .map_err(|e| map_io_error(e, container))?;
    staged
        .persist(container)
        .map_err(|e| map_io_error(e.error, container))?;
    tracing::debug!(container = %container, "archive repacked");
    Ok(())
}

/// Write stream for one archive entry.
///
/// Bytes are buffered; the repack happens once, on flush. An unflushed
/// drop commits as a last resort so a caller that forgets the final
/// flush still gets its bytes into the container.
struct EntrySink {
    container: String,
    entry_name: String,
    buf: Vec<u8>,
    committed: bool,
}

impl EntrySink {
    fn commit(&mut self) -> std::io::Result<()> {
        self.committed = true;
        let patch = Patch::Put {
            name: self.entry_name.clone(),
            bytes: std::mem::take(&mut self.buf),
        };
        repack(&self.container, &patch).map_err(|e| std::io::Error::other(e.to_string()))
    }
}

impl Write for EntrySink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.commit()
    }
}

impl Drop for EntrySink {
    fn drop(&mut self) {
        if !self.committed {
            let _ = self.commit();
        }
    }
}

/// Backend serving paths that address into ZIP containers.
pub struct ArchiveBackend {
    assoc: DefaultAppCache,
}

impl ArchiveBackend {
    pub fn new(assoc: DefaultAppCache) -> Self {
        Self { assoc }
    }

    /// Record for the entry, honoring implicit directories: a name that
    /// only exists as a prefix of other entries is still a folder.
    fn find_record(records: &[EntryRecord], entry: &str) -> Option<EntryRecord> {
        if let Some(record) = records.iter().find(|r| r.name == entry) {
            return Some(record.clone());
        }
        let prefix = format!("{entry}/");
        records.iter().any(|r| r.name.starts_with(&prefix)).then(|| EntryRecord {
            name: entry.to_owned(),
            is_dir: true,
            size: 0,
            modified: UNKNOWN_DATE,
        })
    }

    /// Split an archive path, normalizing the entry part.
    fn address(archive_path: &str) -> Result<(String, String)> {
        let (container, entry) = path::split_archive(archive_path)
            .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidPath(archive_path.to_owned())))?;
        Ok((container.to_owned(), normalize(entry)))
    }

    fn record_info(folder_path: &str, record: &EntryRecord) -> ItemInfo {
        let name = record.name.rsplit('/').next().unwrap_or(&record.name);
        let item_path = path::join(folder_path, name);
        if record.is_dir {
            ItemInfo::folder(item_path, record.modified)
        } else {
            ItemInfo::file(item_path, record.modified)
        }
    }

    /// Entry names directly under `prefix`, as records: real file entries
    /// at that depth plus one synthesized folder per deeper prefix.
    fn children(records: &[EntryRecord], prefix: &str) -> Vec<EntryRecord> {
        let prefix_slash = if prefix.is_empty() { String::new() } else { format!("{prefix}/") };
        let mut files = Vec::new();
        let mut folders = BTreeSet::new();
        for record in records {
            let Some(rest) = record.name.strip_prefix(&prefix_slash) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                Some((head, _)) => {
                    folders.insert(head.to_owned());
                }
                None if record.is_dir => {
                    folders.insert(rest.to_owned());
                }
                None => files.push(record.clone()),
            }
        }
        let mut out: Vec<EntryRecord> = folders
            .into_iter()
            .map(|name| {
                let full = format!("{prefix_slash}{name}");
                records
                    .iter()
                    .find(|r| r.name == full && r.is_dir)
                    .cloned()
                    .unwrap_or(EntryRecord { name: full, is_dir: true, size: 0, modified: UNKNOWN_DATE })
            })
            .collect();
        out.extend(files);
        out
    }

    /// Pick the entry name to create under the collision policy, against
    /// the container's current records.
    fn creation_entry(
        records: &[EntryRecord],
        dir: &str,
        name: &str,
        policy: CollisionPolicy,
        archive_path: &str,
    ) -> Result<Option<String>> {
        let candidate = if dir.is_empty() { name.to_owned() } else { format!("{dir}/{name}") };
        let occupied = Self::find_record(records, &candidate).is_some();
        match (policy, occupied) {
            (_, false) | (CollisionPolicy::ReplaceExisting, true) => Ok(Some(candidate)),
            (CollisionPolicy::Skip, true) => Ok(None),
            (CollisionPolicy::FailIfExists, true) => {
                Err(exn::Exn::from(ErrorKind::AlreadyExists(path::join(archive_path, name))))
            }
            (CollisionPolicy::GenerateUniqueName, true) => {
                for n in 2..u32::MAX {
                    let probe_name = path::unique_name(name, n);
                    let probe = if dir.is_empty() {
                        probe_name.clone()
                    } else {
                        format!("{dir}/{probe_name}")
                    };
                    if Self::find_record(records, &probe).is_none() {
                        return Ok(Some(probe));
                    }
                }
                Err(exn::Exn::from(ErrorKind::AlreadyExists(path::join(archive_path, name))))
            }
        }
    }

    fn unsupported<T>(&self, operation: &'static str) -> Result<T> {
        Err(exn::Exn::from(ErrorKind::Unsupported { backend: "archive", operation }))
    }
}

#[async_trait]
impl StorageBackend for ArchiveBackend {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn claims(&self, archive_path: &str) -> bool {
        // Shape only; the dispatcher is the one that checks whether the
        // container is really a directory named `*.zip`.
        path::split_archive(archive_path).is_some() && self.assoc.is_default_handler(".zip")
    }

    async fn resolve(&self, archive_path: &str) -> Result<ItemInfo> {
        let (container, entry) = Self::address(archive_path)?;
        let owned = archive_path.trim_end_matches(['/', '\\']).to_owned();
        run_blocking(move || {
            let records = read_records(&container)?;
            if entry.is_empty() {
                return Ok(ItemInfo::folder(owned, UNKNOWN_DATE));
            }
            let record = Self::find_record(&records, &entry)
                .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(owned.clone())))?;
            let parent = path::parent(&owned).unwrap_or(container.as_str()).to_owned();
            Ok(Self::record_info(&parent, &record))
        })
        .await
    }

    async fn properties(&self, archive_path: &str) -> Result<BasicProperties> {
        let (container, entry) = Self::address(archive_path)?;
        let owned = archive_path.to_owned();
        run_blocking(move || {
            let records = read_records(&container)?;
            if entry.is_empty() {
                return Ok(BasicProperties::unknown());
            }
            let record = Self::find_record(&records, &entry)
                .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(owned)))?;
            Ok(BasicProperties::new(record.size, record.modified))
        })
        .await
    }

    async fn list(&self, archive_path: &str) -> Result<Vec<ItemInfo>> {
        let (container, entry) = Self::address(archive_path)?;
        let folder_path = archive_path.trim_end_matches(['/', '\\']).to_owned();
        run_blocking(move || {
            let records = read_records(&container)?;
            if !entry.is_empty() && Self::find_record(&records, &entry).is_none() {
                exn::bail!(ErrorKind::NotFound(folder_path));
            }
            Ok(Self::children(&records, &entry)
                .iter()
                .map(|record| Self::record_info(&folder_path, record))
                .collect())
        })
        .await
    }

    async fn open_read(&self, archive_path: &str) -> Result<BoxReadSeek> {
        let (container, entry) = Self::address(archive_path)?;
        let owned = archive_path.to_owned();
        run_blocking(move || {
            let file = std::fs::File::open(&container).map_err(|e| map_io_error(e, &container))?;
            let mut archive = ZipArchive::new(file).map_err(|e| map_zip_error(e, &container))?;
            // Entry names are matched on their normalized form.
            let index = (0..archive.len())
                .find(|&i| {
                    archive
                        .by_index_raw(i)
                        .map(|e| normalize(e.name()) == entry)
                        .unwrap_or(false)
                })
                .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(owned.clone())))?;
            let mut reader = archive.by_index(index).map_err(|e| map_zip_error(e, &container))?;
            let mut bytes = Vec::with_capacity(reader.size() as usize);
            reader.read_to_end(&mut bytes).map_err(|e| map_io_error(e, &owned))?;
            Ok(Box::new(Cursor::new(bytes)) as BoxReadSeek)
        })
        .await
    }

    async fn open_write(&self, archive_path: &str) -> Result<BoxWriteSeek> {
        let (container, entry) = Self::address(archive_path)?;
        if entry.is_empty() {
            return self.unsupported("open_write on the archive root");
        }
        let owned = archive_path.to_owned();
        run_blocking(move || {
            let records = read_records(&container)?;
            match Self::find_record(&records, &entry) {
                Some(record) if record.is_dir => {
                    Err(exn::Exn::from(ErrorKind::InvalidPath(owned)))
                }
                Some(_) => {
                    let sink = EntrySink {
                        container,
                        entry_name: entry,
                        buf: Vec::new(),
                        committed: false,
                    };
                    Ok(Box::new(quay_streams::SinkWriter::new(sink)) as BoxWriteSeek)
                }
                None => Err(exn::Exn::from(ErrorKind::NotFound(owned))),
            }
        })
        .await
    }

    #[instrument(skip(self))]
    async fn create_file(&self, parent: &str, name: &str, policy: CollisionPolicy) -> Result<Option<ItemInfo>> {
        let (container, dir) = Self::address(parent)?;
        let parent_path = parent.trim_end_matches(['/', '\\']).to_owned();
        let name = name.to_owned();
        run_blocking(move || {
            let records = read_records(&container)?;
            let Some(entry) = Self::creation_entry(&records, &dir, &name, policy, &parent_path)?
            else {
                return Ok(None);
            };
            repack(&container, &Patch::Put { name: entry.clone(), bytes: Vec::new() })?;
            let leaf = entry.rsplit('/').next().unwrap_or(&entry).to_owned();
            Ok(Some(ItemInfo::file(path::join(&parent_path, &leaf), UNKNOWN_DATE)))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn create_folder(&self, parent: &str, name: &str, policy: CollisionPolicy) -> Result<Option<ItemInfo>> {
        let (container, dir) = Self::address(parent)?;
        let parent_path = parent.trim_end_matches(['/', '\\']).to_owned();
        let name = name.to_owned();
        run_blocking(move || {
            let records = read_records(&container)?;
            let Some(entry) = Self::creation_entry(&records, &dir, &name, policy, &parent_path)?
            else {
                return Ok(None);
            };
            repack(&container, &Patch::PutDir { name: entry.clone() })?;
            let leaf = entry.rsplit('/').next().unwrap_or(&entry).to_owned();
            Ok(Some(ItemInfo::folder(path::join(&parent_path, &leaf), UNKNOWN_DATE)))
        })
        .await
    }

    async fn create_file_from_reader(
        &self,
        parent: &str,
        name: &str,
        reader: Box<dyn Read + Send>,
        policy: CollisionPolicy,
    ) -> Result<Option<ItemInfo>> {
        let (container, dir) = Self::address(parent)?;
        let parent_path = parent.trim_end_matches(['/', '\\']).to_owned();
        let name = name.to_owned();
        run_blocking(move || {
            let records = read_records(&container)?;
            let Some(entry) = Self::creation_entry(&records, &dir, &name, policy, &parent_path)?
            else {
                return Ok(None);
            };
            let mut reader = reader;
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes).map_err(|e| map_io_error(e, &parent_path))?;
            repack(&container, &Patch::Put { name: entry.clone(), bytes })?;
            let leaf = entry.rsplit('/').next().unwrap_or(&entry).to_owned();
            Ok(Some(ItemInfo::file(path::join(&parent_path, &leaf), UNKNOWN_DATE)))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn rename(&self, archive_path: &str, new_name: &str, policy: CollisionPolicy) -> Result<ItemInfo> {
        let (container, entry) = Self::address(archive_path)?;
        if entry.is_empty() {
            return self.unsupported("rename of the archive root");
        }
        let owned = archive_path.to_owned();
        let new_name = new_name.to_owned();
        run_blocking(move || {
            let records = read_records(&container)?;
            let record = Self::find_record(&records, &entry)
                .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(owned.clone())))?;
            if record.is_dir {
                // Would require rewriting every child entry name.
                exn::bail!(ErrorKind::Unsupported { backend: "archive", operation: "rename folder" });
            }
            let dir = match entry.rsplit_once('/') {
                Some((dir, _)) => dir.to_owned(),
                None => String::new(),
            };
            let target = if dir.is_empty() { new_name.clone() } else { format!("{dir}/{new_name}") };
            let parent_path = path::parent(&owned)
                .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidPath(owned.clone())))?
                .to_owned();
            if Self::find_record(&records, &target).is_some()
                && policy != CollisionPolicy::ReplaceExisting
            {
                exn::bail!(ErrorKind::AlreadyExists(path::join(&parent_path, &new_name)));
            }
            // The rename and any displacement land in the same repack, so
            // a failure at any point leaves the container as it was.
            repack(&container, &Patch::Rename { from: entry, to: target })?;
            Ok(ItemInfo::file(path::join(&parent_path, &new_name), record.modified))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete(&self, archive_path: &str, _mode: DeleteMode) -> Result<()> {
        // Entries have no trash to go to; both modes remove from the
        // container.
        let (container, entry) = Self::address(archive_path)?;
        if entry.is_empty() {
            return self.unsupported("delete of the archive root");
        }
        let owned = archive_path.to_owned();
        run_blocking(move || {
            let records = read_records(&container)?;
            let record = Self::find_record(&records, &entry)
                .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(owned)))?;
            if record.is_dir {
                exn::bail!(ErrorKind::Unsupported { backend: "archive", operation: "delete folder" });
            }
            repack(&container, &Patch::Remove { name: entry })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemKind;
    use std::io::{Seek, SeekFrom, Write as _};

    /// Build a container on disk with the given `(name, content)` file
    /// entries. Directory entries stay implicit, as most zip tools leave
    /// them.
    fn fixture(dir: &tempfile::TempDir, entries: &[(&str, &str)]) -> String {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        let bytes = writer.finish().unwrap().into_inner();
        let container = crate::path::join(&dir.path().to_string_lossy(), "pack.zip");
        std::fs::write(&container, bytes).unwrap();
        container
    }

    fn backend() -> ArchiveBackend {
        ArchiveBackend::new(DefaultAppCache::assume_ours())
    }

    fn entry_names(container: &str) -> Vec<String> {
        read_records(container).unwrap().into_iter().map(|r| r.name).collect()
    }

    #[tokio::test]
    async fn test_claims_respects_shape_and_association() {
        let dir = tempfile::tempdir().unwrap();
        let container = fixture(&dir, &[("a.txt", "x")]);
        let inner = format!("{container}/a.txt");

        let backend = backend();
        assert!(backend.claims(&inner));
        assert!(!backend.claims(&container), "bare container is a file, not an archive address");
        assert!(!backend.claims("/plain/file.txt"));

        let foreign = ArchiveBackend::new(DefaultAppCache::new(std::sync::Arc::new(|_| false)));
        assert!(!foreign.claims(&inner), "not the default handler");
    }

    #[tokio::test]
    async fn test_claims_is_shape_only() {
        // No filesystem access in a claim: a missing container and a
        // directory named like one both match on shape alone.
        let backend = backend();
        assert!(backend.claims("/nowhere/absent.zip/file.txt"));
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("data.zip");
        std::fs::create_dir(&fake).unwrap();
        assert!(backend.claims(&format!("{}/inside.txt", fake.to_string_lossy())));
    }

    #[tokio::test]
    async fn test_list_groups_and_synthesizes_folders() {
        let dir = tempfile::tempdir().unwrap();
        let container = fixture(
            &dir,
            &[
                ("readme.md", "hello"),
                ("docs/guide.md", "guide"),
                ("docs/api/index.md", "api"),
            ],
        );
        let backend = backend();

        let root = backend.list(&format!("{container}/")).await.unwrap();
        let names: Vec<_> = root.iter().map(|i| (i.name.as_str(), i.kind)).collect();
        assert_eq!(names, [("docs", ItemKind::Folder), ("readme.md", ItemKind::File)]);

        let docs = backend.list(&format!("{container}/docs")).await.unwrap();
        let names: Vec<_> = docs.iter().map(|i| (i.name.as_str(), i.kind)).collect();
        assert_eq!(names, [("api", ItemKind::Folder), ("guide.md", ItemKind::File)]);
    }

    #[tokio::test]
    async fn test_resolve_implicit_folder_and_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let container = fixture(&dir, &[("docs/guide.md", "guide")]);
        let backend = backend();

        let folder = backend.resolve(&format!("{container}/docs")).await.unwrap();
        assert!(folder.is_folder());

        let err = backend.resolve(&format!("{container}/ghost.md")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_entry_match_is_case_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let container = fixture(&dir, &[("Readme.md", "x")]);
        let backend = backend();
        assert!(backend.resolve(&format!("{container}/Readme.md")).await.is_ok());
        assert!(backend.resolve(&format!("{container}/readme.md")).await.is_err());
    }

    #[tokio::test]
    async fn test_open_read_inflates_entry() {
        let dir = tempfile::tempdir().unwrap();
        let container = fixture(&dir, &[("docs/guide.md", "guide body")]);
        let backend = backend();
        let mut reader = backend.open_read(&format!("{container}/docs/guide.md")).await.unwrap();
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "guide body");
        // Inflated content supports random access.
        reader.seek(SeekFrom::Start(6)).unwrap();
        buf.clear();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "body");
    }

    #[tokio::test]
    async fn test_create_file_repacks_and_preserves_others() {
        let dir = tempfile::tempdir().unwrap();
        let container = fixture(&dir, &[("keep.txt", "keep me")]);
        let backend = backend();
        let created = backend
            .create_file(&format!("{container}/"), "new.txt", CollisionPolicy::FailIfExists)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.name, "new.txt");

        let mut names = entry_names(&container);
        names.sort();
        assert_eq!(names, ["keep.txt", "new.txt"]);
        let mut reader = backend.open_read(&format!("{container}/keep.txt")).await.unwrap();
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "keep me");
    }

    #[tokio::test]
    async fn test_create_collision_policies() {
        let dir = tempfile::tempdir().unwrap();
        let container = fixture(&dir, &[("a.txt", "x")]);
        let backend = backend();
        let root = format!("{container}/");

        let err = backend.create_file(&root, "a.txt", CollisionPolicy::FailIfExists).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));

        assert!(backend.create_file(&root, "a.txt", CollisionPolicy::Skip).await.unwrap().is_none());

        let unique = backend
            .create_file(&root, "a.txt", CollisionPolicy::GenerateUniqueName)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unique.name, "a (2).txt");
    }

    #[tokio::test]
    async fn test_write_entry_visible_after_flush() {
        let dir = tempfile::tempdir().unwrap();
        let container = fixture(&dir, &[("notes.txt", "old")]);
        let backend = backend();
        let target = format!("{container}/notes.txt");

        let mut writer = backend.open_write(&target).await.unwrap();
        writer.write_all(b"fresh content").unwrap();
        writer.flush().unwrap();
        drop(writer);

        let mut reader = backend.open_read(&target).await.unwrap();
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "fresh content");
    }

    #[tokio::test]
    async fn test_created_folder_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let container = fixture(&dir, &[("a.txt", "x")]);
        let backend = backend();
        let created = backend
            .create_folder(&format!("{container}/"), "sub", CollisionPolicy::FailIfExists)
            .await
            .unwrap()
            .unwrap();
        assert!(created.is_folder());
        assert!(backend.resolve(&created.path).await.unwrap().is_folder());
        assert!(backend.list(&created.path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_file_and_refuse_folder() {
        let dir = tempfile::tempdir().unwrap();
        let container = fixture(&dir, &[("docs/guide.md", "guide"), ("docs/old.md", "old")]);
        let backend = backend();

        let renamed = backend
            .rename(&format!("{container}/docs/old.md"), "new.md", CollisionPolicy::FailIfExists)
            .await
            .unwrap();
        assert_eq!(renamed.name, "new.md");
        assert!(entry_names(&container).contains(&"docs/new.md".to_owned()));

        let err = backend
            .rename(&format!("{container}/docs"), "papers", CollisionPolicy::FailIfExists)
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unsupported { .. }));
    }

    #[tokio::test]
    async fn test_rename_replace_existing_displaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let container = fixture(&dir, &[("a.txt", "alpha"), ("b.txt", "beta")]);
        let backend = backend();

        let renamed = backend
            .rename(&format!("{container}/a.txt"), "b.txt", CollisionPolicy::ReplaceExisting)
            .await
            .unwrap();
        assert_eq!(renamed.name, "b.txt");
        assert_eq!(entry_names(&container), ["b.txt"]);

        let mut reader = backend.open_read(&format!("{container}/b.txt")).await.unwrap();
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "alpha");
    }

    #[tokio::test]
    async fn test_rename_to_own_name_keeps_entry() {
        let dir = tempfile::tempdir().unwrap();
        let container = fixture(&dir, &[("a.txt", "alpha")]);
        let backend = backend();
        backend
            .rename(&format!("{container}/a.txt"), "a.txt", CollisionPolicy::ReplaceExisting)
            .await
            .unwrap();
        assert_eq!(entry_names(&container), ["a.txt"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_displacing_rename_leaves_both_entries() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let container = fixture(&dir, &[("a.txt", "alpha"), ("b.txt", "beta")]);
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o555)).unwrap();

        let backend = backend();
        let result = backend
            .rename(&format!("{container}/a.txt"), "b.txt", CollisionPolicy::ReplaceExisting)
            .await;
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(result.is_err());
        let mut names = entry_names(&container);
        names.sort();
        assert_eq!(names, ["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_delete_entry_and_refuse_folder() {
        let dir = tempfile::tempdir().unwrap();
        let container = fixture(&dir, &[("docs/guide.md", "guide"), ("docs/old.md", "old")]);
        let backend = backend();

        backend.delete(&format!("{container}/docs/old.md"), DeleteMode::Permanent).await.unwrap();
        assert_eq!(entry_names(&container), ["docs/guide.md"]);

        let err = backend.delete(&format!("{container}/docs"), DeleteMode::Permanent).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unsupported { .. }));

        let err = backend.delete(&format!("{container}/docs/old.md"), DeleteMode::Permanent).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_repack_leaves_container_intact() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let container = fixture(&dir, &[("a.txt", "x")]);
        // A read-only parent directory makes the staged temp file fail,
        // before the container is ever touched.
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o555)).unwrap();

        let backend = backend();
        let result = backend
            .create_file(&format!("{container}/"), "new.txt", CollisionPolicy::FailIfExists)
            .await;
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(result.is_err());
        assert_eq!(entry_names(&container), ["a.txt"]);
    }
}
