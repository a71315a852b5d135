//! Shell virtual-namespace backend.
//!
//! Serves `shell:` aliases, `::{CLSID}` identifiers, and recycle-bin
//! hives. Enumeration is delegated to a [`ShellEnumerator`]; this backend
//! classifies what comes back (recycled item, shortcut, or plain entry)
//! and surfaces the namespace metadata as item extras. The namespace is
//! read-only: every mutation is refused as unsupported.

use crate::backend::run_blocking;
use crate::backend::{BoxReadSeek, BoxWriteSeek, StorageBackend};
use crate::error::{ErrorKind, Result, map_io_error};
use crate::item::{Attributes, BasicProperties, CollisionPolicy, DeleteMode, ItemInfo, UNKNOWN_DATE};
use crate::path;
use crate::shell_api::{ShellEntry, ShellEnumerator, ShellEnumeratorHandle};
use async_trait::async_trait;
use time::format_description::well_known::Rfc3339;

/// How a shell entry presents itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShellItemClass {
    RecycleBinItem,
    Shortcut,
    Plain,
}

fn classify(entry: &ShellEntry) -> ShellItemClass {
    if entry.original_path.is_some() || entry.recycle_path.as_deref().is_some_and(|p| p.contains("$Recycle.Bin")) {
        ShellItemClass::RecycleBinItem
    } else if entry.link_target.is_some() {
        ShellItemClass::Shortcut
    } else {
        ShellItemClass::Plain
    }
}

/// Backend over the shell virtual namespace.
pub struct ShellBackend {
    enumerator: ShellEnumeratorHandle,
}

impl ShellBackend {
    pub fn new(enumerator: ShellEnumeratorHandle) -> Self {
        Self { enumerator }
    }

    fn entry_info(parent: &str, entry: &ShellEntry) -> ItemInfo {
        let item_path = path::join(parent, &entry.name);
        let created = entry.created.unwrap_or(UNKNOWN_DATE);
        let mut info = if entry.is_folder {
            ItemInfo::folder(item_path, created).with_attributes(Attributes::DIRECTORY | Attributes::READ_ONLY)
        } else {
            ItemInfo::file(item_path, created).with_attributes(Attributes::READ_ONLY)
        };
        match classify(entry) {
            ShellItemClass::RecycleBinItem => {
                // Recycled items show the name they had before deletion,
                // not the `$R...` mangled name on disk.
                if let Some(original) = &entry.original_path {
                    info = info.with_display_name(path::leaf(original)).with_extra("original_path", original);
                }
                if let Some(deleted) = entry.date_deleted
                    && let Ok(stamp) = deleted.format(&Rfc3339)
                {
                    info = info.with_extra("date_deleted", stamp);
                }
            }
            ShellItemClass::Shortcut => {
                if let Some(target) = &entry.link_target {
                    info = info.with_extra("link_target", target);
                }
            }
            ShellItemClass::Plain => {}
        }
        if let Some(backing) = &entry.recycle_path {
            info = info.with_extra("recycle_path", backing);
        }
        if let Some(file_type) = &entry.file_type {
            info = info.with_extra("file_type", file_type);
        }
        info
    }

    async fn entry(&self, path: &str) -> Result<ShellEntry> {
        self.enumerator
            .item(path)
            .await?
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.to_owned())))
    }

    fn unsupported<T>(&self, operation: &'static str) -> Result<T> {
        Err(exn::Exn::from(ErrorKind::Unsupported { backend: self.name(), operation }))
    }
}

#[async_trait]
impl StorageBackend for ShellBackend {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn claims(&self, path: &str) -> bool {
        path::is_shell(path)
    }

    async fn resolve(&self, path: &str) -> Result<ItemInfo> {
        let entry = self.entry(path).await?;
        let parent = path::parent(path).unwrap_or("");
        Ok(Self::entry_info(parent, &entry))
    }

    async fn properties(&self, path: &str) -> Result<BasicProperties> {
        let entry = self.entry(path).await?;
        let mut props = BasicProperties::new(entry.size.unwrap_or(0), entry.created.unwrap_or(UNKNOWN_DATE));
        // For recycled items the deletion time is the relevant one.
        if let Some(deleted) = entry.date_deleted {
            props.item_date = deleted;
        }
        Ok(props)
    }

    async fn list(&self, path: &str) -> Result<Vec<ItemInfo>> {
        self.list_range(path, 0, usize::MAX).await
    }

    /// The enumerator pages natively; pass the window through instead of
    /// slicing a full listing.
    async fn list_range(&self, path: &str, start: usize, count: usize) -> Result<Vec<ItemInfo>> {
        let listing = self.enumerator.list_folder(path, start, count).await?;
        Ok(listing.entries.iter().map(|e| Self::entry_info(path, e)).collect())
    }

    async fn open_read(&self, path: &str) -> Result<BoxReadSeek> {
        // Recycled items keep their bytes in a real backing file.
        let entry = self.entry(path).await?;
        let Some(backing) = entry.recycle_path else {
            return self.unsupported("open_read");
        };
        run_blocking(move || {
            let file = std::fs::File::open(&backing).map_err(|e| map_io_error(e, &backing))?;
            Ok(Box::new(file) as BoxReadSeek)
        })
        .await
    }

    async fn open_write(&self, _path: &str) -> Result<BoxWriteSeek> {
        self.unsupported("open_write")
    }

    async fn create_file(&self, _parent: &str, _name: &str, _policy: CollisionPolicy) -> Result<Option<ItemInfo>> {
        self.unsupported("create_file")
    }

    async fn create_folder(&self, _parent: &str, _name: &str, _policy: CollisionPolicy) -> Result<Option<ItemInfo>> {
        self.unsupported("create_folder")
    }

    async fn rename(&self, _path: &str, _new_name: &str, _policy: CollisionPolicy) -> Result<ItemInfo> {
        self.unsupported("rename")
    }

    async fn delete(&self, _path: &str, _mode: DeleteMode) -> Result<()> {
        self.unsupported("delete")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell_api::ShellFolderListing;
    use std::collections::HashMap;
    use std::sync::Arc;
    use time::OffsetDateTime;

    /// Canned namespace keyed by folder path.
    #[derive(Default)]
    struct MockEnumerator {
        folders: HashMap<String, Vec<ShellEntry>>,
    }

    #[async_trait]
    impl ShellEnumerator for MockEnumerator {
        async fn list_folder(&self, path: &str, start: usize, count: usize) -> Result<ShellFolderListing> {
            let entries = self
                .folders
                .get(path)
                .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.to_owned())))?;
            let page = entries.iter().skip(start).take(count).cloned().collect();
            Ok(ShellFolderListing { entries: page, total: entries.len() })
        }

        async fn item(&self, path: &str) -> Result<Option<ShellEntry>> {
            let name = crate::path::leaf(path);
            Ok(self
                .folders
                .values()
                .flatten()
                .find(|e| e.name == name)
                .cloned())
        }
    }

    fn recycled(name: &str, original: &str) -> ShellEntry {
        let mut entry = ShellEntry::file(name);
        entry.original_path = Some(original.to_owned());
        entry.recycle_path = Some(format!("C:\\$Recycle.Bin\\S-1-5-21\\{name}"));
        entry.date_deleted = Some(OffsetDateTime::UNIX_EPOCH + time::Duration::days(20_000));
        entry.size = Some(42);
        entry
    }

    fn bin_backend() -> ShellBackend {
        let mut mock = MockEnumerator::default();
        mock.folders.insert(
            "shell:RecycleBinFolder".to_owned(),
            vec![
                recycled("$R1A2B3C.txt", "C:\\Users\\u\\Documents\\notes.txt"),
                ShellEntry::folder("Virtual"),
                {
                    let mut link = ShellEntry::file("editor.lnk");
                    link.link_target = Some("C:\\Tools\\editor.exe".to_owned());
                    link
                },
            ],
        );
        ShellBackend::new(Arc::new(mock))
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify(&recycled("$R1.txt", "C:\\x\\a.txt")), ShellItemClass::RecycleBinItem);
        let mut link = ShellEntry::file("a.lnk");
        link.link_target = Some("C:\\x".to_owned());
        assert_eq!(classify(&link), ShellItemClass::Shortcut);
        assert_eq!(classify(&ShellEntry::folder("Virtual")), ShellItemClass::Plain);
    }

    #[tokio::test]
    async fn test_recycled_item_display_name_and_extras() {
        let backend = bin_backend();
        let items = backend.list("shell:RecycleBinFolder").await.unwrap();
        let bin_item = &items[0];
        assert_eq!(bin_item.name, "$R1A2B3C.txt");
        assert_eq!(bin_item.display_name, "notes.txt");
        let extra = bin_item.extra.as_ref().unwrap();
        assert_eq!(extra["original_path"], "C:\\Users\\u\\Documents\\notes.txt");
        assert!(extra.contains_key("date_deleted"));
        assert!(bin_item.attributes.contains(Attributes::READ_ONLY));
    }

    #[tokio::test]
    async fn test_shortcut_entry_carries_target() {
        let backend = bin_backend();
        let items = backend.list("shell:RecycleBinFolder").await.unwrap();
        let link = items.iter().find(|i| i.name == "editor.lnk").unwrap();
        assert_eq!(link.extra.as_ref().unwrap()["link_target"], "C:\\Tools\\editor.exe");
    }

    #[tokio::test]
    async fn test_paged_listing() {
        let backend = bin_backend();
        let page = backend.list_range("shell:RecycleBinFolder", 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "Virtual");
    }

    #[tokio::test]
    async fn test_mutations_are_unsupported() {
        let backend = bin_backend();
        let err = backend
            .create_file("shell:RecycleBinFolder", "x.txt", CollisionPolicy::FailIfExists)
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unsupported { backend: "shell", .. }));
        let err = backend.delete("shell:RecycleBinFolder\\Virtual", DeleteMode::Trash).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unsupported { .. }));
    }

    #[tokio::test]
    async fn test_properties_prefer_deletion_date() {
        let backend = bin_backend();
        let props = backend.properties("shell:RecycleBinFolder\\$R1A2B3C.txt").await.unwrap();
        assert_eq!(props.size, 42);
        assert_ne!(props.item_date, UNKNOWN_DATE);
    }
}
