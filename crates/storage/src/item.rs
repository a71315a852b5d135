//! Storage item models.
//!
//! These types describe items returned by backends: metadata snapshots for
//! listing and property queries, plus the option enums callers pass into
//! mutating operations.

use std::collections::HashMap;
use time::OffsetDateTime;

/// Timestamp reported when a backend cannot learn the real one.
///
/// Some backends (FTP listings without MDTM, synthetic archive directories)
/// have no creation date to offer. They report the Unix epoch instead of an
/// `Option` so every item carries a sortable date.
pub const UNKNOWN_DATE: OffsetDateTime = OffsetDateTime::UNIX_EPOCH;

/// Whether an item is a file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    File,
    Folder,
}

/// Item attribute flags, modelled as a bitset.
///
/// Only the attributes the backends can actually observe are defined; a
/// plain writable file is `NORMAL` (no bits set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attributes(u32);

impl Attributes {
    pub const NORMAL: Self = Self(0);
    pub const READ_ONLY: Self = Self(1);
    pub const DIRECTORY: Self = Self(1 << 1);
    pub const HIDDEN: Self = Self(1 << 2);

    /// Whether every bit of `other` is set on `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}
impl std::ops::BitOr for Attributes {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Metadata snapshot for one storage item.
///
/// This is what backends hand back from `resolve` and `list`. It describes
/// the item at the moment it was observed; it holds no live resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemInfo {
    /// Full path in the facade's address space (native path, `ftp://` URL,
    /// or archive container path joined with the inner entry path).
    pub path: String,
    /// Leaf name including any extension
    pub name: String,
    /// Name shown to users; usually equal to `name`, but shortcuts and
    /// recycle-bin items substitute their target or original name.
    pub display_name: String,
    pub kind: ItemKind,
    pub attributes: Attributes,
    /// Creation timestamp, or [`UNKNOWN_DATE`] when the backend has none
    pub date_created: OffsetDateTime,
    /// MIME type guessed from the extension (files only)
    pub content_type: String,
    /// Extension including the leading dot, empty for folders
    pub extension: String,
    /// Stable id of the item relative to its parent folder
    pub folder_relative_id: String,
    /// Backend-specific extras (shortcut targets, recycle-bin origin, ...)
    pub extra: Option<HashMap<String, String>>,
}

impl ItemInfo {
    /// Build a file snapshot, deriving name, extension, content type, and
    /// relative id from the path.
    pub fn file(path: impl Into<String>, date_created: OffsetDateTime) -> Self {
        let path = path.into();
        let name = crate::path::leaf(&path).to_owned();
        let extension = match name.rfind('.') {
            Some(idx) if idx > 0 => name[idx..].to_owned(),
            _ => String::new(),
        };
        let content_type = guess_content_type(&extension).to_owned();
        let folder_relative_id = format!("0\\{name}");
        Self {
            path,
            display_name: name.clone(),
            name,
            kind: ItemKind::File,
            attributes: Attributes::NORMAL,
            date_created,
            content_type,
            extension,
            folder_relative_id,
            extra: None,
        }
    }

    /// Build a folder snapshot. Folders carry no extension or content type.
    pub fn folder(path: impl Into<String>, date_created: OffsetDateTime) -> Self {
        let path = path.into();
        let name = crate::path::leaf(&path).to_owned();
        let folder_relative_id = format!("0\\{name}");
        Self {
            path,
            display_name: name.clone(),
            name,
            kind: ItemKind::Folder,
            attributes: Attributes::DIRECTORY,
            date_created,
            content_type: String::new(),
            extension: String::new(),
            folder_relative_id,
            extra: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Attach one backend-specific key/value pair.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }
}

/// Size and modification metadata, fetched separately from [`ItemInfo`]
/// because some backends need an extra round-trip for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicProperties {
    pub size: u64,
    pub date_modified: OffsetDateTime,
    /// Most relevant timestamp for display; falls back to `date_modified`
    pub item_date: OffsetDateTime,
}

impl BasicProperties {
    pub fn new(size: u64, date_modified: OffsetDateTime) -> Self {
        Self { size, date_modified, item_date: date_modified }
    }

    /// Properties for items whose backend reports nothing useful.
    pub fn unknown() -> Self {
        Self::new(0, UNKNOWN_DATE)
    }
}

/// What to do when a creation target already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Fail with `AlreadyExists`
    #[default]
    FailIfExists,
    /// Overwrite the existing item
    ReplaceExisting,
    /// Probe `name (2).ext`, `name (3).ext`, ... until a free slot is found
    GenerateUniqueName,
    /// Leave the existing item alone and report no item created
    Skip,
}

/// How thoroughly a delete should dispose of the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMode {
    /// Move to the platform trash when the backend supports it
    #[default]
    Trash,
    /// Remove outright
    Permanent,
}

/// Guess a MIME type from a file extension (leading dot included).
///
/// Covers the types the facade's consumers branch on; everything else is
/// the generic octet-stream.
pub fn guess_content_type(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        ".txt" | ".log" | ".md" => "text/plain",
        ".html" | ".htm" => "text/html",
        ".css" => "text/css",
        ".csv" => "text/csv",
        ".json" => "application/json",
        ".xml" => "application/xml",
        ".pdf" => "application/pdf",
        ".zip" => "application/zip",
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".gif" => "image/gif",
        ".bmp" => "image/bmp",
        ".svg" => "image/svg+xml",
        ".mp3" => "audio/mpeg",
        ".wav" => "audio/wav",
        ".mp4" => "video/mp4",
        ".mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_derives_metadata() {
        let info = ItemInfo::file("/home/user/report.pdf", UNKNOWN_DATE);
        assert_eq!(info.name, "report.pdf");
        assert_eq!(info.extension, ".pdf");
        assert_eq!(info.content_type, "application/pdf");
        assert_eq!(info.folder_relative_id, "0\\report.pdf");
        assert_eq!(info.kind, ItemKind::File);
    }

    #[test]
    fn test_dotfile_has_no_extension() {
        let info = ItemInfo::file("/home/user/.bashrc", UNKNOWN_DATE);
        assert_eq!(info.extension, "");
        assert_eq!(info.content_type, "application/octet-stream");
    }

    #[test]
    fn test_folder_attributes() {
        let info = ItemInfo::folder("/home/user/photos", UNKNOWN_DATE);
        assert!(info.attributes.contains(Attributes::DIRECTORY));
        assert!(info.is_folder());
        assert_eq!(info.extension, "");
    }

    #[test]
    fn test_attribute_bitset() {
        let attrs = Attributes::READ_ONLY | Attributes::HIDDEN;
        assert!(attrs.contains(Attributes::READ_ONLY));
        assert!(attrs.contains(Attributes::HIDDEN));
        assert!(!attrs.contains(Attributes::DIRECTORY));
        assert!(Attributes::NORMAL.contains(Attributes::NORMAL));
    }

    #[test]
    fn test_extra_accumulates() {
        let info = ItemInfo::file("a.lnk", UNKNOWN_DATE)
            .with_extra("link_target", "/usr/bin/editor")
            .with_extra("arguments", "--verbose");
        let extra = info.extra.unwrap();
        assert_eq!(extra.len(), 2);
        assert_eq!(extra["link_target"], "/usr/bin/editor");
    }
}
