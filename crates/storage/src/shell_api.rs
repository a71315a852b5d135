//! Shell namespace enumeration interface.
//!
//! The shell backend does not crawl the virtual namespace itself; it asks
//! an enumerator, typically backed by a privileged helper process that can
//! see recycle-bin hives and virtual folders. The trait keeps that wiring
//! out of this crate and lets tests substitute a canned namespace.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use time::OffsetDateTime;

/// One entry reported by the shell enumerator.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellEntry {
    /// Name in the namespace (for recycled items, the on-disk `$R...` name)
    pub name: String,
    pub is_folder: bool,
    /// On-disk path backing this entry, when one exists
    pub recycle_path: Option<String>,
    /// Path the item lived at before deletion (recycle-bin entries)
    pub original_path: Option<String>,
    pub date_deleted: Option<OffsetDateTime>,
    pub created: Option<OffsetDateTime>,
    pub size: Option<u64>,
    /// Human-readable type string from the namespace
    pub file_type: Option<String>,
    /// Resolution target, set when the entry is a link
    pub link_target: Option<String>,
}

impl ShellEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_folder: false,
            recycle_path: None,
            original_path: None,
            date_deleted: None,
            created: None,
            size: None,
            file_type: None,
            link_target: None,
        }
    }

    pub fn folder(name: impl Into<String>) -> Self {
        Self { is_folder: true, ..Self::file(name) }
    }
}

/// A page of shell entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShellFolderListing {
    pub entries: Vec<ShellEntry>,
    /// Total entry count in the folder, independent of the requested page
    pub total: usize,
}

/// Enumerates shell namespace folders.
#[async_trait]
pub trait ShellEnumerator: Send + Sync {
    /// List `count` entries of the folder at `path`, starting at `start`.
    /// `start == 0` with `count == usize::MAX` means the whole folder.
    async fn list_folder(&self, path: &str, start: usize, count: usize) -> Result<ShellFolderListing>;

    /// Look up a single entry by its namespace path.
    async fn item(&self, path: &str) -> Result<Option<ShellEntry>>;
}

/// Shared handle to a shell enumerator.
pub type ShellEnumeratorHandle = Arc<dyn ShellEnumerator>;
