//! Unified storage facade.
//!
//! One item-oriented surface over five kinds of storage location: the
//! plain filesystem, native special items (shortcuts and alternate data
//! streams), the shell virtual namespace, FTP servers, and ZIP archives
//! addressed as folders. Paths are dispatched to backends by shape;
//! callers work with [`facade::Entry`] handles and never learn which
//! backend served them.

pub mod assoc;
pub mod backend;
pub mod credentials;
pub mod error;
pub mod facade;
mod item;
mod path;
pub mod query;
pub mod shell_api;

pub use crate::backend::{BackendHandle, StorageBackend};
pub use crate::facade::{Entry, QueryResult, StorageFacade};
pub use crate::item::{
    Attributes, BasicProperties, CollisionPolicy, DeleteMode, ItemInfo, ItemKind, UNKNOWN_DATE,
};
pub use crate::path::{FtpLocation, parse_ftp, split_archive, unique_name};
pub use crate::query::{Filter, FolderDepth, QueryOptions, SortDirection, SortKey, SortSpec};
