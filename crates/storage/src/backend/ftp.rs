//! FTP backend.
//!
//! Every operation opens its own control session, performs one job, and
//! quits; nothing is pooled, so a dropped handle never pins a connection.
//! Credentials come from the configured [`CredentialStore`] keyed by
//! `host:port`, falling back to the conventional anonymous login. The
//! blocking `suppaftp` client runs on the Tokio blocking pool.

use crate::backend::run_blocking;
use crate::backend::{BoxReadSeek, BoxWriteSeek, StorageBackend};
use crate::credentials::{Credentials, CredentialStoreHandle};
use crate::error::{Error, ErrorKind, Result};
use crate::item::{BasicProperties, CollisionPolicy, DeleteMode, ItemInfo, UNKNOWN_DATE};
use crate::path::{self, FtpLocation};
use async_trait::async_trait;
use std::io::{Error as IoError, Read, Write};
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Status};
use time::OffsetDateTime;
use tracing::instrument;

/// Map a client failure onto the storage taxonomy, attributing
/// file-unavailable responses to `path`.
#[track_caller]
fn map_ftp_error(err: FtpError, path: &str) -> Error {
    match err {
        FtpError::ConnectionError(e) => exn::Exn::from(ErrorKind::ConnectionFailed(e.to_string())),
        FtpError::UnexpectedResponse(ref response) if response.status == Status::FileUnavailable => {
            exn::Exn::from(ErrorKind::NotFound(path.to_owned()))
        }
        other => exn::Exn::from(ErrorKind::Io(IoError::other(other))),
    }
}

#[derive(Clone, Copy)]
enum TransferDirection {
    Retrieve,
    Store,
}

/// Owns the data channel together with its control session.
///
/// A transfer is complete only once the server's transfer-completion
/// reply has been read off the control channel. Uploads finalize during
/// the terminal flush, so a server-side failure surfaces to the writer;
/// downloads finalize on drop, after the data channel is drained.
struct FtpTransfer<S: Read + Write> {
    stream: Option<S>,
    session: FtpStream,
    direction: TransferDirection,
}

impl<S: Read + Write> FtpTransfer<S> {
    /// Close the data channel and read the completion reply. Idempotent;
    /// only the first call talks to the server.
    fn finalize(&mut self) -> std::io::Result<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        let finished = match self.direction {
            TransferDirection::Retrieve => self.session.finalize_retr_stream(stream),
            TransferDirection::Store => self.session.finalize_put_stream(stream),
        };
        finished.map_err(std::io::Error::other)?;
        let _ = self.session.quit();
        Ok(())
    }
}

impl<S: Read + Write> Read for FtpTransfer<S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.stream.as_mut() {
            Some(stream) => stream.read(buf),
            None => Ok(0),
        }
    }
}

impl<S: Read + Write> Write for FtpTransfer<S> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.stream.as_mut() {
            Some(stream) => stream.write(buf),
            None => Err(IoError::new(
                std::io::ErrorKind::BrokenPipe,
                "ftp transfer already finalized",
            )),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            stream.flush()?;
        }
        self.finalize()
    }
}

impl<S: Read + Write> Drop for FtpTransfer<S> {
    fn drop(&mut self) {
        if self.finalize().is_err() {
            tracing::debug!("ftp transfer dropped before the completion reply");
        }
    }
}

/// Backend for `ftp://` and `ftps://` locations.
pub struct FtpBackend {
    credentials: CredentialStoreHandle,
}

impl FtpBackend {
    pub fn new(credentials: CredentialStoreHandle) -> Self {
        Self { credentials }
    }

    /// Stored credentials for the location, or the anonymous login.
    async fn credentials_for(&self, location: &FtpLocation) -> Credentials {
        self.credentials
            .lookup(&location.host_key())
            .await
            .unwrap_or_else(Credentials::anonymous)
    }

    fn connect(location: &FtpLocation, credentials: &Credentials) -> Result<FtpStream> {
        let mut session = FtpStream::connect((location.host.as_str(), location.port))
            .map_err(|e| map_ftp_error(e, &location.host))?;
        session
            .login(&credentials.username, &credentials.password)
            .map_err(|_| exn::Exn::from(ErrorKind::PermissionDenied(location.host_key())))?;
        session
            .transfer_type(FileType::Binary)
            .map_err(|e| map_ftp_error(e, &location.host))?;
        Ok(session)
    }

    /// Convert one `LIST` line into an item snapshot under `base_url`.
    /// Unparseable lines and the dot entries yield `None`.
    fn listing_item(base_url: &str, line: &str) -> Option<ItemInfo> {
        let entry = suppaftp::list::File::try_from(line).ok()?;
        if entry.name() == "." || entry.name() == ".." {
            return None;
        }
        let item_path = path::join(base_url, entry.name());
        let modified = OffsetDateTime::from(entry.modified());
        let info = if entry.is_directory() {
            ItemInfo::folder(item_path, modified)
        } else {
            ItemInfo::file(item_path, modified)
        };
        Some(info)
    }

    /// Whether `remote` names an existing file, folder, or nothing.
    fn probe(session: &mut FtpStream, remote: &str) -> RemoteShape {
        if session.size(remote).is_ok() {
            return RemoteShape::File;
        }
        if session.cwd(remote).is_ok() {
            return RemoteShape::Folder;
        }
        RemoteShape::Missing
    }

    /// Decide the upload target under the collision policy.
    ///
    /// Mirrors the remote-creation contract: a collision under
    /// `FailIfExists` or `Skip` yields no target (and no error), and
    /// unique-name generation is not provided over FTP.
    fn creation_target(
        session: &mut FtpStream,
        base_url: &str,
        remote_parent: &str,
        name: &str,
        policy: CollisionPolicy,
    ) -> Result<Option<(String, String)>> {
        let remote = join_remote(remote_parent, name);
        let url = path::join(base_url, name);
        let occupied = !matches!(Self::probe(session, &remote), RemoteShape::Missing);
        match (policy, occupied) {
            (_, false) | (CollisionPolicy::ReplaceExisting, true) => Ok(Some((remote, url))),
            (CollisionPolicy::FailIfExists | CollisionPolicy::Skip, true) => Ok(None),
            (CollisionPolicy::GenerateUniqueName, true) => {
                Err(exn::Exn::from(ErrorKind::AlreadyExists(url)))
            }
        }
    }

    fn delete_recursive(session: &mut FtpStream, remote: &str) -> Result<()> {
        if session.rm(remote).is_ok() {
            return Ok(());
        }
        let lines = session.list(Some(remote)).map_err(|e| map_ftp_error(e, remote))?;
        for line in lines {
            let Ok(entry) = suppaftp::list::File::try_from(line.as_str()) else {
                continue;
            };
            if entry.name() == "." || entry.name() == ".." {
                continue;
            }
            Self::delete_recursive(session, &join_remote(remote, entry.name()))?;
        }
        session.rmdir(remote).map_err(|e| map_ftp_error(e, remote))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemoteShape {
    File,
    Folder,
    Missing,
}

fn join_remote(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}

#[async_trait]
impl StorageBackend for FtpBackend {
    fn name(&self) -> &'static str {
        "ftp"
    }

    fn claims(&self, path: &str) -> bool {
        path::is_ftp(path)
    }

    #[instrument(skip(self))]
    async fn resolve(&self, url: &str) -> Result<ItemInfo> {
        let location = path::parse_ftp(url)?;
        let credentials = self.credentials_for(&location).await;
        let owned_url = url.to_owned();
        run_blocking(move || {
            let mut session = Self::connect(&location, &credentials)?;
            let shape = Self::probe(&mut session, &location.path);
            let _ = session.quit();
            match shape {
                RemoteShape::File => Ok(ItemInfo::file(owned_url, UNKNOWN_DATE)),
                RemoteShape::Folder => Ok(ItemInfo::folder(owned_url, UNKNOWN_DATE)),
                RemoteShape::Missing => Err(exn::Exn::from(ErrorKind::NotFound(owned_url))),
            }
        })
        .await
    }

    async fn properties(&self, url: &str) -> Result<BasicProperties> {
        let location = path::parse_ftp(url)?;
        let credentials = self.credentials_for(&location).await;
        run_blocking(move || {
            let mut session = Self::connect(&location, &credentials)?;
            let size = session.size(&location.path).unwrap_or(0) as u64;
            // SIZE carries no dates; fish the entry out of the parent LIST.
            let name = path::leaf(&location.path).to_owned();
            let parent = path::parent(&location.path).unwrap_or("/").to_owned();
            let modified = session
                .list(Some(parent.as_str()))
                .ok()
                .and_then(|lines| {
                    lines.iter().find_map(|line| {
                        let entry = suppaftp::list::File::try_from(line.as_str()).ok()?;
                        (entry.name() == name).then(|| OffsetDateTime::from(entry.modified()))
                    })
                })
                .unwrap_or(UNKNOWN_DATE);
            let _ = session.quit();
            Ok(BasicProperties::new(size, modified))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list(&self, url: &str) -> Result<Vec<ItemInfo>> {
        let location = path::parse_ftp(url)?;
        let credentials = self.credentials_for(&location).await;
        let owned_url = url.trim_end_matches('/').to_owned();
        run_blocking(move || {
            let mut session = Self::connect(&location, &credentials)?;
            let lines = session
                .list(Some(location.path.as_str()))
                .map_err(|e| map_ftp_error(e, &owned_url))?;
            let _ = session.quit();
            Ok(lines
                .iter()
                .filter_map(|line| Self::listing_item(&owned_url, line))
                .collect())
        })
        .await
    }

    async fn open_read(&self, url: &str) -> Result<BoxReadSeek> {
        let location = path::parse_ftp(url)?;
        let credentials = self.credentials_for(&location).await;
        let owned_url = url.to_owned();
        run_blocking(move || {
            let mut session = Self::connect(&location, &credentials)?;
            let size = session
                .size(&location.path)
                .map_err(|e| map_ftp_error(e, &owned_url))? as u64;
            let stream = session
                .retr_as_stream(&location.path)
                .map_err(|e| map_ftp_error(e, &owned_url))?;
            let transfer = FtpTransfer {
                stream: Some(stream),
                session,
                direction: TransferDirection::Retrieve,
            };
            // The data channel is forward-only; the staging adapter gives
            // the caller random access over it.
            Ok(Box::new(quay_streams::StagedReader::with_len(transfer, size)) as BoxReadSeek)
        })
        .await
    }

    async fn open_write(&self, url: &str) -> Result<BoxWriteSeek> {
        let location = path::parse_ftp(url)?;
        let credentials = self.credentials_for(&location).await;
        let owned_url = url.to_owned();
        run_blocking(move || {
            let mut session = Self::connect(&location, &credentials)?;
            let stream = session
                .put_with_stream(&location.path)
                .map_err(|e| map_ftp_error(e, &owned_url))?;
            let transfer = FtpTransfer {
                stream: Some(stream),
                session,
                direction: TransferDirection::Store,
            };
            Ok(Box::new(quay_streams::SinkWriter::new(transfer)) as BoxWriteSeek)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn create_file(&self, parent: &str, name: &str, policy: CollisionPolicy) -> Result<Option<ItemInfo>> {
        let location = path::parse_ftp(parent)?;
        let credentials = self.credentials_for(&location).await;
        let base_url = parent.trim_end_matches('/').to_owned();
        let name = name.to_owned();
        run_blocking(move || {
            let mut session = Self::connect(&location, &credentials)?;
            let Some((remote, url)) =
                Self::creation_target(&mut session, &base_url, &location.path, &name, policy)?
            else {
                let _ = session.quit();
                return Ok(None);
            };
            let mut empty = std::io::Cursor::new(Vec::new());
            session.put_file(&remote, &mut empty).map_err(|e| map_ftp_error(e, &url))?;
            let _ = session.quit();
            Ok(Some(ItemInfo::file(url, UNKNOWN_DATE)))
        })
        .await
    }

    async fn create_folder(&self, parent: &str, name: &str, policy: CollisionPolicy) -> Result<Option<ItemInfo>> {
        let location = path::parse_ftp(parent)?;
        let credentials = self.credentials_for(&location).await;
        let base_url = parent.trim_end_matches('/').to_owned();
        let name = name.to_owned();
        run_blocking(move || {
            let mut session = Self::connect(&location, &credentials)?;
            let Some((remote, url)) =
                Self::creation_target(&mut session, &base_url, &location.path, &name, policy)?
            else {
                let _ = session.quit();
                return Ok(None);
            };
            session.mkdir(&remote).map_err(|e| map_ftp_error(e, &url))?;
            let _ = session.quit();
            Ok(Some(ItemInfo::folder(url, UNKNOWN_DATE)))
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
        let location = path::parse_ftp(parent)?;
        let credentials = self.credentials_for(&location).await;
        let base_url = parent.trim_end_matches('/').to_owned();
        let name = name.to_owned();
        run_blocking(move || {
            let mut session = Self::connect(&location, &credentials)?;
            let Some((remote, url)) =
                Self::creation_target(&mut session, &base_url, &location.path, &name, policy)?
            else {
                let _ = session.quit();
                return Ok(None);
            };
            let mut reader = reader;
            session.put_file(&remote, &mut reader).map_err(|e| map_ftp_error(e, &url))?;
            let _ = session.quit();
            Ok(Some(ItemInfo::file(url, UNKNOWN_DATE)))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn rename(&self, url: &str, new_name: &str, policy: CollisionPolicy) -> Result<ItemInfo> {
        let location = path::parse_ftp(url)?;
        let credentials = self.credentials_for(&location).await;
        let owned_url = url.to_owned();
        let new_name = new_name.to_owned();
        run_blocking(move || {
            let mut session = Self::connect(&location, &credentials)?;
            let remote_parent = path::parent(&location.path).unwrap_or("/").to_owned();
            let target = join_remote(&remote_parent, &new_name);
            let parent_url = path::parent(&owned_url)
                .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidPath(owned_url.clone())))?;
            let target_url = path::join(parent_url, &new_name);
            if policy != CollisionPolicy::ReplaceExisting
                && !matches!(Self::probe(&mut session, &target), RemoteShape::Missing)
            {
                let _ = session.quit();
                exn::bail!(ErrorKind::AlreadyExists(target_url));
            }
            let was_folder = matches!(Self::probe(&mut session, &location.path), RemoteShape::Folder);
            session
                .rename(&location.path, &target)
                .map_err(|e| map_ftp_error(e, &owned_url))?;
            let _ = session.quit();
            Ok(if was_folder {
                ItemInfo::folder(target_url, UNKNOWN_DATE)
            } else {
                ItemInfo::file(target_url, UNKNOWN_DATE)
            })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete(&self, url: &str, mode: DeleteMode) -> Result<()> {
        // FTP has no recycle facility; both modes remove outright.
        if mode == DeleteMode::Trash {
            tracing::debug!(url = %url, "ftp delete is always permanent");
        }
        let location = path::parse_ftp(url)?;
        let credentials = self.credentials_for(&location).await;
        run_blocking(move || {
            let mut session = Self::connect(&location, &credentials)?;
            let result = Self::delete_recursive(&mut session, &location.path);
            let _ = session.quit();
            result
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use std::sync::Arc;

    const UNIX_FILE: &str = "-rw-r--r--   1 user  group      7280 Mar 12 09:14 report.pdf";
    const UNIX_DIR: &str = "drwxr-xr-x   2 user  group      4096 Mar 12 09:14 uploads";
    const UNIX_DOT: &str = "drwxr-xr-x   2 user  group      4096 Mar 12 09:14 .";

    fn backend() -> FtpBackend {
        FtpBackend::new(Arc::new(MemoryCredentialStore::new()))
    }

    #[test]
    fn test_claims_only_ftp_urls() {
        let backend = backend();
        assert!(backend.claims("ftp://host/pub"));
        assert!(backend.claims("FTPS://host/pub"));
        assert!(!backend.claims("/local/path"));
        assert!(!backend.claims("shell:RecycleBinFolder"));
    }

    #[test]
    fn test_listing_line_to_file_item() {
        let info = FtpBackend::listing_item("ftp://host/pub", UNIX_FILE).unwrap();
        assert_eq!(info.name, "report.pdf");
        assert_eq!(info.path, "ftp://host/pub/report.pdf");
        assert!(!info.is_folder());
        assert_ne!(info.date_created, UNKNOWN_DATE);
    }

    #[test]
    fn test_listing_line_to_folder_item() {
        let info = FtpBackend::listing_item("ftp://host/pub", UNIX_DIR).unwrap();
        assert_eq!(info.name, "uploads");
        assert!(info.is_folder());
    }

    #[test]
    fn test_listing_skips_dot_entries_and_noise() {
        assert!(FtpBackend::listing_item("ftp://host/pub", UNIX_DOT).is_none());
        assert!(FtpBackend::listing_item("ftp://host/pub", "total 12").is_none());
    }

    #[test]
    fn test_join_remote_normalizes_slash() {
        assert_eq!(join_remote("/pub/", "a.txt"), "/pub/a.txt");
        assert_eq!(join_remote("/pub", "a.txt"), "/pub/a.txt");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_failure() {
        let backend = backend();
        // Nothing listens on this port; connect is refused immediately.
        let err = backend.resolve("ftp://127.0.0.1:1/file.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ConnectionFailed(_)));
        assert!(err.is_retryable());
    }
}
