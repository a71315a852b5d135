//! Path classification and manipulation.
//!
//! The facade addresses every backend through one string path space:
//! native filesystem paths (either separator style), `ftp://` URLs, shell
//! namespace identifiers, and archive paths formed by joining a `.zip`
//! container path with an entry path. The helpers here classify a path
//! into that space and slice it apart without touching any backend.

use crate::error::{Error, ErrorKind, Result};

/// Shell namespace GUID prefix (`::{CLSID}` paths).
const SHELL_GUID_PREFIX: &str = "::{";
/// Marker that a path addresses into a ZIP container.
const ARCHIVE_MARKER: &str = ".zip";

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Last path segment, ignoring trailing separators.
///
/// Returns the whole string when it has a single segment, and `""` only
/// for an empty or all-separator input.
pub fn leaf(path: &str) -> &str {
    let trimmed = path.trim_end_matches(is_separator);
    match trimmed.rfind(is_separator) {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Everything before the leaf, without its trailing separator.
///
/// Returns `None` when the path has no parent (single segment or root).
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches(is_separator);
    let idx = trimmed.rfind(is_separator)?;
    let head = trimmed[..idx].trim_end_matches(is_separator);
    if head.is_empty() {
        // Keep the root itself ("/x" parents to "/").
        Some(&trimmed[..=idx])
    } else {
        Some(head)
    }
}

/// Join a child name onto a base path, reusing the base's separator style.
pub fn join(base: &str, name: &str) -> String {
    let sep = if base.contains('\\') { '\\' } else { '/' };
    let base = base.trim_end_matches(is_separator);
    format!("{base}{sep}{name}")
}

/// Split an archive path into `(container, entry)`.
///
/// A path addresses into an archive when a `.zip` component is followed by
/// a separator; the remainder after the separator is the entry path inside
/// the container (empty for the archive root). A path that merely *ends*
/// in `.zip` is the container file itself, not an archive address, and
/// yields `None`.
pub fn split_archive(path: &str) -> Option<(&str, &str)> {
    let lower = path.to_ascii_lowercase();
    let mut search = 0;
    while let Some(rel) = lower[search..].find(ARCHIVE_MARKER) {
        let end = search + rel + ARCHIVE_MARKER.len();
        match path[end..].chars().next() {
            Some(c) if is_separator(c) => {
                let entry = path[end + 1..].trim_matches(is_separator);
                return Some((&path[..end], entry));
            }
            _ => search = end,
        }
    }
    None
}

/// Whether a path addresses the shell virtual namespace.
///
/// Covers `shell:` aliases, raw `::{CLSID}` identifiers, and anything
/// under a `$Recycle.Bin` hive.
pub fn is_shell(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.starts_with("shell:") || path.starts_with(SHELL_GUID_PREFIX) || lower.contains("$recycle.bin")
}

/// Whether a path is an FTP URL.
pub fn is_ftp(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.starts_with("ftp://") || lower.starts_with("ftps://")
}

/// A parsed FTP URL: host, port, and the path on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpLocation {
    pub host: String,
    pub port: u16,
    /// Absolute path on the server, always starting with `/`
    pub path: String,
}

impl FtpLocation {
    /// Key used to look up credentials for this server.
    pub fn host_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse an `ftp://host[:port]/path` URL.
pub fn parse_ftp(url: &str) -> Result<FtpLocation> {
    let lower = url.to_ascii_lowercase();
    let rest = if let Some(rest) = lower.strip_prefix("ftp://") {
        &url[url.len() - rest.len()..]
    } else if let Some(rest) = lower.strip_prefix("ftps://") {
        &url[url.len() - rest.len()..]
    } else {
        return Err(Error::from(ErrorKind::InvalidPath(url.to_owned())));
    };
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    };
    if authority.is_empty() {
        return Err(Error::from(ErrorKind::InvalidPath(url.to_owned())));
    }
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| Error::from(ErrorKind::InvalidPath(url.to_owned())))?;
            (host, port)
        }
        None => (authority, 21),
    };
    Ok(FtpLocation {
        host: host.to_owned(),
        port,
        path: path.to_owned(),
    })
}

/// Split a native path carrying an alternate data stream suffix into
/// `(file, stream)`. The colon must sit inside the leaf segment with word
/// characters on both sides, so drive prefixes (`C:\`) never match.
pub fn split_stream(path: &str) -> Option<(&str, &str)> {
    let name = leaf(path);
    let colon = name.find(':')?;
    let before = name[..colon].chars().next_back()?;
    let after = name[colon + 1..].chars().next()?;
    if !(before.is_alphanumeric() || before == '_') || !(after.is_alphanumeric() || after == '_') {
        return None;
    }
    let split_at = path.len() - name.len() + colon;
    Some((&path[..split_at], &path[split_at + 1..]))
}

/// Whether a path needs the native backend's special handling: shortcut
/// files (`.lnk`/`.url`) or alternate data stream addresses. Shell and
/// FTP identifiers also contain colons and are excluded up front.
pub fn is_native_special(path: &str) -> bool {
    if is_shell(path) || is_ftp(path) {
        return false;
    }
    let lower = leaf(path).to_ascii_lowercase();
    lower.ends_with(".lnk") || lower.ends_with(".url") || split_stream(path).is_some()
}

/// `name (n).ext` candidate for unique-name probing.
pub fn unique_name(name: &str, n: u32) -> String {
    match name.rfind('.') {
        Some(idx) if idx > 0 => format!("{} ({}){}", &name[..idx], n, &name[idx..]),
        _ => format!("{name} ({n})"),
    }
}
