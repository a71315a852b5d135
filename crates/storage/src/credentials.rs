//! FTP credential storage.
//!
//! The FTP backend looks credentials up by `host:port` key before each
//! session and falls back to the conventional anonymous login when the
//! store has nothing. The store itself is a trait so applications can wire
//! in a platform keychain; the in-memory implementation covers tests and
//! standalone use.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Login pair for one FTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }

    /// The conventional anonymous login.
    pub fn anonymous() -> Self {
        Self::new("anonymous", "anonymous")
    }
}

/// Source of stored FTP credentials, keyed by `host:port`.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn lookup(&self, host_key: &str) -> Option<Credentials>;
}

/// Shared handle to a credential store.
pub type CredentialStoreHandle = Arc<dyn CredentialStore>;

/// In-memory credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, host_key: impl Into<String>, credentials: Credentials) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(host_key.into(), credentials);
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn lookup(&self, host_key: &str) -> Option<Credentials> {
        self.entries.read().ok()?.get(host_key).cloned()
    }
}
