//! Default-application association cache.
//!
//! The archive backend only claims `.zip` paths when this process is the
//! system's default handler for the extension. Probing the platform for
//! that association is slow, so the answer is cached per extension and the
//! probe itself is injectable (tests swap in a closure).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Probe asking the platform whether we are the default handler for an
/// extension (leading dot included).
pub type AssocProbe = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Read-through cache over a default-application probe.
#[derive(Clone)]
pub struct DefaultAppCache {
    probe: AssocProbe,
    cache: Arc<RwLock<HashMap<String, bool>>>,
}

impl DefaultAppCache {
    pub fn new(probe: AssocProbe) -> Self {
        Self { probe, cache: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Cache that answers yes for every extension. Standalone consumers
    /// with no surrounding application use this.
    pub fn assume_ours() -> Self {
        Self::new(Arc::new(|_| true))
    }

    /// Whether this process is the default handler for `extension`.
    /// The first call per extension runs the probe; later calls are hits.
    pub fn is_default_handler(&self, extension: &str) -> bool {
        let key = extension.to_ascii_lowercase();
        if let Ok(cache) = self.cache.read()
            && let Some(&hit) = cache.get(&key)
        {
            return hit;
        }
        let answer = (self.probe)(&key);
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, answer);
        }
        answer
    }

    /// Drop every cached answer, forcing fresh probes.
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }
}

impl std::fmt::Debug for DefaultAppCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultAppCache").finish_non_exhaustive()
    }
}
