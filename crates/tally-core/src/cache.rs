//! Transaction key cache
//!
//! Holds the symmetric key derived for each (authority, transaction id)
//! pair on the receiving side. A miss means the label cannot be opened and
//! is ignored. Keys are wiped when evicted or when the cache is dropped.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tally_crypto::aead::AeadKey;
use tokio::task::JoinHandle;

/// Transaction key cache configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a transaction key is kept after it was stored
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 24 * 3600), // 30 days
        }
    }
}

struct CachedKey {
    key: AeadKey,
    stored_at: Instant,
}

/// Concurrent map of transaction keys with expiry
pub struct LabelKeyCache {
    entries: DashMap<(String, String), CachedKey>,
    ttl: Duration,
}

impl LabelKeyCache {
    /// Create an empty cache
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: config.ttl,
        }
    }

    /// Store the key for a transaction, replacing any previous key
    pub fn store(&self, authority: &str, transaction_id: &str, key: AeadKey) {
        let entry = CachedKey {
            key,
            stored_at: Instant::now(),
        };
        let id = (authority.to_string(), transaction_id.to_string());
        self.entries.insert(id, entry);
    }

    /// Key for a transaction, if present and unexpired
    ///
    /// An expired entry found here is removed.
    #[must_use]
    pub fn lookup(&self, authority: &str, transaction_id: &str) -> Option<AeadKey> {
        let id = (authority.to_string(), transaction_id.to_string());
        {
            let entry = self.entries.get(&id)?;
            if !self.is_expired(&entry) {
                return Some(entry.key.clone());
            }
        }
        // A concurrent store may have replaced the entry since the check
        self.entries.remove_if(&id, |_, entry| self.is_expired(entry));
        None
    }

    /// Returns true if an unexpired key is held for the transaction
    #[must_use]
    pub fn contains(&self, authority: &str, transaction_id: &str) -> bool {
        self.lookup(authority, transaction_id).is_some()
    }

    /// Remove the key for a transaction, returning whether one was held
    pub fn evict(&self, authority: &str, transaction_id: &str) -> bool {
        self.entries
            .remove(&(authority.to_string(), transaction_id.to_string()))
            .is_some()
    }

    /// Remove every expired key, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_expired(entry));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            tracing::debug!(purged, "Purged expired transaction keys");
        }
        purged
    }

    /// Number of keys held, including expired ones not yet purged
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no keys are held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start a background task calling [`LabelKeyCache::purge_expired`]
    /// every `period`
    ///
    /// The task runs until the handle is aborted.
    pub fn spawn_purger(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);

            loop {
                timer.tick().await;
                self.purge_expired();
            }
        })
    }

    fn is_expired(&self, entry: &CachedKey) -> bool {
        entry.stored_at.elapsed() >= self.ttl
    }
}

impl Default for LabelKeyCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl std::fmt::Debug for LabelKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelKeyCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
