//! Trust cache over a [`KeyAuthority`].
//!
//! Lookups run under a timeout. A successful lookup replaces whatever was
//! cached for the authority, so a key dropped from the directory stops being
//! trusted at the next refresh. A failed lookup falls back to the cached set
//! while it is younger than `max_staleness`; after that the authority is
//! untrusted until a lookup succeeds again.

use crate::authority::{KeyAuthority, TrustedKeySet};
use crate::error::DiscoveryError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tally_crypto::x25519::PublicKey;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Trust cache configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Upper bound on a single directory lookup
    pub lookup_timeout: Duration,
    /// Age after which a cached set is refreshed on access
    pub refresh_interval: Duration,
    /// Age after which a cached set is no longer trusted
    pub max_staleness: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_secs(5),
            refresh_interval: Duration::from_secs(3600),
            max_staleness: Duration::from_secs(24 * 3600),
        }
    }
}

impl DiscoveryConfig {
    /// Check that the durations are usable together
    ///
    /// # Errors
    ///
    /// Returns a description of the first inconsistent field.
    pub fn validate(&self) -> Result<(), String> {
        if self.lookup_timeout.is_zero() {
            return Err("lookup_timeout must be non-zero".into());
        }
        if self.refresh_interval.is_zero() {
            return Err("refresh_interval must be non-zero".into());
        }
        if self.max_staleness < self.refresh_interval {
            return Err("max_staleness must be at least refresh_interval".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct CachedSet {
    set: Arc<TrustedKeySet>,
    fetched_at: Instant,
}

/// Caches the most recent key set per authority
pub struct TrustCache<A> {
    source: A,
    config: DiscoveryConfig,
    sets: RwLock<HashMap<String, CachedSet>>,
}

impl<A: KeyAuthority> TrustCache<A> {
    /// Create an empty cache in front of `source`
    pub fn new(source: A, config: DiscoveryConfig) -> Self {
        Self {
            source,
            config,
            sets: RwLock::new(HashMap::new()),
        }
    }

    /// Underlying key authority
    pub fn source(&self) -> &A {
        &self.source
    }

    /// Cache configuration
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Look up `authority` now and update the cache
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Untrusted`] when the lookup fails and no
    /// cached set younger than `max_staleness` exists.
    pub async fn refresh(&self, authority: &str) -> Result<Arc<TrustedKeySet>, DiscoveryError> {
        let lookup = self.source.lookup(authority);
        let error = match tokio::time::timeout(self.config.lookup_timeout, lookup).await {
            Ok(Ok(set)) => {
                let set = Arc::new(set);
                tracing::info!(authority, keys = set.len(), "Refreshed trusted key set");
                self.sets.write().await.insert(
                    authority.to_string(),
                    CachedSet {
                        set: Arc::clone(&set),
                        fetched_at: Instant::now(),
                    },
                );
                return Ok(set);
            }
            Ok(Err(e)) => e,
            Err(_) => DiscoveryError::Timeout {
                authority: authority.to_string(),
                timeout: self.config.lookup_timeout,
            },
        };

        let mut sets = self.sets.write().await;
        if let Some(cached) = sets.get(authority) {
            let age = cached.fetched_at.elapsed();
            if age < self.config.max_staleness {
                tracing::warn!(
                    authority,
                    age_secs = age.as_secs(),
                    "Key lookup failed, using cached set: {}",
                    error
                );
                return Ok(Arc::clone(&cached.set));
            }
        }
        sets.remove(authority);
        tracing::warn!(authority, "Key lookup failed with no fresh set: {}", error);
        Err(DiscoveryError::Untrusted(authority.to_string()))
    }

    /// Cached set for `authority` if it is still within `max_staleness`
    ///
    /// Never touches the network.
    pub async fn trusted(&self, authority: &str) -> Option<Arc<TrustedKeySet>> {
        let sets = self.sets.read().await;
        sets.get(authority)
            .filter(|c| c.fetched_at.elapsed() < self.config.max_staleness)
            .map(|c| Arc::clone(&c.set))
    }

    /// Cached set if younger than `refresh_interval`, otherwise a refresh
    ///
    /// # Errors
    ///
    /// Same as [`TrustCache::refresh`].
    pub async fn get(&self, authority: &str) -> Result<Arc<TrustedKeySet>, DiscoveryError> {
        {
            let sets = self.sets.read().await;
            if let Some(cached) = sets.get(authority) {
                if cached.fetched_at.elapsed() < self.config.refresh_interval {
                    return Ok(Arc::clone(&cached.set));
                }
            }
        }
        self.refresh(authority).await
    }

    /// Returns true if `public_key` is in the fresh set for `authority`
    pub async fn is_trusted(&self, authority: &str, public_key: &PublicKey) -> bool {
        self.get(authority)
            .await
            .is_ok_and(|set| set.is_trusted(public_key))
    }

    /// Refresh every listed authority, returning how many failed
    pub async fn refresh_all(&self, authorities: &[String]) -> usize {
        let mut failures = 0;
        for authority in authorities {
            if self.refresh(authority).await.is_err() {
                failures += 1;
            }
        }
        failures
    }

    /// Drop the cached set for `authority`
    pub async fn forget(&self, authority: &str) {
        self.sets.write().await.remove(authority);
    }
}

impl<A: KeyAuthority + 'static> TrustCache<A> {
    /// Start a background task refreshing `authorities` every
    /// `refresh_interval`
    ///
    /// The task runs until the handle is aborted.
    pub fn spawn_refresher(self: Arc<Self>, authorities: Vec<String>) -> JoinHandle<()> {
        let period = self.config.refresh_interval;

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);

            loop {
                timer.tick().await;

                let failures = self.refresh_all(&authorities).await;
                if failures > 0 {
                    tracing::warn!(failures, "Periodic key refresh incomplete");
                }
            }
        })
    }
}

impl<A> std::fmt::Debug for TrustCache<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::StaticDirectory;
    use crate::record::DirectoryRecord;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tally_crypto::x25519::PrivateKey;

    const AUTHORITY: &str = "dsp.example";

    /// Directory that can be made to hang
    #[derive(Default)]
    struct FlakyDirectory {
        inner: StaticDirectory,
        hang: AtomicBool,
    }

    impl KeyAuthority for FlakyDirectory {
        async fn lookup(&self, authority: &str) -> Result<TrustedKeySet, DiscoveryError> {
            if self.hang.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.inner.lookup(authority).await
        }
    }

    fn key() -> PublicKey {
        PrivateKey::generate().unwrap().public_key()
    }

    async fn cache_with(keys: &[PublicKey]) -> TrustCache<FlakyDirectory> {
        let directory = FlakyDirectory::default();
        directory
            .inner
            .publish(AUTHORITY, keys.iter().map(|k| DirectoryRecord::new(*k).to_string()))
            .await;
        TrustCache::new(directory, DiscoveryConfig::default())
    }

    #[test]
    fn test_config_validation() {
        assert!(DiscoveryConfig::default().validate().is_ok());

        let config = DiscoveryConfig {
            max_staleness: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DiscoveryConfig {
            lookup_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_populates_cache() {
        let k = key();
        let cache = cache_with(&[k]).await;
        assert!(cache.trusted(AUTHORITY).await.is_none());

        cache.refresh(AUTHORITY).await.unwrap();
        assert!(cache.trusted(AUTHORITY).await.unwrap().is_trusted(&k));
        assert!(cache.is_trusted(AUTHORITY, &k).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_lookup_replaces_cached_set() {
        let old = key();
        let new = key();
        let cache = cache_with(&[old]).await;
        cache.refresh(AUTHORITY).await.unwrap();

        cache
            .source()
            .inner
            .publish(AUTHORITY, [DirectoryRecord::new(new).to_string()])
            .await;
        cache.refresh(AUTHORITY).await.unwrap();

        let set = cache.trusted(AUTHORITY).await.unwrap();
        assert!(set.is_trusted(&new));
        assert!(!set.is_trusted(&old));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_lookup_falls_back_to_fresh_cache() {
        let k = key();
        let cache = cache_with(&[k]).await;
        cache.refresh(AUTHORITY).await.unwrap();

        cache.source().inner.set_available(false);
        tokio::time::advance(Duration::from_secs(2 * 3600)).await;

        let set = cache.refresh(AUTHORITY).await.unwrap();
        assert!(set.is_trusted(&k));
    }

    #[tokio::test(start_paused = true)]
    async fn test_withdrawal_replaces_fresh_cache() {
        let k = key();
        let cache = cache_with(&[k]).await;
        cache.refresh(AUTHORITY).await.unwrap();

        cache.source().inner.withdraw(AUTHORITY).await;
        let set = cache.refresh(AUTHORITY).await.unwrap();
        assert!(set.is_empty());
        assert!(!cache.is_trusted(AUTHORITY, &k).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_lookup_with_stale_cache_is_untrusted() {
        let k = key();
        let cache = cache_with(&[k]).await;
        cache.refresh(AUTHORITY).await.unwrap();

        cache.source().inner.set_available(false);
        tokio::time::advance(Duration::from_secs(25 * 3600)).await;

        assert_eq!(
            cache.refresh(AUTHORITY).await.unwrap_err(),
            DiscoveryError::Untrusted(AUTHORITY.to_string())
        );
        assert!(cache.trusted(AUTHORITY).await.is_none());
        assert!(!cache.is_trusted(AUTHORITY, &k).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_timeout_falls_back() {
        let k = key();
        let cache = cache_with(&[k]).await;
        cache.refresh(AUTHORITY).await.unwrap();

        cache.source().hang.store(true, Ordering::SeqCst);
        let set = cache.refresh(AUTHORITY).await.unwrap();
        assert!(set.is_trusted(&k));

        cache.forget(AUTHORITY).await;
        assert!(matches!(
            cache.refresh(AUTHORITY).await,
            Err(DiscoveryError::Untrusted(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_uses_cache_within_refresh_interval() {
        let old = key();
        let new = key();
        let cache = cache_with(&[old]).await;
        cache.get(AUTHORITY).await.unwrap();

        cache
            .source()
            .inner
            .publish(AUTHORITY, [DirectoryRecord::new(new).to_string()])
            .await;

        // Still inside refresh_interval: served from cache
        assert!(cache.get(AUTHORITY).await.unwrap().is_trusted(&old));

        tokio::time::advance(Duration::from_secs(3601)).await;
        let set = cache.get(AUTHORITY).await.unwrap();
        assert!(set.is_trusted(&new));
        assert!(!set.is_trusted(&old));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_all_counts_failures() {
        let cache = cache_with(&[key()]).await;
        let authorities = vec![AUTHORITY.to_string(), "missing.example".to_string()];
        assert_eq!(cache.refresh_all(&authorities).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_refresher_picks_up_new_keys() {
        let old = key();
        let new = key();
        let cache = Arc::new(cache_with(&[old]).await);
        let handle = Arc::clone(&cache).spawn_refresher(vec![AUTHORITY.to_string()]);

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.trusted(AUTHORITY).await.unwrap().is_trusted(&old));

        cache
            .source()
            .inner
            .publish(AUTHORITY, [DirectoryRecord::new(new).to_string()])
            .await;
        tokio::time::sleep(Duration::from_secs(3601)).await;
        assert!(cache.trusted(AUTHORITY).await.unwrap().is_trusted(&new));

        handle.abort();
    }
}
