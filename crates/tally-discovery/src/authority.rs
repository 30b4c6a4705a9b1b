//! Key authorities and trusted key sets.
//!
//! A key authority answers "which public keys does this domain currently
//! publish?". The answer is a [`TrustedKeySet`]; any key outside the most
//! recent set is untrusted.

use crate::error::DiscoveryError;
use crate::record::{DirectoryRecord, record_name};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tally_crypto::constant_time::ct_contains;
use tally_crypto::x25519::PublicKey;
use tokio::sync::RwLock;

/// Maximum number of keys an authority may publish
pub const MAX_PUBLISHED_KEYS: usize = 5;

/// Source of published key records
pub trait KeyAuthority: Send + Sync {
    /// Fetch and parse the key set currently published by `authority`
    fn lookup(
        &self,
        authority: &str,
    ) -> impl Future<Output = Result<TrustedKeySet, DiscoveryError>> + Send;
}

/// Public keys published by one authority, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedKeySet {
    authority: String,
    keys: Vec<PublicKey>,
}

impl TrustedKeySet {
    /// Build a set from already-validated keys
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::TooManyKeys`] if more than
    /// [`MAX_PUBLISHED_KEYS`] keys are given.
    pub fn new(
        authority: impl Into<String>,
        keys: Vec<PublicKey>,
    ) -> Result<Self, DiscoveryError> {
        let authority = authority.into();
        if keys.len() > MAX_PUBLISHED_KEYS {
            return Err(DiscoveryError::TooManyKeys {
                authority,
                count: keys.len(),
                max: MAX_PUBLISHED_KEYS,
            });
        }
        Ok(Self { authority, keys })
    }

    /// Parse the raw directory records returned for `authority`
    ///
    /// Record order is preserved. A single malformed record rejects the
    /// whole set.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Parse`] for a malformed record and
    /// [`DiscoveryError::TooManyKeys`] for an oversized ring.
    pub fn from_records<S: AsRef<str>>(
        authority: impl Into<String>,
        records: &[S],
    ) -> Result<Self, DiscoveryError> {
        let authority = authority.into();
        if records.len() > MAX_PUBLISHED_KEYS {
            return Err(DiscoveryError::TooManyKeys {
                authority,
                count: records.len(),
                max: MAX_PUBLISHED_KEYS,
            });
        }
        let keys = records
            .iter()
            .map(|r| r.as_ref().parse::<DirectoryRecord>().map(|r| r.public_key))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { authority, keys })
    }

    /// Authority domain name
    #[must_use]
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Published keys, newest first
    #[must_use]
    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    /// Number of published keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the authority publishes no keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Constant-time membership test
    #[must_use]
    pub fn is_trusted(&self, public_key: &PublicKey) -> bool {
        let keys: Vec<[u8; 32]> = self.keys.iter().map(PublicKey::to_bytes).collect();
        ct_contains(&keys, public_key.as_bytes())
    }
}

/// In-memory directory of raw key records
///
/// Stands in for a DNS-backed authority in tooling and tests. Records are
/// stored unparsed so malformed publications surface at lookup time, the
/// same as they would from a live directory.
///
/// A withdrawn authority answers with an empty set. An authority that never
/// published, or any lookup while the directory is marked unavailable, is a
/// lookup failure.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    records: RwLock<HashMap<String, Vec<String>>>,
    unavailable: AtomicBool,
}

impl StaticDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the records published by `authority`
    pub async fn publish<I, S>(&self, authority: impl Into<String>, records: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let records = records.into_iter().map(Into::into).collect();
        self.records.write().await.insert(authority.into(), records);
    }

    /// Revoke every key published by `authority`
    ///
    /// Later lookups return an empty set, which replaces any cached one.
    pub async fn withdraw(&self, authority: &str) {
        self.publish(authority, std::iter::empty::<String>()).await;
    }

    /// Mark the directory reachable or unreachable
    ///
    /// While unreachable every lookup fails without touching the records.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }
}

impl KeyAuthority for StaticDirectory {
    async fn lookup(&self, authority: &str) -> Result<TrustedKeySet, DiscoveryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DiscoveryError::Lookup {
                authority: authority.to_string(),
                reason: "directory unavailable".into(),
            });
        }

        let records = self.records.read().await;
        let published = records
            .get(authority)
            .ok_or_else(|| DiscoveryError::Lookup {
                authority: authority.to_string(),
                reason: format!("no records at {}", record_name(authority)),
            })?;
        TrustedKeySet::from_records(authority, published)
    }
}
