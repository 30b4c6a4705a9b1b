//! Local key lifecycle
//!
//! An [`Identity`] is an authority name plus a newest-first ring of at most
//! [`MAX_RING_SIZE`] X25519 key pairs. The first pair is the current key and
//! is used for every new campaign; older pairs stay in the ring (and in the
//! published directory) so campaigns established against them keep working
//! until they are rotated out.
//!
//! # Example
//!
//! ```
//! use tally_core::keystore::KeyStore;
//!
//! let store = KeyStore::default();
//! let identity = store.initialize("dsp.example").unwrap();
//! assert_eq!(identity.key_ring().len(), 5);
//!
//! let rotated = store.rotate(&identity).unwrap();
//! assert_eq!(rotated.key_ring()[1].public_key(), identity.current().public_key());
//! ```

use crate::error::{CoreError, Result};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use tally_crypto::CryptoError;
use tally_crypto::constant_time::ct_eq;
use tally_crypto::x25519::{PrivateKey, PublicKey};
use tally_discovery::{DirectoryRecord, MAX_PUBLISHED_KEYS};
use zeroize::Zeroizing;

/// Maximum number of key pairs in a ring
pub const MAX_RING_SIZE: usize = MAX_PUBLISHED_KEYS;

/// Recommended minimum time a key stays in the ring (180 days)
pub const DEFAULT_MIN_KEY_LIFETIME: Duration = Duration::from_secs(180 * 24 * 3600);

/// X25519 key pair with its creation time
#[derive(Clone)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
    created_at: SystemTime,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS random source
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Entropy` if the random source is unavailable.
    pub fn generate() -> Result<Self> {
        Ok(Self::from_private(PrivateKey::generate()?, SystemTime::now()))
    }

    /// Wrap an existing private key
    #[must_use]
    pub fn from_private(private: PrivateKey, created_at: SystemTime) -> Self {
        let public = private.public_key();
        Self {
            private,
            public,
            created_at,
        }
    }

    /// Import a private key from hex, as written by [`KeyPair::export_private_hex`]
    ///
    /// The creation time is set to now.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidEncoding` for bad hex and
    /// `CryptoError::InvalidKeyLength` for anything but 32 bytes.
    pub fn from_private_hex(text: &str) -> Result<Self> {
        let bytes =
            Zeroizing::new(hex::decode(text.trim()).map_err(|_| CryptoError::InvalidEncoding)?);
        let private = PrivateKey::from_slice(&bytes)?;
        Ok(Self::from_private(private, SystemTime::now()))
    }

    /// Export the private key as hex for a configuration file
    ///
    /// This is the only way private bytes leave a `KeyPair`. The returned
    /// string is wiped on drop.
    #[must_use]
    pub fn export_private_hex(&self) -> Zeroizing<String> {
        let bytes = Zeroizing::new(self.private.to_bytes());
        Zeroizing::new(hex::encode(&*bytes))
    }

    /// Public key
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Private key
    #[must_use]
    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    /// Creation time
    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Time since creation (zero if the clock went backwards)
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed().unwrap_or_default()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public.to_base64url())
            .field("private", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// An authority name and its key ring, newest first
#[derive(Clone, Debug)]
pub struct Identity {
    name: String,
    key_ring: Vec<KeyPair>,
}

impl Identity {
    /// Build an identity from an existing ring (newest first)
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the ring is empty or holds
    /// more than [`MAX_RING_SIZE`] pairs.
    pub fn from_ring(name: impl Into<String>, key_ring: Vec<KeyPair>) -> Result<Self> {
        if key_ring.is_empty() {
            return Err(CoreError::invalid_config("key ring is empty"));
        }
        if key_ring.len() > MAX_RING_SIZE {
            return Err(CoreError::invalid_config("key ring holds more than 5 keys"));
        }
        Ok(Self {
            name: name.into(),
            key_ring,
        })
    }

    /// Authority name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current key pair (`key_ring[0]`)
    #[must_use]
    pub fn current(&self) -> &KeyPair {
        &self.key_ring[0]
    }

    /// All key pairs, newest first
    #[must_use]
    pub fn key_ring(&self) -> &[KeyPair] {
        &self.key_ring
    }

    /// Ring entry whose public key is `public`
    #[must_use]
    pub fn find(&self, public: &PublicKey) -> Option<&KeyPair> {
        self.key_ring
            .iter()
            .find(|pair| ct_eq(pair.public_key().as_bytes(), public.as_bytes()))
    }

    /// Public keys, newest first
    #[must_use]
    pub fn public_keys(&self) -> Vec<PublicKey> {
        self.key_ring.iter().map(|pair| *pair.public_key()).collect()
    }

    /// Directory records to publish for this ring, newest first
    #[must_use]
    pub fn directory_records(&self) -> Vec<String> {
        self.key_ring
            .iter()
            .map(|pair| DirectoryRecord::new(*pair.public_key()).to_string())
            .collect()
    }
}

/// Rotation limits
///
/// The cadence is advisory: a rotation that evicts a key younger than
/// `min_key_lifetime` is logged, not refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Pairs kept in the ring (1..=5)
    pub ring_size: usize,
    /// Minimum age of a key before it should be rotated out
    pub min_key_lifetime: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            ring_size: MAX_RING_SIZE,
            min_key_lifetime: DEFAULT_MIN_KEY_LIFETIME,
        }
    }
}

impl RotationPolicy {
    /// Validate the policy
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if `ring_size` is outside 1..=5.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_RING_SIZE).contains(&self.ring_size) {
            return Err(CoreError::invalid_config("ring_size must be between 1 and 5"));
        }
        Ok(())
    }
}

/// Generates identities and rotates their rings
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    policy: RotationPolicy,
}

impl KeyStore {
    /// Create a key store with the given policy
    #[must_use]
    pub fn new(policy: RotationPolicy) -> Self {
        Self { policy }
    }

    /// Rotation policy
    #[must_use]
    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Generate a fresh key pair
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Entropy` if the random source is unavailable.
    pub fn generate(&self) -> Result<KeyPair> {
        KeyPair::generate()
    }

    /// Create an identity with a full ring of `policy.ring_size` fresh pairs
    ///
    /// # Errors
    ///
    /// See [`KeyStore::initialize_with`].
    pub fn initialize(&self, name: impl Into<String>) -> Result<Identity> {
        self.initialize_with(name, self.policy.ring_size)
    }

    /// Create an identity with `count` fresh pairs
    ///
    /// Counts above [`MAX_RING_SIZE`] are clamped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for a count of zero and
    /// `CryptoError::Entropy` if key generation fails.
    pub fn initialize_with(&self, name: impl Into<String>, count: usize) -> Result<Identity> {
        let name = name.into();
        if count == 0 {
            return Err(CoreError::invalid_config("key ring needs at least one key"));
        }
        if count > MAX_RING_SIZE {
            tracing::warn!(
                authority = %name,
                requested = count,
                "Clamping key ring to {} keys",
                MAX_RING_SIZE
            );
        }

        let key_ring = (0..count.min(MAX_RING_SIZE))
            .map(|_| self.generate())
            .collect::<Result<Vec<_>>>()?;
        Identity::from_ring(name, key_ring)
    }

    /// Prepend a fresh pair, evicting the oldest once the ring is full
    ///
    /// The input identity is left untouched, so holders of the old value
    /// keep a consistent ring.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Entropy` if key generation fails.
    pub fn rotate(&self, identity: &Identity) -> Result<Identity> {
        let limit = self.policy.ring_size.clamp(1, MAX_RING_SIZE);
        let mut key_ring = Vec::with_capacity(limit + 1);
        key_ring.push(self.generate()?);
        key_ring.extend(identity.key_ring.iter().cloned());

        while key_ring.len() > limit {
            if let Some(evicted) = key_ring.pop() {
                let age = evicted.age();
                if age < self.policy.min_key_lifetime {
                    tracing::warn!(
                        authority = %identity.name,
                        age_days = age.as_secs() / 86_400,
                        "Rotating out a key younger than the minimum key lifetime"
                    );
                }
            }
        }

        tracing::info!(
            authority = %identity.name,
            ring = key_ring.len(),
            "Rotated key ring"
        );
        Ok(Identity {
            name: identity.name.clone(),
            key_ring,
        })
    }
}

/// Identity handle shared between concurrent sealers, openers and a rotator
///
/// Readers take an `Arc` snapshot and keep using it for the whole operation;
/// rotation installs a new ring without disturbing snapshots already taken.
#[derive(Clone, Debug)]
pub struct SharedIdentity {
    inner: Arc<RwLock<Arc<Identity>>>,
}

impl SharedIdentity {
    /// Wrap an identity
    #[must_use]
    pub fn new(identity: Identity) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(identity))),
        }
    }

    /// Current ring snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<Identity> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Authority name
    #[must_use]
    pub fn name(&self) -> String {
        self.snapshot().name().to_string()
    }

    /// Rotate the shared ring with `store`, returning the new snapshot
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Entropy` if key generation fails; the ring is
    /// then left unchanged.
    pub fn rotate(&self, store: &KeyStore) -> Result<Arc<Identity>> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let rotated = Arc::new(store.rotate(&guard)?);
        *guard = Arc::clone(&rotated);
        Ok(rotated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_default_ring() {
        let identity = KeyStore::default().initialize("dsp.example").unwrap();
        assert_eq!(identity.name(), "dsp.example");
        assert_eq!(identity.key_ring().len(), MAX_RING_SIZE);
        assert_eq!(
            identity.current().public_key(),
            identity.key_ring()[0].public_key()
        );

        let keys = identity.public_keys();
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_initialize_counts() {
        let store = KeyStore::default();
        assert_eq!(store.initialize_with("a", 1).unwrap().key_ring().len(), 1);
        assert_eq!(store.initialize_with("a", 9).unwrap().key_ring().len(), 5);
        assert!(matches!(
            store.initialize_with("a", 0),
            Err(CoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rotate_evicts_oldest_and_prepends() {
        let store = KeyStore::default();
        let identity = store.initialize("dsp.example").unwrap();
        let before = identity.public_keys();

        let rotated = store.rotate(&identity).unwrap();
        let after = rotated.public_keys();

        assert_eq!(after.len(), MAX_RING_SIZE);
        assert!(!before.contains(&after[0]));
        assert_eq!(&after[1..], &before[..MAX_RING_SIZE - 1]);
        assert!(rotated.find(&before[MAX_RING_SIZE - 1]).is_none());

        // Input is untouched
        assert_eq!(identity.public_keys(), before);
    }

    #[test]
    fn test_rotate_grows_short_ring() {
        let store = KeyStore::default();
        let identity = store.initialize_with("dsp.example", 2).unwrap();
        let rotated = store.rotate(&identity).unwrap();
        assert_eq!(rotated.key_ring().len(), 3);
        assert!(rotated.find(identity.current().public_key()).is_some());
    }

    #[test]
    fn test_rotate_respects_policy_ring_size() {
        let store = KeyStore::new(RotationPolicy {
            ring_size: 2,
            ..Default::default()
        });
        let identity = store.initialize("dsp.example").unwrap();
        assert_eq!(identity.key_ring().len(), 2);

        let rotated = store.rotate(&store.rotate(&identity).unwrap()).unwrap();
        assert_eq!(rotated.key_ring().len(), 2);
        assert!(rotated.find(identity.current().public_key()).is_none());
    }

    #[test]
    fn test_policy_validation() {
        assert!(RotationPolicy::default().validate().is_ok());
        for ring_size in [0, 6] {
            let policy = RotationPolicy {
                ring_size,
                ..Default::default()
            };
            assert!(policy.validate().is_err());
        }
    }

    #[test]
    fn test_from_ring_bounds() {
        assert!(Identity::from_ring("a", Vec::new()).is_err());

        let ring: Vec<_> = (0..6).map(|_| KeyPair::generate().unwrap()).collect();
        assert!(Identity::from_ring("a", ring).is_err());
    }

    #[test]
    fn test_directory_records_match_ring() {
        let identity = KeyStore::default().initialize("dsp.example").unwrap();
        let records = identity.directory_records();
        assert_eq!(records.len(), MAX_RING_SIZE);

        for (record, key) in records.iter().zip(identity.public_keys()) {
            let parsed: DirectoryRecord = record.parse().unwrap();
            assert_eq!(parsed.public_key, key);
        }
    }

    #[test]
    fn test_private_hex_roundtrip() {
        let pair = KeyPair::generate().unwrap();
        let exported = pair.export_private_hex();
        assert_eq!(exported.len(), 64);

        let imported = KeyPair::from_private_hex(&exported).unwrap();
        assert_eq!(imported.public_key(), pair.public_key());

        assert!(KeyPair::from_private_hex("zz").is_err());
        assert!(KeyPair::from_private_hex("abcd").is_err());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let pair = KeyPair::generate().unwrap();
        let debug = format!("{pair:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(pair.export_private_hex().as_str()));
    }

    #[test]
    fn test_shared_identity_snapshot_survives_rotation() {
        let store = KeyStore::default();
        let shared = SharedIdentity::new(store.initialize("dsp.example").unwrap());

        let snapshot = shared.snapshot();
        let rotated = shared.rotate(&store).unwrap();

        assert_ne!(snapshot.current().public_key(), rotated.current().public_key());
        assert_eq!(snapshot.key_ring().len(), MAX_RING_SIZE);
        assert_eq!(
            shared.snapshot().current().public_key(),
            rotated.current().public_key()
        );
        assert_eq!(shared.name(), "dsp.example");
    }

    #[test]
    fn test_shared_identity_concurrent_readers() {
        let store = KeyStore::default();
        let shared = SharedIdentity::new(store.initialize("dsp.example").unwrap());

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let shared = shared.clone();
                scope.spawn(move || {
                    for _ in 0..50 {
                        let snapshot = shared.snapshot();
                        assert_eq!(snapshot.key_ring().len(), MAX_RING_SIZE);
                    }
                });
            }
            for _ in 0..5 {
                shared.rotate(&store).unwrap();
            }
        });
    }
}
