//! Receiving side (demand-side participant)
//!
//! Activation checks a campaign against the directory, derives the
//! transaction key and caches it. Opening is stateless per label: any label
//! whose key is unknown or which fails to authenticate is dropped, never
//! reported as `false`.

use crate::cache::LabelKeyCache;
use crate::campaign::Campaign;
use crate::error::{CoreError, Result};
use crate::keystore::SharedIdentity;
use crate::message::LabelMessage;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tally_crypto::hpke::decapsulate;
use tally_crypto::label::open_label;
use tally_crypto::x25519::PublicKey;
use tally_discovery::{KeyAuthority, TrustCache, TrustedKeySet};
use tokio::task::JoinHandle;

/// Receiver of sealed labels
#[derive(Debug, Clone)]
pub struct Receiver {
    identity: SharedIdentity,
    keys: Arc<LabelKeyCache>,
}

impl Receiver {
    /// Create a receiver for `identity` storing keys in `keys`
    #[must_use]
    pub fn new(identity: SharedIdentity, keys: Arc<LabelKeyCache>) -> Self {
        Self { identity, keys }
    }

    /// Local identity
    #[must_use]
    pub fn identity(&self) -> &SharedIdentity {
        &self.identity
    }

    /// Transaction key cache
    #[must_use]
    pub fn keys(&self) -> &LabelKeyCache {
        &self.keys
    }

    /// Activate a campaign against already-fetched trust sets
    ///
    /// `counterpart_trust` must be the fresh set published by the campaign
    /// authority and `own_trust` the fresh set published under the local
    /// identity's name. Both campaign keys must be present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UntrustedKey`] if either key is not published,
    /// [`CoreError::UnknownLocalKey`] if the receiver key is not in the local
    /// ring, and a crypto error if decapsulation fails.
    pub fn activate(
        &self,
        campaign: &Campaign,
        counterpart_trust: &TrustedKeySet,
        own_trust: &TrustedKeySet,
    ) -> Result<()> {
        let identity = self.identity.snapshot();

        ensure_trusted(
            &campaign.authority,
            counterpart_trust,
            &campaign.counterpart_public_key,
        )?;
        ensure_trusted(identity.name(), own_trust, &campaign.own_public_key)?;

        let pair = identity
            .find(&campaign.own_public_key)
            .ok_or_else(|| CoreError::UnknownLocalKey(campaign.own_public_key.to_base64url()))?;

        let key = decapsulate(
            &campaign.encapsulated_key,
            pair.private_key(),
            &campaign.counterpart_public_key,
            campaign.authority.as_bytes(),
        )?;
        self.keys
            .store(&campaign.authority, campaign.transaction_id.as_str(), key);

        tracing::info!(
            authority = %campaign.authority,
            transaction_id = %campaign.transaction_id,
            "Activated campaign"
        );
        Ok(())
    }

    /// Activate a campaign, fetching both trust sets through `trust`
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Discovery` if either authority has no fresh key
    /// set, otherwise as [`Receiver::activate`].
    pub async fn activate_discovered<A: KeyAuthority>(
        &self,
        campaign: &Campaign,
        trust: &TrustCache<A>,
    ) -> Result<()> {
        let counterpart_trust = trust.get(&campaign.authority).await?;
        let own_trust = trust.get(&self.identity.name()).await?;
        self.activate(campaign, &counterpart_trust, &own_trust)
    }

    /// Periodically wipe expired transaction keys
    ///
    /// Expired keys are never used for opening; this bounds how long they
    /// stay in memory. Abort the handle to stop the task.
    pub fn spawn_purger(&self, period: Duration) -> JoinHandle<()> {
        Arc::clone(&self.keys).spawn_purger(period)
    }

    /// Drop the key for a finished transaction
    pub fn deactivate(&self, authority: &str, transaction_id: &str) -> bool {
        self.keys.evict(authority, transaction_id)
    }

    /// Open one sealed label
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTransaction`] without a cached key, or the
    /// crypto error from opening. All of these are ignorable.
    pub fn open(&self, authority: &str, transaction_id: &str, sealed: &str) -> Result<bool> {
        let key = self.keys.lookup(authority, transaction_id).ok_or_else(|| {
            CoreError::UnknownTransaction {
                authority: authority.to_string(),
                transaction_id: transaction_id.to_string(),
            }
        })?;
        Ok(open_label(&key, sealed, transaction_id.as_bytes())?)
    }

    /// Open every label in a message
    ///
    /// Labels that cannot be opened are absent from the result.
    #[must_use]
    pub fn open_batch(&self, message: &LabelMessage) -> BTreeMap<String, bool> {
        self.open_batch_counted(message).0
    }

    /// Open every label in a message, also returning how many were dropped
    ///
    /// Results are keyed by transaction id, so a message carrying several
    /// labels for one transaction yields fewer entries than it had labels;
    /// the count covers only labels that failed to open.
    #[must_use]
    pub fn open_batch_counted(&self, message: &LabelMessage) -> (BTreeMap<String, bool>, usize) {
        let mut opened = BTreeMap::new();
        let mut dropped = 0;

        for entry in &message.labels {
            match self.open(&message.authority, &entry.transaction_id, &entry.label) {
                Ok(label) => {
                    opened.insert(entry.transaction_id.clone(), label);
                }
                Err(e) => {
                    dropped += 1;
                    tracing::debug!(
                        authority = %message.authority,
                        transaction_id = %entry.transaction_id,
                        "Dropping label: {}",
                        e
                    );
                }
            }
        }

        (opened, dropped)
    }
}

fn ensure_trusted(authority: &str, trust: &TrustedKeySet, key: &PublicKey) -> Result<()> {
    if trust.authority() == authority && trust.is_trusted(key) {
        return Ok(());
    }
    tracing::warn!(authority, key = %key, "Campaign key is not published");
    Err(CoreError::UntrustedKey {
        authority: authority.to_string(),
        key: key.to_base64url(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::TransactionId;
    use crate::keystore::KeyStore;
    use crate::message::EncryptedLabel;
    use tally_crypto::hpke::encapsulate;
    use tally_crypto::label::LabelSealer;
    use tally_crypto::x25519::PrivateKey;

    const SENDER: &str = "match-system-operator.com";
    const RECEIVER: &str = "dsp.example";
    const TXID: &str = "2VwhmTY9MecgWsu6";

    struct Fixture {
        receiver: Receiver,
        sender_key: PrivateKey,
        campaign: Campaign,
        sealer: LabelSealer,
        sender_trust: TrustedKeySet,
        receiver_trust: TrustedKeySet,
    }

    fn fixture() -> Fixture {
        let identity = KeyStore::default().initialize(RECEIVER).unwrap();
        let receiver_trust = TrustedKeySet::new(RECEIVER, identity.public_keys()).unwrap();
        let receiver_public = *identity.current().public_key();

        let sender_key = PrivateKey::generate().unwrap();
        let sender_trust = TrustedKeySet::new(SENDER, vec![sender_key.public_key()]).unwrap();
        let (encapsulated_key, key) =
            encapsulate(&sender_key, &receiver_public, SENDER.as_bytes()).unwrap();

        let campaign = Campaign {
            authority: SENDER.into(),
            transaction_id: TransactionId::new(TXID).unwrap(),
            encapsulated_key,
            counterpart_public_key: sender_key.public_key(),
            own_public_key: receiver_public,
        };

        Fixture {
            receiver: Receiver::new(SharedIdentity::new(identity), Arc::default()),
            sender_key,
            campaign,
            sealer: LabelSealer::new(key).unwrap(),
            sender_trust,
            receiver_trust,
        }
    }

    #[test]
    fn test_activate_and_open() {
        let mut f = fixture();
        f.receiver
            .activate(&f.campaign, &f.sender_trust, &f.receiver_trust)
            .unwrap();
        assert!(f.receiver.keys().contains(SENDER, TXID));

        let one = f.sealer.seal_one(TXID.as_bytes()).unwrap();
        let zero = f.sealer.seal_zero(TXID.as_bytes()).unwrap();
        assert!(f.receiver.open(SENDER, TXID, one.as_str()).unwrap());
        assert!(!f.receiver.open(SENDER, TXID, zero.as_str()).unwrap());
    }

    #[test]
    fn test_untrusted_sender_key() {
        let f = fixture();
        let stranger = PrivateKey::generate().unwrap().public_key();
        let sender_trust = TrustedKeySet::new(SENDER, vec![stranger]).unwrap();

        let err = f
            .receiver
            .activate(&f.campaign, &sender_trust, &f.receiver_trust)
            .unwrap_err();
        assert!(matches!(err, CoreError::UntrustedKey { .. }));
        assert!(err.invalidates_campaign());
        assert!(f.receiver.keys().is_empty());
    }

    #[test]
    fn test_untrusted_own_key() {
        let f = fixture();
        let receiver_trust = TrustedKeySet::new(RECEIVER, Vec::new()).unwrap();

        let err = f
            .receiver
            .activate(&f.campaign, &f.sender_trust, &receiver_trust)
            .unwrap_err();
        assert!(matches!(err, CoreError::UntrustedKey { .. }));
    }

    #[test]
    fn test_trust_set_for_wrong_authority() {
        let f = fixture();
        let wrong = TrustedKeySet::new("other.example", f.sender_trust.keys().to_vec()).unwrap();

        assert!(matches!(
            f.receiver.activate(&f.campaign, &wrong, &f.receiver_trust),
            Err(CoreError::UntrustedKey { .. })
        ));
    }

    #[test]
    fn test_unknown_local_key() {
        let mut f = fixture();
        let foreign = PrivateKey::generate().unwrap().public_key();
        f.campaign.own_public_key = foreign;
        let receiver_trust = TrustedKeySet::new(RECEIVER, vec![foreign]).unwrap();

        assert!(matches!(
            f.receiver.activate(&f.campaign, &f.sender_trust, &receiver_trust),
            Err(CoreError::UnknownLocalKey(_))
        ));
    }

    #[test]
    fn test_open_batch_drops_bad_labels() {
        let mut f = fixture();
        f.receiver
            .activate(&f.campaign, &f.sender_trust, &f.receiver_trust)
            .unwrap();

        let good = f.sealer.seal_one(TXID.as_bytes()).unwrap();
        let other = f.sealer.seal_zero(b"otherTx").unwrap();

        let mut message = LabelMessage::new(SENDER);
        for (transaction_id, label) in [
            ("unknownTx", good.as_str()),
            (TXID, "not a label"),
            (TXID, other.as_str()),
            (TXID, good.as_str()),
        ] {
            message.push(EncryptedLabel {
                transaction_id: transaction_id.into(),
                label: label.into(),
            });
        }

        let opened = f.receiver.open_batch(&message);
        assert_eq!(opened.len(), 1);
        assert_eq!(opened.get(TXID), Some(&true));
    }

    #[test]
    fn test_open_batch_counts_drops_per_label() {
        let mut f = fixture();
        f.receiver
            .activate(&f.campaign, &f.sender_trust, &f.receiver_trust)
            .unwrap();

        let mut message = LabelMessage::new(SENDER);
        for _ in 0..3 {
            message.push(EncryptedLabel {
                transaction_id: TXID.into(),
                label: f.sealer.seal_zero(TXID.as_bytes()).unwrap().into_string(),
            });
        }
        message.push(EncryptedLabel {
            transaction_id: TXID.into(),
            label: "AAAA".into(),
        });

        let (opened, dropped) = f.receiver.open_batch_counted(&message);
        assert_eq!(opened.len(), 1);
        assert_eq!(dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_purger_wipes_expired_transaction_keys() {
        let f = fixture();
        let receiver = Receiver::new(
            f.receiver.identity().clone(),
            Arc::new(LabelKeyCache::new(&crate::cache::CacheConfig {
                ttl: Duration::ZERO,
            })),
        );
        receiver
            .activate(&f.campaign, &f.sender_trust, &f.receiver_trust)
            .unwrap();
        assert_eq!(receiver.keys().len(), 1);

        let handle = receiver.spawn_purger(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(receiver.keys().is_empty());

        handle.abort();
    }

    #[test]
    fn test_open_after_deactivate_is_ignorable() {
        let mut f = fixture();
        f.receiver
            .activate(&f.campaign, &f.sender_trust, &f.receiver_trust)
            .unwrap();
        let sealed = f.sealer.seal_one(TXID.as_bytes()).unwrap();

        assert!(f.receiver.deactivate(SENDER, TXID));
        let err = f.receiver.open(SENDER, TXID, sealed.as_str()).unwrap_err();
        assert!(err.is_ignorable());
    }

    #[test]
    fn test_campaign_against_rotated_out_key_fails() {
        let f = fixture();
        let store = KeyStore::default();
        for _ in 0..5 {
            f.receiver.identity().rotate(&store).unwrap();
        }
        let receiver_trust =
            TrustedKeySet::new(RECEIVER, vec![f.campaign.own_public_key]).unwrap();

        assert!(matches!(
            f.receiver.activate(&f.campaign, &f.sender_trust, &receiver_trust),
            Err(CoreError::UnknownLocalKey(_))
        ));
    }

    #[tokio::test]
    async fn test_activate_discovered() {
        use tally_discovery::{DiscoveryConfig, StaticDirectory};

        let f = fixture();
        let directory = StaticDirectory::new();
        let own = f.receiver.identity().snapshot().directory_records();
        directory.publish(RECEIVER, own).await;
        directory
            .publish(
                SENDER,
                [tally_discovery::DirectoryRecord::new(f.sender_key.public_key()).to_string()],
            )
            .await;

        let trust = TrustCache::new(directory, DiscoveryConfig::default());
        f.receiver
            .activate_discovered(&f.campaign, &trust)
            .await
            .unwrap();
        assert!(f.receiver.keys().contains(SENDER, TXID));
    }

    #[tokio::test]
    async fn test_activate_discovered_without_records() {
        use tally_discovery::{DiscoveryConfig, StaticDirectory};

        let f = fixture();
        let trust = TrustCache::new(StaticDirectory::new(), DiscoveryConfig::default());
        let err = f
            .receiver
            .activate_discovered(&f.campaign, &trust)
            .await
            .unwrap_err();
        assert!(err.invalidates_campaign());
    }
}
