//! Sending side (matching system)
//!
//! One [`LabelSealer`] per transaction. Sealers live in a `DashMap`, so a
//! caller sealing for a transaction holds that entry exclusively and two
//! seals can never share a counter value.

use crate::campaign::{Campaign, TransactionId};
use crate::error::{CoreError, Result};
use crate::keystore::SharedIdentity;
use crate::message::{EncryptedLabel, LabelMessage};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tally_crypto::CryptoError;
use tally_crypto::hpke::encapsulate;
use tally_crypto::label::LabelSealer;
use tally_crypto::x25519::PublicKey;
use tally_discovery::{KeyAuthority, TrustCache, TrustedKeySet};

/// Sender of sealed labels
#[derive(Debug)]
pub struct Sender {
    identity: SharedIdentity,
    sealers: DashMap<String, LabelSealer>,
}

impl Sender {
    /// Create a sender for `identity`
    #[must_use]
    pub fn new(identity: SharedIdentity) -> Self {
        Self {
            identity,
            sealers: DashMap::new(),
        }
    }

    /// Local identity
    #[must_use]
    pub fn identity(&self) -> &SharedIdentity {
        &self.identity
    }

    /// Derive a transaction key for a receiver and start sealing for it
    ///
    /// Encapsulates to `receiver_public` with the current local key and the
    /// local authority name as context. The returned campaign is what the
    /// receiver needs to derive the same key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UntrustedKey`] if `receiver_public` is not in
    /// `trust`, [`CoreError::InvalidTransactionId`] if the transaction is
    /// already established, and a crypto error if encapsulation fails.
    pub fn establish(
        &self,
        receiver_authority: &str,
        receiver_public: &PublicKey,
        trust: &TrustedKeySet,
        transaction_id: TransactionId,
    ) -> Result<Campaign> {
        if trust.authority() != receiver_authority || !trust.is_trusted(receiver_public) {
            tracing::warn!(
                authority = receiver_authority,
                key = %receiver_public,
                "Receiver key is not published"
            );
            return Err(CoreError::UntrustedKey {
                authority: receiver_authority.to_string(),
                key: receiver_public.to_base64url(),
            });
        }

        let identity = self.identity.snapshot();
        let current = identity.current();
        let (encapsulated_key, key) = encapsulate(
            current.private_key(),
            receiver_public,
            identity.name().as_bytes(),
        )?;
        let sealer = LabelSealer::new(key)?;

        match self.sealers.entry(transaction_id.to_string()) {
            Entry::Occupied(_) => {
                return Err(CoreError::InvalidTransactionId(
                    format!("{transaction_id} is already established").into(),
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(sealer);
            }
        }

        tracing::info!(
            receiver = receiver_authority,
            transaction_id = %transaction_id,
            "Established transaction key"
        );
        Ok(Campaign {
            authority: identity.name().to_string(),
            transaction_id,
            encapsulated_key,
            counterpart_public_key: *current.public_key(),
            own_public_key: *receiver_public,
        })
    }

    /// Establish a transaction, fetching the receiver's key set through `trust`
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Discovery` if the receiver has no fresh key set,
    /// otherwise as [`Sender::establish`].
    pub async fn establish_discovered<A: KeyAuthority>(
        &self,
        receiver_authority: &str,
        receiver_public: &PublicKey,
        trust: &TrustCache<A>,
        transaction_id: TransactionId,
    ) -> Result<Campaign> {
        let set = trust.get(receiver_authority).await?;
        self.establish(receiver_authority, receiver_public, &set, transaction_id)
    }

    /// Seal one label for an established transaction
    ///
    /// A transaction whose counter is exhausted is retired; it must be
    /// established again under a new id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTransaction`] for a transaction that was
    /// never established (or was retired) and
    /// `CryptoError::SequenceExhausted` once the counter is used up.
    pub fn seal(&self, transaction_id: &str, label: bool) -> Result<EncryptedLabel> {
        let sealed = {
            let mut sealer = self.sealers.get_mut(transaction_id).ok_or_else(|| {
                CoreError::UnknownTransaction {
                    authority: self.identity.name(),
                    transaction_id: transaction_id.to_string(),
                }
            })?;
            sealer.seal(label, transaction_id.as_bytes())
        };

        match sealed {
            Ok(label) => Ok(EncryptedLabel {
                transaction_id: transaction_id.to_string(),
                label: label.into_string(),
            }),
            Err(CryptoError::SequenceExhausted) => {
                self.sealers.remove(transaction_id);
                tracing::warn!(transaction_id, "Sequence exhausted, retiring transaction key");
                Err(CryptoError::SequenceExhausted.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Seal a batch of labels into one message
    ///
    /// # Errors
    ///
    /// Stops at the first label that cannot be sealed; see [`Sender::seal`].
    pub fn seal_batch<'a, I>(&self, labels: I) -> Result<LabelMessage>
    where
        I: IntoIterator<Item = (&'a str, bool)>,
    {
        let mut message = LabelMessage::new(self.identity.name());
        for (transaction_id, label) in labels {
            message.push(self.seal(transaction_id, label)?);
        }
        Ok(message)
    }

    /// Install a sealer at a known state, e.g. after a restart
    pub fn resume(&self, transaction_id: TransactionId, sealer: LabelSealer) {
        self.sealers.insert(transaction_id.into(), sealer);
    }

    /// Stop sealing for a transaction, wiping its key
    pub fn retire(&self, transaction_id: &str) -> bool {
        self.sealers.remove(transaction_id).is_some()
    }

    /// Number of transactions with an active sealer
    #[must_use]
    pub fn active_transactions(&self) -> usize {
        self.sealers.len()
    }
}
