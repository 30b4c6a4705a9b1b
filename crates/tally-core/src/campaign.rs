//! Campaign configuration
//!
//! A campaign binds one transaction id to the key material a receiver needs
//! to derive the transaction key: the sender's authority and public key, the
//! receiver's own public key and the encapsulated key. It is produced by the
//! sender and handed to the receiver out-of-band, usually as JSON:
//!
//! ```json
//! {
//!   "authority": "match-system-operator.com",
//!   "transaction_id": "2VwhmTY9MecgWsu6",
//!   "encapsulated_key": "<base64url>",
//!   "counterpart_public_key": "<base64url>",
//!   "own_public_key": "<base64url>"
//! }
//! ```

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use tally_crypto::hpke::EncapsulatedKey;
use tally_crypto::x25519::PublicKey;

/// Maximum transaction id length
pub const MAX_TRANSACTION_ID_LEN: usize = 16;

/// Match transaction identifier: 1 to 16 ASCII alphanumerics
///
/// The raw bytes are the associated data of every label sealed for the
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionId(String);

impl TransactionId {
    /// Validate and wrap a transaction id
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTransactionId`] for empty, over-long or
    /// non-alphanumeric ids.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::InvalidTransactionId(Cow::Borrowed("empty")));
        }
        if id.len() > MAX_TRANSACTION_ID_LEN {
            return Err(CoreError::InvalidTransactionId(Cow::Owned(format!(
                "{} characters (max {MAX_TRANSACTION_ID_LEN})",
                id.len()
            ))));
        }
        if !id.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidTransactionId(Cow::Borrowed(
                "only ASCII letters and digits are allowed",
            )));
        }
        Ok(Self(id))
    }

    /// Id text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Associated data for label sealing
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TransactionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for TransactionId {
    type Error = CoreError;

    fn try_from(id: String) -> Result<Self> {
        Self::new(id)
    }
}

impl From<TransactionId> for String {
    fn from(id: TransactionId) -> Self {
        id.0
    }
}

/// Key material for one transaction, from the receiver's point of view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CampaignRecord", into = "CampaignRecord")]
pub struct Campaign {
    /// Sender authority; also the key schedule context
    pub authority: String,
    /// Transaction id
    pub transaction_id: TransactionId,
    /// Encapsulated key produced by the sender
    pub encapsulated_key: EncapsulatedKey,
    /// Sender public key, must be published by `authority`
    pub counterpart_public_key: PublicKey,
    /// Receiver public key the sender encapsulated to
    pub own_public_key: PublicKey,
}

impl Campaign {
    /// Parse a campaign from JSON
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Serialization`] for malformed JSON, bad key
    /// encodings or an invalid transaction id.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render as pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Text form of a campaign: keys as unpadded base64url
#[derive(Serialize, Deserialize)]
struct CampaignRecord {
    authority: String,
    transaction_id: String,
    encapsulated_key: String,
    counterpart_public_key: String,
    own_public_key: String,
}

impl TryFrom<CampaignRecord> for Campaign {
    type Error = CoreError;

    fn try_from(record: CampaignRecord) -> Result<Self> {
        if record.authority.is_empty() {
            return Err(CoreError::invalid_config("campaign authority is empty"));
        }
        Ok(Self {
            authority: record.authority,
            transaction_id: TransactionId::new(record.transaction_id)?,
            encapsulated_key: EncapsulatedKey::from_base64url(&record.encapsulated_key)?,
            counterpart_public_key: PublicKey::from_base64url(&record.counterpart_public_key)?,
            own_public_key: PublicKey::from_base64url(&record.own_public_key)?,
        })
    }
}

impl From<Campaign> for CampaignRecord {
    fn from(campaign: Campaign) -> Self {
        Self {
            authority: campaign.authority,
            transaction_id: campaign.transaction_id.into(),
            encapsulated_key: campaign.encapsulated_key.to_base64url(),
            counterpart_public_key: campaign.counterpart_public_key.to_base64url(),
            own_public_key: campaign.own_public_key.to_base64url(),
        }
    }
}
