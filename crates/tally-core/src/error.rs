//! Error types for TALLY core operations
//!
//! Errors fall into three groups:
//!
//! - **Campaign-invalidating**: the campaign cannot be activated and must be
//!   reconfigured (untrusted or unknown keys, bad transaction ids, failed key
//!   establishment). Never retried.
//! - **Ignorable**: a single label could not be opened. The label is dropped
//!   and the rest of the batch continues.
//! - **Operational**: configuration, I/O and serialization problems.

use std::borrow::Cow;
use tally_crypto::CryptoError;
use tally_discovery::DiscoveryError;
use thiserror::Error;

/// Errors that can occur in TALLY core operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    // ============ Wrapped Errors ============
    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Key discovery failed
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    // ============ Campaign Errors ============
    /// Transaction id is empty, too long, or not alphanumeric
    #[error("Invalid transaction id: {0}")]
    InvalidTransactionId(Cow<'static, str>),

    /// A campaign key is absent from its authority's fresh key set
    #[error("Key {key} is not published by {authority}")]
    UntrustedKey {
        /// Authority expected to publish the key
        authority: String,
        /// Public key (base64url)
        key: String,
    },

    /// The campaign names a public key that is not in the local key ring
    #[error("No local key pair for public key {0}")]
    UnknownLocalKey(String),

    /// No transaction key is held for this (authority, transaction id)
    #[error("Unknown transaction {transaction_id} from {authority}")]
    UnknownTransaction {
        /// Sender authority
        authority: String,
        /// Transaction id
        transaction_id: String,
    },

    // ============ Operational Errors ============
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

impl CoreError {
    /// Returns true if the campaign this error arose from must be treated as
    /// invalid
    #[must_use]
    pub fn invalidates_campaign(&self) -> bool {
        match self {
            Self::InvalidTransactionId(_)
            | Self::UntrustedKey { .. }
            | Self::UnknownLocalKey(_) => true,
            Self::Crypto(e) => matches!(
                e,
                CryptoError::KeyEncapsulation(_) | CryptoError::KeyDecapsulation(_)
            ),
            Self::Discovery(e) => matches!(e, DiscoveryError::Untrusted(_)),
            _ => false,
        }
    }

    /// Returns true if this error only affects one label, which should be
    /// dropped
    #[must_use]
    pub fn is_ignorable(&self) -> bool {
        match self {
            Self::Crypto(e) => e.is_ignorable(),
            Self::UnknownTransaction { .. } => true,
            _ => false,
        }
    }

    /// Create an invalid configuration error with static context
    #[must_use]
    pub const fn invalid_config(context: &'static str) -> Self {
        Self::InvalidConfig(Cow::Borrowed(context))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for TALLY core operations
pub type Result<T> = std::result::Result<T, CoreError>;
