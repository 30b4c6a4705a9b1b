//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The OS random source could not be read
    #[error("entropy source unavailable")]
    Entropy,

    /// Sender-side key encapsulation failed (malformed or low-order key)
    #[error("key encapsulation failed: {0}")]
    KeyEncapsulation(&'static str),

    /// Receiver-side key decapsulation failed (invalid encapsulated key)
    #[error("key decapsulation failed: {0}")]
    KeyDecapsulation(&'static str),

    /// Sequence counter saturated; a new transaction key is required
    #[error("sequence counter exhausted, re-establish the transaction key")]
    SequenceExhausted,

    /// AEAD tag did not verify (tampering, wrong key or wrong associated data)
    #[error("label authentication failed")]
    Authentication,

    /// Decrypted label byte was neither 0x00 nor 0xFF
    #[error("invalid label plaintext")]
    InvalidLabel,

    /// Sealed label is not valid base64 or is too short to hold nonce and tag
    #[error("malformed sealed label")]
    MalformedLabel,

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Key text is not valid base64url / hex
    #[error("invalid key encoding")]
    InvalidEncoding,
}

impl CryptoError {
    /// Whether a label-open failure should be dropped rather than propagated.
    ///
    /// Labels arrive from untrusted network hops; a forged or corrupted one
    /// must never abort processing of the rest of a batch.
    #[must_use]
    pub fn is_ignorable(&self) -> bool {
        matches!(
            self,
            Self::Authentication | Self::InvalidLabel | Self::MalformedLabel
        )
    }
}
