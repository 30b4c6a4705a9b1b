//! Sealing and opening of boolean match labels.
//!
//! A label is one byte (`0xFF` for a match, `0x00` otherwise) encrypted
//! under the transaction key with AES-128-GCM. The transaction id is the
//! associated data, so a label sealed for one transaction never opens under
//! another.
//!
//! ## Wire Format
//!
//! ```text
//! base64( nonce (12B) || ciphertext (1B) || tag (16B) )   -> 40 chars
//! ```
//!
//! ## Nonces
//!
//! The sender draws a random 12-byte base nonce once per [`LabelSealer`] and
//! XORs it with a 96-bit big-endian [`SequenceCounter`] for every label. The
//! counter saturates at `2^96 - 1`: once reached, sealing fails with
//! [`CryptoError::SequenceExhausted`] instead of wrapping onto a used nonce.
//!
//! The nonce travels inside the sealed label, so [`open_label`] keeps no
//! state and labels can be opened in any order.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::CryptoError;
use crate::aead::{AeadKey, NONCE_SIZE, Nonce, TAG_SIZE};
use crate::random;

/// Plaintext byte for a positive match.
pub const LABEL_TRUE: u8 = 0xFF;

/// Plaintext byte for a negative match.
pub const LABEL_FALSE: u8 = 0x00;

/// Decoded size of a sealed one-byte label.
pub const SEALED_LABEL_SIZE: usize = NONCE_SIZE + 1 + TAG_SIZE;

/// Smallest decoded input [`open_label`] will attempt to decrypt.
pub const MIN_SEALED_SIZE: usize = NONCE_SIZE + TAG_SIZE;

/// Base64 length of a sealed one-byte label (with padding).
pub const SEALED_LABEL_ENCODED_LEN: usize = SEALED_LABEL_SIZE.div_ceil(3) * 4;

/// 96-bit big-endian label sequence number.
///
/// Starts at zero and only moves forward. The all-ones value is the
/// saturation point and is never used to seal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceCounter(u128);

impl SequenceCounter {
    /// Saturated counter value, `2^96 - 1`.
    pub const MAX: Self = Self((1u128 << 96) - 1);

    /// Counter at zero.
    pub const ZERO: Self = Self(0);

    /// Build from the 12-byte big-endian representation.
    #[must_use]
    pub fn from_be_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        let mut wide = [0u8; 16];
        wide[16 - NONCE_SIZE..].copy_from_slice(&bytes);
        Self(u128::from_be_bytes(wide))
    }

    /// 12-byte big-endian representation.
    #[must_use]
    pub fn to_be_bytes(self) -> [u8; NONCE_SIZE] {
        let wide = self.0.to_be_bytes();
        let mut bytes = [0u8; NONCE_SIZE];
        bytes.copy_from_slice(&wide[16 - NONCE_SIZE..]);
        bytes
    }

    /// Number of labels sealed so far.
    #[must_use]
    pub fn value(self) -> u128 {
        self.0
    }

    /// Whether the counter can no longer be used.
    #[must_use]
    pub fn is_exhausted(self) -> bool {
        self >= Self::MAX
    }

    fn increment(&mut self) -> Result<(), CryptoError> {
        if self.is_exhausted() {
            return Err(CryptoError::SequenceExhausted);
        }
        self.0 += 1;
        Ok(())
    }
}

/// Base64-encoded `nonce || ciphertext || tag`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SealedLabel(String);

impl SealedLabel {
    /// Wrap an encoded label received from the wire.
    #[must_use]
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// The encoded label text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwrap into the encoded text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for SealedLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sender-side sealing state for one transaction key.
///
/// Sealing takes `&mut self`; share a sealer across threads only behind a
/// lock, since two seals racing on the counter would reuse a nonce.
pub struct LabelSealer {
    key: AeadKey,
    base_nonce: [u8; NONCE_SIZE],
    counter: SequenceCounter,
}

impl LabelSealer {
    /// Start a sealing session with a fresh random base nonce.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Entropy`] if the base nonce cannot be drawn.
    pub fn new(key: AeadKey) -> Result<Self, CryptoError> {
        let base_nonce = random::random_12()?;
        Ok(Self::resume(key, base_nonce, SequenceCounter::ZERO))
    }

    /// Rebuild a sealer at a known state.
    ///
    /// The caller must guarantee `(base_nonce, counter)` was never passed
    /// before for this key, otherwise nonces repeat.
    #[must_use]
    pub fn resume(key: AeadKey, base_nonce: [u8; NONCE_SIZE], counter: SequenceCounter) -> Self {
        Self {
            key,
            base_nonce,
            counter,
        }
    }

    /// Current sequence counter.
    #[must_use]
    pub fn counter(&self) -> SequenceCounter {
        self.counter
    }

    /// Whether this sealer refuses to seal further labels.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.counter.is_exhausted()
    }

    fn current_nonce(&self) -> Nonce {
        let sequence = self.counter.to_be_bytes();
        let mut nonce = self.base_nonce;
        for (byte, seq) in nonce.iter_mut().zip(sequence) {
            *byte ^= seq;
        }
        Nonce::from_bytes(nonce)
    }

    /// Seal one label bound to `aad` (the transaction id bytes).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SequenceExhausted`] once the counter is
    /// saturated; no ciphertext is produced and the sealer stays exhausted.
    pub fn seal(&mut self, label: bool, aad: &[u8]) -> Result<SealedLabel, CryptoError> {
        if self.counter.is_exhausted() {
            return Err(CryptoError::SequenceExhausted);
        }

        let nonce = self.current_nonce();
        let plaintext = [if label { LABEL_TRUE } else { LABEL_FALSE }];
        let ciphertext = self.key.encrypt(&nonce, &plaintext, aad)?;
        self.counter.increment()?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(nonce.as_bytes());
        sealed.extend_from_slice(&ciphertext);
        Ok(SealedLabel(STANDARD.encode(sealed)))
    }

    /// Seal a positive label.
    ///
    /// # Errors
    ///
    /// See [`LabelSealer::seal`].
    pub fn seal_one(&mut self, aad: &[u8]) -> Result<SealedLabel, CryptoError> {
        self.seal(true, aad)
    }

    /// Seal a negative label.
    ///
    /// # Errors
    ///
    /// See [`LabelSealer::seal`].
    pub fn seal_zero(&mut self, aad: &[u8]) -> Result<SealedLabel, CryptoError> {
        self.seal(false, aad)
    }
}

impl std::fmt::Debug for LabelSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelSealer")
            .field("counter", &self.counter.value())
            .finish_non_exhaustive()
    }
}

/// Open a sealed label with the transaction key and its associated data.
///
/// # Errors
///
/// - [`CryptoError::MalformedLabel`]: not base64, or shorter than nonce + tag.
/// - [`CryptoError::Authentication`]: tag mismatch (tampering, wrong key,
///   wrong associated data).
/// - [`CryptoError::InvalidLabel`]: authentic, but the plaintext is not a
///   single `0x00`/`0xFF` byte.
///
/// All three are [ignorable](CryptoError::is_ignorable) by batch callers.
pub fn open_label(key: &AeadKey, sealed: &str, aad: &[u8]) -> Result<bool, CryptoError> {
    let decoded = STANDARD
        .decode(sealed.trim())
        .map_err(|_| CryptoError::MalformedLabel)?;
    if decoded.len() < MIN_SEALED_SIZE {
        return Err(CryptoError::MalformedLabel);
    }

    let (nonce, ciphertext_and_tag) = decoded.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce).ok_or(CryptoError::MalformedLabel)?;
    let plaintext = key.decrypt(&nonce, ciphertext_and_tag, aad)?;

    match plaintext.as_slice() {
        [LABEL_TRUE] => Ok(true),
        [LABEL_FALSE] => Ok(false),
        _ => Err(CryptoError::InvalidLabel),
    }
}
