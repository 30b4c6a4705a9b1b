//! Authenticated hybrid key establishment (HPKE Auth mode, RFC 9180).
//!
//! A matching system derives one symmetric transaction key per DSP
//! campaign. Auth mode mixes the sender's static key into the KEM shared
//! secret, so a receiver that derives the same key has also authenticated
//! the sender's published identity without any signature.
//!
//! ## Suite
//!
//! | Component | Algorithm | Id |
//! |-----------|-----------|----|
//! | KEM | DHKEM(X25519, HKDF-SHA256) | `0x0020` |
//! | KDF | HKDF-SHA256 | `0x0001` |
//! | AEAD | AES-128-GCM | `0x0001` |
//! | Mode | Auth | `0x02` |
//!
//! The transaction key is taken from the HPKE exporter interface:
//! `Export(info, 16)`, with `info` also bound into the key schedule context.
//!
//! ```text
//! Sender (skS, pkR)                          Receiver (skR, pkS)
//!   skE, pkE <- fresh
//!   dh  = DH(skE, pkR) || DH(skS, pkR)         dh  = DH(skR, pkE) || DH(skR, pkS)
//!   ctx = pkE || pkR || pkS                    ctx = pkE || pk(skR) || pkS
//!   ss  = ExtractAndExpand(dh, ctx)            ss  = ExtractAndExpand(dh, ctx)
//!   key = Export(KeySchedule(ss, info), info)  key = Export(KeySchedule(ss, info), info)
//!   --------------------- enc = pkE ------------------------->
//! ```

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hkdf::{Hkdf, HkdfExtract};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::aead::{AeadKey, KEY_SIZE};
use crate::x25519::{PrivateKey, PublicKey};
use crate::{CryptoError, X25519_PUBLIC_KEY_SIZE};

/// KEM identifier for DHKEM(X25519, HKDF-SHA256).
pub const KEM_ID: u16 = 0x0020;

/// KDF identifier for HKDF-SHA256.
pub const KDF_ID: u16 = 0x0001;

/// AEAD identifier for AES-128-GCM.
pub const AEAD_ID: u16 = 0x0001;

/// Mode byte for authenticated (Auth) mode.
pub const MODE_AUTH: u8 = 0x02;

/// Encapsulated key size (an X25519 public key).
pub const ENCAPSULATED_KEY_SIZE: usize = X25519_PUBLIC_KEY_SIZE;

const VERSION_LABEL: &[u8] = b"HPKE-v1";

/// Output length of SHA-256 (`Nh`) and of the DHKEM shared secret (`Nsecret`).
const HASH_LEN: usize = 32;

const KEM_SUITE_ID: [u8; 5] = {
    let kem = KEM_ID.to_be_bytes();
    [b'K', b'E', b'M', kem[0], kem[1]]
};

const HPKE_SUITE_ID: [u8; 10] = {
    let kem = KEM_ID.to_be_bytes();
    let kdf = KDF_ID.to_be_bytes();
    let aead = AEAD_ID.to_be_bytes();
    [
        b'H', b'P', b'K', b'E', kem[0], kem[1], kdf[0], kdf[1], aead[0], aead[1],
    ]
};

/// Ephemeral public value produced by [`encapsulate`].
///
/// Not secret: it travels with the campaign configuration to the receiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncapsulatedKey([u8; ENCAPSULATED_KEY_SIZE]);

impl EncapsulatedKey {
    /// Create from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; ENCAPSULATED_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking the length.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if the slice is not 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; ENCAPSULATED_KEY_SIZE] =
            slice.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: ENCAPSULATED_KEY_SIZE,
                actual: slice.len(),
            })?;
        Ok(Self(bytes))
    }

    /// Get raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ENCAPSULATED_KEY_SIZE] {
        &self.0
    }

    /// Encode as unpadded base64url.
    #[must_use]
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Decode from unpadded base64url.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidEncoding`] or [`CryptoError::InvalidKeyLength`].
    pub fn from_base64url(text: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(text.trim())
            .map_err(|_| CryptoError::InvalidEncoding)?;
        Self::from_slice(&bytes)
    }

    fn as_public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.0)
    }
}

/// HKDF refused an input length. Unreachable with this suite's fixed sizes,
/// but kept as a value so every caller maps it to its own error.
#[derive(Debug)]
struct ScheduleError;

/// `LabeledExtract(salt, label, ikm)` from RFC 9180 section 4.
fn labeled_extract(suite_id: &[u8], salt: &[u8], label: &[u8], ikm: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut extract = HkdfExtract::<Sha256>::new(Some(salt));
    extract.input_ikm(VERSION_LABEL);
    extract.input_ikm(suite_id);
    extract.input_ikm(label);
    extract.input_ikm(ikm);
    let (mut prk, _) = extract.finalize();

    let mut out = Zeroizing::new([0u8; HASH_LEN]);
    out.copy_from_slice(&prk);
    prk.as_mut_slice().zeroize();
    out
}

/// `LabeledExpand(prk, label, info, L)` from RFC 9180 section 4.
fn labeled_expand(
    suite_id: &[u8],
    prk: &[u8; HASH_LEN],
    label: &[u8],
    info: &[u8],
    out: &mut [u8],
) -> Result<(), ScheduleError> {
    let length = u16::try_from(out.len())
        .map_err(|_| ScheduleError)?
        .to_be_bytes();
    let hkdf = Hkdf::<Sha256>::from_prk(prk).map_err(|_| ScheduleError)?;
    let labeled_info: [&[u8]; 5] = [&length, VERSION_LABEL, suite_id, label, info];
    hkdf.expand_multi_info(&labeled_info, out)
        .map_err(|_| ScheduleError)
}

/// DHKEM `ExtractAndExpand(dh, kem_context)`.
fn extract_and_expand(dh: &[u8], kem_context: &[u8]) -> Result<Zeroizing<[u8; 32]>, ScheduleError> {
    let eae_prk = labeled_extract(&KEM_SUITE_ID, b"", b"eae_prk", dh);
    let mut shared_secret = Zeroizing::new([0u8; HASH_LEN]);
    labeled_expand(
        &KEM_SUITE_ID,
        &eae_prk,
        b"shared_secret",
        kem_context,
        shared_secret.as_mut_slice(),
    )?;
    Ok(shared_secret)
}

/// Auth-mode key schedule followed by `Export(info, 16)`.
///
/// The PSK and PSK id are empty in Auth mode.
fn export_transaction_key(shared_secret: &[u8; 32], info: &[u8]) -> Result<AeadKey, ScheduleError> {
    let psk_id_hash = labeled_extract(&HPKE_SUITE_ID, b"", b"psk_id_hash", b"");
    let info_hash = labeled_extract(&HPKE_SUITE_ID, b"", b"info_hash", info);

    let mut context = Zeroizing::new([0u8; 1 + 2 * HASH_LEN]);
    context[0] = MODE_AUTH;
    context[1..=HASH_LEN].copy_from_slice(psk_id_hash.as_slice());
    context[1 + HASH_LEN..].copy_from_slice(info_hash.as_slice());

    let secret = labeled_extract(&HPKE_SUITE_ID, shared_secret, b"secret", b"");

    let mut exporter_secret = Zeroizing::new([0u8; HASH_LEN]);
    labeled_expand(
        &HPKE_SUITE_ID,
        &secret,
        b"exp",
        context.as_slice(),
        exporter_secret.as_mut_slice(),
    )?;

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    labeled_expand(
        &HPKE_SUITE_ID,
        &exporter_secret,
        b"sec",
        info,
        key.as_mut_slice(),
    )?;
    Ok(AeadKey::new(*key))
}

/// `kem_context = enc || pkR || pkS`.
fn kem_context(enc: &[u8; 32], receiver: &PublicKey, sender: &PublicKey) -> [u8; 96] {
    let mut context = [0u8; 3 * X25519_PUBLIC_KEY_SIZE];
    context[..32].copy_from_slice(enc);
    context[32..64].copy_from_slice(receiver.as_bytes());
    context[64..].copy_from_slice(sender.as_bytes());
    context
}

/// Sender side: derive a transaction key for `receiver_public`.
///
/// Generates a fresh ephemeral key pair, so every call yields a different
/// encapsulated key and a different transaction key.
///
/// # Errors
///
/// - [`CryptoError::Entropy`] if the ephemeral key cannot be generated.
/// - [`CryptoError::KeyEncapsulation`] if the receiver key is a low-order
///   point or the key schedule rejects its input.
pub fn encapsulate(
    sender_private: &PrivateKey,
    receiver_public: &PublicKey,
    info: &[u8],
) -> Result<(EncapsulatedKey, AeadKey), CryptoError> {
    let ephemeral = PrivateKey::generate()?;
    encapsulate_with_ephemeral(&ephemeral, sender_private, receiver_public, info)
}

fn encapsulate_with_ephemeral(
    ephemeral: &PrivateKey,
    sender_private: &PrivateKey,
    receiver_public: &PublicKey,
    info: &[u8],
) -> Result<(EncapsulatedKey, AeadKey), CryptoError> {
    let dh_ephemeral = ephemeral
        .exchange(receiver_public)
        .ok_or(CryptoError::KeyEncapsulation(
            "receiver public key is a low-order point",
        ))?;
    let dh_static = sender_private
        .exchange(receiver_public)
        .ok_or(CryptoError::KeyEncapsulation(
            "receiver public key is a low-order point",
        ))?;

    let mut dh = Zeroizing::new([0u8; 64]);
    dh[..32].copy_from_slice(dh_ephemeral.as_bytes());
    dh[32..].copy_from_slice(dh_static.as_bytes());

    let enc = ephemeral.public_key().to_bytes();
    let context = kem_context(&enc, receiver_public, &sender_private.public_key());

    let shared_secret = extract_and_expand(dh.as_slice(), &context)
        .map_err(|_| CryptoError::KeyEncapsulation("key schedule rejected input"))?;
    let key = export_transaction_key(&shared_secret, info)
        .map_err(|_| CryptoError::KeyEncapsulation("key schedule rejected input"))?;

    Ok((EncapsulatedKey(enc), key))
}

/// Receiver side: recover the transaction key from an encapsulated key.
///
/// Produces the same key as the paired [`encapsulate`] call when the
/// receiver private key, sender public key and `info` match.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDecapsulation`] if the encapsulated key or the
/// sender key is not a usable point.
pub fn decapsulate(
    encapsulated_key: &EncapsulatedKey,
    receiver_private: &PrivateKey,
    sender_public: &PublicKey,
    info: &[u8],
) -> Result<AeadKey, CryptoError> {
    let dh_ephemeral = receiver_private
        .exchange(&encapsulated_key.as_public_key())
        .ok_or(CryptoError::KeyDecapsulation(
            "encapsulated key is not a valid point",
        ))?;
    let dh_static = receiver_private
        .exchange(sender_public)
        .ok_or(CryptoError::KeyDecapsulation(
            "sender public key is a low-order point",
        ))?;

    let mut dh = Zeroizing::new([0u8; 64]);
    dh[..32].copy_from_slice(dh_ephemeral.as_bytes());
    dh[32..].copy_from_slice(dh_static.as_bytes());

    let context = kem_context(
        encapsulated_key.as_bytes(),
        &receiver_private.public_key(),
        sender_public,
    );

    let shared_secret = extract_and_expand(dh.as_slice(), &context)
        .map_err(|_| CryptoError::KeyDecapsulation("key schedule rejected input"))?;
    export_transaction_key(&shared_secret, info)
        .map_err(|_| CryptoError::KeyDecapsulation("key schedule rejected input"))
}
