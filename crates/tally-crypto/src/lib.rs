//! # TALLY Crypto
//!
//! Cryptographic primitives for TALLY label delivery.
//!
//! This crate provides:
//! - X25519 identity and ephemeral keys
//! - HPKE Auth-mode key encapsulation with exporter-derived transaction keys
//! - `AES-128-GCM` AEAD encryption
//! - Boolean label sealing with counter-derived, non-repeating nonces
//! - Secure random number generation
//!
//! Everything here is synchronous, CPU-bound and free of I/O.
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Security Level |
//! |----------|-----------|----------------|
//! | Key Exchange | X25519 | 128-bit |
//! | KEM | DHKEM(X25519, HKDF-SHA256), Auth mode | 128-bit |
//! | KDF | HKDF-SHA256 | 128-bit |
//! | AEAD | AES-128-GCM | 128-bit key |
//!
//! ## Example
//!
//! ```
//! use tally_crypto::hpke::{decapsulate, encapsulate};
//! use tally_crypto::label::{LabelSealer, open_label};
//! use tally_crypto::x25519::PrivateKey;
//!
//! let matcher = PrivateKey::generate().unwrap();
//! let dsp = PrivateKey::generate().unwrap();
//! let info = b"match-system-operator.com";
//!
//! let (enc, key) = encapsulate(&matcher, &dsp.public_key(), info).unwrap();
//! let mut sealer = LabelSealer::new(key).unwrap();
//! let sealed = sealer.seal_one(b"2VwhmTY9MecgWsu6").unwrap();
//!
//! let key = decapsulate(&enc, &dsp, &matcher.public_key(), info).unwrap();
//! assert!(open_label(&key, sealed.as_str(), b"2VwhmTY9MecgWsu6").unwrap());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod aead;
pub mod constant_time;
pub mod error;
pub mod hpke;
pub mod label;
pub mod random;
pub mod x25519;

pub use error::CryptoError;

/// X25519 public key size
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// X25519 secret key size
pub const X25519_SECRET_KEY_SIZE: usize = 32;
