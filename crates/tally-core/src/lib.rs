//! # TALLY Core
//!
//! Key lifecycle and label flows for the TALLY activation protocol.
//!
//! This crate provides:
//! - Identities with rotating key rings ([`keystore`])
//! - The receiver's transaction key cache ([`cache`])
//! - Campaign configuration and label messages ([`campaign`], [`message`])
//! - Sender and receiver flows ([`Sender`], [`Receiver`])
//! - Configuration and error types
//!
//! ## Flow
//!
//! ```text
//! Matching system (Sender)                 DSP (Receiver)
//!     |                                        |
//!     |-- lookup DSP keys (directory) -------->|
//!     |   establish(): encapsulate             |
//!     |                                        |
//!     |== Campaign (out-of-band) =============>|
//!     |                     lookup sender keys |
//!     |                activate(): decapsulate |
//!     |                                        |
//!     |-- LabelMessage (bid stream) ---------->|
//!     |                           open_batch() |
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use tally_core::{KeyStore, Receiver, Sender, SharedIdentity, TransactionId};
//! use tally_discovery::TrustedKeySet;
//!
//! let store = KeyStore::default();
//! let ms = store.initialize("match-system-operator.com").unwrap();
//! let dsp = store.initialize("dsp.example").unwrap();
//! let ms_trust = TrustedKeySet::new(ms.name(), ms.public_keys()).unwrap();
//! let dsp_trust = TrustedKeySet::new(dsp.name(), dsp.public_keys()).unwrap();
//! let dsp_key = *dsp.current().public_key();
//!
//! let sender = Sender::new(SharedIdentity::new(ms));
//! let receiver = Receiver::new(SharedIdentity::new(dsp), Arc::default());
//!
//! let txid = TransactionId::new("2VwhmTY9MecgWsu6").unwrap();
//! let campaign = sender.establish("dsp.example", &dsp_key, &dsp_trust, txid).unwrap();
//! receiver.activate(&campaign, &ms_trust, &dsp_trust).unwrap();
//!
//! let message = sender.seal_batch([("2VwhmTY9MecgWsu6", true)]).unwrap();
//! let opened = receiver.open_batch(&message);
//! assert_eq!(opened.get("2VwhmTY9MecgWsu6"), Some(&true));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod cache;
pub mod campaign;
pub mod config;
pub mod error;
pub mod keystore;
pub mod message;
pub mod receiver;
pub mod sender;

pub use cache::{CacheConfig, LabelKeyCache};
pub use campaign::{Campaign, TransactionId};
pub use config::{LoggingConfig, TallyConfig};
pub use error::{CoreError, Result};
pub use keystore::{Identity, KeyPair, KeyStore, RotationPolicy, SharedIdentity};
pub use message::{EncryptedLabel, LabelMessage};
pub use receiver::Receiver;
pub use sender::Sender;
