//! # TALLY Discovery
//!
//! Key authority layer for TALLY.
//!
//! Every participant publishes the public half of its key ring in a
//! directory under its domain name. Before a campaign is activated, both
//! public keys it names must be present in the fresh set published by the
//! owning authority.
//!
//! This crate provides:
//! - The directory record format (`v=1; k=x25519; p=<base64url key>`)
//! - The [`KeyAuthority`] trait and an in-memory [`StaticDirectory`]
//! - [`TrustedKeySet`] with constant-time membership tests
//! - [`TrustCache`], which bounds lookups with a timeout and falls back to
//!   the last fresh set when the directory is unreachable
//!
//! ## Example
//!
//! ```
//! use tally_discovery::{DirectoryRecord, DiscoveryConfig, StaticDirectory, TrustCache};
//! use tally_crypto::x25519::PrivateKey;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let key = PrivateKey::generate().unwrap().public_key();
//! let directory = StaticDirectory::new();
//! directory
//!     .publish("dsp.example", [DirectoryRecord::new(key).to_string()])
//!     .await;
//!
//! let cache = TrustCache::new(directory, DiscoveryConfig::default());
//! assert!(cache.is_trusted("dsp.example", &key).await);
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod authority;
pub mod cache;
pub mod error;
pub mod record;

pub use authority::{KeyAuthority, MAX_PUBLISHED_KEYS, StaticDirectory, TrustedKeySet};
pub use cache::{DiscoveryConfig, TrustCache};
pub use error::DiscoveryError;
pub use record::{DirectoryRecord, record_name};
