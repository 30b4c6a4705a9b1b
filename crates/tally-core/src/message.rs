//! Label messages
//!
//! The bid-stream fragment carrying sealed labels from one sender:
//!
//! ```json
//! {
//!   "authority": "match-system-operator.com",
//!   "labels": [
//!     { "transaction_id": "2VwhmTY9MecgWsu6", "label": "<40-char base64>" }
//!   ]
//! }
//! ```
//!
//! Fields are kept as plain strings: the message arrives from untrusted
//! hops, and every entry is validated when it is opened.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// One sealed label for a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedLabel {
    /// Transaction id (the label's associated data)
    pub transaction_id: String,
    /// Base64 `nonce || ciphertext || tag`
    pub label: String,
}

/// Sealed labels from one sender authority
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMessage {
    /// Sender authority
    pub authority: String,
    /// Sealed labels
    #[serde(default)]
    pub labels: Vec<EncryptedLabel>,
}

impl LabelMessage {
    /// Create an empty message for `authority`
    #[must_use]
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            labels: Vec::new(),
        }
    }

    /// Append a label
    pub fn push(&mut self, label: EncryptedLabel) {
        self.labels.push(label);
    }

    /// Parse from JSON
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Serialization` for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render as JSON
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
