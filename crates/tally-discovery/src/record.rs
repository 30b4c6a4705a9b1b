//! Directory record format.
//!
//! Each authority publishes its key ring as a list of text records under
//! `_tally-keys.<authority>`, one key per record, newest first:
//!
//! ```text
//! v=1; k=x25519; p=<43-char unpadded base64url public key>
//! ```
//!
//! Tags are `;`-separated `name=value` pairs with optional surrounding
//! whitespace. Unrecognized tags are ignored so new tags can be introduced
//! without breaking existing parsers.

use crate::error::DiscoveryError;
use std::fmt;
use std::str::FromStr;
use tally_crypto::x25519::PublicKey;

/// Record version understood by this parser
pub const RECORD_VERSION: &str = "1";

/// Key type tag value for X25519 keys
pub const KEY_TYPE_X25519: &str = "x25519";

/// Label prepended to the authority name to form the record location
pub const RECORD_PREFIX: &str = "_tally-keys";

/// Directory name holding the records for `authority`
#[must_use]
pub fn record_name(authority: &str) -> String {
    format!("{RECORD_PREFIX}.{authority}")
}

/// A single published key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryRecord {
    /// Published public key
    pub public_key: PublicKey,
}

impl DirectoryRecord {
    /// Create a record for a public key
    #[must_use]
    pub fn new(public_key: PublicKey) -> Self {
        Self { public_key }
    }
}

impl fmt::Display for DirectoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v={RECORD_VERSION}; k={KEY_TYPE_X25519}; p={}",
            self.public_key.to_base64url()
        )
    }
}

impl FromStr for DirectoryRecord {
    type Err = DiscoveryError;

    fn from_str(record: &str) -> Result<Self, Self::Err> {
        let mut version = None;
        let mut key_type = None;
        let mut key = None;

        for tag in record.split(';').map(str::trim).filter(|t| !t.is_empty()) {
            let (name, value) = tag
                .split_once('=')
                .ok_or_else(|| DiscoveryError::Parse(format!("tag without value: {tag:?}")))?;
            let slot = match name.trim() {
                "v" => &mut version,
                "k" => &mut key_type,
                "p" => &mut key,
                _ => continue,
            };
            if slot.replace(value.trim()).is_some() {
                return Err(DiscoveryError::Parse(format!("duplicate tag {name:?}")));
            }
        }

        match version {
            Some(RECORD_VERSION) => {}
            Some(other) => {
                return Err(DiscoveryError::Parse(format!(
                    "unsupported version {other:?}"
                )));
            }
            None => return Err(DiscoveryError::Parse("missing version tag".into())),
        }
        match key_type {
            Some(KEY_TYPE_X25519) => {}
            Some(other) => {
                return Err(DiscoveryError::Parse(format!(
                    "unsupported key type {other:?}"
                )));
            }
            None => return Err(DiscoveryError::Parse("missing key type tag".into())),
        }
        let key = key.ok_or_else(|| DiscoveryError::Parse("missing public key tag".into()))?;
        let public_key = PublicKey::from_base64url(key)
            .map_err(|e| DiscoveryError::Parse(format!("public key: {e}")))?;

        Ok(Self { public_key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_crypto::x25519::PrivateKey;

    #[test]
    fn test_record_name() {
        assert_eq!(record_name("dsp.example"), "_tally-keys.dsp.example");
    }

    #[test]
    fn test_display_parse_roundtrip() {
        let public = PrivateKey::generate().unwrap().public_key();
        let text = DirectoryRecord::new(public).to_string();
        assert!(text.starts_with("v=1; k=x25519; p="));
        assert_eq!(text.len(), "v=1; k=x25519; p=".len() + 43);

        let parsed: DirectoryRecord = text.parse().unwrap();
        assert_eq!(parsed.public_key, public);
    }

    #[test]
    fn test_parse_tolerates_spacing_order_and_unknown_tags() {
        let public = PrivateKey::generate().unwrap().public_key();
        let text = format!("  p = {} ;k=x25519;  t=s ; v=1;", public.to_base64url());
        let parsed: DirectoryRecord = text.parse().unwrap();
        assert_eq!(parsed.public_key, public);
    }

    #[test]
    fn test_parse_rejects_bad_records() {
        let key = PrivateKey::generate().unwrap().public_key().to_base64url();
        let bad = [
            format!("v=2; k=x25519; p={key}"),
            format!("v=1; k=ed25519; p={key}"),
            format!("k=x25519; p={key}"),
            format!("v=1; p={key}"),
            "v=1; k=x25519".to_string(),
            "v=1; k=x25519; p=not base64!".to_string(),
            "v=1; k=x25519; p=AAAA".to_string(),
            format!("v=1; v=1; k=x25519; p={key}"),
            format!("v=1; k=x25519; p{key}"),
            String::new(),
        ];

        for record in bad {
            assert!(
                matches!(record.parse::<DirectoryRecord>(), Err(DiscoveryError::Parse(_))),
                "accepted {record:?}"
            );
        }
    }
}
