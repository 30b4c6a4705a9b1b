//! Discovery error types.

use std::time::Duration;
use thiserror::Error;

/// Key authority lookup and trust errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The directory could not be queried or had no records for the name
    #[error("Lookup failed for {authority}: {reason}")]
    Lookup {
        /// Authority domain name
        authority: String,
        /// Failure description
        reason: String,
    },

    /// The directory did not answer within the configured timeout
    #[error("Lookup for {authority} timed out after {timeout:?}")]
    Timeout {
        /// Authority domain name
        authority: String,
        /// Configured lookup timeout
        timeout: Duration,
    },

    /// A directory record could not be parsed
    #[error("Invalid directory record: {0}")]
    Parse(String),

    /// The authority published more keys than a ring may hold
    #[error("{authority} published {count} keys (max {max})")]
    TooManyKeys {
        /// Authority domain name
        authority: String,
        /// Number of records returned
        count: usize,
        /// Maximum accepted
        max: usize,
    },

    /// No fresh key set is available for the authority
    #[error("No fresh key set for {0}")]
    Untrusted(String),
}

impl DiscoveryError {
    /// Returns true if a later lookup may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Lookup { .. } | Self::Timeout { .. })
    }
}
