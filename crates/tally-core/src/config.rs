//! TALLY configuration

use crate::cache::CacheConfig;
use crate::error::{CoreError, Result};
use crate::keystore::RotationPolicy;
use tally_discovery::DiscoveryConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TallyConfig {
    /// Key lookup and trust caching
    pub discovery: DiscoveryConfig,

    /// Transaction key cache
    pub cache: CacheConfig,

    /// Key ring size and rotation cadence
    pub rotation: RotationPolicy,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl TallyConfig {
    /// Validate every section
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] naming the first bad value.
    pub fn validate(&self) -> Result<()> {
        self.discovery
            .validate()
            .map_err(|e| CoreError::InvalidConfig(format!("discovery: {e}").into()))?;
        if self.cache.ttl.is_zero() {
            return Err(CoreError::invalid_config("cache: ttl must be non-zero"));
        }
        self.rotation.validate()?;
        self.logging.validate()
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Validate the log level name
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for an unknown level.
    pub fn validate(&self) -> Result<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            Ok(())
        } else {
            Err(CoreError::InvalidConfig(
                format!("logging: unknown level {:?}", self.level).into(),
            ))
        }
    }
}
