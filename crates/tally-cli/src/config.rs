//! Configuration file for the TALLY CLI.
//!
//! ```toml
//! [identity]
//! name = "dsp.example"
//! private_keys = ["<hex>", "<hex>"]   # newest first
//!
//! [discovery]
//! lookup_timeout_secs = 5
//!
//! [[directory]]
//! authority = "match-system-operator.com"
//! records = ["v=1; k=x25519; p=<base64url>"]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tally_core::{CacheConfig, Identity, KeyPair, RotationPolicy, TallyConfig};
use tally_discovery::{DiscoveryConfig, StaticDirectory, TrustedKeySet};

/// TALLY CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Local identity
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Key lookup configuration
    #[serde(default)]
    pub discovery: DiscoverySection,
    /// Transaction key cache configuration
    #[serde(default)]
    pub cache: CacheSection,
    /// Key rotation configuration
    #[serde(default)]
    pub rotation: RotationSection,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSection,
    /// Published key records, per authority
    #[serde(default)]
    pub directory: Vec<DirectoryEntry>,
}

/// Local identity
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    /// Authority name
    #[serde(default)]
    pub name: String,
    /// Private keys as hex, newest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub private_keys: Vec<String>,
}

/// Key lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySection {
    /// Lookup timeout in seconds
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
    /// Refresh interval in seconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Maximum age of a cached key set in seconds
    #[serde(default = "default_max_staleness")]
    pub max_staleness_secs: u64,
}

/// Transaction key cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    /// Transaction key lifetime in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

/// Key rotation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationSection {
    /// Keys kept in the ring
    #[serde(default = "default_ring_size")]
    pub ring_size: usize,
    /// Minimum key lifetime in days before rotation
    #[serde(default = "default_min_key_lifetime")]
    pub min_key_lifetime_days: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Records published by one authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Authority name
    pub authority: String,
    /// Raw directory records, newest first
    #[serde(default)]
    pub records: Vec<String>,
}

// Default values

fn default_lookup_timeout() -> u64 {
    5
}

fn default_refresh_interval() -> u64 {
    3600
}

fn default_max_staleness() -> u64 {
    24 * 3600
}

fn default_cache_ttl() -> u64 {
    30 * 24 * 3600
}

fn default_ring_size() -> usize {
    5
}

fn default_min_key_lifetime() -> u64 {
    180
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            lookup_timeout_secs: default_lookup_timeout(),
            refresh_interval_secs: default_refresh_interval(),
            max_staleness_secs: default_max_staleness(),
        }
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl Default for RotationSection {
    fn default() -> Self {
        Self {
            ring_size: default_ring_size(),
            min_key_lifetime_days: default_min_key_lifetime(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// A file holding private keys is readable by its owner only (unix).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let secret = !self.identity.private_keys.is_empty();
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        if secret {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path)?;
        // The mode above only applies to newly created files
        #[cfg(unix)]
        if secret {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(contents.as_bytes())?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("tally/config.toml")
    }

    /// Load `path` if given, otherwise the default path if it exists,
    /// otherwise defaults
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Library configuration built from this file
    #[must_use]
    pub fn tally_config(&self) -> TallyConfig {
        TallyConfig {
            discovery: DiscoveryConfig {
                lookup_timeout: Duration::from_secs(self.discovery.lookup_timeout_secs),
                refresh_interval: Duration::from_secs(self.discovery.refresh_interval_secs),
                max_staleness: Duration::from_secs(self.discovery.max_staleness_secs),
            },
            cache: CacheConfig {
                ttl: Duration::from_secs(self.cache.ttl_secs),
            },
            rotation: RotationPolicy {
                ring_size: self.rotation.ring_size,
                min_key_lifetime: Duration::from_secs(
                    self.rotation.min_key_lifetime_days.saturating_mul(86_400),
                ),
            },
            logging: tally_core::LoggingConfig {
                level: self.logging.level.clone(),
            },
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.tally_config().validate()?;

        for entry in &self.directory {
            if entry.authority.is_empty() {
                anyhow::bail!("Directory entry with empty authority");
            }
            TrustedKeySet::from_records(entry.authority.as_str(), &entry.records)
                .map_err(|e| anyhow::anyhow!("Directory entry '{}': {}", entry.authority, e))?;
        }

        if !self.identity.private_keys.is_empty() && self.identity.name.is_empty() {
            anyhow::bail!("Identity has private keys but no name");
        }

        Ok(())
    }

    /// Local identity from the configured private keys
    ///
    /// `name` and `private_keys` override the file's values when given.
    ///
    /// # Errors
    ///
    /// Returns an error if no name or key is available or a key is malformed.
    pub fn identity(
        &self,
        name: Option<&str>,
        private_keys: &[String],
    ) -> anyhow::Result<Identity> {
        let name = name.unwrap_or(&self.identity.name);
        if name.is_empty() {
            anyhow::bail!("No identity name configured (use --authority or [identity].name)");
        }

        let keys: &[String] = if private_keys.is_empty() {
            &self.identity.private_keys
        } else {
            private_keys
        };
        if keys.is_empty() {
            anyhow::bail!("No private key configured (use --private-key or [identity].private_keys)");
        }

        let ring = keys
            .iter()
            .map(String::as_str)
            .map(KeyPair::from_private_hex)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Identity::from_ring(name, ring)?)
    }

    /// In-memory directory holding the configured records
    pub async fn directory(&self) -> StaticDirectory {
        let directory = StaticDirectory::new();
        for entry in &self.directory {
            directory
                .publish(entry.authority.as_str(), entry.records.iter().cloned())
                .await;
        }
        directory
    }
}
