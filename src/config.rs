//! Botbrain configuration management

use crate::error::{Error, Result};
use crate::storage::MEMORY_PROVIDER;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the brain unlocking passphrase
pub const ENCRYPTION_KEY_ENV: &str = "BOTBRAIN_ENCRYPTION_KEY";

/// Main Botbrain configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    /// Brain configuration
    #[serde(default)]
    pub brain: BrainConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

impl BotConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(ENCRYPTION_KEY_ENV) {
            self.brain.apply_encryption_key(key);
        }
    }

    /// Default config file location, `~/.botbrain/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|h| h.join(".botbrain").join("config.toml"))
    }
}

/// Brain configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct BrainConfig {
    /// Storage provider name
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Encrypt every datum at rest
    #[serde(default)]
    pub encrypt_brain: bool,

    /// Unlocking passphrase (32+ bytes); prefer the environment variable
    #[serde(default, skip_serializing)]
    pub encryption_key: Option<String>,

    /// Lock aging tick in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Short-term memory lifetime in seconds
    #[serde(default = "default_short_term_ttl_secs")]
    pub short_term_ttl_secs: u64,

    /// Provider-specific settings, handed to the provider factory untouched
    #[serde(default)]
    pub provider_config: toml::Table,
}

fn default_provider() -> String {
    MEMORY_PROVIDER.to_string()
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_short_term_ttl_secs() -> u64 {
    7 * 60
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            provider_config: toml::Table::new(),
            encrypt_brain: false,
            encryption_key: None,
            tick_interval_ms: default_tick_interval_ms(),
            short_term_ttl_secs: default_short_term_ttl_secs(),
        }
    }
}

impl BrainConfig {
    /// Lock aging tick; a zero setting is clamped to one millisecond
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// Short-term memory lifetime
    pub fn short_term_ttl(&self) -> Duration {
        Duration::from_secs(self.short_term_ttl_secs)
    }

    fn apply_encryption_key(&mut self, key: String) {
        if !key.is_empty() {
            self.encryption_key = Some(key);
        }
    }
}

impl std::fmt::Debug for BrainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrainConfig")
            .field("provider", &self.provider)
            .field("provider_config", &self.provider_config)
            .field("encrypt_brain", &self.encrypt_brain)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("tick_interval_ms", &self.tick_interval_ms)
            .field("short_term_ttl_secs", &self.short_term_ttl_secs)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default level filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
