//! # shardblob-config
//!
//! Configuration management for shardblob.
//!
//! Loads configuration from:
//! 1. `~/.shardblob/config.toml` (global)
//! 2. `.shardblob/config.toml` (project-local, overrides global key by key)
//! 3. Environment variables (highest priority)
//!
//! There is no process-wide instance: callers load a [`Config`] and hand the
//! derived [`StoreOptions`] to each store they open.

pub mod logging;
pub mod testing;

pub use logging::{init_logging, LogLevel};

use serde::{Deserialize, Serialize};
use shardblob_cas::{BlobStore, KdfAlgorithm, KdfParams, StoreOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Project-local config file, relative to the working directory.
pub const PROJECT_CONFIG: &str = ".shardblob/config.toml";

pub const ENV_ROOT: &str = "SHARDBLOB_ROOT";
pub const ENV_LOG: &str = "SHARDBLOB_LOG";
pub const ENV_KDF: &str = "SHARDBLOB_KDF";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        Self::load_from(global.as_deref(), Some(Path::new(PROJECT_CONFIG)))
    }

    /// Load from explicit global and project files, then apply the environment.
    ///
    /// Missing files are skipped. The project file only overrides the keys it
    /// actually sets.
    pub fn load_from(global: Option<&Path>, project: Option<&Path>) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();

        for path in [global, project].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)?;
            let layer: toml::Table = contents.parse()?;
            merge_tables(&mut merged, layer);
        }

        let mut config: Config = toml::Value::Table(merged).try_into()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Global config path: ~/.shardblob/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".shardblob/config.toml"))
    }

    /// Apply overrides from `lookup` (the process environment in [`Config::load`]).
    ///
    /// Unparsable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_ROOT) {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(level) = lookup(ENV_LOG) {
            match level.parse() {
                Ok(level) => self.logging.level = level,
                Err(e) => warn!("Ignoring {}: {}", ENV_LOG, e),
            }
        }
        if let Some(kdf) = lookup(ENV_KDF) {
            match parse_kdf(&kdf) {
                Some(kdf) => self.crypto.kdf = kdf,
                None => warn!("Ignoring {}: unknown algorithm {:?}", ENV_KDF, kdf),
            }
        }
    }

    /// Store root with a leading `~` expanded.
    pub fn store_root(&self) -> PathBuf {
        expand_tilde(&self.storage.root)
    }

    /// Engine options described by `[storage]` and `[crypto]`.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            compression_level: self.storage.compression_level,
            sync_writes: self.storage.sync_writes,
            kdf: KdfParams {
                algorithm: self.crypto.kdf,
                memory_kib: self.crypto.memory_kib,
                iterations: self.crypto.iterations,
                parallelism: self.crypto.parallelism,
            },
        }
    }

    /// Passphrase from the configured environment variable; empty counts as unset.
    pub fn passphrase(&self) -> Option<String> {
        self.passphrase_from(|key| std::env::var(key).ok())
    }

    /// Passphrase read through `lookup` under the configured variable name.
    pub fn passphrase_from<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(&self.crypto.passphrase_env).filter(|p| !p.is_empty())
    }

    /// Create (or reuse) the configured store.
    pub fn create_store(&self) -> shardblob_cas::Result<BlobStore> {
        let passphrase = self.passphrase();
        BlobStore::create_with(
            self.store_root(),
            passphrase.as_deref(),
            self.store_options(),
        )
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(incoming) => {
                if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, incoming);
                    continue;
                }
                base.insert(key, toml::Value::Table(incoming));
            }
            other => {
                base.insert(key, other);
            }
        }
    }
}

fn parse_kdf(value: &str) -> Option<KdfAlgorithm> {
    match value.trim().to_ascii_lowercase().as_str() {
        "argon2id" => Some(KdfAlgorithm::Argon2id),
        "legacy-pad" => Some(KdfAlgorithm::LegacyPad),
        _ => None,
    }
}

/// Expand a leading `~` component to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Store root directory
    pub root: PathBuf,
    /// Gzip level, 0..=9
    pub compression_level: u32,
    /// fsync temp files before renaming them into place
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let options = StoreOptions::default();
        Self {
            root: PathBuf::from("~/.shardblob/store"),
            compression_level: options.compression_level,
            sync_writes: options.sync_writes,
        }
    }
}

/// Key derivation for new encrypted stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    pub kdf: KdfAlgorithm,
    /// Argon2 memory cost in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    /// Environment variable holding the passphrase
    pub passphrase_env: String,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        let params = KdfParams::default();
        Self {
            kdf: params.algorithm,
            memory_kib: params.memory_kib,
            iterations: params.iterations,
            parallelism: params.parallelism,
            passphrase_env: "SHARDBLOB_PASSPHRASE".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}
