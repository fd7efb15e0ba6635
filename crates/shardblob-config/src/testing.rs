//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - A temporary store root
//! - A project directory for config files
//! - A config with cheap key derivation, so encrypted stores open in milliseconds
//!
//! # Usage
//!
//! ```ignore
//! use shardblob_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     let store = env.create_store(Some("pw")).unwrap();
//!     // env.store_root and env.project_root are isolated
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use shardblob_cas::BlobStore;
use tempfile::TempDir;

use crate::Config;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Isolated store root (not created until a store is)
    pub store_root: PathBuf,
    /// Project root for config files
    pub project_root: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let project_root = root.join("project");
        let store_root = root.join("store");
        std::fs::create_dir_all(project_root.join(".shardblob"))?;

        Ok(Self {
            _temp_dir: temp_dir,
            store_root,
            project_root,
            test_id,
        })
    }

    /// Config pointing at this environment, with test-speed settings.
    ///
    /// The passphrase variable is unique per environment so parallel tests
    /// never see each other's passphrase.
    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.storage.root = self.store_root.clone();
        cfg.storage.sync_writes = false;
        cfg.crypto.memory_kib = 64;
        cfg.crypto.iterations = 1;
        cfg.crypto.passphrase_env = self.passphrase_env();
        cfg
    }

    /// Name of the environment variable `config()` reads the passphrase from.
    pub fn passphrase_env(&self) -> String {
        format!("SHARDBLOB_TEST_PASSPHRASE_{}_{}", std::process::id(), self.test_id)
    }

    /// Project config path (`<project>/.shardblob/config.toml`)
    pub fn project_config_path(&self) -> PathBuf {
        self.project_root.join(crate::PROJECT_CONFIG)
    }

    /// Write the project config file
    pub fn write_project_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.project_config_path();
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Create a store at `store_root` using `config()`'s options.
    pub fn create_store(&self, passphrase: Option<&str>) -> anyhow::Result<BlobStore> {
        let cfg = self.config();
        Ok(BlobStore::create_with(
            &self.store_root,
            passphrase,
            cfg.store_options(),
        )?)
    }

    /// Open the existing store at `store_root`.
    pub fn open_store(&self, passphrase: Option<&str>) -> anyhow::Result<BlobStore> {
        let cfg = self.config();
        Ok(BlobStore::open_with(
            &self.store_root,
            passphrase,
            cfg.store_options(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardblob_cas::BlobMeta;

    #[test]
    fn test_environment_creates_directories() {
        let env = TestEnvironment::new().unwrap();
        assert!(env.project_root.join(".shardblob").is_dir());
        assert!(!env.store_root.exists());
    }

    #[test]
    fn test_environment_is_unique() {
        let env1 = TestEnvironment::new().unwrap();
        let env2 = TestEnvironment::new().unwrap();
        assert_ne!(env1.store_root, env2.store_root);
        assert_ne!(env1.passphrase_env(), env2.passphrase_env());
    }

    #[test]
    fn test_config_uses_cheap_kdf() {
        let env = TestEnvironment::new().unwrap();
        let cfg = env.config();
        assert_eq!(cfg.store_root(), env.store_root);
        assert_eq!(cfg.crypto.memory_kib, 64);
        assert!(!cfg.storage.sync_writes);
    }

    #[test]
    fn test_create_and_reopen_store() {
        let env = TestEnvironment::new().unwrap();
        let id = {
            let store = env.create_store(Some("pw")).unwrap();
            store.put(b"payload", BlobMeta::new("p", "")).unwrap()
        };
        let store = env.open_store(Some("pw")).unwrap();
        assert_eq!(store.get(&id).unwrap().0, b"payload");
    }

    #[test]
    fn test_write_project_config() {
        let env = TestEnvironment::new().unwrap();
        let path = env.write_project_config("[logging]\nlevel = \"debug\"\n").unwrap();
        assert!(path.exists());
        assert_eq!(path, env.project_config_path());
    }
}
