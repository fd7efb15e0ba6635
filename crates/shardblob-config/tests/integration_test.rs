//! Integration tests for shardblob-config
//!
//! These tests verify the full config loading pipeline with real file system operations,
//! and that a loaded config drives a working store.

use std::path::PathBuf;

use shardblob_cas::{BlobMeta, BlobStore, CasError, KdfAlgorithm, KeyDerivation};
use shardblob_config::testing::TestEnvironment;
use shardblob_config::{Config, LogLevel};
use tempfile::tempdir;

/// Test config loading from real global config file
#[test]
fn test_load_global_config_from_file() {
    let temp = tempdir().unwrap();
    let global_dir = temp.path().join(".shardblob");
    std::fs::create_dir_all(&global_dir).unwrap();

    let config_content = r#"
[storage]
root = "/custom/store"
compression_level = 9
sync_writes = false

[crypto]
kdf = "legacy-pad"
memory_kib = 1024
passphrase_env = "MY_STORE_PW"

[logging]
level = "debug"
"#;
    let path = global_dir.join("config.toml");
    std::fs::write(&path, config_content).unwrap();

    let config: Config = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

    assert_eq!(config.storage.root, PathBuf::from("/custom/store"));
    assert_eq!(config.storage.compression_level, 9);
    assert!(!config.storage.sync_writes);
    assert_eq!(config.crypto.kdf, KdfAlgorithm::LegacyPad);
    assert_eq!(config.crypto.memory_kib, 1024);
    assert_eq!(config.crypto.iterations, 3);
    assert_eq!(config.crypto.passphrase_env, "MY_STORE_PW");
    assert_eq!(config.logging.level, LogLevel::Debug);
}

/// Test config hierarchy: project config overrides global, key by key
#[test]
fn test_config_hierarchy_project_overrides_global() {
    let temp = tempdir().unwrap();

    let global_dir = temp.path().join("global/.shardblob");
    std::fs::create_dir_all(&global_dir).unwrap();
    let global_config = r#"
[storage]
compression_level = 1
sync_writes = false

[crypto]
iterations = 5
"#;
    let global_path = global_dir.join("config.toml");
    std::fs::write(&global_path, global_config).unwrap();

    let project_dir = temp.path().join("project/.shardblob");
    std::fs::create_dir_all(&project_dir).unwrap();
    let project_config = r#"
[storage]
compression_level = 8

[logging]
level = "warn"
"#;
    let project_path = project_dir.join("config.toml");
    std::fs::write(&project_path, project_config).unwrap();

    let config = Config::load_from(Some(global_path.as_path()), Some(project_path.as_path()))
        .unwrap();

    // Overridden by project
    assert_eq!(config.storage.compression_level, 8);
    // Preserved from global
    assert!(!config.storage.sync_writes);
    assert_eq!(config.crypto.iterations, 5);
    // Defaults untouched by either file
    assert_eq!(config.crypto.parallelism, 1);
}

/// Test config with environment-style overrides
#[test]
fn test_config_env_override_integration() {
    let config_toml = r#"
[storage]
root = "~/.shardblob/store"

[logging]
level = "info"
"#;
    let mut config: Config = toml::from_str(config_toml).unwrap();

    config.apply_overrides(|key| match key {
        "SHARDBLOB_ROOT" => Some("/override/path".to_string()),
        "SHARDBLOB_LOG" => Some("trace".to_string()),
        _ => None,
    });

    assert_eq!(config.storage.root, PathBuf::from("/override/path"));
    assert_eq!(config.store_root(), PathBuf::from("/override/path"));
    assert_eq!(config.logging.level, LogLevel::Trace);
    assert_eq!(config.crypto.kdf, KdfAlgorithm::Argon2id);
}

/// Test complete config serialization/deserialization cycle
#[test]
fn test_config_full_roundtrip_with_all_sections() {
    let original = Config::default();

    let temp = tempdir().unwrap();
    let config_path = temp.path().join("config.toml");
    std::fs::write(&config_path, Config::default_toml().unwrap()).unwrap();

    let contents = std::fs::read_to_string(&config_path).unwrap();
    let loaded: Config = toml::from_str(&contents).unwrap();

    assert_eq!(original, loaded);
}

/// Test partial config with defaults filling in
#[test]
fn test_partial_config_defaults_applied() {
    let partial = r#"
[crypto]
kdf = "legacy-pad"
"#;
    let config: Config = toml::from_str(partial).unwrap();

    assert_eq!(config.crypto.kdf, KdfAlgorithm::LegacyPad);
    assert_eq!(config.crypto.memory_kib, 65536);
    assert_eq!(config.storage.compression_level, 6);
    assert!(config.storage.sync_writes);
    assert_eq!(config.logging.level, LogLevel::Info);
}

/// Unknown values for typed keys are rejected at load time
#[test]
fn test_invalid_kdf_rejected() {
    let result: Result<Config, _> = toml::from_str("[crypto]\nkdf = \"md5\"\n");
    assert!(result.is_err());
}

/// A config-driven store picks up the configured passphrase and KDF
#[test]
fn test_config_drives_encrypted_store() {
    let env = TestEnvironment::new().unwrap();
    let config = env.config();
    let var = env.passphrase_env();
    let passphrase = config.passphrase_from(|key| {
        (key == var).then(|| "from-the-environment".to_string())
    });
    assert_eq!(passphrase.as_deref(), Some("from-the-environment"));

    let store = BlobStore::create_with(
        config.store_root(),
        passphrase.as_deref(),
        config.store_options(),
    )
    .unwrap();
    assert!(store.settings().is_encrypted());
    let id = store
        .put(b"configured payload", BlobMeta::new("cfg", "file:///cfg"))
        .unwrap();

    let descriptor = KeyDerivation::load(&env.store_root).unwrap().unwrap();
    assert_eq!(descriptor.algorithm(), KdfAlgorithm::Argon2id);

    let reopened = env.open_store(Some("from-the-environment")).unwrap();
    assert_eq!(reopened.get(&id).unwrap().0, b"configured payload");

    let wrong = env.open_store(Some("guess")).unwrap();
    assert!(matches!(
        wrong.get(&id),
        Err(CasError::AuthenticationFailure)
    ));

    // Plain access to an encrypted store is refused.
    assert!(matches!(
        env.open_store(None),
        Err(e) if matches!(e.downcast_ref::<CasError>(), Some(CasError::KeyDerivation(_)))
    ));
}

/// Without a passphrase in the environment the store is plain
#[test]
fn test_config_without_passphrase_is_plain_store() {
    let env = TestEnvironment::new().unwrap();
    let store = env.config().create_store().unwrap();
    assert!(!store.settings().is_encrypted());
    assert!(KeyDerivation::load(&env.store_root).unwrap().is_none());

    let id = store.put(b"plain", BlobMeta::new("plain", "")).unwrap();
    assert_eq!(store.stats().unwrap().total_object_count, 1);
    assert!(store.exists(&id).unwrap());
}

/// Project file written by the test environment is honoured
#[test]
fn test_project_config_from_environment() {
    let env = TestEnvironment::new().unwrap();
    let path = env
        .write_project_config("[storage]\ncompression_level = 0\n")
        .unwrap();

    let config = Config::load_from(None, Some(path.as_path())).unwrap();
    assert_eq!(config.storage.compression_level, 0);
    assert_eq!(config.store_options().compression_level, 0);
}
