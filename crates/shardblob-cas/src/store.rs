//! Storage engine.
//!
//! A [`BlobStore`] owns one store root. All mutating operations (put, delete,
//! purge) take the engine's write lock; reads take the read lock. Within one
//! engine this makes the dedup check and the following write a single critical
//! section. Two engines pointed at the same root, in one process or several, are
//! not coordinated: racing puts of the same new content both write identical
//! bytes and the last sidecar rename wins.
//!
//! ## Lazy key verification
//!
//! Opening a store never checks the passphrase. A wrong passphrase derives a
//! wrong key, which surfaces as [`CasError::AuthenticationFailure`] on the first
//! `get` of an existing object.
//!
//! ## Encryption mode
//!
//! A root is either wholly encrypted or wholly plain. It counts as encrypted when
//! it holds a key descriptor, or when its objects are not bare gzip streams
//! (stores written before descriptors existed). Creating or opening a root with
//! the wrong mode, a passphrase for a plain store or none for an encrypted one,
//! fails with [`CasError::KeyDerivation`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::fsutil;
use crate::id::{identify, BlobId};
use crate::key::{KdfParams, KeyDerivation, StoreKey, DESCRIPTOR_FILE};
use crate::layout;
use crate::observer::StoreObserver;
use crate::sidecar::{self, BlobMeta};
use crate::transform::{self, DEFAULT_COMPRESSION_LEVEL};
use crate::traverse::{self, StoreStats};
use crate::{CasError, Result};

/// Tunables fixed when a store is created or opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Gzip level, 0..=9.
    pub compression_level: u32,
    /// Key derivation used when `create` sets up a new encrypted store.
    pub kdf: KdfParams,
    /// `fsync` temp files before renaming them into place.
    pub sync_writes: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            kdf: KdfParams::default(),
            sync_writes: true,
        }
    }
}

/// Immutable per-engine configuration: root, key and how the key was derived.
#[derive(Debug)]
pub struct StoreSettings {
    root: PathBuf,
    key: Option<StoreKey>,
    key_derivation: Option<KeyDerivation>,
    options: StoreOptions,
}

impl StoreSettings {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    pub fn key_derivation(&self) -> Option<&KeyDerivation> {
        self.key_derivation.as_ref()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }
}

/// Content-addressable blob store rooted at one directory.
pub struct BlobStore {
    settings: StoreSettings,
    lock: RwLock<()>,
    observers: Vec<Arc<dyn StoreObserver>>,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("settings", &self.settings)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl BlobStore {
    /// Create (or re-create over) a store at `path` with default options.
    pub fn create<P: AsRef<Path>>(path: P, passphrase: Option<&str>) -> Result<Self> {
        Self::create_with(path, passphrase, StoreOptions::default())
    }

    /// Create the root directory if needed and set up the key.
    ///
    /// Idempotent: an existing, usable root is accepted as-is, and an existing
    /// key descriptor is reused rather than replaced. An encrypted root without a
    /// descriptor gets a `LegacyPad` one. A passphrase must be given exactly when
    /// the existing root is encrypted.
    pub fn create_with<P: AsRef<Path>>(
        path: P,
        passphrase: Option<&str>,
        options: StoreOptions,
    ) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Self::ensure_dir(&root)?;

        let (key, key_derivation) = resolve_key(&root, passphrase, &options, true)?;

        info!(
            "[STORE] created {:?} (encrypted: {})",
            root,
            key.is_some()
        );
        Ok(Self::from_settings(StoreSettings {
            root,
            key,
            key_derivation,
            options,
        }))
    }

    /// Open an existing store with default options.
    pub fn open<P: AsRef<Path>>(path: P, passphrase: Option<&str>) -> Result<Self> {
        Self::open_with(path, passphrase, StoreOptions::default())
    }

    /// Open an existing store root.
    ///
    /// The root must exist and be a directory. With a passphrase, the key is
    /// derived from the store's descriptor, or with `LegacyPad` when the store
    /// has none. The passphrase itself is not verified here, but opening an
    /// encrypted store without one (or a plain store with one) is refused.
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        passphrase: Option<&str>,
        options: StoreOptions,
    ) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        Self::ensure_dir(&root)?;

        let (key, key_derivation) = resolve_key(&root, passphrase, &options, false)?;

        debug!("[STORE] opened {:?} (encrypted: {})", root, key.is_some());
        Ok(Self::from_settings(StoreSettings {
            root,
            key,
            key_derivation,
            options,
        }))
    }

    fn from_settings(settings: StoreSettings) -> Self {
        Self {
            settings,
            lock: RwLock::new(()),
            observers: Vec::new(),
        }
    }

    fn ensure_dir(root: &Path) -> Result<()> {
        let meta = fs::metadata(root)?;
        if !meta.is_dir() {
            return Err(CasError::InvalidRoot {
                path: root.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Register a downstream collaborator (e.g. a search index).
    pub fn with_observer(mut self, observer: Arc<dyn StoreObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.settings.root
    }

    /// Absolute path of the object file for `id`.
    pub fn object_path(&self, id: &BlobId) -> PathBuf {
        self.settings.root.join(layout::shard(id))
    }

    /// Absolute path of the metadata sidecar for `id`.
    pub fn sidecar_path(&self, id: &BlobId) -> PathBuf {
        layout::sidecar_of(&self.object_path(id))
    }

    /// Store a payload and return its id.
    ///
    /// If the object already exists nothing is written and `meta` is discarded:
    /// the first writer's metadata wins. Otherwise the payload is sealed and
    /// written together with its sidecar; `length` and `blob_hash` in the sidecar
    /// are always computed here, whatever the caller passed.
    #[instrument(skip(self, data, meta), level = "debug", fields(len = data.len()))]
    pub fn put(&self, data: &[u8], meta: BlobMeta) -> Result<BlobId> {
        let id = identify(data);
        let object_path = self.object_path(&id);

        let record = {
            let _guard = self.lock.write();

            if object_path.try_exists()? {
                debug!("[STORE] dedup hit for {}", id);
                return Ok(id);
            }

            let sealed = transform::seal(
                data,
                self.settings.key.as_ref(),
                self.settings.options.compression_level,
            )?;

            if let Some(parent) = object_path.parent() {
                fs::create_dir_all(parent)?;
            }

            let record = meta.stamped(&id, data.len());
            self.write_pair(&object_path, &sealed, &record)?;
            record
        };

        debug!("[STORE] stored {} ({} bytes)", id, data.len());
        self.notify(|o| o.on_put(&id, data, &record), "put", &id);
        Ok(id)
    }

    /// Write object and sidecar so that a visible object always has its sidecar.
    ///
    /// Both are staged as temp files; the sidecar is renamed first and removed
    /// again if the object rename fails.
    fn write_pair(&self, object_path: &Path, sealed: &[u8], record: &BlobMeta) -> Result<()> {
        let sync = self.settings.options.sync_writes;
        let sidecar_path = layout::sidecar_of(object_path);

        let meta_bytes = sidecar::encode(record)?;
        let object_temp = fsutil::write_temp(object_path, sealed, sync)?;
        let meta_temp = match fsutil::write_temp(&sidecar_path, &meta_bytes, sync) {
            Ok(temp) => temp,
            Err(e) => {
                let _ = fs::remove_file(&object_temp);
                return Err(e.into());
            }
        };

        if let Err(e) = fsutil::commit(&meta_temp, &sidecar_path) {
            let _ = fs::remove_file(&object_temp);
            return Err(e.into());
        }
        if let Err(e) = fsutil::commit(&object_temp, object_path) {
            let _ = fs::remove_file(&sidecar_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Load a payload and its metadata.
    #[instrument(skip(self), level = "debug")]
    pub fn get(&self, id: &BlobId) -> Result<(Vec<u8>, BlobMeta)> {
        let object_path = self.object_path(id);
        let _guard = self.lock.read();

        let sealed = match fs::read(&object_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CasError::NotFound {
                    id: id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let plaintext = transform::open(&sealed, self.settings.key.as_ref())?;

        let meta = sidecar::read(&layout::sidecar_of(&object_path)).map_err(|e| {
            if e.is_not_found() {
                CasError::NotFound {
                    id: id.to_string(),
                }
            } else {
                e
            }
        })?;

        Ok((plaintext, meta))
    }

    /// True iff the object file is present. The sidecar is not consulted.
    pub fn exists(&self, id: &BlobId) -> Result<bool> {
        let _guard = self.lock.read();
        Ok(self.object_path(id).try_exists()?)
    }

    /// Remove an object and its sidecar. Absent files are not an error.
    #[instrument(skip(self), level = "debug")]
    pub fn delete(&self, id: &BlobId) -> Result<()> {
        let object_path = self.object_path(id);
        {
            let _guard = self.lock.write();
            let removed_object = fsutil::remove_if_exists(&object_path)?;
            let removed_sidecar = fsutil::remove_if_exists(&layout::sidecar_of(&object_path))?;
            debug!(
                "[STORE] delete {} (object: {}, sidecar: {})",
                id, removed_object, removed_sidecar
            );
        }

        self.notify(|o| o.on_delete(id), "delete", id);
        Ok(())
    }

    /// Remove everything under the root, keeping the root itself.
    ///
    /// The key descriptor is never removed, so an encrypted store stays
    /// reopenable with the same passphrase even if the purge is interrupted.
    /// A store opened through the `LegacyPad` fallback gets its descriptor
    /// written here, since after the purge nothing else would mark it encrypted.
    pub fn purge(&self) -> Result<()> {
        {
            let _guard = self.lock.write();
            let mut removed = 0usize;
            for entry in fs::read_dir(&self.settings.root)? {
                let entry = entry?;
                if entry.file_name() == DESCRIPTOR_FILE {
                    continue;
                }
                if entry.file_type()?.is_dir() {
                    fs::remove_dir_all(entry.path())?;
                } else {
                    fs::remove_file(entry.path())?;
                }
                removed += 1;
            }

            if let Some(kdf) = &self.settings.key_derivation {
                if KeyDerivation::load(&self.settings.root)?.is_none() {
                    kdf.persist(&self.settings.root, self.settings.options.sync_writes)?;
                }
            }
            info!(
                "[STORE] purged {:?} ({} top-level entries removed)",
                self.settings.root, removed
            );
        }

        let root = self.settings.root.display().to_string();
        for observer in &self.observers {
            if let Err(e) = observer.on_purge() {
                warn!("[STORE] observer failed on purge of {}: {}", root, e);
            }
        }
        Ok(())
    }

    /// Object count and per-level fan-out of the sharded tree.
    pub fn stats(&self) -> Result<StoreStats> {
        let _guard = self.lock.read();
        let walk = traverse::walk(&self.settings.root)?;
        Ok(traverse::summarize(&walk))
    }

    /// Metadata of every object whose sidecar can be read, in walk order.
    pub fn inventory(&self) -> Result<Vec<BlobMeta>> {
        let _guard = self.lock.read();
        traverse::inventory(&self.settings.root)
    }

    fn notify<F>(&self, call: F, op: &str, id: &BlobId)
    where
        F: Fn(&dyn StoreObserver) -> crate::observer::ObserverResult,
    {
        for observer in &self.observers {
            if let Err(e) = call(observer.as_ref()) {
                warn!("[STORE] observer failed on {} of {}: {}", op, id, e);
            }
        }
    }
}

/// Encryption state of a root as found on disk.
#[derive(Debug)]
enum RootState {
    /// No descriptor and no objects.
    Empty,
    /// Objects are bare gzip streams.
    Plain,
    /// A descriptor exists, or objects are not gzip streams (a store written
    /// before descriptors existed).
    Encrypted(Option<KeyDerivation>),
}

fn inspect_root(root: &Path) -> Result<RootState> {
    if let Some(kdf) = KeyDerivation::load(root)? {
        return Ok(RootState::Encrypted(Some(kdf)));
    }
    let Some(object) = traverse::first_object(root)? else {
        return Ok(RootState::Empty);
    };
    let sealed = fs::read(&object)?;
    if transform::decompress(&sealed).is_ok() {
        Ok(RootState::Plain)
    } else {
        Ok(RootState::Encrypted(None))
    }
}

/// Derive the engine key for `root`, refusing to mix encrypted and plain objects.
///
/// `create` allows writing a descriptor: a fresh one for an empty root, or
/// `LegacyPad` for an encrypted root that has none.
fn resolve_key(
    root: &Path,
    passphrase: Option<&str>,
    options: &StoreOptions,
    create: bool,
) -> Result<(Option<StoreKey>, Option<KeyDerivation>)> {
    let state = inspect_root(root)?;
    let (passphrase, kdf, persist) = match (passphrase, state) {
        (None, RootState::Empty | RootState::Plain) => return Ok((None, None)),
        (None, RootState::Encrypted(_)) => {
            return Err(CasError::KeyDerivation(
                "store is encrypted; passphrase required".to_string(),
            ))
        }
        (Some(_), RootState::Plain) => {
            return Err(CasError::KeyDerivation(
                "store is not encrypted; passphrase not accepted".to_string(),
            ))
        }
        (Some(p), RootState::Encrypted(Some(kdf))) => (p, kdf, false),
        (Some(p), RootState::Encrypted(None)) => {
            debug!("[STORE] no key descriptor in {:?}, using legacy-pad", root);
            (p, KeyDerivation::LegacyPad, create)
        }
        (Some(p), RootState::Empty) if create => (p, KeyDerivation::generate(&options.kdf)?, true),
        (Some(p), RootState::Empty) => {
            debug!("[STORE] empty root {:?} without descriptor, using legacy-pad", root);
            (p, KeyDerivation::LegacyPad, false)
        }
    };

    let key = kdf.derive(passphrase)?;
    if persist {
        kdf.persist(root, options.sync_writes)?;
    }
    Ok((Some(key), Some(kdf)))
}
