//! JSON-file preference store.
//!
//! Each store is one file, `<dir>/<name>.json`, holding a flat JSON object
//! of string keys to string values. The file is loaded once when the store
//! is opened and all reads are served from memory.
//!
//! Writes are atomic: the new document is written to a temp file in the
//! same directory and renamed over the target, so readers never see a
//! half-written file.
//!
//! Every change to the in-memory map happens under `write_lock`, so a
//! `commit` and an `apply` never overwrite each other. Background writes
//! from `apply` are coalesced: at most one flush is queued at a time, and
//! it persists whatever state is current when it runs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, error};

use super::{validate_store_name, PreferenceStore, StoreEdit, StoreProvider};
use crate::errors::{Result, VaultError};
use crate::listener::{ChangeEvent, ListenerId, ListenerRegistry};

/// A `PreferenceStore` persisted as a JSON document on disk.
#[derive(Debug)]
pub struct FileStore {
    inner: Arc<Inner>,
    listeners: ListenerRegistry,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
    /// Held for every mutation of `entries` and every disk write.
    write_lock: Mutex<()>,
    /// Set while a background flush is queued but has not yet taken its
    /// snapshot.
    flush_pending: AtomicBool,
}

impl FileStore {
    /// Open the store at `path`, loading it if the file exists.
    pub fn open(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let data = fs::read(path)?;
            serde_json::from_slice(&data).map_err(|e| {
                VaultError::Storage(format!("{} is not a valid store: {e}", path.display()))
            })?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            inner: Arc::new(Inner {
                path: path.to_path_buf(),
                entries: RwLock::new(entries),
                write_lock: Mutex::new(()),
                flush_pending: AtomicBool::new(false),
            }),
            listeners: ListenerRegistry::new(),
        })
    }

    /// Returns the path to the backing file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Write the current state to disk now, including anything handed to
    /// `apply` that has not been persisted yet.
    pub fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    /// Queue a background flush unless one is already waiting.
    fn schedule_flush(&self) {
        if self.inner.flush_pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let spawned = std::thread::Builder::new()
            .name("prefvault-flush".into())
            .spawn(move || {
                if let Err(e) = inner.flush() {
                    error!(path = %inner.path.display(), error = %e, "background store write failed");
                }
            });
        if let Err(e) = spawned {
            self.inner.flush_pending.store(false, Ordering::Release);
            error!(path = %self.inner.path.display(), error = %e, "could not start background store write");
        }
    }
}

impl Inner {
    fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the current in-memory state to disk.
    ///
    /// The pending flag is cleared under `write_lock` before the snapshot
    /// is taken, so an `apply` landing after the snapshot queues a new
    /// flush.
    fn flush(&self) -> Result<()> {
        let _guard = self.lock_writes();
        self.flush_pending.store(false, Ordering::Release);
        persist(&self.path, &self.snapshot())
    }
}

/// Write a snapshot to disk atomically.
fn persist(path: &Path, entries: &BTreeMap<String, String>) -> Result<()> {
    let data = serde_json::to_vec(entries)
        .map_err(|e| VaultError::Serialization(format!("store entries: {e}")))?;

    let parent = path.parent().unwrap_or(Path::new("."));
    if !parent.as_os_str().is_empty() && !parent.exists() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    fs::write(&tmp_path, &data)?;

    // On Unix, restrict the store to owner-only read/write.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

impl PreferenceStore for FileStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn get_all(&self) -> BTreeMap<String, String> {
        self.inner.snapshot()
    }

    fn commit(&self, edit: StoreEdit) -> Result<()> {
        let changed = {
            let _guard = self.inner.lock_writes();

            // Build the next state on a copy; memory only changes once the
            // rename has succeeded.
            let mut next = self.inner.snapshot();
            let changed = edit.apply_to(&mut next);
            persist(&self.inner.path, &next)?;

            *self
                .inner
                .entries
                .write()
                .unwrap_or_else(PoisonError::into_inner) = next;
            changed
        };

        debug!(path = %self.inner.path.display(), changed = changed.len(), "store committed");
        self.listeners.notify(&changed);
        Ok(())
    }

    fn apply(&self, edit: StoreEdit) {
        let changed = {
            let _guard = self.inner.lock_writes();
            let mut entries = self
                .inner
                .entries
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            edit.apply_to(&mut entries)
        };
        self.listeners.notify(&changed);
        self.schedule_flush();
    }

    fn register_listener(
        &self,
        listener: Box<dyn Fn(&ChangeEvent<'_>) + Send + Sync>,
    ) -> ListenerId {
        self.listeners.register(listener)
    }

    fn unregister_listener(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }
}

/// Opens `FileStore`s under a directory, one file per store name.
#[derive(Debug, Clone)]
pub struct FileStoreProvider {
    dir: PathBuf,
}

impl FileStoreProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Build the full path to a store file.
    ///
    /// Example: `dir/secure_prefs.json`
    pub fn store_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl StoreProvider for FileStoreProvider {
    fn open(&self, name: &str) -> Result<Arc<dyn PreferenceStore>> {
        validate_store_name(name)?;
        let store = FileStore::open(&self.store_path(name))?;
        Ok(Arc::new(store))
    }
}
