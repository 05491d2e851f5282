//! Plain-string preference stores.
//!
//! A [`PreferenceStore`] is the untrusted medium the vault writes
//! ciphertext into. It only understands `String -> String` and batched
//! edits. Backends:
//! - `MemoryStore`: process-local map (`memory`)
//! - `FileStore`: one JSON document per store (`file`)
//! - `SqliteStore`: one SQLite database per store (`sqlite`, feature
//!   `sqlite-store`)

pub mod file;
pub mod memory;
#[cfg(feature = "sqlite-store")]
pub mod sqlite;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::errors::{Result, VaultError};
use crate::listener::{ChangeEvent, ListenerId};

pub use file::{FileStore, FileStoreProvider};
pub use memory::{MemoryStore, MemoryStoreProvider};
#[cfg(feature = "sqlite-store")]
pub use sqlite::{SqliteStore, SqliteStoreProvider};

/// One batch of mutations against a store.
///
/// Stores apply it as: clear (if requested), then removals, then puts,
/// regardless of the order the builder methods were called in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreEdit {
    pub clear: bool,
    pub removals: BTreeSet<String>,
    pub puts: BTreeMap<String, String>,
}

impl StoreEdit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.puts.insert(key.into(), value.into());
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.removals.insert(key.into());
        self
    }

    pub fn clear(mut self) -> Self {
        self.clear = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.clear && self.removals.is_empty() && self.puts.is_empty()
    }

    /// Apply this edit to an in-memory map.
    ///
    /// Returns the keys whose presence or value actually changed.
    pub fn apply_to(&self, map: &mut BTreeMap<String, String>) -> BTreeSet<String> {
        let mut changed = BTreeSet::new();

        if self.clear {
            changed.extend(map.keys().cloned());
            map.clear();
        }
        for key in &self.removals {
            if map.remove(key).is_some() {
                changed.insert(key.clone());
            }
        }
        for (key, value) in &self.puts {
            if map.get(key) != Some(value) {
                map.insert(key.clone(), value.clone());
                changed.insert(key.clone());
            }
        }

        changed
    }
}

/// A persistent `String -> String` map with batched edits.
pub trait PreferenceStore: Send + Sync {
    /// Read one raw value.
    fn get_string(&self, key: &str) -> Option<String>;

    /// Snapshot of every entry.
    fn get_all(&self) -> BTreeMap<String, String>;

    fn contains(&self, key: &str) -> bool {
        self.get_string(key).is_some()
    }

    /// Apply `edit` durably. Returns only once the change is persisted;
    /// on error nothing from `edit` is visible.
    fn commit(&self, edit: StoreEdit) -> Result<()>;

    /// Apply `edit` in memory now and persist it in the background.
    /// Persistence failures are logged, not returned.
    fn apply(&self, edit: StoreEdit);

    /// Register a callback fired once per changed key after each edit.
    fn register_listener(
        &self,
        listener: Box<dyn Fn(&ChangeEvent<'_>) + Send + Sync>,
    ) -> ListenerId;

    fn unregister_listener(&self, id: ListenerId) -> bool;
}

/// Opens a named store. Called once per vault, on first access.
pub trait StoreProvider: Send + Sync {
    fn open(&self, name: &str) -> Result<Arc<dyn PreferenceStore>>;
}

impl<P: StoreProvider + ?Sized> StoreProvider for Arc<P> {
    fn open(&self, name: &str) -> Result<Arc<dyn PreferenceStore>> {
        (**self).open(name)
    }
}

/// Validate that a store name is safe to use as a file name.
///
/// Allowed: ASCII letters, digits, underscores, hyphens, periods.
/// Must be non-empty, at most 128 characters, and not start with a period.
pub fn validate_store_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.');

    if valid {
        Ok(())
    } else {
        Err(VaultError::InvalidStoreName(name.to_string()))
    }
}
