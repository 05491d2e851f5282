//! The encrypted vault facade.
//!
//! `Vault` sits in front of a plain-string [`PreferenceStore`] and makes it
//! look like a typed key-value store whose values are encrypted at rest.
//!
//! Key material is never held by the vault. Every operation asks the
//! [`KeyStorage`] for the key, uses it, and drops it (which zeroizes it)
//! before returning.
//!
//! Failure model:
//! - No key installed: reads return the caller's default, writes return
//!   `false` without touching the store.
//! - A value that is cleartext or does not decrypt: that single read
//!   returns the default, and `get_all` omits the entry.
//! - An empty store name: `Vault::new` fails with `Precondition`.
//!
//! Concurrent `write` calls are not serialized by the vault; they race as
//! the underlying store allows. Wrap the vault in a lock if you need
//! strict ordering between writers.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::crypto::encryption::{decrypt, encrypt, looks_encrypted, CipherSuite};
use crate::crypto::SecretKeyMaterial;
use crate::errors::{Result, VaultError};
use crate::keystore::KeyStorage;
use crate::listener::{ChangeEvent, ListenerId, ListenerRegistry};
use crate::storage::{PreferenceStore, StoreEdit, StoreProvider};

use super::batch::{PendingBatch, VaultEditor};
use super::codec;
use super::value::{TypedValue, ValueKind};

/// An encrypted, typed view over a named preference store.
pub struct Vault {
    /// Name of the backing store, handed to the provider on first access.
    store_name: String,

    provider: Box<dyn StoreProvider>,

    /// Opened lazily by `store()`.
    store: OnceLock<Arc<dyn PreferenceStore>>,

    key_storage: Box<dyn KeyStorage>,

    /// Fixed for the lifetime of the vault.
    cipher: CipherSuite,

    listeners: ListenerRegistry,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("store_name", &self.store_name)
            .field("cipher", &self.cipher)
            .field("opened", &self.store.get().is_some())
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl Vault {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Bind a vault to the store called `store_name`.
    ///
    /// The store itself is not opened until the first operation needs it.
    /// An empty store name is a programming error and is rejected here.
    pub fn new(
        provider: impl StoreProvider + 'static,
        store_name: &str,
        key_storage: impl KeyStorage + 'static,
        cipher: CipherSuite,
    ) -> Result<Self> {
        Self::build(Box::new(provider), store_name, Box::new(key_storage), cipher)
    }

    /// Build a vault from project settings. Backend, directory and cipher
    /// come from `prefvault.toml`, or its defaults when the file is absent.
    pub fn from_settings(
        settings: &Settings,
        project_dir: &Path,
        store_name: &str,
        key_storage: impl KeyStorage + 'static,
    ) -> Result<Self> {
        let cipher = settings.cipher_suite()?;
        Self::build(
            settings.store_provider(project_dir)?,
            store_name,
            Box::new(key_storage),
            cipher,
        )
    }

    fn build(
        provider: Box<dyn StoreProvider>,
        store_name: &str,
        key_storage: Box<dyn KeyStorage>,
        cipher: CipherSuite,
    ) -> Result<Self> {
        if store_name.trim().is_empty() {
            return Err(VaultError::Precondition(
                "a store name must be set before the vault is used".into(),
            ));
        }

        Ok(Self {
            store_name: store_name.to_string(),
            provider,
            store: OnceLock::new(),
            key_storage,
            cipher,
            listeners: ListenerRegistry::new(),
        })
    }

    // ------------------------------------------------------------------
    // Key state
    // ------------------------------------------------------------------

    /// Whether key material is currently installed.
    ///
    /// Advisory only: a concurrent `clear_storage` or `rekey_storage` can
    /// change the answer immediately after it is returned.
    pub fn is_key_available(&self) -> bool {
        self.key_storage.has_key()
    }

    /// Fetch the key for one operation. The caller drops it, zeroizing the
    /// bytes, when the operation ends.
    fn load_key(&self) -> Result<SecretKeyMaterial> {
        self.key_storage
            .load_key()?
            .ok_or(VaultError::KeyUnavailable)
    }

    /// Open the backing store on first use.
    fn store(&self) -> Result<&Arc<dyn PreferenceStore>> {
        if let Some(store) = self.store.get() {
            return Ok(store);
        }

        let opened = self.provider.open(&self.store_name)?;
        debug!(store = %self.store_name, "backing store opened");
        // If another thread won the race, its handle is kept and ours dropped.
        Ok(self.store.get_or_init(|| opened))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Decrypt one entry, or `None` if it is missing or unreadable.
    fn read_plaintext(
        &self,
        store: &dyn PreferenceStore,
        secret: &SecretKeyMaterial,
        key: &str,
    ) -> Option<Zeroizing<String>> {
        let token = store.get_string(key)?;

        match decrypt(self.cipher, secret, &token) {
            Ok(plaintext) => Some(Zeroizing::new(plaintext)),
            Err(VaultError::NotEncrypted(reason)) => {
                error!(store = %self.store_name, key = %key, %reason, "value for key was stored in the clear");
                None
            }
            Err(e) => {
                warn!(store = %self.store_name, key = %key, error = %e, "value for key could not be decrypted");
                None
            }
        }
    }

    /// Load the key and the store, then read one entry's plaintext.
    fn read(&self, key: &str) -> Option<Zeroizing<String>> {
        let secret = match self.load_key() {
            Ok(secret) => secret,
            Err(e) => {
                debug!(store = %self.store_name, key = %key, error = %e, "read without key material");
                return None;
            }
        };

        let store = match self.store() {
            Ok(store) => store,
            Err(e) => {
                error!(store = %self.store_name, error = %e, "backing store could not be opened");
                return None;
            }
        };

        self.read_plaintext(&**store, &secret, key)
    }

    /// Read a string value, falling back to `default` when the key is
    /// absent, no key material is installed, or the value is unreadable.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        match self.read(key) {
            Some(plaintext) => plaintext.to_string(),
            None => default.to_string(),
        }
    }

    /// Read a value with an explicit kind. `None` covers every failure,
    /// including text that does not parse as `kind`.
    pub fn get_typed(&self, key: &str, kind: ValueKind) -> Option<TypedValue> {
        let plaintext = self.read(key)?;
        match codec::decode(&plaintext, kind) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(store = %self.store_name, key = %key, error = %e, "stored value has the wrong kind");
                None
            }
        }
    }

    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.get_typed(key, ValueKind::Int)
            .and_then(|v| v.as_int())
            .unwrap_or(default)
    }

    pub fn get_long(&self, key: &str, default: i64) -> i64 {
        self.get_typed(key, ValueKind::Long)
            .and_then(|v| v.as_long())
            .unwrap_or(default)
    }

    pub fn get_float(&self, key: &str, default: f32) -> f32 {
        self.get_typed(key, ValueKind::Float)
            .and_then(|v| v.as_float())
            .unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_typed(key, ValueKind::Bool)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    pub fn get_string_set(&self, key: &str, default: BTreeSet<String>) -> BTreeSet<String> {
        match self.get_typed(key, ValueKind::StringSet) {
            Some(TypedValue::StringSet(set)) => set,
            _ => default,
        }
    }

    /// Decrypt every entry and infer its kind from its text.
    ///
    /// Entries that cannot be decrypted are left out. Without key material
    /// the result is empty.
    pub fn get_all(&self) -> BTreeMap<String, TypedValue> {
        let mut result = BTreeMap::new();

        let secret = match self.load_key() {
            Ok(secret) => secret,
            Err(e) => {
                debug!(store = %self.store_name, error = %e, "get_all without key material");
                return result;
            }
        };
        let store = match self.store() {
            Ok(store) => store,
            Err(e) => {
                error!(store = %self.store_name, error = %e, "backing store could not be opened");
                return result;
            }
        };

        for (key, token) in store.get_all() {
            if !looks_encrypted(&token) {
                error!(store = %self.store_name, key = %key, "value for key was stored in the clear");
                continue;
            }
            match decrypt(self.cipher, &secret, &token) {
                Ok(plaintext) => {
                    let plaintext = Zeroizing::new(plaintext);
                    result.insert(key, codec::infer_and_decode(&plaintext));
                }
                Err(e) => {
                    debug!(store = %self.store_name, key = %key, error = %e, "entry omitted from get_all");
                }
            }
        }

        result
    }

    /// Whether the store has an entry for `key`. Metadata only; the entry
    /// may still be unreadable.
    pub fn contains(&self, key: &str) -> bool {
        match self.store() {
            Ok(store) => store.contains(key),
            Err(e) => {
                error!(store = %self.store_name, error = %e, "backing store could not be opened");
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Start a batch of changes.
    pub fn edit(&self) -> VaultEditor<'_> {
        VaultEditor::new(self)
    }

    /// Encrypt and persist `batch` as one unit.
    ///
    /// With `durable = true` this blocks until the store confirms the write
    /// and returns `true` only then. With `durable = false` the batch is
    /// handed to the store's background path and `true` is returned once it
    /// is queued.
    ///
    /// Returns `false`, leaving the store untouched, if no key material is
    /// installed, the store cannot be opened, or any value fails to encrypt.
    /// On success every listener is called once per affected key.
    pub fn write(&self, batch: PendingBatch, durable: bool) -> bool {
        let secret = match self.load_key() {
            Ok(secret) => secret,
            Err(e) => {
                warn!(store = %self.store_name, error = %e, "write aborted: no usable key material");
                return false;
            }
        };
        let store = match self.store() {
            Ok(store) => store,
            Err(e) => {
                error!(store = %self.store_name, error = %e, "write aborted: backing store could not be opened");
                return false;
            }
        };

        let affected = batch.affected_keys();
        let PendingBatch {
            insertions,
            removals,
            clear_all,
        } = batch;

        // Encrypt everything before the store sees any mutation.
        let mut edit = StoreEdit {
            clear: clear_all,
            removals,
            puts: BTreeMap::new(),
        };
        for (key, value) in &insertions {
            let plaintext = Zeroizing::new(codec::encode(value));
            match encrypt(self.cipher, &secret, &plaintext) {
                Ok(token) => {
                    edit.puts.insert(key.clone(), token);
                }
                Err(e) => {
                    warn!(store = %self.store_name, key = %key, error = %e, "write aborted: encryption failed");
                    return false;
                }
            }
        }
        drop(secret);

        if durable {
            if let Err(e) = store.commit(edit) {
                warn!(store = %self.store_name, error = %e, "write aborted: commit failed");
                return false;
            }
        } else {
            store.apply(edit);
        }

        debug!(store = %self.store_name, changed = affected.len(), durable, "batch written");
        self.listeners.notify(&affected);
        true
    }

    /// Delete every stored value and destroy the key material.
    ///
    /// Irreversible. Safe to call repeatedly. Listeners are not notified.
    pub fn clear_storage(&self) -> Result<()> {
        self.store()?.commit(StoreEdit::new().clear())?;
        self.key_storage.clear_key()?;
        info!(store = %self.store_name, "vault storage cleared");
        Ok(())
    }

    /// Clear the vault and install `new_key` for future writes.
    ///
    /// Existing values are destroyed, not re-encrypted.
    pub fn rekey_storage(&self, new_key: SecretKeyMaterial) -> Result<()> {
        self.clear_storage()?;
        self.key_storage.save_key(&new_key)?;
        info!(store = %self.store_name, "vault rekeyed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Register a callback invoked after every successful write, once per
    /// affected key, on the writer's thread.
    pub fn register_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent<'_>) + Send + Sync + 'static,
    {
        self.listeners.register(listener)
    }

    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn cipher(&self) -> CipherSuite {
        self.cipher
    }
}
