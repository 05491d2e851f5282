//! Key lifecycle management.
//!
//! A [`KeyStorage`] owns the persistence of the vault's symmetric key. The
//! vault never stores key material itself; it asks the key storage for the
//! key at the start of each operation and drops it when the operation ends.
//!
//! Backends:
//! - `MemoryKeyStorage`: key lives only in process memory (`memory`)
//! - `FileKeyStorage`: key file on disk with owner-only permissions (`file`)
//! - `KeyringKeyStorage`: OS credential store (`keyring`, feature
//!   `keyring-store`)

pub mod file;
pub mod memory;

#[cfg(feature = "keyring-store")]
pub mod keyring;

use std::sync::Arc;

use crate::crypto::SecretKeyMaterial;
use crate::errors::Result;

pub use file::FileKeyStorage;
pub use memory::MemoryKeyStorage;

#[cfg(feature = "keyring-store")]
pub use self::keyring::KeyringKeyStorage;

/// Load/save/clear contract for the vault's key material.
pub trait KeyStorage: Send + Sync {
    /// Fetch the current key, or `None` if no key is installed.
    fn load_key(&self) -> Result<Option<SecretKeyMaterial>>;

    /// Install `key`, replacing any previous key.
    fn save_key(&self, key: &SecretKeyMaterial) -> Result<()>;

    /// Destroy the installed key. Succeeds if there is none.
    fn clear_key(&self) -> Result<()>;

    /// Whether a key is installed. Advisory: the answer can be stale by the
    /// time the caller acts on it.
    fn has_key(&self) -> bool;
}

impl<K: KeyStorage + ?Sized> KeyStorage for Arc<K> {
    fn load_key(&self) -> Result<Option<SecretKeyMaterial>> {
        (**self).load_key()
    }

    fn save_key(&self, key: &SecretKeyMaterial) -> Result<()> {
        (**self).save_key(key)
    }

    fn clear_key(&self) -> Result<()> {
        (**self).clear_key()
    }

    fn has_key(&self) -> bool {
        (**self).has_key()
    }
}
