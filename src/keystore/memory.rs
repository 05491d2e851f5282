//! In-memory key storage.

use std::sync::{Mutex, PoisonError};

use super::KeyStorage;
use crate::crypto::SecretKeyMaterial;
use crate::errors::Result;

/// Keeps the key in process memory only; it is gone when the process
/// exits. Useful for session-scoped vaults and tests.
#[derive(Debug, Default)]
pub struct MemoryKeyStorage {
    key: Mutex<Option<SecretKeyMaterial>>,
}

impl MemoryKeyStorage {
    /// Empty storage: the vault starts without a key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-loaded with `key`.
    pub fn with_key(key: SecretKeyMaterial) -> Self {
        Self {
            key: Mutex::new(Some(key)),
        }
    }
}

impl KeyStorage for MemoryKeyStorage {
    fn load_key(&self) -> Result<Option<SecretKeyMaterial>> {
        Ok(self
            .key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save_key(&self, key: &SecretKeyMaterial) -> Result<()> {
        *self.key.lock().unwrap_or_else(PoisonError::into_inner) = Some(key.clone());
        Ok(())
    }

    fn clear_key(&self) -> Result<()> {
        // Dropping the old value zeroizes it.
        self.key.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }

    fn has_key(&self) -> bool {
        self.key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
