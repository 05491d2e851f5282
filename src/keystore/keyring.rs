//! OS keyring key storage.
//!
//! Stores the vault key in the operating system's secure credential store:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring / KDE Wallet)
//!
//! The entry's secret is `<algorithm>:<base64 key>`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zeroize::Zeroizing;

use super::KeyStorage;
use crate::crypto::{KeyAlgorithm, SecretKeyMaterial};
use crate::errors::{Result, VaultError};

/// Default service name used in the OS keyring.
const SERVICE_NAME: &str = "prefvault";

/// Stores the vault key as an OS keyring entry.
#[derive(Debug, Clone)]
pub struct KeyringKeyStorage {
    service: String,
    account: String,
}

impl KeyringKeyStorage {
    /// Key storage for the vault bound to `store_name`.
    pub fn new(store_name: &str) -> Self {
        Self::with_service(SERVICE_NAME, store_name)
    }

    pub fn with_service(service: &str, store_name: &str) -> Self {
        Self {
            service: service.to_string(),
            account: format!("vault-key:{store_name}"),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.account).map_err(|e| {
            VaultError::KeyStorage(format!("failed to create keyring entry: {e}"))
        })
    }
}

impl KeyStorage for KeyringKeyStorage {
    fn load_key(&self) -> Result<Option<SecretKeyMaterial>> {
        let secret = match self.entry()?.get_password() {
            Ok(secret) => Zeroizing::new(secret),
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => {
                return Err(VaultError::KeyStorage(format!(
                    "failed to read from keyring: {e}"
                )))
            }
        };

        let (algorithm, encoded) = secret
            .split_once(':')
            .ok_or_else(|| VaultError::KeyStorage("malformed keyring entry".into()))?;
        let algorithm: KeyAlgorithm = algorithm.parse()?;
        let bytes = Zeroizing::new(
            BASE64
                .decode(encoded)
                .map_err(|e| VaultError::KeyStorage(format!("keyring key is not base64: {e}")))?,
        );

        SecretKeyMaterial::from_slice(algorithm, &bytes).map(Some)
    }

    fn save_key(&self, key: &SecretKeyMaterial) -> Result<()> {
        let secret = Zeroizing::new(format!(
            "{}:{}",
            key.algorithm().as_str(),
            BASE64.encode(key.as_bytes())
        ));

        self.entry()?.set_password(&secret).map_err(|e| {
            VaultError::KeyStorage(format!("failed to store key in keyring: {e}"))
        })
    }

    fn clear_key(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already gone, that's fine.
            Err(e) => Err(VaultError::KeyStorage(format!(
                "failed to delete from keyring: {e}"
            ))),
        }
    }

    fn has_key(&self) -> bool {
        self.entry()
            .and_then(|entry| {
                entry
                    .get_password()
                    .map(|secret| drop(Zeroizing::new(secret)))
                    .map_err(|e| VaultError::KeyStorage(e.to_string()))
            })
            .is_ok()
    }
}
