//! Symmetric key material handed between the key derivation factory,
//! the key storage backends, and the vault.
//!
//! `SecretKeyMaterial` zeroes its bytes when dropped, never prints them
//! through `Debug`, and compares in constant time.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{Result, VaultError};

/// Length of an AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

/// Algorithm a piece of key material is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    Aes256,
}

impl KeyAlgorithm {
    /// Name used in persisted key files and keyring entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::Aes256 => "AES-256",
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyAlgorithm {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AES-256" | "AES" => Ok(KeyAlgorithm::Aes256),
            other => Err(VaultError::KeyStorage(format!(
                "unsupported key algorithm '{other}'"
            ))),
        }
    }
}

/// Opaque symmetric key bytes plus the algorithm they belong to.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKeyMaterial {
    bytes: [u8; KEY_LEN],
    #[zeroize(skip)]
    algorithm: KeyAlgorithm,
}

impl SecretKeyMaterial {
    /// Wrap raw AES-256 key bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            bytes,
            algorithm: KeyAlgorithm::Aes256,
        }
    }

    /// Build key material from a slice, checking its length.
    pub fn from_slice(algorithm: KeyAlgorithm, bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            VaultError::KeyStorage(format!(
                "{algorithm} key must be exactly {KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes, algorithm })
    }

    /// Generate a fresh random AES-256 key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut bytes);
        let key = Self::new(bytes);
        bytes.zeroize();
        key
    }

    /// Access the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }
}

impl PartialEq for SecretKeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        self.algorithm == other.algorithm && bool::from(self.bytes.ct_eq(&other.bytes))
    }
}

impl Eq for SecretKeyMaterial {}

impl fmt::Debug for SecretKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKeyMaterial")
            .field("algorithm", &self.algorithm)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
