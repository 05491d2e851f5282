//! Password-based key derivation.
//!
//! Turns a password into AES-256 key material. Every call draws a fresh
//! 512-byte salt, so the same password never yields the same key twice:
//! the result must be handed to a [`crate::keystore::KeyStorage`] to be
//! reused. Derivation is deliberately slow and blocks the calling thread
//! for a time proportional to the iteration count.
//!
//! Two algorithms are available:
//! - PBKDF2-HMAC-SHA256 (default), where `iterations` is the round count.
//! - Argon2id, where `iterations` is the time cost and memory/parallelism
//!   come from `KdfParams`.

use std::fmt;
use std::str::FromStr;

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::keys::{SecretKeyMaterial, KEY_LEN};
use crate::errors::{Result, VaultError};

/// Length of the random salt in bytes.
pub const SALT_LEN: usize = 512;

/// Minimum safe Argon2 memory cost in KiB (8 MB).
const MIN_MEMORY_KIB: u32 = 8_192;

/// Which password-based KDF to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KdfAlgorithm {
    #[default]
    #[serde(rename = "pbkdf2-sha256")]
    Pbkdf2Sha256,
    #[serde(rename = "argon2id")]
    Argon2id,
}

impl KdfAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            KdfAlgorithm::Pbkdf2Sha256 => "pbkdf2-sha256",
            KdfAlgorithm::Argon2id => "argon2id",
        }
    }
}

impl fmt::Display for KdfAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KdfAlgorithm {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pbkdf2-sha256" => Ok(KdfAlgorithm::Pbkdf2Sha256),
            "argon2id" => Ok(KdfAlgorithm::Argon2id),
            other => Err(VaultError::KeyDerivationFailed(format!(
                "unknown KDF algorithm '{other}'"
            ))),
        }
    }
}

/// Tunable KDF parameters.
///
/// `memory_kib` and `parallelism` only apply to Argon2id.
#[derive(Debug, Clone, Copy)]
pub struct KdfParams {
    pub algorithm: KdfAlgorithm,
    /// PBKDF2 rounds, or Argon2 time cost.
    pub iterations: u32,
    /// Argon2 memory cost in KiB (default: 65 536 = 64 MB).
    pub memory_kib: u32,
    /// Argon2 parallelism lanes (default: 4).
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            algorithm: KdfAlgorithm::Pbkdf2Sha256,
            iterations: 10_000,
            memory_kib: 65_536,
            parallelism: 4,
        }
    }
}

/// Derive a fresh AES-256 key from `password` with PBKDF2-HMAC-SHA256.
///
/// Not idempotent: a new random salt is generated on every call, so two
/// calls with the same password return different keys. Blocks for a time
/// proportional to `iterations`; keep it off latency-sensitive threads.
pub fn derive_key(password: &str, iterations: u32) -> Result<SecretKeyMaterial> {
    derive_key_with_params(
        password,
        &KdfParams {
            iterations,
            ..KdfParams::default()
        },
    )
}

/// Derive a fresh AES-256 key with explicit parameters.
///
/// Same salt behavior as [`derive_key`]. Enforces minimum parameters to
/// prevent dangerously weak settings.
pub fn derive_key_with_params(password: &str, params: &KdfParams) -> Result<SecretKeyMaterial> {
    let salt = generate_salt();
    derive_key_with_salt(password.as_bytes(), &salt[..], params)
}

/// Deterministic core of the factory: same password, salt and params give
/// the same key.
pub(crate) fn derive_key_with_salt(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<SecretKeyMaterial> {
    if params.iterations < 1 {
        return Err(VaultError::KeyDerivationFailed(
            "iterations must be at least 1".into(),
        ));
    }

    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    match params.algorithm {
        KdfAlgorithm::Pbkdf2Sha256 => {
            pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, params.iterations, &mut output[..]);
        }
        KdfAlgorithm::Argon2id => {
            if params.memory_kib < MIN_MEMORY_KIB {
                return Err(VaultError::KeyDerivationFailed(format!(
                    "Argon2 memory_kib must be at least {MIN_MEMORY_KIB} (got {})",
                    params.memory_kib
                )));
            }
            if params.parallelism < 1 {
                return Err(VaultError::KeyDerivationFailed(
                    "Argon2 parallelism must be at least 1".into(),
                ));
            }

            let argon2_params = Params::new(
                params.memory_kib,
                params.iterations,
                params.parallelism,
                Some(KEY_LEN),
            )
            .map_err(|e| VaultError::KeyDerivationFailed(format!("invalid Argon2 params: {e}")))?;

            Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params)
                .hash_password_into(password, salt, &mut output[..])
                .map_err(|e| {
                    VaultError::KeyDerivationFailed(format!("Argon2id hashing failed: {e}"))
                })?;
        }
    }

    Ok(SecretKeyMaterial::new(*output))
}

/// Generate a cryptographically random 512-byte salt.
pub fn generate_salt() -> Box<[u8; SALT_LEN]> {
    let mut salt = Box::new([0u8; SALT_LEN]);
    rand::rng().fill_bytes(&mut salt[..]);
    salt
}
