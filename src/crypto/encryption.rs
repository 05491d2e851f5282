//! String encryption transform.
//!
//! Each call to `encrypt` generates a fresh random 12-byte nonce. The
//! result is a self-describing text token that fits a string-only store:
//!
//! ```text
//! base64(nonce) ":" base64(ciphertext + 16-byte auth tag)
//! ```
//!
//! `decrypt` distinguishes two failures:
//! - [`VaultError::NotEncrypted`]: the input does not have the token shape
//!   above, so it was most likely written as cleartext.
//! - [`VaultError::DecryptionFailed`]: the shape is right but the token does
//!   not authenticate under this key (wrong key, tampering, bad UTF-8).

use std::fmt;
use std::str::FromStr;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::keys::{KeyAlgorithm, SecretKeyMaterial};
use crate::errors::{Result, VaultError};

/// Size of the AES-256-GCM nonce in bytes.
const NONCE_LEN: usize = 12;

/// Size of the AES-256-GCM authentication tag in bytes.
const TAG_LEN: usize = 16;

/// Separates the encoded nonce from the encoded ciphertext.
const TOKEN_SEPARATOR: char = ':';

/// Cipher configuration a vault is bound to.
///
/// Switching a vault to another suite without rekeying leaves existing
/// tokens unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CipherSuite {
    #[default]
    Aes256Gcm,
}

impl CipherSuite {
    /// Transformation identifier, e.g. `AES/GCM/NoPadding`.
    pub fn identifier(&self) -> &'static str {
        match self {
            CipherSuite::Aes256Gcm => "AES/GCM/NoPadding",
        }
    }

    /// Algorithm that key material must carry to be used with this suite.
    pub fn key_algorithm(&self) -> KeyAlgorithm {
        match self {
            CipherSuite::Aes256Gcm => KeyAlgorithm::Aes256,
        }
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for CipherSuite {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "AES/GCM/NoPadding" | "AES-256-GCM" => Ok(CipherSuite::Aes256Gcm),
            other => Err(VaultError::UnknownCipher(other.to_string())),
        }
    }
}

impl TryFrom<String> for CipherSuite {
    type Error = VaultError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CipherSuite> for String {
    fn from(suite: CipherSuite) -> Self {
        suite.identifier().to_string()
    }
}

/// Encrypt a UTF-8 `plaintext` under `key` and return a text token.
pub fn encrypt(suite: CipherSuite, key: &SecretKeyMaterial, plaintext: &str) -> Result<String> {
    if key.algorithm() != suite.key_algorithm() {
        return Err(VaultError::EncryptionFailed(format!(
            "{} key cannot be used with {suite}",
            key.algorithm()
        )));
    }

    match suite {
        CipherSuite::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
                .map_err(|e| VaultError::EncryptionFailed(format!("invalid key length: {e}")))?;

            let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

            let ciphertext = cipher
                .encrypt(&nonce, plaintext.as_bytes())
                .map_err(|e| VaultError::EncryptionFailed(format!("encryption error: {e}")))?;

            Ok(format!(
                "{}{TOKEN_SEPARATOR}{}",
                BASE64.encode(nonce),
                BASE64.encode(&ciphertext)
            ))
        }
    }
}

/// Decrypt a token produced by [`encrypt`].
pub fn decrypt(suite: CipherSuite, key: &SecretKeyMaterial, token: &str) -> Result<String> {
    let (nonce_bytes, ciphertext) = split_token(token)?;

    if key.algorithm() != suite.key_algorithm() {
        return Err(VaultError::DecryptionFailed);
    }

    match suite {
        CipherSuite::Aes256Gcm => {
            let cipher =
                Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| VaultError::DecryptionFailed)?;
            let nonce = Nonce::from_slice(&nonce_bytes);

            let plaintext = cipher
                .decrypt(nonce, ciphertext.as_slice())
                .map_err(|_| VaultError::DecryptionFailed)?;

            String::from_utf8(plaintext).map_err(|e| {
                let mut bad_bytes = e.into_bytes();
                bad_bytes.zeroize();
                VaultError::DecryptionFailed
            })
        }
    }
}

/// Returns `true` if `token` has the shape of an encrypted token.
///
/// Shape only: a token that passes may still fail to decrypt.
pub fn looks_encrypted(token: &str) -> bool {
    split_token(token).is_ok()
}

/// Split a token into nonce and ciphertext bytes, classifying anything that
/// is not token-shaped as `NotEncrypted`.
fn split_token(token: &str) -> Result<([u8; NONCE_LEN], Vec<u8>)> {
    let mut parts = token.split(TOKEN_SEPARATOR);
    let (nonce_part, body_part) = match (parts.next(), parts.next(), parts.next()) {
        (Some(nonce), Some(body), None) => (nonce, body),
        _ => {
            return Err(VaultError::NotEncrypted(
                "expected exactly one nonce separator".into(),
            ))
        }
    };

    let nonce_bytes: [u8; NONCE_LEN] = BASE64
        .decode(nonce_part)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| VaultError::NotEncrypted("nonce is not a 12-byte base64 value".into()))?;

    let ciphertext = BASE64
        .decode(body_part)
        .map_err(|_| VaultError::NotEncrypted("ciphertext is not base64".into()))?;
    if ciphertext.len() < TAG_LEN {
        return Err(VaultError::NotEncrypted(
            "ciphertext is shorter than the authentication tag".into(),
        ));
    }

    Ok((nonce_bytes, ciphertext))
}
