//! Cryptographic primitives for prefvault.
//!
//! This module provides:
//! - AES-256-GCM string encryption and decryption (`encryption`)
//! - PBKDF2 / Argon2id password-based key derivation (`kdf`)
//! - Zeroizing symmetric key material (`keys`)

pub mod encryption;
pub mod kdf;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use prefvault::crypto::{encrypt, decrypt, derive_key, ...};
pub use encryption::{decrypt, encrypt, looks_encrypted, CipherSuite};
pub use kdf::{derive_key, derive_key_with_params, generate_salt, KdfAlgorithm, KdfParams};
pub use keys::{KeyAlgorithm, SecretKeyMaterial};
