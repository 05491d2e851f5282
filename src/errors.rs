use thiserror::Error;

/// All errors that can occur in prefvault.
///
/// Most of these never reach callers of [`crate::vault::Vault`]: data-level
/// failures on the read path degrade to default values and are reported
/// through `tracing` instead.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: wrong key or corrupted data")]
    DecryptionFailed,

    #[error("Value is not encrypted: {0}")]
    NotEncrypted(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("No key material is installed")]
    KeyUnavailable,

    #[error("Unknown cipher configuration '{0}'")]
    UnknownCipher(String),

    // --- Codec errors ---
    #[error("Stored value is not a valid {0}")]
    InvalidValue(&'static str),

    // --- Vault errors ---
    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Invalid store name '{0}': only ASCII letters, digits, underscores, hyphens, and periods are allowed")]
    InvalidStoreName(String),

    // --- Backend errors ---
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Key storage error: {0}")]
    KeyStorage(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    Config(String),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    Serialization(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for prefvault results.
pub type Result<T> = std::result::Result<T, VaultError>;
