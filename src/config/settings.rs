use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::{CipherSuite, KdfAlgorithm, KdfParams};
use crate::errors::{Result, VaultError};
use crate::storage::{FileStoreProvider, MemoryStoreProvider, StoreProvider};

/// Which plain-string store backs the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, nothing persisted.
    Memory,
    /// One JSON document per store under `store_dir`.
    #[default]
    File,
    /// One SQLite database per store under `store_dir`.
    Sqlite,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreBackend::Memory => "memory",
            StoreBackend::File => "file",
            StoreBackend::Sqlite => "sqlite",
        })
    }
}

/// Project-level configuration, loaded from `prefvault.toml`.
///
/// Every field has a default, so a project without a config file gets a
/// file-backed AES-GCM vault under `.prefvault/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory (relative to project root) where store files live.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,

    #[serde(default)]
    pub backend: StoreBackend,

    /// Cipher identifier, e.g. `AES/GCM/NoPadding`.
    #[serde(default = "default_cipher")]
    pub cipher: String,

    #[serde(default)]
    pub kdf: KdfAlgorithm,

    /// PBKDF2 rounds, or Argon2 time cost (default: 10 000).
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Argon2 memory cost in KiB (default: 64 MB).
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 parallelism degree (default: 4).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_store_dir() -> String {
    ".prefvault".to_string()
}

fn default_cipher() -> String {
    CipherSuite::default().identifier().to_string()
}

fn default_kdf_iterations() -> u32 {
    10_000
}

fn default_argon2_memory_kib() -> u32 {
    65_536
}

fn default_argon2_parallelism() -> u32 {
    4
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            backend: StoreBackend::default(),
            cipher: default_cipher(),
            kdf: KdfAlgorithm::default(),
            kdf_iterations: default_kdf_iterations(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_parallelism: default_argon2_parallelism(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    const FILE_NAME: &'static str = "prefvault.toml";

    /// Load settings from `<project_dir>/prefvault.toml`.
    ///
    /// A missing file yields the defaults. A file that does not parse is
    /// an error.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            VaultError::Config(format!("failed to parse {}: {e}", config_path.display()))
        })?;

        tracing::debug!(path = %config_path.display(), backend = %settings.backend, "settings loaded");
        Ok(settings)
    }

    /// Absolute directory holding the store files.
    ///
    /// Example: `project_dir/.prefvault`
    pub fn store_dir_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.store_dir)
    }

    /// Resolve the configured cipher identifier.
    pub fn cipher_suite(&self) -> Result<CipherSuite> {
        self.cipher.parse()
    }

    /// Convert the KDF settings into crypto-layer params.
    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            algorithm: self.kdf,
            iterations: self.kdf_iterations,
            memory_kib: self.argon2_memory_kib,
            parallelism: self.argon2_parallelism,
        }
    }

    /// Build the store provider for the configured backend.
    pub fn store_provider(&self, project_dir: &Path) -> Result<Box<dyn StoreProvider>> {
        let dir = self.store_dir_path(project_dir);

        match self.backend {
            StoreBackend::Memory => Ok(Box::new(MemoryStoreProvider::new())),
            StoreBackend::File => Ok(Box::new(FileStoreProvider::new(dir))),
            #[cfg(feature = "sqlite-store")]
            StoreBackend::Sqlite => Ok(Box::new(crate::storage::SqliteStoreProvider::new(dir))),
            #[cfg(not(feature = "sqlite-store"))]
            StoreBackend::Sqlite => Err(VaultError::Config(
                "the sqlite backend requires the `sqlite-store` feature".into(),
            )),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
