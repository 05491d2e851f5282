//! File-based key storage.
//!
//! The key is kept in a small JSON document:
//!
//! ```json
//! {"version":1,"algorithm":"AES-256","key":"<base64>"}
//! ```
//!
//! The file is written atomically (temp file + rename) with owner-only
//! permissions on Unix. Clearing the key deletes the file.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::KeyStorage;
use crate::crypto::{KeyAlgorithm, SecretKeyMaterial};
use crate::errors::{Result, VaultError};

/// Current key file format version.
const KEYFILE_VERSION: u8 = 1;

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct KeyFileContents {
    version: u8,
    algorithm: String,
    key: String,
}

/// Stores the vault key in a file on disk.
#[derive(Debug, Clone)]
pub struct FileKeyStorage {
    path: PathBuf,
}

impl FileKeyStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path to the key file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn keyfile_err(message: String) -> VaultError {
        VaultError::KeyStorage(message)
    }
}

impl KeyStorage for FileKeyStorage {
    fn load_key(&self) -> Result<Option<SecretKeyMaterial>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = Zeroizing::new(
            fs::read(&self.path)
                .map_err(|e| Self::keyfile_err(format!("failed to read key file: {e}")))?,
        );
        let contents: KeyFileContents = serde_json::from_slice(&data)
            .map_err(|e| Self::keyfile_err(format!("invalid key file: {e}")))?;

        if contents.version != KEYFILE_VERSION {
            return Err(Self::keyfile_err(format!(
                "unsupported key file version {}, expected {KEYFILE_VERSION}",
                contents.version
            )));
        }

        let algorithm: KeyAlgorithm = contents.algorithm.parse()?;
        let bytes = Zeroizing::new(
            BASE64
                .decode(&contents.key)
                .map_err(|e| Self::keyfile_err(format!("key is not base64: {e}")))?,
        );

        SecretKeyMaterial::from_slice(algorithm, &bytes).map(Some)
    }

    fn save_key(&self, key: &SecretKeyMaterial) -> Result<()> {
        let contents = KeyFileContents {
            version: KEYFILE_VERSION,
            algorithm: key.algorithm().as_str().to_string(),
            key: BASE64.encode(key.as_bytes()),
        };
        let data = Zeroizing::new(
            serde_json::to_vec(&contents)
                .map_err(|e| VaultError::Serialization(format!("key file: {e}")))?,
        );

        // Ensure the parent directory exists.
        let parent = self.path.parent().unwrap_or(Path::new("."));
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                Self::keyfile_err(format!("cannot create key file directory: {e}"))
            })?;
        }

        let tmp_path = parent.join(format!(
            ".{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy()
        ));
        fs::write(&tmp_path, &*data)
            .map_err(|e| Self::keyfile_err(format!("failed to write key file: {e}")))?;

        // On Unix, restrict permissions to owner-only read/write.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&tmp_path, perms).map_err(|e| {
                Self::keyfile_err(format!("failed to set key file permissions: {e}"))
            })?;
        }

        fs::rename(&tmp_path, &self.path)
            .map_err(|e| Self::keyfile_err(format!("failed to install key file: {e}")))?;

        debug!(path = %self.path.display(), "key file written");
        Ok(())
    }

    fn clear_key(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "key file removed");
                Ok(())
            }
            // Already gone, that's fine.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::keyfile_err(format!("failed to remove key file: {e}"))),
        }
    }

    fn has_key(&self) -> bool {
        self.path.is_file()
    }
}
