//! Transparent encryption for string-keyed preference stores.
//!
//! A [`Vault`] sits in front of any [`PreferenceStore`] and encrypts every
//! value before it reaches the store. Key material is owned by a
//! [`KeyStorage`] and fetched only for the duration of a single operation.

pub mod config;
pub mod crypto;
pub mod errors;
pub mod keystore;
pub mod listener;
pub mod storage;
pub mod vault;

pub use config::Settings;
pub use crypto::{CipherSuite, SecretKeyMaterial};
pub use errors::{Result, VaultError};
pub use keystore::KeyStorage;
pub use listener::{ChangeEvent, ListenerId};
pub use storage::{PreferenceStore, StoreEdit, StoreProvider};
pub use vault::{PendingBatch, TypedValue, ValueKind, Vault};
