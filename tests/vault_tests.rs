//! Integration tests for the prefvault vault module.

use std::collections::BTreeSet;
use std::fs;
use std::sync::{Arc, Mutex};

use prefvault::config::{Settings, StoreBackend};
use prefvault::crypto::{decrypt, derive_key, CipherSuite, SecretKeyMaterial};
use prefvault::keystore::{FileKeyStorage, KeyStorage, MemoryKeyStorage};
use prefvault::storage::{FileStoreProvider, MemoryStore, MemoryStoreProvider, PreferenceStore, StoreEdit};
use prefvault::vault::{PendingBatch, TypedValue, ValueKind, Vault};
use prefvault::VaultError;
use tempfile::TempDir;

const STORE: &str = "secure_prefs";

/// Helper: a memory-backed vault plus handles on its raw store and key
/// storage so tests can look underneath the vault.
fn memory_vault(key: Option<SecretKeyMaterial>) -> (Vault, Arc<MemoryStore>, Arc<MemoryKeyStorage>) {
    let provider = Arc::new(MemoryStoreProvider::new());
    let raw = provider.store(STORE);
    let keys = Arc::new(match key {
        Some(key) => MemoryKeyStorage::with_key(key),
        None => MemoryKeyStorage::new(),
    });

    let vault = Vault::new(provider, STORE, Arc::clone(&keys), CipherSuite::Aes256Gcm)
        .expect("create vault");
    (vault, raw, keys)
}

fn set(members: &[&str]) -> BTreeSet<String> {
    members.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Basic scenarios
// ---------------------------------------------------------------------------

#[test]
fn password_derived_key_roundtrip() {
    let key = derive_key("correct-horse", 10_000).expect("derive key");
    let (vault, _raw, _keys) = memory_vault(Some(key));

    assert!(vault.edit().put_string("token", "abc123").commit());
    assert_eq!(vault.get_string("token", ""), "abc123");

    let all = vault.get_all();
    assert_eq!(all.len(), 1);
    assert_eq!(all["token"], TypedValue::String("abc123".into()));
}

#[test]
fn integer_is_persisted_as_text_and_inferred_back() {
    let key = SecretKeyMaterial::generate();
    let (vault, raw, _keys) = memory_vault(Some(key.clone()));

    assert!(vault.edit().put_int("count", 42).commit());

    let token = raw.get_string("count").expect("ciphertext stored");
    assert_ne!(token, "42");
    assert_eq!(decrypt(CipherSuite::Aes256Gcm, &key, &token).unwrap(), "42");

    assert_eq!(vault.get_all()["count"], TypedValue::Int(42));
}

#[test]
fn literal_string_42_is_read_back_as_integer_by_get_all() {
    let (vault, _raw, _keys) = memory_vault(Some(SecretKeyMaterial::generate()));

    assert!(vault.edit().put_string("count", "42").commit());

    assert_eq!(vault.get_all()["count"], TypedValue::Int(42));
    // An explicit kind resolves the ambiguity.
    assert_eq!(
        vault.get_typed("count", ValueKind::String),
        Some(TypedValue::String("42".into()))
    );
}

#[test]
fn typed_getters_roundtrip_every_kind() {
    let (vault, _raw, _keys) = memory_vault(Some(SecretKeyMaterial::generate()));

    let ok = vault
        .edit()
        .put_string("name", "ada")
        .put_int("small", -7)
        .put_long("big", 9_000_000_000)
        .put_float("ratio", 0.5)
        .put_bool("enabled", true)
        .put_string_set("tags", ["beta", "alpha"])
        .commit();
    assert!(ok);

    assert_eq!(vault.get_string("name", ""), "ada");
    assert_eq!(vault.get_int("small", 0), -7);
    assert_eq!(vault.get_long("big", 0), 9_000_000_000);
    assert_eq!(vault.get_float("ratio", 0.0), 0.5);
    assert!(vault.get_bool("enabled", false));
    assert_eq!(vault.get_string_set("tags", BTreeSet::new()), set(&["alpha", "beta"]));

    let all = vault.get_all();
    assert_eq!(all["big"], TypedValue::Long(9_000_000_000));
    assert_eq!(all["ratio"], TypedValue::Float(0.5));
    assert_eq!(all["enabled"], TypedValue::Bool(true));
    assert_eq!(all["tags"], TypedValue::StringSet(set(&["alpha", "beta"])));
}

#[test]
fn wrong_kind_falls_back_to_default() {
    let (vault, _raw, _keys) = memory_vault(Some(SecretKeyMaterial::generate()));
    assert!(vault.edit().put_string("name", "ada").commit());

    assert_eq!(vault.get_int("name", 5), 5);
    assert!(!vault.get_bool("name", false));
    assert_eq!(vault.get_typed("name", ValueKind::Long), None);
}

#[test]
fn missing_key_returns_default() {
    let (vault, _raw, _keys) = memory_vault(Some(SecretKeyMaterial::generate()));
    assert_eq!(vault.get_string("absent", "fallback"), "fallback");
    assert!(!vault.contains("absent"));
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[test]
fn batch_applies_clear_then_removals_then_insertions() {
    let (vault, raw, _keys) = memory_vault(Some(SecretKeyMaterial::generate()));
    assert!(vault.edit().put_string("a", "1").put_string("b", "2").commit());

    // "b" is both removed and inserted: the insertion wins.
    assert!(vault.edit().clear().remove("b").put_string("b", "new").commit());

    assert_eq!(raw.len(), 1);
    assert_eq!(vault.get_string("a", "gone"), "gone");
    assert_eq!(vault.get_string("b", ""), "new");
}

#[test]
fn write_accepts_a_prebuilt_batch() {
    let (vault, _raw, _keys) = memory_vault(Some(SecretKeyMaterial::generate()));

    let mut batch = PendingBatch::new();
    batch.insert("x", 1).insert("y", true);
    assert!(vault.write(batch, true));

    assert_eq!(vault.get_int("x", 0), 1);
    assert!(vault.get_bool("y", false));
}

#[test]
fn apply_is_visible_immediately() {
    let (vault, _raw, _keys) = memory_vault(Some(SecretKeyMaterial::generate()));
    assert!(vault.edit().put_string("k", "v").apply());
    assert_eq!(vault.get_string("k", ""), "v");
}

// ---------------------------------------------------------------------------
// Missing key material
// ---------------------------------------------------------------------------

#[test]
fn missing_key_degrades_gracefully() {
    let (vault, raw, _keys) = memory_vault(None);
    raw.commit(StoreEdit::new().put("a", "existing")).unwrap();

    assert!(!vault.is_key_available());
    assert_eq!(vault.get_string("a", "default"), "default");
    assert!(vault.get_all().is_empty());

    assert!(!vault.edit().put_string("b", "x").remove("a").commit());
    assert!(!vault.edit().clear().apply());

    // Zero mutation to the backing store.
    let snapshot = raw.get_all();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot["a"], "existing");
}

// ---------------------------------------------------------------------------
// Malformed stored values
// ---------------------------------------------------------------------------

#[test]
fn cleartext_slot_reads_as_default_and_is_omitted() {
    let (vault, raw, _keys) = memory_vault(Some(SecretKeyMaterial::generate()));
    assert!(vault.edit().put_string("good", "ok").commit());
    raw.commit(
        StoreEdit::new()
            .put("plain", "abc123")
            .put("number", "42")
            .put("empty", ""),
    )
    .unwrap();

    assert_eq!(vault.get_string("plain", "default"), "default");
    assert_eq!(vault.get_int("number", 7), 7);
    assert!(vault.contains("plain"));

    let all = vault.get_all();
    assert_eq!(all.len(), 1);
    assert!(all.contains_key("good"));
}

#[test]
fn value_written_under_another_key_is_unreadable() {
    let (writer, raw, _keys) = memory_vault(Some(SecretKeyMaterial::generate()));
    assert!(writer.edit().put_string("k", "v").commit());
    let token = raw.get_string("k").unwrap();

    let (reader, reader_raw, _keys) = memory_vault(Some(SecretKeyMaterial::generate()));
    reader_raw.commit(StoreEdit::new().put("k", token)).unwrap();

    assert_eq!(reader.get_string("k", "default"), "default");
    assert!(reader.get_all().is_empty());
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn clear_storage_is_idempotent() {
    let (vault, raw, _keys) = memory_vault(Some(SecretKeyMaterial::generate()));
    assert!(vault.edit().put_string("a", "x").commit());

    for _ in 0..2 {
        vault.clear_storage().expect("clear storage");
        assert!(raw.is_empty());
        assert!(!vault.is_key_available());
    }
}

#[test]
fn rekey_destroys_prior_data() {
    let (vault, _raw, keys) = memory_vault(Some(SecretKeyMaterial::generate()));
    assert!(vault.edit().put_string("a", "x").commit());

    let new_key = SecretKeyMaterial::generate();
    vault.rekey_storage(new_key.clone()).expect("rekey");

    assert_eq!(vault.get_string("a", "default"), "default");
    assert!(vault.is_key_available());
    assert_eq!(keys.load_key().unwrap(), Some(new_key));

    assert!(vault.edit().put_string("a", "y").commit());
    assert_eq!(vault.get_string("a", ""), "y");
}

#[test]
fn empty_store_name_is_rejected() {
    let result = Vault::new(
        MemoryStoreProvider::new(),
        "",
        MemoryKeyStorage::new(),
        CipherSuite::Aes256Gcm,
    );
    assert!(matches!(result, Err(VaultError::Precondition(_))));
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

#[test]
fn listeners_fire_once_per_key_in_registration_order() {
    let (vault, _raw, _keys) = memory_vault(Some(SecretKeyMaterial::generate()));
    let calls: Arc<Mutex<Vec<(String, String, usize)>>> = Arc::default();

    for name in ["first", "second"] {
        let calls = Arc::clone(&calls);
        vault.register_listener(move |event| {
            calls
                .lock()
                .unwrap()
                .push((name.to_string(), event.key.to_string(), event.changed.len()));
        });
    }

    assert!(vault.edit().put_string("b", "1").remove("a").commit());

    let calls = calls.lock().unwrap();
    let expected: Vec<(String, String, usize)> = [
        ("first", "a"),
        ("first", "b"),
        ("second", "a"),
        ("second", "b"),
    ]
    .iter()
    .map(|(listener, key)| (listener.to_string(), key.to_string(), 2))
    .collect();
    assert_eq!(*calls, expected);
}

#[test]
fn failed_write_and_clear_storage_do_not_notify() {
    let (vault, _raw, _keys) = memory_vault(Some(SecretKeyMaterial::generate()));
    let count = Arc::new(Mutex::new(0usize));

    let counter = Arc::clone(&count);
    let id = vault.register_listener(move |_| *counter.lock().unwrap() += 1);

    assert!(vault.edit().put_string("a", "x").commit());
    assert_eq!(*count.lock().unwrap(), 1);

    vault.clear_storage().unwrap();
    assert!(!vault.edit().put_string("a", "x").commit());
    assert_eq!(*count.lock().unwrap(), 1);

    assert!(vault.unregister_listener(id));
    assert!(!vault.unregister_listener(id));
}

// ---------------------------------------------------------------------------
// File-backed vaults
// ---------------------------------------------------------------------------

#[test]
fn file_backed_vault_survives_reopen() {
    let dir = TempDir::new().expect("create temp dir");
    let key_path = dir.path().join("vault.key");

    {
        let keys = FileKeyStorage::new(&key_path);
        keys.save_key(&SecretKeyMaterial::generate()).unwrap();
        let vault = Vault::new(
            FileStoreProvider::new(dir.path()),
            STORE,
            keys,
            CipherSuite::Aes256Gcm,
        )
        .unwrap();
        assert!(vault.edit().put_long("visits", 3).put_string("user", "ada").commit());
    }

    // The file on disk only holds ciphertext.
    let on_disk = fs::read_to_string(dir.path().join(format!("{STORE}.json"))).unwrap();
    assert!(!on_disk.contains("ada"));

    let vault = Vault::new(
        FileStoreProvider::new(dir.path()),
        STORE,
        FileKeyStorage::new(&key_path),
        CipherSuite::Aes256Gcm,
    )
    .unwrap();
    assert_eq!(vault.get_long("visits", 0), 3);
    assert_eq!(vault.get_string("user", ""), "ada");
}

#[test]
fn failed_durable_write_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let vault = Vault::new(
        FileStoreProvider::new(dir.path()),
        STORE,
        MemoryKeyStorage::with_key(SecretKeyMaterial::generate()),
        CipherSuite::Aes256Gcm,
    )
    .unwrap();
    assert!(vault.edit().put_int("a", 1).put_string("b", "D").commit());

    let hits = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&hits);
    vault.register_listener(move |_| *counter.lock().unwrap() += 1);

    // A non-empty directory in place of the store file makes the rename fail.
    let path = dir.path().join(format!("{STORE}.json"));
    fs::remove_file(&path).unwrap();
    fs::create_dir(&path).unwrap();
    fs::write(path.join("occupant"), b"x").unwrap();

    let ok = vault
        .edit()
        .put_string("b", "changed")
        .put_string("c", "new")
        .remove("a")
        .commit();

    assert!(!ok);
    assert_eq!(*hits.lock().unwrap(), 0);
    assert_eq!(vault.get_int("a", 0), 1);
    assert_eq!(vault.get_string("b", ""), "D");
    assert_eq!(vault.get_string("c", "default"), "default");
}

#[test]
fn invalid_store_name_degrades_instead_of_panicking() {
    let dir = TempDir::new().unwrap();
    let vault = Vault::new(
        FileStoreProvider::new(dir.path()),
        "../escape",
        MemoryKeyStorage::with_key(SecretKeyMaterial::generate()),
        CipherSuite::Aes256Gcm,
    )
    .unwrap();

    assert_eq!(vault.get_string("a", "default"), "default");
    assert!(!vault.edit().put_string("a", "x").commit());
    assert!(vault.clear_storage().is_err());
}

#[test]
fn vault_from_settings_uses_configured_backend() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("prefvault.toml"),
        "store_dir = \"prefs\"\nbackend = \"file\"\n",
    )
    .unwrap();

    let settings = Settings::load(dir.path()).unwrap();
    assert_eq!(settings.backend, StoreBackend::File);

    let vault = Vault::from_settings(
        &settings,
        dir.path(),
        STORE,
        MemoryKeyStorage::with_key(SecretKeyMaterial::generate()),
    )
    .unwrap();
    assert!(vault.edit().put_bool("dark_mode", true).commit());

    assert!(dir.path().join("prefs").join(format!("{STORE}.json")).exists());
}

#[cfg(feature = "sqlite-store")]
#[test]
fn sqlite_backed_vault_roundtrip() {
    let dir = TempDir::new().unwrap();
    let settings = Settings {
        backend: StoreBackend::Sqlite,
        ..Settings::default()
    };

    let vault = Vault::from_settings(
        &settings,
        dir.path(),
        STORE,
        MemoryKeyStorage::with_key(SecretKeyMaterial::generate()),
    )
    .unwrap();

    assert!(vault.edit().put_float("volume", 0.75).commit());
    assert_eq!(vault.get_float("volume", 0.0), 0.75);

    let all = vault.get_all();
    assert_eq!(all["volume"], TypedValue::Float(0.75));
}
