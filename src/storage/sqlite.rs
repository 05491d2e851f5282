//! SQLite-backed preference store.
//!
//! Each store is a database at `<dir>/<name>.db` with a single table:
//!
//! ```sql
//! CREATE TABLE entries (key TEXT PRIMARY KEY, value TEXT NOT NULL)
//! ```
//!
//! Every `StoreEdit` runs inside one SQL transaction. SQLite has no
//! deferred write mode here, so `apply` runs the same transaction as
//! `commit` and only logs a failure instead of returning it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, error};

use super::{validate_store_name, PreferenceStore, StoreEdit, StoreProvider};
use crate::errors::{Result, VaultError};
use crate::listener::{ChangeEvent, ListenerId, ListenerRegistry};

fn storage_err(e: rusqlite::Error) -> VaultError {
    VaultError::Storage(format!("sqlite: {e}"))
}

/// A `PreferenceStore` persisted in a SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    listeners: ListenerRegistry,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(storage_err)?;
        let store = Self::with_connection(conn)?;

        // Restrict the database to owner-only read/write on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(store)
    }

    /// A throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(storage_err)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .map_err(storage_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
            listeners: ListenerRegistry::new(),
        })
    }

    fn run_edit(&self, edit: &StoreEdit) -> Result<()> {
        let changed = {
            let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

            // The change set is computed against the pre-edit state inside
            // the same transaction.
            let tx = conn.transaction().map_err(storage_err)?;
            let mut before = BTreeMap::new();
            {
                let mut stmt = tx
                    .prepare("SELECT key, value FROM entries")
                    .map_err(storage_err)?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
                    .map_err(storage_err)?;
                for row in rows {
                    let (key, value) = row.map_err(storage_err)?;
                    before.insert(key, value);
                }
            }
            let changed = edit.apply_to(&mut before);

            if edit.clear {
                tx.execute("DELETE FROM entries", []).map_err(storage_err)?;
            }
            for key in &edit.removals {
                tx.execute("DELETE FROM entries WHERE key = ?1", params![key])
                    .map_err(storage_err)?;
            }
            for (key, value) in &edit.puts {
                tx.execute(
                    "INSERT OR REPLACE INTO entries (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )
                .map_err(storage_err)?;
            }
            tx.commit().map_err(storage_err)?;
            changed
        };

        debug!(changed = changed.len(), "sqlite store committed");
        self.listeners.notify(&changed);
        Ok(())
    }
}

impl PreferenceStore for SqliteStore {
    fn get_string(&self, key: &str) -> Option<String> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.query_row(
            "SELECT value FROM entries WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .unwrap_or_else(|e| {
            error!(error = %e, "sqlite read failed");
            None
        })
    }

    fn get_all(&self) -> BTreeMap<String, String> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let result = conn
            .prepare("SELECT key, value FROM entries")
            .and_then(|mut stmt| {
                let entries = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                    .collect::<rusqlite::Result<BTreeMap<String, String>>>();
                entries
            });

        result.unwrap_or_else(|e| {
            error!(error = %e, "sqlite read failed");
            BTreeMap::new()
        })
    }

    fn commit(&self, edit: StoreEdit) -> Result<()> {
        self.run_edit(&edit)
    }

    fn apply(&self, edit: StoreEdit) {
        if let Err(e) = self.run_edit(&edit) {
            error!(error = %e, "sqlite store apply failed");
        }
    }

    fn register_listener(
        &self,
        listener: Box<dyn Fn(&ChangeEvent<'_>) + Send + Sync>,
    ) -> ListenerId {
        self.listeners.register(listener)
    }

    fn unregister_listener(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }
}

/// Opens `SqliteStore`s under a directory, one database per store name.
#[derive(Debug, Clone)]
pub struct SqliteStoreProvider {
    dir: PathBuf,
}

impl SqliteStoreProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Example: `dir/secure_prefs.db`
    pub fn store_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.db"))
    }
}

impl StoreProvider for SqliteStoreProvider {
    fn open(&self, name: &str) -> Result<Arc<dyn PreferenceStore>> {
        validate_store_name(name)?;
        let store = SqliteStore::open(&self.store_path(name))?;
        Ok(Arc::new(store))
    }
}
