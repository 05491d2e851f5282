//! Process-local preference store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::{PreferenceStore, StoreEdit, StoreProvider};
use crate::errors::Result;
use crate::listener::{ChangeEvent, ListenerId, ListenerRegistry};

/// A `PreferenceStore` that lives only as long as the process.
///
/// `commit` and `apply` behave identically: both take effect immediately.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
    listeners: ListenerRegistry,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply_edit(&self, edit: &StoreEdit) {
        let changed = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            edit.apply_to(&mut entries)
        };
        self.listeners.notify(&changed);
    }
}

impl PreferenceStore for MemoryStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn get_all(&self) -> BTreeMap<String, String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn commit(&self, edit: StoreEdit) -> Result<()> {
        self.apply_edit(&edit);
        Ok(())
    }

    fn apply(&self, edit: StoreEdit) {
        self.apply_edit(&edit);
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

/// Hands out one shared `MemoryStore` per name.
#[derive(Debug, Default)]
pub struct MemoryStoreProvider {
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryStoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The concrete store behind `name`, creating it if needed.
    pub fn store(&self, name: &str) -> Arc<MemoryStore> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(stores.entry(name.to_string()).or_default())
    }
}

impl StoreProvider for MemoryStoreProvider {
    fn open(&self, name: &str) -> Result<Arc<dyn PreferenceStore>> {
        let store: Arc<dyn PreferenceStore> = self.store(name);
        Ok(store)
    }
}
