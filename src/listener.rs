//! Change listener registry.
//!
//! Used by the vault and by the store backends. Listeners are called
//! synchronously on the thread that committed the change, in registration
//! order, once per changed key.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Handle returned by `register`, used to unregister a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// One notification delivered to a listener.
#[derive(Debug, Clone, Copy)]
pub struct ChangeEvent<'a> {
    /// The key this call is about.
    pub key: &'a str,
    /// Every key touched by the same commit, including `key`.
    pub changed: &'a BTreeSet<String>,
}

type Callback = Arc<dyn Fn(&ChangeEvent<'_>) + Send + Sync>;

/// Ordered list of registered callbacks.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<Vec<(ListenerId, Callback)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. It runs after every successful commit.
    pub fn register<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent<'_>) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every listener once per key in `changed`.
    ///
    /// The list is snapshotted first, so a listener may register or
    /// unregister others without deadlocking.
    pub fn notify(&self, changed: &BTreeSet<String>) {
        if changed.is_empty() {
            return;
        }

        let snapshot: Vec<Callback> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in &snapshot {
            for key in changed {
                callback(&ChangeEvent {
                    key: key.as_str(),
                    changed,
                });
            }
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
