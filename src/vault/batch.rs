//! Pending write batches and the fluent editor that builds them.

use std::collections::{BTreeMap, BTreeSet};

use super::store::Vault;
use super::value::TypedValue;

/// A set of changes submitted to [`Vault::write`] as one unit.
///
/// Inserting the same key twice keeps the last value. When the batch is
/// committed the store applies `clear_all` first, then removals, then
/// insertions, so a key that is both removed and inserted ends up inserted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingBatch {
    pub insertions: BTreeMap<String, TypedValue>,
    pub removals: BTreeSet<String>,
    pub clear_all: bool,
}

impl PendingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<TypedValue>) -> &mut Self {
        self.insertions.insert(key.into(), value.into());
        self
    }

    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        self.removals.insert(key.into());
        self
    }

    pub fn clear_all(&mut self) -> &mut Self {
        self.clear_all = true;
        self
    }

    /// Keys listeners are told about: removed keys plus inserted keys.
    pub fn affected_keys(&self) -> BTreeSet<String> {
        self.removals
            .iter()
            .chain(self.insertions.keys())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        !self.clear_all && self.insertions.is_empty() && self.removals.is_empty()
    }
}

/// Fluent builder over a [`PendingBatch`], obtained from [`Vault::edit`].
///
/// Nothing touches the store until [`commit`](Self::commit) or
/// [`apply`](Self::apply) is called; dropping the editor discards the batch.
#[must_use = "an editor does nothing until commit() or apply() is called"]
pub struct VaultEditor<'a> {
    vault: &'a Vault,
    batch: PendingBatch,
}

impl<'a> VaultEditor<'a> {
    pub(crate) fn new(vault: &'a Vault) -> Self {
        Self {
            vault,
            batch: PendingBatch::new(),
        }
    }

    pub fn put(mut self, key: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        self.batch.insert(key, value);
        self
    }

    pub fn put_string(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.put(key, TypedValue::String(value.into()))
    }

    pub fn put_int(self, key: impl Into<String>, value: i32) -> Self {
        self.put(key, TypedValue::Int(value))
    }

    pub fn put_long(self, key: impl Into<String>, value: i64) -> Self {
        self.put(key, TypedValue::Long(value))
    }

    pub fn put_float(self, key: impl Into<String>, value: f32) -> Self {
        self.put(key, TypedValue::Float(value))
    }

    pub fn put_bool(self, key: impl Into<String>, value: bool) -> Self {
        self.put(key, TypedValue::Bool(value))
    }

    pub fn put_string_set<I, S>(self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = values.into_iter().map(Into::into).collect();
        self.put(key, TypedValue::StringSet(set))
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.batch.remove(key);
        self
    }

    /// Remove every existing entry before this batch's insertions land.
    pub fn clear(mut self) -> Self {
        self.batch.clear_all();
        self
    }

    /// The batch built so far.
    pub fn batch(&self) -> &PendingBatch {
        &self.batch
    }

    /// Write durably. Returns `true` only once the store confirms the write.
    pub fn commit(self) -> bool {
        self.vault.write(self.batch, true)
    }

    /// Queue the write. Returns `true` once the batch has been handed to
    /// the store; persistence happens in the background.
    pub fn apply(self) -> bool {
        self.vault.write(self.batch, false)
    }
}
