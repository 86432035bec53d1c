//! # Copy-on-Write Branch
//!
//! A `CacheStore` layers an overlay map on top of a parent store.
//!
//! ## Algorithm: Tagged Overlay
//!
//! - Read: overlay first, then parent. Parent hits are cached as *clean*.
//! - Write/Delete: recorded in the overlay as *dirty*; the parent is untouched.
//! - `write()`: dirty entries are applied to the parent as one batch and the
//!   overlay is cleared.
//!
//! Creating a branch is O(1): nothing is copied, lookups fall through the
//! layers instead.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use super::entities::{ChangeSet, KvPair};
use super::errors::StoreError;
use crate::ports::KvStore;

#[derive(Clone, Debug)]
struct CacheValue {
    /// `None` marks a deletion.
    value: Option<Vec<u8>>,
    dirty: bool,
}

/// Copy-on-write overlay over a parent store.
pub struct CacheStore {
    parent: Arc<dyn KvStore>,
    cache: RwLock<BTreeMap<Vec<u8>, CacheValue>>,
}

impl CacheStore {
    pub fn new(parent: Arc<dyn KvStore>) -> Self {
        Self {
            parent,
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    /// Branch this store: a fresh overlay whose parent is `self`.
    pub fn branch(self: &Arc<Self>) -> Arc<CacheStore> {
        let parent: Arc<dyn KvStore> = Arc::clone(self) as Arc<dyn KvStore>;
        Arc::new(CacheStore::new(parent))
    }

    /// Merge dirty entries into the parent and reset the overlay.
    pub fn write(&self) -> Result<(), StoreError> {
        let mut cache = self.cache.write();
        let changes: ChangeSet = cache
            .iter()
            .filter(|(_, entry)| entry.dirty)
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect();

        if !changes.is_empty() {
            self.parent.apply(changes)?;
        }
        cache.clear();
        Ok(())
    }

    /// Number of pending (unmerged) writes and deletes.
    pub fn dirty_count(&self) -> usize {
        self.cache.read().values().filter(|entry| entry.dirty).count()
    }

    fn set_entry(&self, key: &[u8], value: Option<Vec<u8>>) {
        self.cache
            .write()
            .insert(key.to_vec(), CacheValue { value, dirty: true });
    }
}

impl KvStore for CacheStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(entry) = self.cache.read().get(key) {
            return Ok(entry.value.clone());
        }

        let value = self.parent.get(key)?;
        let mut cache = self.cache.write();
        // A concurrent writer may have landed a dirty entry in between.
        let entry = cache.entry(key.to_vec()).or_insert(CacheValue {
            value,
            dirty: false,
        });
        Ok(entry.value.clone())
    }

    fn set(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.set_entry(key, Some(value));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.set_entry(key, None);
        Ok(())
    }

    fn range(&self, start: &[u8], end: Option<&[u8]>) -> Result<Vec<KvPair>, StoreError> {
        self.range_limit(start, end, usize::MAX)
    }

    fn range_limit(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<KvPair>, StoreError> {
        if matches!(end, Some(end) if end <= start) {
            return Ok(Vec::new());
        }

        let bounds = (
            Bound::Included(start.to_vec()),
            end.map_or(Bound::Unbounded, |end| Bound::Excluded(end.to_vec())),
        );
        // Clean entries mirror the parent.
        let pending: Vec<(Vec<u8>, Option<Vec<u8>>)> = self
            .cache
            .read()
            .range(bounds)
            .filter(|(_, entry)| entry.dirty)
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect();
        // Each pending delete can hide one parent pair.
        let deletes = pending.iter().filter(|(_, value)| value.is_none()).count();

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .parent
            .range_limit(start, end, limit.saturating_add(deletes))?
            .into_iter()
            .map(|pair| (pair.key, pair.value))
            .collect();
        for (key, value) in pending {
            match value {
                Some(value) => {
                    merged.insert(key, value);
                }
                None => {
                    merged.remove(&key);
                }
            }
        }

        Ok(merged
            .into_iter()
            .take(limit)
            .map(|(key, value)| KvPair { key, value })
            .collect())
    }

    fn apply(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let mut cache = self.cache.write();
        for (key, value) in changes {
            cache.insert(key, CacheValue { value, dirty: true });
        }
        Ok(())
    }
}
