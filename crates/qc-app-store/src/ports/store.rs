use std::sync::Arc;

use crate::domain::{ChangeSet, CommitId, KvPair, StoreError, StoreQuery, StoreQueryResponse};

/// Key/value access shared by the root store, read-only views and branches.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    fn set(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError>;

    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Live pairs in `[start, end)` in ascending key order. `None` end is
    /// unbounded.
    fn range(&self, start: &[u8], end: Option<&[u8]>) -> Result<Vec<KvPair>, StoreError>;

    /// The first `limit` pairs of `range`. Implementations override this to
    /// avoid materializing the rest.
    fn range_limit(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<KvPair>, StoreError> {
        let mut pairs = self.range(start, end)?;
        pairs.truncate(limit);
        Ok(pairs)
    }

    /// Apply a batch of changes. Implementations override this to take their
    /// lock once.
    fn apply(&self, changes: ChangeSet) -> Result<(), StoreError> {
        for (key, value) in changes {
            match value {
                Some(value) => self.set(&key, value)?,
                None => self.delete(&key)?,
            }
        }
        Ok(())
    }
}

/// The root store: commits the working set as a new version.
pub trait CommitStore: KvStore {
    /// Stamp pending writes as version `latest + 1` and return its id.
    fn commit(&self) -> Result<CommitId, StoreError>;

    fn last_commit_id(&self) -> CommitId;

    /// Read-only view of a committed version.
    fn view_at(&self, version: u64) -> Result<Arc<dyn KvStore>, StoreError>;

    /// Path-based query against a committed version.
    fn query(&self, request: &StoreQuery) -> Result<StoreQueryResponse, StoreError>;

    /// Upcast for use as a branch parent.
    fn as_kv_store(self: Arc<Self>) -> Arc<dyn KvStore>;
}

/// State-sync capability of the root store.
pub trait Snapshotter: Send + Sync {
    /// Export the committed state at `height` as ordered chunks.
    fn snapshot(&self, height: u64, format: u32) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Import a full state at `height` into an empty store.
    ///
    /// A non-empty `expected_hash` must equal the commitment of the payload;
    /// on mismatch the store is left untouched.
    fn restore(
        &self,
        height: u64,
        format: u32,
        chunks: Vec<Vec<u8>>,
        expected_hash: &[u8],
    ) -> Result<CommitId, StoreError>;
}

/// Everything the runtime needs from its root store.
pub trait CommitMultiStore: CommitStore + Snapshotter {
    /// Upcast for the snapshot worker.
    fn as_snapshotter(self: Arc<Self>) -> Arc<dyn Snapshotter>;
}
