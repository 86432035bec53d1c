//! In-memory multi-version store.
//!
//! Every key keeps its full version history, so any committed version can be
//! read back for queries and snapshots while new versions are being written.
//! Writes land in a working set that `commit()` stamps with the next version.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{
    commitment_hash, ChangeSet, CommitId, KvPair, SnapshotPayload, StateTree, StoreError,
    StoreQuery, StoreQueryResponse, DEFAULT_CHUNK_SIZE, QUERY_PATH_KEY, QUERY_PATH_SUBSPACE,
    SNAPSHOT_FORMAT, prefix_end,
};
use crate::ports::{CommitMultiStore, CommitStore, KvStore, Snapshotter};

type Versions = BTreeMap<u64, Option<Vec<u8>>>;

fn key_bounds(start: &[u8], end: Option<&[u8]>) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    (
        Bound::Included(start.to_vec()),
        end.map_or(Bound::Unbounded, |end| Bound::Excluded(end.to_vec())),
    )
}

#[derive(Default)]
struct Inner {
    /// key -> version -> value (`None` = deleted at that version)
    history: BTreeMap<Vec<u8>, Versions>,
    /// Uncommitted writes on top of `latest`.
    working: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    latest: u64,
    /// Oldest readable version. Non-zero after a snapshot restore.
    earliest: u64,
    commits: BTreeMap<u64, CommitId>,
}

impl Inner {
    fn get_at(&self, key: &[u8], version: u64) -> Option<Vec<u8>> {
        self.history
            .get(key)
            .and_then(|versions| versions.range(..=version).next_back())
            .and_then(|(_, value)| value.clone())
    }

    /// At most `limit` live pairs of `version` in `[start, end)`.
    fn range_at(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        version: u64,
        limit: usize,
    ) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.history
            .range(key_bounds(start, end))
            .filter_map(|(key, versions)| {
                versions
                    .range(..=version)
                    .next_back()
                    .and_then(|(_, value)| value.clone())
                    .map(|value| (key.clone(), value))
            })
            .take(limit)
            .collect()
    }

    fn state_at(&self, version: u64) -> Vec<KvPair> {
        self.range_at(&[], None, version, usize::MAX)
            .into_iter()
            .map(|(key, value)| KvPair { key, value })
            .collect()
    }

    fn check_version(&self, version: u64) -> Result<(), StoreError> {
        if version > self.latest || (version < self.earliest && version != 0) {
            return Err(StoreError::VersionNotFound {
                version,
                earliest: self.earliest,
                latest: self.latest,
            });
        }
        Ok(())
    }

    fn commit_id_for(&self, version: u64) -> CommitId {
        let tree = StateTree::from_pairs(&self.state_at(version));
        CommitId {
            version,
            hash: commitment_hash(version, &tree.root()),
        }
    }
}

/// In-memory root store keeping every committed version.
pub struct VersionedStore {
    inner: Arc<RwLock<Inner>>,
    chunk_size: usize,
}

impl VersionedStore {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Create with a custom snapshot chunk size.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn latest_version(&self) -> u64 {
        self.inner.read().latest
    }

    /// Read a key at a committed version.
    pub fn get_at(&self, key: &[u8], version: u64) -> Result<Option<Vec<u8>>, StoreError> {
        let inner = self.inner.read();
        inner.check_version(version)?;
        Ok(inner.get_at(key, version))
    }

    fn resolve_height(&self, height: u64) -> u64 {
        if height == 0 {
            self.latest_version()
        } else {
            height
        }
    }
}

impl Default for VersionedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for VersionedStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let inner = self.inner.read();
        if let Some(pending) = inner.working.get(key) {
            return Ok(pending.clone());
        }
        Ok(inner.get_at(key, inner.latest))
    }

    fn set(&self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.inner.write().working.insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.inner.write().working.insert(key.to_vec(), None);
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
        let inner = self.inner.read();
        let pending: Vec<_> = inner.working.range(key_bounds(start, end)).collect();
        // Each pending delete can hide one committed pair.
        let deletes = pending.iter().filter(|(_, value)| value.is_none()).count();
        let mut merged = inner.range_at(start, end, inner.latest, limit.saturating_add(deletes));
        for (key, value) in pending {
            match value {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }
        Ok(merged
            .into_iter()
            .take(limit)
            .map(|(key, value)| KvPair { key, value })
            .collect())
    }

    fn apply(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.working.extend(changes);
        Ok(())
    }
}

impl CommitStore for VersionedStore {
    fn commit(&self) -> Result<CommitId, StoreError> {
        let mut inner = self.inner.write();
        let version = inner.latest + 1;

        let working = std::mem::take(&mut inner.working);
        let changed = working.len();
        for (key, value) in working {
            inner.history.entry(key).or_default().insert(version, value);
        }
        inner.latest = version;

        let commit_id = inner.commit_id_for(version);
        inner.commits.insert(version, commit_id);

        debug!(
            version,
            changed,
            hash = %commit_id.hash_hex(),
            "[store] committed version"
        );
        Ok(commit_id)
    }

    fn last_commit_id(&self) -> CommitId {
        let inner = self.inner.read();
        inner
            .commits
            .get(&inner.latest)
            .copied()
            .unwrap_or_default()
    }

    fn view_at(&self, version: u64) -> Result<Arc<dyn KvStore>, StoreError> {
        self.inner.read().check_version(version)?;
        Ok(Arc::new(VersionView {
            inner: Arc::clone(&self.inner),
            version,
        }))
    }

    fn query(&self, request: &StoreQuery) -> Result<StoreQueryResponse, StoreError> {
        let height = self.resolve_height(request.height);
        let inner = self.inner.read();
        inner.check_version(height)?;

        match request.path.as_str() {
            QUERY_PATH_KEY => {
                let value = inner.get_at(&request.data, height);
                let proof = match (&value, request.prove) {
                    (Some(_), true) => {
                        let state = inner.state_at(height);
                        let index = state
                            .binary_search_by(|pair| pair.key.as_slice().cmp(&request.data))
                            .ok();
                        index.and_then(|i| StateTree::from_pairs(&state).generate_proof(i))
                    }
                    _ => None,
                };
                Ok(StoreQueryResponse {
                    key: request.data.clone(),
                    value: value.unwrap_or_default(),
                    proof,
                    height,
                })
            }
            QUERY_PATH_SUBSPACE => {
                let end = prefix_end(&request.data);
                let pairs: Vec<KvPair> = inner
                    .range_at(&request.data, end.as_deref(), height, usize::MAX)
                    .into_iter()
                    .map(|(key, value)| KvPair { key, value })
                    .collect();
                let value = bincode::serialize(&pairs)
                    .map_err(|e| StoreError::SerializationError(e.to_string()))?;
                Ok(StoreQueryResponse {
                    key: request.data.clone(),
                    value,
                    proof: None,
                    height,
                })
            }
            other => Err(StoreError::UnknownQueryPath(other.to_string())),
        }
    }

    fn as_kv_store(self: Arc<Self>) -> Arc<dyn KvStore> {
        self
    }
}

impl Snapshotter for VersionedStore {
    fn snapshot(&self, height: u64, format: u32) -> Result<Vec<Vec<u8>>, StoreError> {
        if format != SNAPSHOT_FORMAT {
            return Err(StoreError::UnsupportedFormat { format });
        }

        let payload = {
            let inner = self.inner.read();
            if height == 0 || height > inner.latest || height < inner.earliest {
                return Err(StoreError::InvalidSnapshotHeight {
                    height,
                    latest: inner.latest,
                });
            }
            SnapshotPayload {
                version: height,
                items: inner.state_at(height),
            }
        };

        let bytes = bincode::serialize(&payload)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        let chunks: Vec<Vec<u8>> = bytes.chunks(self.chunk_size).map(<[u8]>::to_vec).collect();

        debug!(
            height,
            items = payload.items.len(),
            chunks = chunks.len(),
            "[store] exported snapshot"
        );
        Ok(chunks)
    }

    fn restore(
        &self,
        height: u64,
        format: u32,
        chunks: Vec<Vec<u8>>,
        expected_hash: &[u8],
    ) -> Result<CommitId, StoreError> {
        if format != SNAPSHOT_FORMAT {
            return Err(StoreError::UnsupportedFormat { format });
        }

        let payload: SnapshotPayload = bincode::deserialize(&chunks.concat())
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        if payload.version != height {
            return Err(StoreError::SnapshotVersionMismatch {
                expected: height,
                found: payload.version,
            });
        }

        // Normalize to the ordered, deduplicated view `commit_id_for` sees.
        let state: BTreeMap<Vec<u8>, Vec<u8>> = payload
            .items
            .into_iter()
            .map(|pair| (pair.key, pair.value))
            .collect();
        let pairs: Vec<KvPair> = state
            .into_iter()
            .map(|(key, value)| KvPair { key, value })
            .collect();
        let commit_id = CommitId {
            version: height,
            hash: commitment_hash(height, &StateTree::from_pairs(&pairs).root()),
        };
        if !expected_hash.is_empty() && expected_hash != commit_id.hash.as_slice() {
            return Err(StoreError::AppHashMismatch {
                expected: hex::encode_upper(expected_hash),
                actual: commit_id.hash_hex(),
            });
        }

        let mut inner = self.inner.write();
        if inner.latest != 0 || !inner.working.is_empty() {
            return Err(StoreError::NotEmpty {
                version: inner.latest,
            });
        }

        let count = pairs.len();
        for pair in pairs {
            inner
                .history
                .entry(pair.key)
                .or_default()
                .insert(height, Some(pair.value));
        }
        inner.latest = height;
        inner.earliest = height;
        inner.commits.insert(height, commit_id);

        info!(
            height,
            items = count,
            hash = %commit_id.hash_hex(),
            "[store] restored snapshot"
        );
        Ok(commit_id)
    }
}

impl CommitMultiStore for VersionedStore {
    fn as_snapshotter(self: Arc<Self>) -> Arc<dyn Snapshotter> {
        self
    }
}

/// Read-only view of one committed version.
pub struct VersionView {
    inner: Arc<RwLock<Inner>>,
    version: u64,
}

impl VersionView {
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl KvStore for VersionView {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.read().get_at(key, self.version))
    }

    fn set(&self, _key: &[u8], _value: Vec<u8>) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly)
    }

    fn delete(&self, _key: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly)
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
        Ok(self
            .inner
            .read()
            .range_at(start, end, self.version, limit)
            .into_iter()
            .map(|(key, value)| KvPair { key, value })
            .collect())
    }
}
