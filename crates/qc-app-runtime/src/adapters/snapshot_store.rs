//! Snapshot store adapters.
//!
//! - `InMemorySnapshotStore`: for tests and ephemeral nodes.
//! - `FsSnapshotStore`: one directory per snapshot,
//!   `<root>/<height>/<format>/{metadata.json,0,1,...}`.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::{chunk_checksum, SnapshotError, StoredSnapshot};
use crate::ports::SnapshotStore;

type Key = (u64, u32);

fn newest_first(mut snapshots: Vec<StoredSnapshot>) -> Vec<StoredSnapshot> {
    snapshots.sort_by(|a, b| (b.height, b.format).cmp(&(a.height, a.format)));
    snapshots
}

/// Heap-backed snapshot store.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<BTreeMap<Key, (StoredSnapshot, Vec<Vec<u8>>)>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the data of a stored chunk, keeping its checksum.
    pub fn corrupt_chunk(&self, height: u64, format: u32, index: u32, data: Vec<u8>) {
        if let Some((_, chunks)) = self.snapshots.write().get_mut(&(height, format)) {
            if let Some(chunk) = chunks.get_mut(index as usize) {
                *chunk = data;
            }
        }
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn save(
        &self,
        height: u64,
        format: u32,
        chunks: Vec<Vec<u8>>,
    ) -> Result<StoredSnapshot, SnapshotError> {
        let mut snapshots = self.snapshots.write();
        if snapshots.contains_key(&(height, format)) {
            return Err(SnapshotError::AlreadyExists { height, format });
        }
        let metadata = StoredSnapshot {
            height,
            format,
            chunk_hashes: chunks.iter().map(|chunk| chunk_checksum(chunk)).collect(),
        };
        snapshots.insert((height, format), (metadata.clone(), chunks));
        Ok(metadata)
    }

    fn list(&self) -> Result<Vec<StoredSnapshot>, SnapshotError> {
        Ok(newest_first(
            self.snapshots
                .read()
                .values()
                .map(|(metadata, _)| metadata.clone())
                .collect(),
        ))
    }

    fn load_chunk(
        &self,
        height: u64,
        format: u32,
        index: u32,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, SnapshotError> {
        let snapshots = self.snapshots.read();
        let Some((metadata, chunks)) = snapshots.get(&(height, format)) else {
            return Ok(None);
        };
        Ok(metadata
            .chunk_hashes
            .get(index as usize)
            .zip(chunks.get(index as usize))
            .map(|(hash, data)| (hash.to_vec(), data.clone())))
    }

    fn prune(&self, retain: u32) -> Result<u64, SnapshotError> {
        let mut snapshots = self.snapshots.write();
        let doomed: Vec<Key> = newest_first(snapshots.values().map(|(m, _)| m.clone()).collect())
            .into_iter()
            .skip(retain as usize)
            .map(|m| (m.height, m.format))
            .collect();
        for key in &doomed {
            snapshots.remove(key);
        }
        Ok(doomed.len() as u64)
    }
}

const METADATA_FILE: &str = "metadata.json";

/// Directory-backed snapshot store.
pub struct FsSnapshotStore {
    root: PathBuf,
    // Serializes writers against pruning.
    lock: RwLock<()>,
}

impl FsSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            lock: RwLock::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshot_dir(&self, height: u64, format: u32) -> PathBuf {
        self.root.join(height.to_string()).join(format.to_string())
    }

    fn read_metadata(dir: &Path) -> Result<Option<StoredSnapshot>, SnapshotError> {
        let path = dir.join(METADATA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))
    }

    fn list_unlocked(&self) -> Result<Vec<StoredSnapshot>, SnapshotError> {
        let mut snapshots = Vec::new();
        for height_entry in fs::read_dir(&self.root)? {
            let height_entry = height_entry?;
            if !height_entry.file_type()?.is_dir() {
                continue;
            }
            for format_entry in fs::read_dir(height_entry.path())? {
                let format_entry = format_entry?;
                if let Some(metadata) = Self::read_metadata(&format_entry.path())? {
                    snapshots.push(metadata);
                }
            }
        }
        Ok(newest_first(snapshots))
    }
}

impl SnapshotStore for FsSnapshotStore {
    fn save(
        &self,
        height: u64,
        format: u32,
        chunks: Vec<Vec<u8>>,
    ) -> Result<StoredSnapshot, SnapshotError> {
        let _guard = self.lock.write();
        let dir = self.snapshot_dir(height, format);
        if dir.join(METADATA_FILE).exists() {
            return Err(SnapshotError::AlreadyExists { height, format });
        }
        fs::create_dir_all(&dir)?;

        let mut chunk_hashes = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            fs::write(dir.join(index.to_string()), chunk)?;
            chunk_hashes.push(chunk_checksum(chunk));
        }

        let metadata = StoredSnapshot {
            height,
            format,
            chunk_hashes,
        };
        let json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;
        // Metadata last: a snapshot without it is incomplete and ignored.
        fs::write(dir.join(METADATA_FILE), json)?;

        debug!(height, format, dir = %dir.display(), "[app] Saved snapshot");
        Ok(metadata)
    }

    fn list(&self) -> Result<Vec<StoredSnapshot>, SnapshotError> {
        let _guard = self.lock.read();
        self.list_unlocked()
    }

    fn load_chunk(
        &self,
        height: u64,
        format: u32,
        index: u32,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, SnapshotError> {
        let _guard = self.lock.read();
        let dir = self.snapshot_dir(height, format);
        let Some(metadata) = Self::read_metadata(&dir)? else {
            return Ok(None);
        };
        let Some(hash) = metadata.chunk_hashes.get(index as usize) else {
            return Ok(None);
        };
        let data = fs::read(dir.join(index.to_string()))?;
        Ok(Some((hash.to_vec(), data)))
    }

    fn prune(&self, retain: u32) -> Result<u64, SnapshotError> {
        let _guard = self.lock.write();
        let mut pruned = 0;
        for snapshot in self.list_unlocked()?.into_iter().skip(retain as usize) {
            let dir = self.snapshot_dir(snapshot.height, snapshot.format);
            fs::remove_dir_all(&dir)?;
            // Drop the height directory once its last format is gone.
            if let Some(parent) = dir.parent() {
                if fs::read_dir(parent)?.next().is_none() {
                    fs::remove_dir(parent)?;
                }
            }
            pruned += 1;
        }
        Ok(pruned)
    }
}
