//! # Snapshot Coordinator
//!
//! Producing side: a single background worker exports committed versions
//! through the root store's `Snapshotter`, persists them in the
//! `SnapshotStore` and prunes old ones. At most one snapshot is in flight;
//! a trigger while one runs is logged and dropped.
//!
//! Consuming side: OfferSnapshot binds one `SnapshotRestorer`, chunks are
//! applied strictly in order and the complete set is imported in one step.

use qc_app_store::{Snapshotter, SNAPSHOT_FORMAT};
use shared_types::{BlockHeader, Hash};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::{BaseApp, LifecyclePhase};
use crate::domain::{
    ApplyRejectReason, ChunkProgress, OfferRejectReason, RequestApplySnapshotChunk,
    RequestLoadSnapshotChunk, RequestOfferSnapshot, ResponseApplySnapshotChunk,
    ResponseListSnapshots, ResponseLoadSnapshotChunk, ResponseOfferSnapshot, RestoreError,
    Snapshot, SnapshotChunk, SnapshotError, SnapshotOutcome, SnapshotRestorer, StoredSnapshot,
    MAX_LISTED_SNAPSHOTS,
};
use crate::ports::SnapshotStore;

const OUTCOME_CAPACITY: usize = 16;

/// Owns the snapshot store and the background snapshot worker.
pub struct SnapshotManager {
    store: Option<Arc<dyn SnapshotStore>>,
    interval: u64,
    active: Arc<AtomicBool>,
    requests: Option<mpsc::UnboundedSender<u64>>,
    outcomes: broadcast::Sender<SnapshotOutcome>,
    worker: Option<JoinHandle<()>>,
}

impl SnapshotManager {
    /// Spawns the worker only when a store is configured.
    pub fn new(
        store: Option<Arc<dyn SnapshotStore>>,
        snapshotter: Arc<dyn Snapshotter>,
        interval: u64,
        keep_recent: u32,
    ) -> Self {
        let (outcomes, _) = broadcast::channel(OUTCOME_CAPACITY);
        let active = Arc::new(AtomicBool::new(false));

        let (requests, worker) = match &store {
            Some(store) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let worker = SnapshotWorker {
                    snapshotter,
                    store: Arc::clone(store),
                    keep_recent,
                    active: Arc::clone(&active),
                    outcomes: outcomes.clone(),
                };
                match std::thread::Builder::new()
                    .name("qc-snapshot".to_string())
                    .spawn(move || worker.run(rx))
                {
                    Ok(handle) => (Some(tx), Some(handle)),
                    Err(e) => {
                        error!("[app] Failed to spawn snapshot worker: {}", e);
                        (None, None)
                    }
                }
            }
            None => (None, None),
        };

        Self {
            store,
            interval,
            active,
            requests,
            outcomes,
            worker,
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// True if `height` falls on the configured interval.
    pub fn should_snapshot(&self, height: u64) -> bool {
        self.interval > 0 && height > 0 && height % self.interval == 0
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotOutcome> {
        self.outcomes.subscribe()
    }

    /// Request a snapshot of `height` without blocking the caller.
    pub fn trigger(&self, height: u64) -> Result<(), SnapshotError> {
        if self.store.is_none() {
            return Err(SnapshotError::NoSnapshotStore);
        }
        let Some(requests) = &self.requests else {
            return Err(SnapshotError::WorkerStopped);
        };
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(SnapshotError::InProgress);
        }
        if requests.send(height).is_err() {
            self.active.store(false, Ordering::SeqCst);
            return Err(SnapshotError::WorkerStopped);
        }
        debug!(height, "[app] Snapshot requested");
        Ok(())
    }

    /// Up to `MAX_LISTED_SNAPSHOTS` snapshots, newest first.
    pub fn list(&self) -> Result<Vec<Snapshot>, SnapshotError> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        store
            .list()?
            .into_iter()
            .take(MAX_LISTED_SNAPSHOTS)
            .map(advertise)
            .collect()
    }

    /// A stored chunk whose data still matches its recorded checksum.
    pub fn load_chunk(&self, height: u64, format: u32, index: u32) -> Option<SnapshotChunk> {
        let store = self.store.as_ref()?;
        let (checksum, data) = match store.load_chunk(height, format, index) {
            Ok(Some(found)) => found,
            Ok(None) => return None,
            Err(e) => {
                error!(height, format, index, "[app] Failed to load snapshot chunk: {}", e);
                return None;
            }
        };
        let actual = crate::domain::chunk_checksum(&data);
        if actual.as_slice() != checksum.as_slice() {
            error!(
                height,
                format,
                index,
                expected = %hex::encode(&checksum),
                actual = %hex::encode(actual),
                "[app] Stored snapshot chunk is corrupt"
            );
            return None;
        }
        Some(SnapshotChunk {
            height,
            format,
            index,
            checksum,
            data,
        })
    }
}

impl Drop for SnapshotManager {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("[app] Snapshot worker panicked");
            }
        }
    }
}

fn advertise(stored: StoredSnapshot) -> Result<Snapshot, SnapshotError> {
    let metadata = bincode::serialize(&stored.chunk_hashes)
        .map_err(|e| SnapshotError::Serialization(e.to_string()))?;
    Ok(Snapshot {
        height: stored.height,
        format: stored.format,
        chunks: stored.chunk_count(),
        metadata,
    })
}

struct SnapshotWorker {
    snapshotter: Arc<dyn Snapshotter>,
    store: Arc<dyn SnapshotStore>,
    keep_recent: u32,
    active: Arc<AtomicBool>,
    outcomes: broadcast::Sender<SnapshotOutcome>,
}

impl SnapshotWorker {
    fn run(self, mut requests: mpsc::UnboundedReceiver<u64>) {
        while let Some(height) = requests.blocking_recv() {
            let outcome = match self.take(height) {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(height, "[app] Failed to create state snapshot: {}", e);
                    SnapshotOutcome::Failed {
                        height,
                        reason: e.to_string(),
                    }
                }
            };
            self.active.store(false, Ordering::SeqCst);
            // Nobody listening is fine.
            let _ = self.outcomes.send(outcome);
        }
        debug!("[app] Snapshot worker stopped");
    }

    fn take(&self, height: u64) -> Result<SnapshotOutcome, SnapshotError> {
        info!(height, "[app] Creating state snapshot");
        let chunks = self.snapshotter.snapshot(height, SNAPSHOT_FORMAT)?;
        let stored = self.store.save(height, SNAPSHOT_FORMAT, chunks)?;
        info!(
            height,
            format = stored.format,
            chunks = stored.chunk_count(),
            "[app] Completed state snapshot"
        );

        let pruned = if self.keep_recent > 0 {
            match self.store.prune(self.keep_recent) {
                Ok(pruned) => {
                    debug!(pruned, "[app] Pruned state snapshots");
                    pruned
                }
                Err(e) => {
                    error!("[app] Failed to prune state snapshots: {}", e);
                    0
                }
            }
        } else {
            0
        };

        Ok(SnapshotOutcome::Completed {
            height,
            format: stored.format,
            chunks: stored.chunk_count(),
            pruned,
        })
    }
}

/// Restoration bound by an accepted offer.
pub(super) struct ActiveRestore {
    restorer: SnapshotRestorer,
    app_hash: Vec<u8>,
}

impl BaseApp {
    pub(super) fn trigger_snapshot(&self, height: u64) {
        if let Err(e) = self.snapshots.trigger(height) {
            error!(height, "[app] Failed to create state snapshot: {}", e);
        }
    }

    pub(super) fn handle_list_snapshots(&self) -> ResponseListSnapshots {
        match self.snapshots.list() {
            Ok(snapshots) => ResponseListSnapshots { snapshots },
            Err(e) => {
                error!("[app] Failed to list snapshots: {}", e);
                ResponseListSnapshots::default()
            }
        }
    }

    pub(super) fn handle_load_snapshot_chunk(
        &self,
        req: RequestLoadSnapshotChunk,
    ) -> ResponseLoadSnapshotChunk {
        ResponseLoadSnapshotChunk {
            chunk: self.snapshots.load_chunk(req.height, req.format, req.index),
        }
    }

    pub(super) fn handle_offer_snapshot(
        &mut self,
        req: RequestOfferSnapshot,
    ) -> ResponseOfferSnapshot {
        let Some(snapshot) = req.snapshot else {
            error!("[app] Received nil snapshot");
            return ResponseOfferSnapshot::rejected(OfferRejectReason::InternalError);
        };
        if snapshot.format != SNAPSHOT_FORMAT {
            warn!(
                height = snapshot.height,
                format = snapshot.format,
                "[app] Rejecting snapshot in unsupported format"
            );
            return ResponseOfferSnapshot::rejected(OfferRejectReason::InvalidFormat);
        }
        if self.restore.is_some() {
            error!(
                height = snapshot.height,
                "[app] Snapshot restoration already in progress"
            );
            return ResponseOfferSnapshot::rejected(OfferRejectReason::InternalError);
        }
        let latest = self.last_block_height();
        if latest > 0 {
            error!(
                height = snapshot.height,
                latest, "[app] Cannot restore a snapshot over existing state"
            );
            return ResponseOfferSnapshot::rejected(OfferRejectReason::InternalError);
        }

        let checksums: Vec<Hash> = if snapshot.metadata.is_empty() {
            Vec::new()
        } else {
            match bincode::deserialize(&snapshot.metadata) {
                Ok(checksums) => checksums,
                Err(e) => {
                    error!(height = snapshot.height, "[app] Invalid snapshot metadata: {}", e);
                    return ResponseOfferSnapshot::rejected(OfferRejectReason::InternalError);
                }
            }
        };

        match SnapshotRestorer::new(snapshot.height, snapshot.format, snapshot.chunks, checksums) {
            Ok(restorer) => {
                info!(
                    height = snapshot.height,
                    format = snapshot.format,
                    chunks = snapshot.chunks,
                    "[app] Accepted snapshot offer"
                );
                self.restore = Some(ActiveRestore {
                    restorer,
                    app_hash: req.app_hash,
                });
                ResponseOfferSnapshot::accepted()
            }
            Err(e) => {
                error!(height = snapshot.height, "[app] Failed to restore snapshot: {}", e);
                ResponseOfferSnapshot::rejected(OfferRejectReason::InternalError)
            }
        }
    }

    pub(super) fn handle_apply_snapshot_chunk(
        &mut self,
        req: RequestApplySnapshotChunk,
    ) -> ResponseApplySnapshotChunk {
        let Some(active) = self.restore.as_mut() else {
            error!("[app] Received chunk without an active restoration");
            return ResponseApplySnapshotChunk::rejected(ApplyRejectReason::InternalError);
        };
        let Some(chunk) = req.chunk else {
            error!("[app] Received nil chunk; aborting restoration");
            self.restore = None;
            return ResponseApplySnapshotChunk::rejected(ApplyRejectReason::InternalError);
        };

        let (height, format, index) = (chunk.height, chunk.format, chunk.index);
        let progress =
            active
                .restorer
                .add(height, format, index, &chunk.checksum, chunk.data);

        match progress {
            Ok(ChunkProgress::Pending { next_index }) => {
                debug!(height, index, next_index, "[app] Applied snapshot chunk");
                ResponseApplySnapshotChunk::applied()
            }
            Ok(ChunkProgress::Complete(chunks)) => self.complete_restore(height, format, chunks),
            Err(e @ RestoreError::ChecksumMismatch { .. }) => {
                warn!(height, index, "[app] Rejected snapshot chunk: {}", e);
                ResponseApplySnapshotChunk::rejected(ApplyRejectReason::VerifyFailed)
            }
            Err(e) if e.is_retryable() => {
                warn!(height, index, "[app] Rejected snapshot chunk: {}", e);
                ResponseApplySnapshotChunk::rejected(ApplyRejectReason::Unexpected)
            }
            Err(e) => {
                error!(height, index, "[app] Aborting restoration: {}", e);
                self.restore = None;
                ResponseApplySnapshotChunk::rejected(ApplyRejectReason::InternalError)
            }
        }
    }

    fn complete_restore(
        &mut self,
        height: u64,
        format: u32,
        chunks: Vec<Vec<u8>>,
    ) -> ResponseApplySnapshotChunk {
        let Some(active) = self.restore.take() else {
            return ResponseApplySnapshotChunk::rejected(ApplyRejectReason::InternalError);
        };

        // The store verifies the offered hash before importing anything, so a
        // mismatch leaves it empty and a fresh offer can be accepted.
        let commit_id = match self.cms.restore(height, format, chunks, &active.app_hash) {
            Ok(commit_id) => commit_id,
            Err(e) => {
                error!(height, "[app] Failed to import snapshot: {}", e);
                return ResponseApplySnapshotChunk::rejected(ApplyRejectReason::InternalError);
            }
        };

        self.set_check_state(BlockHeader {
            height,
            ..Default::default()
        });
        self.phase = LifecyclePhase::Ready;
        info!(
            height,
            hash = %commit_id.hash_hex(),
            "[app] Snapshot restoration complete"
        );
        ResponseApplySnapshotChunk::applied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemorySnapshotStore;
    use qc_app_store::{CommitStore, KvStore, VersionedStore};
    use std::time::Duration;

    fn committed_store(versions: u64) -> Arc<VersionedStore> {
        let store = Arc::new(VersionedStore::with_chunk_size(16));
        for v in 1..=versions {
            store.set(format!("key{v}").as_bytes(), vec![v as u8; 8]).unwrap();
            store.commit().unwrap();
        }
        store
    }

    fn recv(rx: &mut broadcast::Receiver<SnapshotOutcome>) -> SnapshotOutcome {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            match rx.try_recv() {
                Ok(outcome) => return outcome,
                Err(broadcast::error::TryRecvError::Empty) if std::time::Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => panic!("no snapshot outcome: {e}"),
            }
        }
    }

    #[test]
    fn test_should_snapshot_on_interval() {
        let manager = SnapshotManager::new(None, committed_store(0), 5, 2);
        assert!(!manager.should_snapshot(0));
        assert!(!manager.should_snapshot(4));
        assert!(manager.should_snapshot(5));
        assert!(manager.should_snapshot(10));

        let disabled = SnapshotManager::new(None, committed_store(0), 0, 2);
        assert!(!disabled.should_snapshot(5));
    }

    #[test]
    fn test_trigger_without_store_fails() {
        let manager = SnapshotManager::new(None, committed_store(1), 1, 2);
        assert_eq!(manager.trigger(1), Err(SnapshotError::NoSnapshotStore));
        assert!(manager.list().unwrap().is_empty());
        assert!(manager.load_chunk(1, 1, 0).is_none());
    }

    #[test]
    fn test_worker_snapshots_and_prunes() {
        let store: Arc<dyn SnapshotStore> = Arc::new(InMemorySnapshotStore::new());
        let manager = SnapshotManager::new(Some(Arc::clone(&store)), committed_store(3), 1, 2);
        let mut rx = manager.subscribe();

        for height in 1..=3 {
            manager.trigger(height).unwrap();
            match recv(&mut rx) {
                SnapshotOutcome::Completed { height: h, .. } => assert_eq!(h, height),
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert!(!manager.is_active());

        let listed: Vec<u64> = manager.list().unwrap().iter().map(|s| s.height).collect();
        assert_eq!(listed, vec![3, 2]);

        let snapshot = &manager.list().unwrap()[0];
        let hashes: Vec<Hash> = bincode::deserialize(&snapshot.metadata).unwrap();
        assert_eq!(hashes.len() as u32, snapshot.chunks);
        let chunk = manager.load_chunk(3, SNAPSHOT_FORMAT, 0).unwrap();
        assert_eq!(chunk.checksum, hashes[0].to_vec());
    }

    #[test]
    fn test_failed_snapshot_is_reported() {
        let store: Arc<dyn SnapshotStore> = Arc::new(InMemorySnapshotStore::new());
        let manager = SnapshotManager::new(Some(store), committed_store(1), 1, 0);
        let mut rx = manager.subscribe();

        manager.trigger(9).unwrap();
        assert!(matches!(recv(&mut rx), SnapshotOutcome::Failed { height: 9, .. }));
    }

    #[test]
    fn test_corrupt_chunk_is_not_served() {
        let memory = Arc::new(InMemorySnapshotStore::new());
        let store: Arc<dyn SnapshotStore> = memory.clone();
        let manager = SnapshotManager::new(Some(store), committed_store(1), 1, 0);
        let mut rx = manager.subscribe();
        manager.trigger(1).unwrap();
        recv(&mut rx);

        assert!(manager.load_chunk(1, SNAPSHOT_FORMAT, 0).is_some());
        memory.corrupt_chunk(1, SNAPSHOT_FORMAT, 0, vec![0xFF]);
        assert!(manager.load_chunk(1, SNAPSHOT_FORMAT, 0).is_none());
    }
}
