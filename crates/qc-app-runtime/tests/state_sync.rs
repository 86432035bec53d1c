//! # State Sync Tests
//!
//! Snapshots taken by one app on commit, served chunk by chunk and
//! restored into a fresh app over an empty store.

mod common;

use common::*;
use qc_app_runtime::{
    AppConfig, Application, ApplyRejectReason, BaseApp, FsSnapshotStore, InMemorySnapshotStore,
    LifecyclePhase, OfferRejectReason, RequestApplySnapshotChunk, RequestBeginBlock,
    RequestEndBlock, RequestLoadSnapshotChunk, RequestOfferSnapshot, RequestQuery, Snapshot,
    SnapshotChunk, SnapshotOutcome, SnapshotStore,
};
use qc_app_store::VersionedStore;
use shared_types::format_address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

fn snapshot_config(interval: u64, keep_recent: u32) -> AppConfig {
    AppConfig {
        snapshot_interval: interval,
        snapshot_keep_recent: keep_recent,
        ..AppConfig::default()
    }
}

async fn next_outcome(rx: &mut broadcast::Receiver<SnapshotOutcome>) -> SnapshotOutcome {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("Should snapshot within timeout")
        .expect("Snapshot channel open")
}

/// A chain at height 2 with one snapshot of height 2, and its app hash.
async fn snapshotted_chain() -> (TestChain, Snapshot, Vec<u8>) {
    let store: Arc<dyn SnapshotStore> = Arc::new(InMemorySnapshotStore::new());
    let mut chain =
        TestChain::with_genesis(snapshot_config(2, 0), Genesis::default(), Some(store));
    let mut outcomes = chain.app.subscribe_snapshots();

    let bob = chain.address("bob");
    let tx = chain.sign("alice", vec![chain.send_msg("alice", bob, 4_200)]);
    let (results, hash) = chain.block(vec![tx]);
    assert!(results[0].is_ok(), "send failed: {}", results[0].log);

    match next_outcome(&mut outcomes).await {
        SnapshotOutcome::Completed { height, .. } => assert_eq!(height, 2),
        other => panic!("Expected completed snapshot, got {:?}", other),
    }
    let snapshot = chain
        .app
        .list_snapshots()
        .snapshots
        .into_iter()
        .next()
        .expect("snapshot listed");
    (chain, snapshot, hash)
}

fn load_chunk(source: &BaseApp, snapshot: &Snapshot, index: u32) -> SnapshotChunk {
    source
        .load_snapshot_chunk(RequestLoadSnapshotChunk {
            height: snapshot.height,
            format: snapshot.format,
            index,
        })
        .chunk
        .expect("chunk served")
}

fn empty_app() -> BaseApp {
    build_app(
        Arc::new(VersionedStore::new()),
        AppConfig::default(),
        Genesis::default(),
        None,
    )
}

fn offer(app: &mut BaseApp, snapshot: &Snapshot, app_hash: Vec<u8>) -> OfferRejectReason {
    let res = app.offer_snapshot(RequestOfferSnapshot {
        snapshot: Some(snapshot.clone()),
        app_hash,
    });
    assert_eq!(res.accepted, res.reason == OfferRejectReason::None);
    res.reason
}

fn apply(app: &mut BaseApp, chunk: SnapshotChunk) -> ApplyRejectReason {
    app.apply_snapshot_chunk(RequestApplySnapshotChunk { chunk: Some(chunk) })
        .reason
}

#[tokio::test]
async fn test_snapshot_round_trip_reproduces_app_hash() {
    // Arrange
    let (source, snapshot, hash) = snapshotted_chain().await;
    assert_eq!(snapshot.height, 2);
    assert!(snapshot.chunks >= 2);
    let mut target = empty_app();
    assert_eq!(target.phase(), LifecyclePhase::Uninitialized);

    // Act
    assert_eq!(offer(&mut target, &snapshot, hash.clone()), OfferRejectReason::None);
    for index in 0..snapshot.chunks {
        let chunk = load_chunk(&source.app, &snapshot, index);
        assert_eq!(apply(&mut target, chunk), ApplyRejectReason::None);
    }

    // Assert
    assert_eq!(target.phase(), LifecyclePhase::Ready);
    assert_eq!(target.info().last_block_height, 2);
    assert_eq!(target.info().last_block_app_hash, hash);

    let bob = format_address(&source.address("bob"));
    let res = target.query(RequestQuery {
        path: format!("custom/bank/balance/{bob}"),
        ..Default::default()
    });
    assert_eq!(res.value, b"1004200");

    // The restored app keeps producing blocks.
    target.begin_block(RequestBeginBlock {
        header: header(3),
        ..Default::default()
    });
    target.end_block(RequestEndBlock { height: 3 });
    target.commit();
    assert_eq!(target.last_block_height(), 3);
}

#[tokio::test]
async fn test_out_of_order_chunk_is_retryable() {
    let (source, snapshot, hash) = snapshotted_chain().await;
    let mut target = empty_app();
    offer(&mut target, &snapshot, hash.clone());

    let second = load_chunk(&source.app, &snapshot, 1);
    assert_eq!(apply(&mut target, second), ApplyRejectReason::Unexpected);

    for index in 0..snapshot.chunks {
        let chunk = load_chunk(&source.app, &snapshot, index);
        assert_eq!(apply(&mut target, chunk), ApplyRejectReason::None);
    }
    assert_eq!(target.info().last_block_app_hash, hash);
}

#[tokio::test]
async fn test_corrupted_chunk_fails_verification() {
    let (source, snapshot, hash) = snapshotted_chain().await;
    let mut target = empty_app();
    offer(&mut target, &snapshot, hash);

    let mut corrupted = load_chunk(&source.app, &snapshot, 0);
    corrupted.data[0] ^= 0xFF;
    assert_eq!(apply(&mut target, corrupted), ApplyRejectReason::VerifyFailed);

    // The restore is still active and accepts the genuine chunk.
    let genuine = load_chunk(&source.app, &snapshot, 0);
    assert_eq!(apply(&mut target, genuine), ApplyRejectReason::None);
}

#[tokio::test]
async fn test_app_hash_mismatch_rejects_final_chunk() {
    // Arrange
    let (source, snapshot, hash) = snapshotted_chain().await;
    let mut target = empty_app();
    assert_eq!(offer(&mut target, &snapshot, vec![0; 32]), OfferRejectReason::None);

    // Act
    let last = snapshot.chunks - 1;
    for index in 0..last {
        let chunk = load_chunk(&source.app, &snapshot, index);
        assert_eq!(apply(&mut target, chunk), ApplyRejectReason::None);
    }
    let chunk = load_chunk(&source.app, &snapshot, last);
    let rejected = apply(&mut target, chunk);

    // Assert
    assert_eq!(rejected, ApplyRejectReason::InternalError);
    assert_eq!(target.info().last_block_height, 0);
    assert_eq!(target.phase(), LifecyclePhase::Uninitialized);

    // The untouched store still accepts the snapshot under the right hash.
    assert_eq!(offer(&mut target, &snapshot, hash.clone()), OfferRejectReason::None);
    for index in 0..snapshot.chunks {
        let chunk = load_chunk(&source.app, &snapshot, index);
        assert_eq!(apply(&mut target, chunk), ApplyRejectReason::None);
    }
    assert_eq!(target.phase(), LifecyclePhase::Ready);
    assert_eq!(target.info().last_block_app_hash, hash);
}

#[tokio::test]
async fn test_offer_rejections() {
    let (mut source, snapshot, hash) = snapshotted_chain().await;
    let mut target = empty_app();

    let nil = target.offer_snapshot(RequestOfferSnapshot::default());
    assert!(!nil.accepted);
    assert_eq!(nil.reason, OfferRejectReason::InternalError);

    let wrong_format = Snapshot {
        format: 99,
        ..snapshot.clone()
    };
    assert_eq!(
        offer(&mut target, &wrong_format, hash.clone()),
        OfferRejectReason::InvalidFormat
    );

    let bad_metadata = Snapshot {
        metadata: vec![1, 2, 3],
        ..snapshot.clone()
    };
    assert_eq!(
        offer(&mut target, &bad_metadata, hash.clone()),
        OfferRejectReason::InternalError
    );

    let no_chunks = Snapshot {
        chunks: 0,
        metadata: Vec::new(),
        ..snapshot.clone()
    };
    assert_eq!(
        offer(&mut target, &no_chunks, hash.clone()),
        OfferRejectReason::InternalError
    );

    let oversized = Snapshot {
        chunks: u32::MAX,
        metadata: Vec::new(),
        ..snapshot.clone()
    };
    assert_eq!(
        offer(&mut target, &oversized, hash.clone()),
        OfferRejectReason::InternalError
    );

    // Existing state cannot be overwritten.
    assert_eq!(
        offer(&mut source.app, &snapshot, hash.clone()),
        OfferRejectReason::InternalError
    );

    // Only one restore at a time.
    assert_eq!(offer(&mut target, &snapshot, hash.clone()), OfferRejectReason::None);
    assert_eq!(
        offer(&mut target, &snapshot, hash),
        OfferRejectReason::InternalError
    );
}

#[tokio::test]
async fn test_nil_chunk_aborts_restore() {
    let (source, snapshot, hash) = snapshotted_chain().await;
    let mut target = empty_app();

    let orphan = load_chunk(&source.app, &snapshot, 0);
    assert_eq!(apply(&mut target, orphan), ApplyRejectReason::InternalError);

    offer(&mut target, &snapshot, hash);
    let res = target.apply_snapshot_chunk(RequestApplySnapshotChunk { chunk: None });
    assert_eq!(res.reason, ApplyRejectReason::InternalError);

    let after_abort = load_chunk(&source.app, &snapshot, 0);
    assert_eq!(apply(&mut target, after_abort), ApplyRejectReason::InternalError);
    assert_eq!(target.phase(), LifecyclePhase::Uninitialized);
}

#[tokio::test]
async fn test_filesystem_snapshots_pruned_to_keep_recent() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn SnapshotStore> = Arc::new(FsSnapshotStore::new(dir.path()).unwrap());
    let mut chain = TestChain::with_genesis(snapshot_config(2, 2), Genesis::default(), Some(store));
    let mut outcomes = chain.app.subscribe_snapshots();

    // Act: snapshots at 2, 4 and 6, waiting out each one.
    for expected in [2, 4, 6] {
        chain.block(Vec::new());
        chain.block(Vec::new());
        match next_outcome(&mut outcomes).await {
            SnapshotOutcome::Completed { height, .. } => assert_eq!(height, expected),
            other => panic!("Expected completed snapshot, got {:?}", other),
        }
    }

    // Assert
    let heights: Vec<u64> = chain
        .app
        .list_snapshots()
        .snapshots
        .iter()
        .map(|s| s.height)
        .collect();
    assert_eq!(heights, vec![6, 4]);
    assert!(!chain.app.snapshot_manager().is_active());
}
