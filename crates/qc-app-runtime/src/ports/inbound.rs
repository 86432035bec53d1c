//! # Inbound Ports (Driving Ports / API)
//!
//! The protocol the consensus engine drives the application with.
//!
//! Lifecycle calls take `&mut self` and are strictly sequential. `check_tx`
//! and `query` take `&self`; callers running them concurrently must still
//! serialize them against `commit`.

use crate::domain::{
    RequestApplySnapshotChunk, RequestBeginBlock, RequestCheckTx, RequestDeliverTx,
    RequestEndBlock, RequestInitChain, RequestLoadSnapshotChunk, RequestOfferSnapshot,
    RequestQuery, ResponseApplySnapshotChunk, ResponseBeginBlock, ResponseCheckTx,
    ResponseCommit, ResponseDeliverTx, ResponseEndBlock, ResponseInfo, ResponseInitChain,
    ResponseListSnapshots, ResponseLoadSnapshotChunk, ResponseOfferSnapshot, ResponseQuery,
};

pub trait Application {
    fn info(&self) -> ResponseInfo;

    fn init_chain(&mut self, req: RequestInitChain) -> ResponseInitChain;

    fn begin_block(&mut self, req: RequestBeginBlock) -> ResponseBeginBlock;

    fn check_tx(&self, req: RequestCheckTx) -> ResponseCheckTx;

    fn deliver_tx(&mut self, req: RequestDeliverTx) -> ResponseDeliverTx;

    fn end_block(&mut self, req: RequestEndBlock) -> ResponseEndBlock;

    fn commit(&mut self) -> ResponseCommit;

    fn query(&self, req: RequestQuery) -> ResponseQuery;

    fn list_snapshots(&self) -> ResponseListSnapshots;

    fn load_snapshot_chunk(&self, req: RequestLoadSnapshotChunk) -> ResponseLoadSnapshotChunk;

    fn offer_snapshot(&mut self, req: RequestOfferSnapshot) -> ResponseOfferSnapshot;

    fn apply_snapshot_chunk(&mut self, req: RequestApplySnapshotChunk)
        -> ResponseApplySnapshotChunk;
}
