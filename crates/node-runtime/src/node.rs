//! # Solo Block Driver
//!
//! Stands in for a consensus engine on a single-validator chain: accepts
//! transactions through CheckTx, queues the ones that pass and commits them
//! in a block on every interval tick.
//!
//! ## Shutdown
//!
//! The loop ends on ctrl-c, or when the app raises its halt signal after
//! committing the configured halt height or time. Either way the app is
//! handed back to the caller.

use qc_app_runtime::{
    Application, BaseApp, CheckTxKind, RequestBeginBlock, RequestCheckTx, RequestDeliverTx,
    RequestEndBlock, ResponseCheckTx,
};
use sha2::{Digest, Sha256};
use shared_types::{BlockHeader, LastCommitInfo};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Capacity of the transaction submission channel.
pub const SUBMIT_QUEUE_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Node has stopped")]
    Stopped,

    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

/// Why `SoloNode::run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Halted,
    Interrupted,
}

struct Submission {
    tx: Vec<u8>,
    reply: oneshot::Sender<ResponseCheckTx>,
}

/// Cloneable handle for submitting transactions to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    submit_tx: mpsc::Sender<Submission>,
}

impl NodeHandle {
    /// Run CheckTx on `tx` and queue it for the next block if it passes.
    pub async fn submit(&self, tx: Vec<u8>) -> Result<ResponseCheckTx, NodeError> {
        let (reply, response) = oneshot::channel();
        self.submit_tx
            .send(Submission { tx, reply })
            .await
            .map_err(|_| NodeError::Stopped)?;
        response.await.map_err(|_| NodeError::Stopped)
    }
}

pub struct SoloNode {
    app: BaseApp,
    chain_id: String,
    block_interval: Duration,
    mempool: Vec<Vec<u8>>,
    submit_rx: mpsc::Receiver<Submission>,
    halt_rx: watch::Receiver<bool>,
    last_time: u64,
}

impl SoloNode {
    pub fn new(app: BaseApp, chain_id: impl Into<String>, block_interval: Duration) -> (Self, NodeHandle) {
        let (submit_tx, submit_rx) = mpsc::channel(SUBMIT_QUEUE_SIZE);
        let halt_rx = app.halt_signal();
        let node = Self {
            app,
            chain_id: chain_id.into(),
            block_interval,
            mempool: Vec::new(),
            submit_rx,
            halt_rx,
            last_time: 0,
        };
        (node, NodeHandle { submit_tx })
    }

    pub fn app(&self) -> &BaseApp {
        &self.app
    }

    pub fn height(&self) -> u64 {
        self.app.last_block_height()
    }

    pub fn pending(&self) -> usize {
        self.mempool.len()
    }

    /// Drive blocks until halted or interrupted; returns the app.
    pub async fn run(mut self) -> Result<(BaseApp, StopReason), NodeError> {
        info!(
            chain_id = %self.chain_id,
            height = self.height(),
            interval_ms = self.block_interval.as_millis() as u64,
            "[node] Block production started"
        );

        let mut ticker = interval(self.block_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        let mut submissions_open = true;
        let reason = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.produce_block();
                }
                submission = self.submit_rx.recv(), if submissions_open => {
                    match submission {
                        Some(submission) => self.accept(submission),
                        None => {
                            debug!("[node] All submission handles dropped");
                            submissions_open = false;
                        }
                    }
                }
                changed = self.halt_rx.changed() => {
                    if changed.is_ok() && *self.halt_rx.borrow() {
                        break StopReason::Halted;
                    }
                }
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    info!("[node] Interrupt received");
                    break StopReason::Interrupted;
                }
            }
        };

        info!(
            height = self.height(),
            dropped_txs = self.mempool.len(),
            ?reason,
            "[node] Block production stopped"
        );
        Ok((self.app, reason))
    }

    fn accept(&mut self, submission: Submission) {
        let res = self.app.check_tx(RequestCheckTx {
            tx: submission.tx.clone(),
            kind: CheckTxKind::New,
        });
        if res.is_ok() {
            self.mempool.push(submission.tx);
        } else {
            debug!(code = res.code, log = %res.log, "[node] CheckTx rejected tx");
        }
        // The submitter may have given up waiting.
        let _ = submission.reply.send(res);
    }

    /// Commit one block holding every queued transaction. The mempool is
    /// always drained, so nothing is left to recheck.
    pub fn produce_block(&mut self) {
        let height = self.height() + 1;
        let header = BlockHeader {
            chain_id: self.chain_id.clone(),
            height,
            time: self.next_block_time(),
            proposer_address: Vec::new(),
            app_hash: self.app.last_commit_id().hash.to_vec(),
        };
        let hash = block_hash(&header, &self.mempool);

        self.app.begin_block(RequestBeginBlock {
            hash,
            header,
            last_commit_info: LastCommitInfo::default(),
        });

        let txs = std::mem::take(&mut self.mempool);
        let mut failed = 0usize;
        for tx in &txs {
            let res = self.app.deliver_tx(RequestDeliverTx { tx: tx.clone() });
            if !res.is_ok() {
                failed += 1;
                warn!(height, code = res.code, log = %res.log, "[node] DeliverTx failed");
            }
        }

        self.app.end_block(RequestEndBlock { height });
        let commit = self.app.commit();
        info!(
            height,
            txs = txs.len(),
            failed,
            app_hash = %hex::encode(&commit.data),
            "[node] Block committed"
        );
    }

    /// Wall-clock seconds, never earlier than the previous block.
    fn next_block_time(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        self.last_time = now.max(self.last_time);
        self.last_time
    }
}

fn block_hash(header: &BlockHeader, txs: &[Vec<u8>]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(header.chain_id.as_bytes());
    hasher.update(header.height.to_be_bytes());
    hasher.update(header.time.to_be_bytes());
    hasher.update(&header.app_hash);
    for tx in txs {
        hasher.update(Sha256::digest(tx));
    }
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(height: u64) -> BlockHeader {
        BlockHeader {
            chain_id: "qc-1".into(),
            height,
            ..Default::default()
        }
    }

    #[test]
    fn test_block_hash_commits_to_header_and_txs() {
        let empty = block_hash(&header(1), &[]);
        let with_tx = block_hash(&header(1), &[vec![1, 2, 3]]);

        assert_eq!(empty.len(), 32);
        assert_ne!(empty, with_tx);
        assert_ne!(empty, block_hash(&header(2), &[]));
        assert_eq!(with_tx, block_hash(&header(1), &[vec![1, 2, 3]]));
    }
}
