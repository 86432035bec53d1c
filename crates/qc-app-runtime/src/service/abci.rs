//! # Block Lifecycle
//!
//! `Application` implementation for `BaseApp`.
//!
//! ## Phases
//!
//! ```text
//!  Uninitialized ──InitChain / snapshot──▶ Ready ──BeginBlock──▶ InBlock
//!                                            ▲                      │
//!                                            └──Commit── Closing ◀──EndBlock
//! ```
//!
//! Calls out of order are lifecycle faults and abort the process: consensus
//! never recovers from a skipped or repeated step.

use shared_types::BlockHeader;
use std::sync::Arc;
use tracing::{debug, info};

use super::{BaseApp, LifecyclePhase};
use crate::domain::{
    CheckTxKind, GasInfo, GasMeter, RequestApplySnapshotChunk, RequestBeginBlock,
    RequestCheckTx, RequestDeliverTx, RequestEndBlock, RequestInitChain,
    RequestLoadSnapshotChunk, RequestOfferSnapshot, RequestQuery, ResponseApplySnapshotChunk,
    ResponseBeginBlock, ResponseCheckTx, ResponseCommit, ResponseDeliverTx, ResponseEndBlock,
    ResponseInfo, ResponseInitChain, ResponseListSnapshots, ResponseLoadSnapshotChunk,
    ResponseOfferSnapshot, ResponseQuery, ResponseTx, RunTxMode,
};
use crate::error::{fatal, LifecycleFault};
use crate::ports::Application;

impl BaseApp {
    fn require_in_block(&self, operation: &'static str) {
        match self.phase {
            LifecyclePhase::InBlock => {}
            LifecyclePhase::Uninitialized => fatal(LifecycleFault::NotInitialized { operation }),
            _ => fatal(LifecycleFault::NoBlockInProgress { operation }),
        }
    }

    fn validate_height(&self, height: u64) {
        let expected = self.last_block_height() + 1;
        if height != expected {
            fatal(LifecycleFault::InvalidHeight {
                expected,
                got: height,
            });
        }
    }

    /// Decode and run one transaction. Undecodable bytes report zero gas.
    fn decode_and_run(&self, mode: RunTxMode, tx_bytes: &[u8]) -> ResponseTx {
        let tx = match self.tx_decoder.decode(tx_bytes) {
            Ok(tx) => tx,
            Err(err) => {
                debug!(?mode, "[app] Rejecting undecodable tx: {}", err);
                return ResponseTx::from_error(GasInfo::default(), &err);
            }
        };
        let (gas, result) = self.run_tx(mode, tx_bytes, &tx);
        match result {
            Ok(result) => ResponseTx::from_result(gas, result),
            Err(err) => ResponseTx::from_error(gas, &err),
        }
    }

    fn should_halt(&self, header: &BlockHeader) -> bool {
        let by_height = self.config.halt_height > 0 && header.height >= self.config.halt_height;
        let by_time = self.config.halt_time > 0 && header.time >= self.config.halt_time;
        by_height || by_time
    }
}

impl Application for BaseApp {
    fn info(&self) -> ResponseInfo {
        let last = self.cms.last_commit_id();
        ResponseInfo {
            data: self.name.clone(),
            version: self.config.app_version.clone(),
            last_block_height: last.version,
            last_block_app_hash: last.hash.to_vec(),
        }
    }

    fn init_chain(&mut self, req: RequestInitChain) -> ResponseInitChain {
        if self.phase != LifecyclePhase::Uninitialized {
            fatal(LifecycleFault::AlreadyInitialized {
                height: self.last_block_height(),
            });
        }

        if let Some(params) = &req.consensus_params {
            self.consensus_params = Some(params.clone());
        }

        // Genesis state lives in the deliver branch until the first Commit.
        let header = BlockHeader {
            chain_id: req.chain_id.clone(),
            time: req.time,
            ..Default::default()
        };
        self.set_deliver_state(header.clone());
        self.set_check_state(header);
        self.phase = LifecyclePhase::Ready;

        let Some(state) = self.deliver_state.as_mut() else {
            fatal(LifecycleFault::NoBlockInProgress {
                operation: "InitChain",
            });
        };
        state.ctx = state.ctx.clone().with_block_gas_meter(GasMeter::infinite());
        let ctx = state.ctx.clone();
        let ms = Arc::clone(&state.ms);

        if let Some(params) = &req.consensus_params {
            self.store_consensus_params(&ms, params);
        }

        let Some(init_chainer) = self.init_chainer.clone() else {
            info!(chain_id = %req.chain_id, "[app] Chain initialized without genesis callback");
            return ResponseInitChain::default();
        };
        let mut res = init_chainer(&ctx, &req).unwrap_or_else(|e| {
            fatal(LifecycleFault::Callback {
                callback: "InitChainer",
                reason: e.to_string(),
            })
        });

        // Consensus-provided validators must match the genesis set exactly.
        if !req.validators.is_empty() {
            if req.validators.len() != res.validators.len() {
                fatal(LifecycleFault::ValidatorCountMismatch {
                    requested: req.validators.len(),
                    returned: res.validators.len(),
                });
            }
            let mut requested = req.validators.clone();
            requested.sort();
            res.validators.sort();
            if let Some(index) = requested
                .iter()
                .zip(&res.validators)
                .position(|(a, b)| a != b)
            {
                fatal(LifecycleFault::ValidatorMismatch { index });
            }
        }

        info!(
            chain_id = %req.chain_id,
            validators = res.validators.len(),
            "[app] Chain initialized"
        );
        res
    }

    fn begin_block(&mut self, req: RequestBeginBlock) -> ResponseBeginBlock {
        match self.phase {
            LifecyclePhase::Ready => {}
            LifecyclePhase::Uninitialized => fatal(LifecycleFault::NotInitialized {
                operation: "BeginBlock",
            }),
            LifecyclePhase::InBlock | LifecyclePhase::Closing => {
                fatal(LifecycleFault::BlockInProgress {
                    height: req.header.height,
                    current: self
                        .deliver_context()
                        .map_or(0, |ctx| ctx.block_height()),
                })
            }
        }
        self.validate_height(req.header.height);

        // The genesis deliver branch carries into block one.
        match self.deliver_state.as_mut() {
            Some(state) => state.ctx = state.ctx.clone().with_header(req.header.clone()),
            None => self.set_deliver_state(req.header.clone()),
        }

        let block_meter = match self
            .consensus_params
            .as_ref()
            .and_then(|params| params.max_block_gas())
        {
            Some(max) => GasMeter::new(max),
            None => GasMeter::infinite(),
        };
        let consensus_params = self.consensus_params.clone();
        let Some(state) = self.deliver_state.as_mut() else {
            fatal(LifecycleFault::NoBlockInProgress {
                operation: "BeginBlock",
            });
        };
        state.ctx = state
            .ctx
            .clone()
            .with_block_gas_meter(block_meter)
            .with_consensus_params(consensus_params);
        let ctx = state.ctx.clone();

        let res = match self.begin_blocker.clone() {
            Some(begin_blocker) => begin_blocker(&ctx, &req).unwrap_or_else(|e| {
                fatal(LifecycleFault::Callback {
                    callback: "BeginBlocker",
                    reason: e.to_string(),
                })
            }),
            None => ResponseBeginBlock::default(),
        };

        // Vote info becomes visible to transactions only after the callback.
        self.vote_infos = req.last_commit_info.votes.clone();
        if let Some(state) = self.deliver_state.as_mut() {
            state.ctx = state.ctx.clone().with_vote_infos(self.vote_infos.clone());
        }
        self.phase = LifecyclePhase::InBlock;

        debug!(
            height = req.header.height,
            proposer = %hex::encode(&req.header.proposer_address),
            votes = self.vote_infos.len(),
            "[app] Block started"
        );
        res
    }

    fn check_tx(&self, req: RequestCheckTx) -> ResponseCheckTx {
        let mode = match req.kind {
            CheckTxKind::New => RunTxMode::Check,
            CheckTxKind::Recheck => RunTxMode::ReCheck,
        };
        self.decode_and_run(mode, &req.tx)
    }

    fn deliver_tx(&mut self, req: RequestDeliverTx) -> ResponseDeliverTx {
        self.require_in_block("DeliverTx");
        self.decode_and_run(RunTxMode::Deliver, &req.tx)
    }

    fn end_block(&mut self, req: RequestEndBlock) -> ResponseEndBlock {
        self.require_in_block("EndBlock");
        let Some(state) = self.deliver_state.as_ref() else {
            fatal(LifecycleFault::NoBlockInProgress {
                operation: "EndBlock",
            });
        };
        let ctx = state.ctx.clone();
        let ms = Arc::clone(&state.ms);

        let res = match self.end_blocker.clone() {
            Some(end_blocker) => end_blocker(&ctx, &req).unwrap_or_else(|e| {
                fatal(LifecycleFault::Callback {
                    callback: "EndBlocker",
                    reason: e.to_string(),
                })
            }),
            None => ResponseEndBlock::default(),
        };

        if let Some(params) = &res.consensus_param_updates {
            self.store_consensus_params(&ms, params);
            self.consensus_params = Some(params.clone());
        }
        self.phase = LifecyclePhase::Closing;

        debug!(
            height = req.height,
            validator_updates = res.validator_updates.len(),
            "[app] Block ended"
        );
        res
    }

    fn commit(&mut self) -> ResponseCommit {
        match self.phase {
            LifecyclePhase::Closing => {}
            LifecyclePhase::InBlock => fatal(LifecycleFault::BlockNotClosed),
            LifecyclePhase::Uninitialized => fatal(LifecycleFault::NotInitialized {
                operation: "Commit",
            }),
            LifecyclePhase::Ready => fatal(LifecycleFault::NoBlockInProgress {
                operation: "Commit",
            }),
        }
        let Some(state) = self.deliver_state.take() else {
            fatal(LifecycleFault::NoBlockInProgress {
                operation: "Commit",
            });
        };
        let header = state.ctx.header().clone();

        state.ms.write().unwrap_or_else(|e| fatal(e.into()));
        let commit_id = self.cms.commit().unwrap_or_else(|e| fatal(e.into()));
        info!(
            height = commit_id.version,
            hash = %commit_id.hash_hex(),
            "[app] Commit synced"
        );

        // Mempool checks restart from the new version.
        self.set_check_state(header.clone());
        self.phase = LifecyclePhase::Ready;

        if self.should_halt(&header) {
            self.halt(header.height, header.time);
        }
        if self.snapshots.should_snapshot(header.height) {
            self.trigger_snapshot(header.height);
        }

        ResponseCommit {
            data: commit_id.hash.to_vec(),
        }
    }

    fn query(&self, req: RequestQuery) -> ResponseQuery {
        self.handle_query(req)
    }

    fn list_snapshots(&self) -> ResponseListSnapshots {
        self.handle_list_snapshots()
    }

    fn load_snapshot_chunk(&self, req: RequestLoadSnapshotChunk) -> ResponseLoadSnapshotChunk {
        self.handle_load_snapshot_chunk(req)
    }

    fn offer_snapshot(&mut self, req: RequestOfferSnapshot) -> ResponseOfferSnapshot {
        self.handle_offer_snapshot(req)
    }

    fn apply_snapshot_chunk(
        &mut self,
        req: RequestApplySnapshotChunk,
    ) -> ResponseApplySnapshotChunk {
        self.handle_apply_snapshot_chunk(req)
    }
}
