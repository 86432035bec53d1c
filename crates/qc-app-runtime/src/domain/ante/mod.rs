//! # Ante Pipeline
//!
//! Ordered pre-execution stages run before a transaction's messages.
//!
//! Each stage receives the context produced by the previous one and may
//! consume gas, mutate state (deduct fees, bump sequences) or abort the whole
//! transaction. The chain is assembled once at deployment time and runs under
//! its own gas meter, separate from message execution.
//!
//! ## Standard Order
//!
//! ```text
//! ValidateBasic → ValidateMemo → ConsumeTxSizeGas → MempoolFee (check only)
//!   → DeductFee → SetPubKey → SigGasConsume → SigVerification
//!   → IncrementSequence
//! ```

pub mod basic;
pub mod fee;
pub mod sigverify;

pub use basic::*;
pub use fee::*;
pub use sigverify::*;

use shared_types::Address;
use std::sync::Arc;

use super::context::Context;
use super::entities::Tx;
use crate::error::Result;
use crate::ports::SignatureVerifier;

/// The composed pre-execution function installed on the application.
pub trait AnteHandler: Send + Sync {
    fn run(&self, ctx: Context, tx: &Tx, simulate: bool) -> Result<Context>;
}

/// One independently configured step of the pipeline.
pub trait AnteStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle(&self, ctx: Context, tx: &Tx, simulate: bool) -> Result<Context>;
}

/// Stages executed in insertion order. The first error aborts the chain.
#[derive(Default, Clone)]
pub struct AnteChain {
    stages: Vec<Arc<dyn AnteStage>>,
}

impl AnteChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: impl AnteStage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }
}

impl AnteHandler for AnteChain {
    fn run(&self, ctx: Context, tx: &Tx, simulate: bool) -> Result<Context> {
        self.stages
            .iter()
            .try_fold(ctx, |ctx, stage| stage.handle(ctx, tx, simulate))
    }
}

/// Parameters of the standard chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnteParams {
    pub max_memo_characters: usize,
    pub tx_size_cost_per_byte: u64,
    pub sig_verify_cost_secp256k1: u64,
}

impl Default for AnteParams {
    fn default() -> Self {
        Self {
            max_memo_characters: 256,
            tx_size_cost_per_byte: 10,
            sig_verify_cost_secp256k1: 1000,
        }
    }
}

/// The standard chain: validation, fees, signatures and sequences.
pub fn standard_ante_chain(
    params: AnteParams,
    fee_collector: Address,
    verifier: Arc<dyn SignatureVerifier>,
) -> AnteChain {
    AnteChain::new()
        .with_stage(ValidateBasicStage)
        .with_stage(ValidateMemoStage::new(params.max_memo_characters))
        .with_stage(ConsumeTxSizeGasStage::new(params.tx_size_cost_per_byte))
        .with_stage(MempoolFeeStage)
        .with_stage(DeductFeeStage::new(fee_collector))
        .with_stage(SetPubKeyStage)
        .with_stage(SigGasConsumeStage::new(params.sig_verify_cost_secp256k1))
        .with_stage(SigVerificationStage::new(verifier))
        .with_stage(IncrementSequenceStage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TxError;
    use qc_app_store::{CacheStore, KvStore, VersionedStore};
    use shared_types::{BlockHeader, Event};

    struct Emit(&'static str);

    impl AnteStage for Emit {
        fn name(&self) -> &'static str {
            self.0
        }

        fn handle(&self, ctx: Context, _tx: &Tx, _simulate: bool) -> Result<Context> {
            ctx.emit_event(Event::new(self.0));
            Ok(ctx)
        }
    }

    struct Fail;

    impl AnteStage for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }

        fn handle(&self, _ctx: Context, _tx: &Tx, _simulate: bool) -> Result<Context> {
            Err(TxError::Unauthorized("stop".into()))
        }
    }

    fn context() -> Context {
        let root: Arc<dyn KvStore> = Arc::new(VersionedStore::new());
        Context::new(Arc::new(CacheStore::new(root)), BlockHeader::default(), false)
    }

    #[test]
    fn test_stages_run_in_order() {
        let chain = AnteChain::new().with_stage(Emit("first")).with_stage(Emit("second"));
        let ctx = chain.run(context(), &Tx::default(), false).unwrap();

        let kinds: Vec<String> = ctx
            .event_manager()
            .events()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec!["first", "second"]);
    }

    #[test]
    fn test_failure_aborts_remaining_stages() {
        let chain = AnteChain::new()
            .with_stage(Emit("first"))
            .with_stage(Fail)
            .with_stage(Emit("never"));
        let ctx = context();

        let err = chain.run(ctx.clone(), &Tx::default(), false).unwrap_err();
        assert_eq!(err, TxError::Unauthorized("stop".into()));

        let kinds: Vec<String> = ctx
            .event_manager()
            .events()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec!["first"]);
    }

    #[test]
    fn test_standard_chain_order() {
        struct AcceptAll;
        impl SignatureVerifier for AcceptAll {
            fn verify(&self, _: &[u8], _: &[u8], _: &[u8]) -> bool {
                true
            }
        }

        let chain = standard_ante_chain(AnteParams::default(), [0; 20], Arc::new(AcceptAll));
        assert_eq!(
            chain.stage_names(),
            vec![
                "validate_basic",
                "validate_memo",
                "consume_tx_size_gas",
                "mempool_fee",
                "deduct_fee",
                "set_pubkey",
                "sig_gas_consume",
                "sig_verification",
                "increment_sequence",
            ]
        );
    }
}
