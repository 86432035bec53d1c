//! Stateless validation and size-based gas.

use super::AnteStage;
use crate::domain::context::Context;
use crate::domain::entities::Tx;
use crate::error::{Result, TxError};

/// Runs `Tx::validate_basic`. Skipped on ReCheck: the tx already passed it.
pub struct ValidateBasicStage;

impl AnteStage for ValidateBasicStage {
    fn name(&self) -> &'static str {
        "validate_basic"
    }

    fn handle(&self, ctx: Context, tx: &Tx, _simulate: bool) -> Result<Context> {
        if ctx.is_recheck_tx() {
            return Ok(ctx);
        }
        tx.validate_basic()?;
        Ok(ctx)
    }
}

/// Rejects memos longer than the configured character count.
pub struct ValidateMemoStage {
    max_characters: usize,
}

impl ValidateMemoStage {
    pub fn new(max_characters: usize) -> Self {
        Self { max_characters }
    }
}

impl AnteStage for ValidateMemoStage {
    fn name(&self) -> &'static str {
        "validate_memo"
    }

    fn handle(&self, ctx: Context, tx: &Tx, _simulate: bool) -> Result<Context> {
        let length = tx.memo.chars().count();
        if length > self.max_characters {
            return Err(TxError::MemoTooLarge {
                length,
                max: self.max_characters,
            });
        }
        Ok(ctx)
    }
}

/// Charges gas proportional to the encoded transaction size.
pub struct ConsumeTxSizeGasStage {
    cost_per_byte: u64,
}

impl ConsumeTxSizeGasStage {
    pub fn new(cost_per_byte: u64) -> Self {
        Self { cost_per_byte }
    }
}

impl AnteStage for ConsumeTxSizeGasStage {
    fn name(&self) -> &'static str {
        "consume_tx_size_gas"
    }

    fn handle(&self, ctx: Context, _tx: &Tx, _simulate: bool) -> Result<Context> {
        let size = ctx.tx_bytes().len() as u64;
        ctx.gas_meter()
            .consume(size.saturating_mul(self.cost_per_byte), "txSize")?;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Msg, TxSignature};
    use crate::domain::gas::GasMeter;
    use qc_app_store::{CacheStore, KvStore, VersionedStore};
    use shared_types::BlockHeader;
    use std::sync::Arc;

    fn context() -> Context {
        let root: Arc<dyn KvStore> = Arc::new(VersionedStore::new());
        Context::new(Arc::new(CacheStore::new(root)), BlockHeader::default(), false)
    }

    fn signed_tx(memo: &str) -> Tx {
        Tx {
            msgs: vec![Msg::new("bank", "send", vec![[1; 20]], vec![])],
            memo: memo.to_string(),
            signatures: vec![TxSignature {
                pub_key: vec![],
                signature: vec![],
                sequence: 0,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_basic_skipped_on_recheck() {
        let unsigned = Tx {
            msgs: vec![Msg::new("bank", "send", vec![[1; 20]], vec![])],
            ..Default::default()
        };
        assert!(ValidateBasicStage.handle(context(), &unsigned, false).is_err());

        let recheck = context().with_is_recheck_tx(true);
        assert!(ValidateBasicStage.handle(recheck, &unsigned, false).is_ok());
    }

    #[test]
    fn test_memo_limit() {
        let stage = ValidateMemoStage::new(4);
        assert!(stage.handle(context(), &signed_tx("abcd"), false).is_ok());
        assert_eq!(
            stage.handle(context(), &signed_tx("abcde"), false).err(),
            Some(TxError::MemoTooLarge { length: 5, max: 4 })
        );
    }

    #[test]
    fn test_tx_size_gas() {
        let meter = GasMeter::new(1_000);
        let ctx = context()
            .with_gas_meter(meter.clone())
            .with_tx_bytes(vec![0; 30]);

        ConsumeTxSizeGasStage::new(10)
            .handle(ctx.clone(), &signed_tx(""), false)
            .unwrap();
        assert_eq!(meter.consumed(), 300);

        let big = ctx.with_tx_bytes(vec![0; 100]);
        let err = ConsumeTxSizeGasStage::new(10)
            .handle(big, &signed_tx(""), false)
            .err()
            .unwrap();
        assert!(err.is_out_of_gas());
    }
}
