//! Fee checks and fee deduction.

use shared_types::{format_address, Address, Event};

use super::AnteStage;
use crate::domain::auth;
use crate::domain::context::Context;
use crate::domain::entities::{Coin, Coins, Tx};
use crate::error::{Result, TxError};

/// Local mempool policy: the fee must cover `min_gas_price * gas_limit` in at
/// least one configured denomination. Only applies in check mode and never
/// while simulating.
pub struct MempoolFeeStage;

impl AnteStage for MempoolFeeStage {
    fn name(&self) -> &'static str {
        "mempool_fee"
    }

    fn handle(&self, ctx: Context, tx: &Tx, simulate: bool) -> Result<Context> {
        if !ctx.is_check_tx() || simulate || ctx.min_gas_prices().is_empty() {
            return Ok(ctx);
        }

        let gas = tx.fee.gas_limit;
        let required = Coins::new(
            ctx.min_gas_prices()
                .iter()
                .map(|price| Coin::new(price.denom.clone(), price.fee_for(gas)))
                .collect(),
        );
        if !required.is_empty() && !tx.fee.amount.is_any_gte(&required) {
            return Err(TxError::InsufficientFee(format!(
                "got: {} required: {}",
                tx.fee.amount, required
            )));
        }
        Ok(ctx)
    }
}

/// Moves the fee from the fee payer to the fee collector account.
pub struct DeductFeeStage {
    fee_collector: Address,
}

impl DeductFeeStage {
    pub fn new(fee_collector: Address) -> Self {
        Self { fee_collector }
    }
}

pub const EVENT_TX: &str = "tx";

impl AnteStage for DeductFeeStage {
    fn name(&self) -> &'static str {
        "deduct_fee"
    }

    fn handle(&self, ctx: Context, tx: &Tx, _simulate: bool) -> Result<Context> {
        let payer = tx
            .fee_payer()
            .ok_or_else(|| TxError::InvalidRequest("tx has no fee payer".into()))?;
        // The payer must exist even for zero-fee transactions.
        auth::must_get_account(&ctx, &payer)?;

        if tx.fee.amount.is_empty() {
            return Ok(ctx);
        }

        auth::send_coins(&ctx, &payer, &self.fee_collector, &tx.fee.amount).map_err(|e| {
            match e {
                TxError::InsufficientFunds(reason) => {
                    TxError::InsufficientFunds(format!("insufficient funds to pay for fees; {reason}"))
                }
                other => other,
            }
        })?;

        ctx.emit_event(
            Event::new(EVENT_TX)
                .with_attribute("fee", tx.fee.amount.to_string())
                .with_attribute("fee_payer", format_address(&payer)),
        );
        Ok(ctx)
    }
}
