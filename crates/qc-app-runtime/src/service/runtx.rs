//! # Transaction Execution
//!
//! One code path for every execution mode.
//!
//! ## Algorithm
//!
//! 1. Pick the state for the mode (deliver state for Deliver, check state
//!    otherwise; Simulate works on a throwaway branch of the check state).
//! 2. Refuse to start when the block gas meter is already exhausted.
//! 3. Run the ante handler on its own branch and gas meter. Its writes are
//!    kept even if the messages fail later.
//! 4. Check and ReCheck stop here.
//! 5. Run every message on a second branch against the remaining budget.
//!    Any failure drops the whole message branch.
//! 6. Charge the block gas meter with the attempt's total.
//!
//! Handler panics are recovered into errors. An `OutOfGas` payload becomes
//! an out-of-gas result; anything else becomes `TxError::Panic`.

use shared_types::Event;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

use super::BaseApp;
use crate::domain::{
    Context, EventManager, Gas, GasInfo, GasMeter, MessageLog, Msg, OutOfGas, RunTxMode, Tx,
    TxResult,
};
use crate::error::{fatal, LifecycleFault, Result, TxError};

/// Type of the per-message event emitted by the engine.
pub const EVENT_MESSAGE: &str = "message";

impl BaseApp {
    /// Execute a decoded transaction. Always returns the gas figures, even
    /// on failure.
    pub(crate) fn run_tx(
        &self,
        mode: RunTxMode,
        tx_bytes: &[u8],
        tx: &Tx,
    ) -> (GasInfo, Result<TxResult>) {
        let gas_wanted = tx.fee.gas_limit;
        let no_gas = GasInfo {
            gas_wanted,
            gas_used: 0,
        };

        let max = self.config.max_tx_bytes;
        if max > 0 && tx_bytes.len() > max {
            return (
                no_gas,
                Err(TxError::TxTooLarge {
                    size: tx_bytes.len(),
                    max,
                }),
            );
        }

        let state = match mode {
            RunTxMode::Deliver => match &self.deliver_state {
                Some(state) => state,
                None => fatal(LifecycleFault::NoBlockInProgress {
                    operation: "DeliverTx",
                }),
            },
            _ => self.check_state(),
        };

        let base = match mode {
            RunTxMode::Simulate => state.ctx.derive_child(),
            _ => state.ctx.clone(),
        }
        .with_tx_bytes(tx_bytes.to_vec())
        .with_is_recheck_tx(mode == RunTxMode::ReCheck);

        let block_meter = match mode {
            RunTxMode::Deliver => base.block_gas_meter().cloned(),
            _ => None,
        };
        if block_meter.as_ref().is_some_and(GasMeter::is_out_of_gas) {
            return (
                no_gas,
                Err(TxError::OutOfGas {
                    descriptor: "no block gas left to run tx".to_string(),
                }),
            );
        }

        let unmetered =
            base.block_height() == 0 || (mode == RunTxMode::Simulate && gas_wanted == 0);
        let limit = if unmetered {
            None
        } else {
            let block_remaining = block_meter.as_ref().and_then(GasMeter::remaining);
            Some(block_remaining.map_or(gas_wanted, |remaining| gas_wanted.min(remaining)))
        };

        let (gas_used, result) = self.execute(mode, &base, tx, limit);
        if let Some(meter) = block_meter {
            meter.consume_saturating(gas_used);
        }

        if let Err(err) = &result {
            debug!(
                ?mode,
                gas_wanted,
                gas_used,
                code = err.code(),
                "[app] tx failed: {}",
                err
            );
        }
        (
            GasInfo {
                gas_wanted,
                gas_used,
            },
            result,
        )
    }

    fn execute(
        &self,
        mode: RunTxMode,
        base: &Context,
        tx: &Tx,
        limit: Option<Gas>,
    ) -> (Gas, Result<TxResult>) {
        let ante_meter = GasMeter::with_limit(limit);
        let mut events = Vec::new();

        if let Some(ante) = &self.ante_handler {
            let ante_ctx = base.derive_child().with_gas_meter(ante_meter.clone());
            let branch = std::sync::Arc::clone(ante_ctx.branch());
            let simulate = mode == RunTxMode::Simulate;
            let outcome = recover(|| ante.run(ante_ctx, tx, simulate));
            let ctx = match outcome {
                Ok(ctx) => ctx,
                Err(err) => return (ante_meter.consumed(), Err(err)),
            };
            if let Err(e) = branch.write() {
                return (ante_meter.consumed(), Err(e.into()));
            }
            events.extend(ctx.event_manager().events());
        }
        let ante_used = ante_meter.consumed();

        if mode.is_check() {
            return (
                ante_used,
                Ok(TxResult {
                    events,
                    ..Default::default()
                }),
            );
        }

        let msg_meter = GasMeter::with_limit(limit.map(|limit| limit.saturating_sub(ante_used)));
        let msg_ctx = base.derive_child().with_gas_meter(msg_meter.clone());
        let outcome = self.run_msgs(&msg_ctx, &tx.msgs);
        let gas_used = ante_used.saturating_add(msg_meter.consumed());

        let mut result = match outcome {
            Ok(result) => result,
            Err(err) => return (gas_used, Err(err)),
        };
        if let Err(e) = msg_ctx.branch().write() {
            return (gas_used, Err(e.into()));
        }
        events.append(&mut result.events);
        result.events = events;
        (gas_used, Ok(result))
    }

    /// Route and run every message. Stops at the first failure.
    fn run_msgs(&self, ctx: &Context, msgs: &[Msg]) -> Result<TxResult> {
        let mut data = Vec::with_capacity(msgs.len());
        let mut logs = Vec::with_capacity(msgs.len());
        let mut events = Vec::new();

        for (index, msg) in msgs.iter().enumerate() {
            let handler = self
                .router
                .route(&msg.route)
                .ok_or_else(|| TxError::UnknownRoute(msg.route.clone()))?;

            let msg_ctx = ctx.clone().with_event_manager(EventManager::new());
            let result = recover(|| handler(&msg_ctx, msg)).map_err(|err| {
                debug!(index, route = %msg.route, "[app] message failed: {}", err);
                err
            })?;

            let mut msg_events = vec![Event::new(EVENT_MESSAGE)
                .with_attribute("action", msg.msg_type.clone())
                .with_attribute("module", msg.route.clone())];
            msg_events.extend(msg_ctx.event_manager().events());
            msg_events.extend(result.events);

            data.push(result.data);
            logs.push(MessageLog {
                msg_index: index,
                log: result.log,
                events: msg_events.clone(),
            });
            events.extend(msg_events);
        }

        let data = bincode::serialize(&data)
            .map_err(|e| TxError::Internal(format!("failed to encode message data: {e}")))?;
        let log = serde_json::to_string(&logs)
            .map_err(|e| TxError::Internal(format!("failed to encode message logs: {e}")))?;
        Ok(TxResult { data, log, events })
    }
}

/// Run `f`, turning a panic into an error.
fn recover<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(panic_to_error(payload)),
    }
}

fn panic_to_error(payload: Box<dyn Any + Send>) -> TxError {
    if let Some(oog) = payload.downcast_ref::<OutOfGas>() {
        return TxError::OutOfGas {
            descriptor: oog.descriptor.clone(),
        };
    }
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    warn!("[app] Recovered from panic: {}", message);
    TxError::Panic(message)
}
