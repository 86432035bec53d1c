//! # Gas Metering
//!
//! A `GasMeter` tracks consumption against an optional limit. Clones share the
//! same counter, so a meter handed to a child context keeps accounting into
//! the parent's budget.
//!
//! ## Invariants
//!
//! - `consumed` never decreases and never exceeds `limit`.
//! - `consume` fails with `OutOfGas` iff the single call would cross the
//!   limit. The counter then saturates at the limit.
//! - Infinite meters never fail.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Result, TxError};

/// Gas units.
pub type Gas = u64;

/// Panic payload recognized as an out-of-gas fault by the execution engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutOfGas {
    pub descriptor: String,
}

#[derive(Debug)]
struct MeterState {
    limit: Option<Gas>,
    consumed: AtomicU64,
}

/// Shared gas counter.
#[derive(Debug, Clone)]
pub struct GasMeter {
    state: Arc<MeterState>,
}

impl GasMeter {
    /// Meter that fails once `limit` is crossed.
    pub fn new(limit: Gas) -> Self {
        Self::with_limit(Some(limit))
    }

    /// Meter that never fails.
    pub fn infinite() -> Self {
        Self::with_limit(None)
    }

    pub fn with_limit(limit: Option<Gas>) -> Self {
        Self {
            state: Arc::new(MeterState {
                limit,
                consumed: AtomicU64::new(0),
            }),
        }
    }

    pub fn limit(&self) -> Option<Gas> {
        self.state.limit
    }

    pub fn consumed(&self) -> Gas {
        self.state.consumed.load(Ordering::SeqCst)
    }

    /// Remaining budget, `None` for infinite meters.
    pub fn remaining(&self) -> Option<Gas> {
        self.state
            .limit
            .map(|limit| limit.saturating_sub(self.consumed()))
    }

    pub fn is_infinite(&self) -> bool {
        self.state.limit.is_none()
    }

    /// True once the whole budget has been used.
    pub fn is_out_of_gas(&self) -> bool {
        matches!(self.state.limit, Some(limit) if self.consumed() >= limit)
    }

    /// Consume `amount`, failing with `OutOfGas` if it would cross the limit.
    pub fn consume(&self, amount: Gas, descriptor: &str) -> Result<()> {
        let limit = self.state.limit;
        let outcome = self
            .state
            .consumed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                match (current.checked_add(amount), limit) {
                    (Some(next), Some(limit)) if next > limit => None,
                    (Some(next), _) => Some(next),
                    (None, _) => None,
                }
            });

        if outcome.is_ok() {
            return Ok(());
        }
        // Saturate so the attempt reports its whole budget.
        if let Some(limit) = limit {
            self.state.consumed.fetch_max(limit, Ordering::SeqCst);
        }
        Err(TxError::OutOfGas {
            descriptor: descriptor.to_string(),
        })
    }

    /// Consume up to `amount`, clamping at the limit instead of failing.
    pub fn consume_saturating(&self, amount: Gas) {
        let limit = self.state.limit.unwrap_or(Gas::MAX);
        let _ = self
            .state
            .consumed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(amount).min(limit))
            });
    }
}

/// Per-operation gas costs of store access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvGasConfig {
    pub has_cost: Gas,
    pub delete_cost: Gas,
    pub read_cost_flat: Gas,
    pub read_cost_per_byte: Gas,
    pub write_cost_flat: Gas,
    pub write_cost_per_byte: Gas,
    pub iter_next_cost_flat: Gas,
}

impl Default for KvGasConfig {
    fn default() -> Self {
        Self {
            has_cost: 1000,
            delete_cost: 1000,
            read_cost_flat: 1000,
            read_cost_per_byte: 3,
            write_cost_flat: 2000,
            write_cost_per_byte: 30,
            iter_next_cost_flat: 30,
        }
    }
}

/// Gas descriptors used by the metered store.
pub mod descriptors {
    pub const HAS: &str = "Has";
    pub const READ_FLAT: &str = "ReadFlat";
    pub const READ_PER_BYTE: &str = "ReadPerByte";
    pub const WRITE_FLAT: &str = "WriteFlat";
    pub const WRITE_PER_BYTE: &str = "WritePerByte";
    pub const DELETE: &str = "Delete";
    pub const ITER_NEXT: &str = "IterNextFlat";
    pub const VALUE_PER_BYTE: &str = "ValuePerByte";
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_consume_within_limit() {
        let meter = GasMeter::new(100);
        meter.consume(40, "a").unwrap();
        meter.consume(60, "b").unwrap();
        assert_eq!(meter.consumed(), 100);
        assert_eq!(meter.remaining(), Some(0));
        assert!(meter.is_out_of_gas());
    }

    #[test]
    fn test_out_of_gas_saturates_at_limit() {
        let meter = GasMeter::new(100);
        meter.consume(90, "a").unwrap();

        let err = meter.consume(11, "WriteFlat").unwrap_err();
        assert_eq!(
            err,
            TxError::OutOfGas {
                descriptor: "WriteFlat".into()
            }
        );
        assert_eq!(meter.consumed(), 100);
    }

    #[test]
    fn test_infinite_meter_never_fails() {
        let meter = GasMeter::infinite();
        meter.consume(u64::MAX / 2, "a").unwrap();
        meter.consume(u64::MAX / 2, "b").unwrap();
        assert!(!meter.is_out_of_gas());
        assert_eq!(meter.remaining(), None);
    }

    #[test]
    fn test_overflow_is_out_of_gas() {
        let meter = GasMeter::infinite();
        meter.consume(u64::MAX, "a").unwrap();
        assert!(meter.consume(1, "overflow").unwrap_err().is_out_of_gas());
    }

    #[test]
    fn test_clones_share_the_counter() {
        let meter = GasMeter::new(10);
        let shared = meter.clone();
        shared.consume(7, "a").unwrap();
        assert_eq!(meter.consumed(), 7);
    }

    #[test]
    fn test_consume_saturating_clamps() {
        let meter = GasMeter::new(10);
        meter.consume_saturating(25);
        assert_eq!(meter.consumed(), 10);
    }

    proptest! {
        #[test]
        fn prop_consumed_is_monotonic_and_bounded(
            limit in 0u64..10_000,
            amounts in proptest::collection::vec(0u64..2_000, 0..40),
        ) {
            let meter = GasMeter::new(limit);
            let mut previous = 0;
            for amount in amounts {
                let before = meter.consumed();
                let result = meter.consume(amount, "prop");
                let after = meter.consumed();

                prop_assert!(after >= previous);
                prop_assert!(after <= limit);
                // Fails exactly when this one call would pass the limit.
                prop_assert_eq!(result.is_err(), before + amount > limit);
                previous = after;
            }
        }
    }
}
