//! # Execution Context
//!
//! Immutable carrier of everything a stage or handler may touch: the store
//! branch, the block header, the gas meters and the event log. `with_*`
//! methods return updated copies; `derive_child` opens a fresh copy-on-write
//! branch whose writes stay invisible to the parent until merged.

use parking_lot::Mutex;
use qc_app_store::{CacheStore, KvPair, KvStore};
use shared_types::{BlockHeader, ConsensusParams, Event, VoteInfo};
use std::fmt;
use std::sync::Arc;

use super::entities::DecCoin;
use super::gas::{descriptors, GasMeter, KvGasConfig};
use crate::error::Result;

/// Append-only event log shared by clones of one context.
#[derive(Debug, Clone, Default)]
pub struct EventManager {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: Event) {
        self.events.lock().push(event);
    }

    pub fn emit_all(&self, events: impl IntoIterator<Item = Event>) {
        self.events.lock().extend(events);
    }

    /// Snapshot of the events emitted so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

/// Per-call execution state.
#[derive(Clone)]
pub struct Context {
    store: Arc<CacheStore>,
    header: BlockHeader,
    gas_meter: GasMeter,
    block_gas_meter: Option<GasMeter>,
    events: EventManager,
    min_gas_prices: Arc<Vec<DecCoin>>,
    is_check_tx: bool,
    is_recheck_tx: bool,
    kv_gas: KvGasConfig,
    consensus_params: Option<ConsensusParams>,
    vote_infos: Arc<Vec<VoteInfo>>,
    tx_bytes: Arc<Vec<u8>>,
}

impl Context {
    /// Context over `store` with an infinite gas meter.
    pub fn new(store: Arc<CacheStore>, header: BlockHeader, is_check_tx: bool) -> Self {
        Self {
            store,
            header,
            gas_meter: GasMeter::infinite(),
            block_gas_meter: None,
            events: EventManager::new(),
            min_gas_prices: Arc::new(Vec::new()),
            is_check_tx,
            is_recheck_tx: false,
            kv_gas: KvGasConfig::default(),
            consensus_params: None,
            vote_infos: Arc::new(Vec::new()),
            tx_bytes: Arc::new(Vec::new()),
        }
    }

    /// Child context over a fresh branch of this context's store, with its
    /// own event log.
    pub fn derive_child(&self) -> Context {
        let mut child = self.clone();
        child.store = self.store.branch();
        child.events = EventManager::new();
        child
    }

    /// Gas-metered access to the store branch.
    pub fn store(&self) -> GasKvStore {
        GasKvStore {
            parent: Arc::clone(&self.store),
            meter: self.gas_meter.clone(),
            config: self.kv_gas,
        }
    }

    /// The unmetered store branch.
    pub fn branch(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn block_height(&self) -> u64 {
        self.header.height
    }

    pub fn block_time(&self) -> u64 {
        self.header.time
    }

    pub fn chain_id(&self) -> &str {
        &self.header.chain_id
    }

    pub fn gas_meter(&self) -> &GasMeter {
        &self.gas_meter
    }

    pub fn block_gas_meter(&self) -> Option<&GasMeter> {
        self.block_gas_meter.as_ref()
    }

    pub fn event_manager(&self) -> &EventManager {
        &self.events
    }

    pub fn emit_event(&self, event: Event) {
        self.events.emit(event);
    }

    pub fn min_gas_prices(&self) -> &[DecCoin] {
        &self.min_gas_prices
    }

    pub fn is_check_tx(&self) -> bool {
        self.is_check_tx
    }

    pub fn is_recheck_tx(&self) -> bool {
        self.is_recheck_tx
    }

    pub fn kv_gas_config(&self) -> KvGasConfig {
        self.kv_gas
    }

    pub fn consensus_params(&self) -> Option<&ConsensusParams> {
        self.consensus_params.as_ref()
    }

    pub fn vote_infos(&self) -> &[VoteInfo] {
        &self.vote_infos
    }

    /// Raw bytes of the transaction being executed.
    pub fn tx_bytes(&self) -> &[u8] {
        &self.tx_bytes
    }

    pub fn with_store(mut self, store: Arc<CacheStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_header(mut self, header: BlockHeader) -> Self {
        self.header = header;
        self
    }

    pub fn with_block_height(mut self, height: u64) -> Self {
        self.header.height = height;
        self
    }

    pub fn with_gas_meter(mut self, meter: GasMeter) -> Self {
        self.gas_meter = meter;
        self
    }

    pub fn with_block_gas_meter(mut self, meter: GasMeter) -> Self {
        self.block_gas_meter = Some(meter);
        self
    }

    pub fn with_event_manager(mut self, events: EventManager) -> Self {
        self.events = events;
        self
    }

    pub fn with_min_gas_prices(mut self, prices: Vec<DecCoin>) -> Self {
        self.min_gas_prices = Arc::new(prices);
        self
    }

    pub fn with_is_check_tx(mut self, is_check_tx: bool) -> Self {
        self.is_check_tx = is_check_tx;
        self
    }

    /// ReCheck implies Check.
    pub fn with_is_recheck_tx(mut self, is_recheck_tx: bool) -> Self {
        if is_recheck_tx {
            self.is_check_tx = true;
        }
        self.is_recheck_tx = is_recheck_tx;
        self
    }

    pub fn with_kv_gas_config(mut self, config: KvGasConfig) -> Self {
        self.kv_gas = config;
        self
    }

    pub fn with_consensus_params(mut self, params: Option<ConsensusParams>) -> Self {
        self.consensus_params = params;
        self
    }

    pub fn with_vote_infos(mut self, votes: Vec<VoteInfo>) -> Self {
        self.vote_infos = Arc::new(votes);
        self
    }

    pub fn with_tx_bytes(mut self, tx_bytes: Vec<u8>) -> Self {
        self.tx_bytes = Arc::new(tx_bytes);
        self
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("header", &self.header)
            .field("gas_consumed", &self.gas_meter.consumed())
            .field("gas_limit", &self.gas_meter.limit())
            .field("is_check_tx", &self.is_check_tx)
            .field("is_recheck_tx", &self.is_recheck_tx)
            .field("pending_writes", &self.store.dirty_count())
            .finish()
    }
}

/// Store handle that charges the context's gas meter per access.
pub struct GasKvStore {
    parent: Arc<CacheStore>,
    meter: GasMeter,
    config: KvGasConfig,
}

impl GasKvStore {
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.meter
            .consume(self.config.read_cost_flat, descriptors::READ_FLAT)?;
        let value = self.parent.get(key)?;
        if let Some(value) = &value {
            self.meter.consume(
                self.config
                    .read_cost_per_byte
                    .saturating_mul(value.len() as u64),
                descriptors::READ_PER_BYTE,
            )?;
        }
        Ok(value)
    }

    pub fn has(&self, key: &[u8]) -> Result<bool> {
        self.meter.consume(self.config.has_cost, descriptors::HAS)?;
        Ok(self.parent.has(key)?)
    }

    pub fn set(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.meter
            .consume(self.config.write_cost_flat, descriptors::WRITE_FLAT)?;
        self.meter.consume(
            self.config
                .write_cost_per_byte
                .saturating_mul((key.len() + value.len()) as u64),
            descriptors::WRITE_PER_BYTE,
        )?;
        Ok(self.parent.set(key, value)?)
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.meter.consume(self.config.delete_cost, descriptors::DELETE)?;
        Ok(self.parent.delete(key)?)
    }

    /// Pairs in `[start, end)`, charging per item returned.
    ///
    /// Only as many items as the remaining gas can pay for are fetched, plus
    /// one to trip `OutOfGas` when the range runs past the budget.
    pub fn range(&self, start: &[u8], end: Option<&[u8]>) -> Result<Vec<KvPair>> {
        let affordable = match (self.meter.remaining(), self.config.iter_next_cost_flat) {
            (Some(remaining), cost) if cost > 0 => {
                usize::try_from(remaining / cost + 1).unwrap_or(usize::MAX)
            }
            _ => usize::MAX,
        };
        let pairs = self.parent.range_limit(start, end, affordable)?;
        for pair in &pairs {
            self.meter
                .consume(self.config.iter_next_cost_flat, descriptors::ITER_NEXT)?;
            self.meter.consume(
                self.config
                    .read_cost_per_byte
                    .saturating_mul((pair.key.len() + pair.value.len()) as u64),
                descriptors::VALUE_PER_BYTE,
            )?;
        }
        Ok(pairs)
    }
}
