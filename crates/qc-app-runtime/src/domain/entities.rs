//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Value**: `Coin`, `Coins`, `DecCoin`
//! - **Transactions**: `Msg`, `Fee`, `TxSignature`, `Tx`, `SignDoc`
//! - **Accounts**: `BaseAccount`
//! - **Execution**: `RunTxMode`, `GasInfo`, `MsgResult`, `TxResult`

use serde::{Deserialize, Serialize};
use shared_types::{format_address, Address, Event};
use std::collections::BTreeMap;
use std::fmt;

use super::gas::Gas;
use crate::error::{Result, TxError};

// =============================================================================
// CLUSTER A: VALUE
// =============================================================================

/// Fixed-point scale of `DecCoin` amounts (18 decimals).
pub const DEC_PRECISION: u128 = 1_000_000_000_000_000_000;

/// An amount of a single denomination.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: u128,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// A normalized set of coins: sorted by denom, no duplicates, no zero amounts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coins(Vec<Coin>);

impl Coins {
    pub fn new(coins: Vec<Coin>) -> Self {
        let mut merged: BTreeMap<String, u128> = BTreeMap::new();
        for coin in coins {
            let entry = merged.entry(coin.denom).or_default();
            *entry = entry.saturating_add(coin.amount);
        }
        Self(
            merged
                .into_iter()
                .filter(|(_, amount)| *amount > 0)
                .map(|(denom, amount)| Coin { denom, amount })
                .collect(),
        )
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Coin] {
        &self.0
    }

    pub fn amount_of(&self, denom: &str) -> u128 {
        self.0
            .iter()
            .find(|coin| coin.denom == denom)
            .map_or(0, |coin| coin.amount)
    }

    pub fn checked_add(&self, other: &Coins) -> Option<Coins> {
        let mut merged: BTreeMap<String, u128> = self
            .0
            .iter()
            .map(|coin| (coin.denom.clone(), coin.amount))
            .collect();
        for coin in &other.0 {
            let entry = merged.entry(coin.denom.clone()).or_default();
            *entry = entry.checked_add(coin.amount)?;
        }
        Some(Self::new(
            merged
                .into_iter()
                .map(|(denom, amount)| Coin { denom, amount })
                .collect(),
        ))
    }

    /// `None` if any denomination would go negative.
    pub fn checked_sub(&self, other: &Coins) -> Option<Coins> {
        let mut merged: BTreeMap<String, u128> = self
            .0
            .iter()
            .map(|coin| (coin.denom.clone(), coin.amount))
            .collect();
        for coin in &other.0 {
            let entry = merged.entry(coin.denom.clone()).or_default();
            *entry = entry.checked_sub(coin.amount)?;
        }
        Some(Self::new(
            merged
                .into_iter()
                .map(|(denom, amount)| Coin { denom, amount })
                .collect(),
        ))
    }

    /// True if at least one denomination in `other` is covered by `self`.
    pub fn is_any_gte(&self, other: &Coins) -> bool {
        other
            .0
            .iter()
            .any(|coin| self.amount_of(&coin.denom) >= coin.amount)
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(Coin::to_string).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl From<Vec<Coin>> for Coins {
    fn from(coins: Vec<Coin>) -> Self {
        Coins::new(coins)
    }
}

/// A decimal price per unit of gas, fixed-point with `DEC_PRECISION`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecCoin {
    pub denom: String,
    pub amount: u128,
}

impl DecCoin {
    /// Smallest fee in this denomination covering `gas` units.
    pub fn fee_for(&self, gas: Gas) -> u128 {
        let total = self.amount.saturating_mul(u128::from(gas));
        total.div_ceil(DEC_PRECISION)
    }
}

/// Parse a list like `"0.025uqc,1stake"` into decimal coins.
pub fn parse_dec_coins(input: &str) -> Result<Vec<DecCoin>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_dec_coin)
        .collect()
}

fn parse_dec_coin(input: &str) -> Result<DecCoin> {
    let split = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .ok_or_else(|| TxError::InvalidCoins(format!("missing denom in {input:?}")))?;
    let (number, denom) = input.split_at(split);
    if number.is_empty() || !denom.chars().all(|c| c.is_ascii_alphanumeric() || c == '/') {
        return Err(TxError::InvalidCoins(format!("invalid decimal coin {input:?}")));
    }

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if fraction.len() > 18 || fraction.contains('.') {
        return Err(TxError::InvalidCoins(format!("invalid decimal amount {number:?}")));
    }
    let parse = |digits: &str| -> Result<u128> {
        if digits.is_empty() {
            return Ok(0);
        }
        digits
            .parse::<u128>()
            .map_err(|e| TxError::InvalidCoins(format!("{input:?}: {e}")))
    };

    let scale = 10u128.pow(18 - fraction.len() as u32);
    let fraction_units = parse(fraction)? * scale;
    let amount = parse(whole)?
        .checked_mul(DEC_PRECISION)
        .and_then(|w| w.checked_add(fraction_units))
        .ok_or_else(|| TxError::InvalidCoins(format!("amount overflow in {input:?}")))?;

    Ok(DecCoin {
        denom: denom.to_string(),
        amount,
    })
}

// =============================================================================
// CLUSTER B: TRANSACTIONS
// =============================================================================

/// A typed sub-message routed to a business module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Msg {
    /// Router key of the module that handles this message.
    pub route: String,
    /// Message type within the module, e.g. `send`.
    pub msg_type: String,
    /// Accounts whose signatures the message requires.
    pub signers: Vec<Address>,
    /// Module-defined payload.
    pub payload: Vec<u8>,
}

impl Msg {
    pub fn new(
        route: impl Into<String>,
        msg_type: impl Into<String>,
        signers: Vec<Address>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            route: route.into(),
            msg_type: msg_type.into(),
            signers,
            payload,
        }
    }

    /// Stateless checks every message must pass.
    pub fn validate_basic(&self) -> Result<()> {
        if self.route.is_empty() || !self.route.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TxError::UnknownRoute(self.route.clone()));
        }
        if self.signers.is_empty() {
            return Err(TxError::Unauthorized(format!(
                "message {}/{} has no signers",
                self.route, self.msg_type
            )));
        }
        Ok(())
    }
}

/// Fee offered for a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fee {
    pub amount: Coins,
    pub gas_limit: Gas,
}

/// A signature by one of the transaction's signers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSignature {
    /// Compressed SEC1 public key.
    pub pub_key: Vec<u8>,
    /// 64-byte `r || s` signature over the sign bytes.
    pub signature: Vec<u8>,
    /// Account sequence the signature was made for.
    pub sequence: u64,
}

/// A decoded transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tx {
    pub msgs: Vec<Msg>,
    pub fee: Fee,
    pub memo: String,
    /// One signature per signer, in `signers()` order.
    pub signatures: Vec<TxSignature>,
}

impl Tx {
    /// Unique signers in order of first appearance.
    pub fn signers(&self) -> Vec<Address> {
        let mut seen = Vec::new();
        for signer in self.msgs.iter().flat_map(|msg| msg.signers.iter()) {
            if !seen.contains(signer) {
                seen.push(*signer);
            }
        }
        seen
    }

    /// The account paying the fee.
    pub fn fee_payer(&self) -> Option<Address> {
        self.signers().first().copied()
    }

    pub fn validate_basic(&self) -> Result<()> {
        if self.msgs.is_empty() {
            return Err(TxError::InvalidRequest("tx must contain at least one message".into()));
        }
        for msg in &self.msgs {
            msg.validate_basic()?;
        }
        if self.signatures.is_empty() {
            return Err(TxError::NoSignatures);
        }
        let signers = self.signers();
        if self.signatures.len() != signers.len() {
            return Err(TxError::WrongSignatureCount {
                expected: signers.len(),
                got: self.signatures.len(),
            });
        }
        Ok(())
    }
}

/// The document a signer commits to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignDoc {
    pub chain_id: String,
    pub account_number: u64,
    pub sequence: u64,
    pub fee: Fee,
    pub msgs: Vec<Msg>,
    pub memo: String,
}

impl SignDoc {
    pub fn new(chain_id: &str, account_number: u64, sequence: u64, tx: &Tx) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            account_number,
            sequence,
            fee: tx.fee.clone(),
            msgs: tx.msgs.clone(),
            memo: tx.memo.clone(),
        }
    }

    /// Canonical bytes that are signed.
    pub fn sign_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| TxError::Internal(e.to_string()))
    }
}

// =============================================================================
// CLUSTER C: ACCOUNTS
// =============================================================================

/// On-chain account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseAccount {
    pub address: Address,
    /// Set by the first signed transaction.
    pub pub_key: Option<Vec<u8>>,
    pub account_number: u64,
    pub sequence: u64,
    pub coins: Coins,
}

impl BaseAccount {
    pub fn new(address: Address, account_number: u64) -> Self {
        Self {
            address,
            pub_key: None,
            account_number,
            sequence: 0,
            coins: Coins::empty(),
        }
    }

    pub fn address_string(&self) -> String {
        format_address(&self.address)
    }
}

// =============================================================================
// CLUSTER D: EXECUTION
// =============================================================================

/// How `run_tx` treats an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTxMode {
    /// Mempool admission of a new transaction.
    Check,
    /// Mempool re-validation after a commit.
    ReCheck,
    /// Dry run for gas estimation.
    Simulate,
    /// Block execution.
    Deliver,
}

impl RunTxMode {
    pub fn is_check(self) -> bool {
        matches!(self, RunTxMode::Check | RunTxMode::ReCheck)
    }
}

/// Gas requested and used by one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GasInfo {
    pub gas_wanted: Gas,
    pub gas_used: Gas,
}

/// Output of one message handler.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MsgResult {
    pub data: Vec<u8>,
    pub log: String,
    pub events: Vec<Event>,
}

/// Per-message log entry of a transaction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLog {
    pub msg_index: usize,
    pub log: String,
    pub events: Vec<Event>,
}

/// Outcome of a successful attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxResult {
    /// Bincode-encoded list of each message's data.
    pub data: Vec<u8>,
    /// JSON array of `MessageLog`.
    pub log: String,
    /// Ante events first, then message events in execution order.
    pub events: Vec<Event>,
}

/// Body of the `app/simulate` query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResponse {
    pub gas_info: GasInfo,
    pub result: TxResult,
}
