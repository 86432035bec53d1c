//! # Bank Module
//!
//! Coin transfers between accounts.
//!
//! - Messages: `bank/send` with a bincode `MsgSend` payload; the first signer
//!   pays.
//! - Queries: `custom/bank/balance/<address>` (decimal amount of the
//!   queried denom, default `uqc`) and `custom/bank/account/<address>`
//!   (JSON account).
//! - Genesis: `app_state.bank.balances` minted at InitChain.

use qc_app_runtime::auth::{get_account, mint_coins, send_coins};
use qc_app_runtime::{
    Coins, Context, Handler, InitChainer, Msg, MsgResult, Querier, QueryRouter, RequestInitChain,
    RequestQuery, ResponseInitChain, Result, Router, RouterError, TxError,
};
use serde::{Deserialize, Serialize};
use shared_types::{format_address, parse_address, Address, ValidatorUpdate};
use std::sync::Arc;
use tracing::info;

pub const ROUTE: &str = "bank";
pub const MSG_SEND: &str = "send";
pub const DEFAULT_DENOM: &str = "uqc";

/// Transfer `amount` from the message's first signer to `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSend {
    pub to: Address,
    pub amount: Coins,
}

impl MsgSend {
    pub fn into_msg(self, from: Address) -> Result<Msg> {
        let payload = bincode::serialize(&self).map_err(|e| TxError::Internal(e.to_string()))?;
        Ok(Msg::new(ROUTE, MSG_SEND, vec![from], payload))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenesisBalance {
    /// `0x`-prefixed hex address.
    pub address: String,
    pub coins: Coins,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisState {
    pub balances: Vec<GenesisBalance>,
}

/// Application genesis state carried in `RequestInitChain.app_state_bytes`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppGenesis {
    pub bank: GenesisState,
}

fn handle_msg(ctx: &Context, msg: &Msg) -> Result<MsgResult> {
    match msg.msg_type.as_str() {
        MSG_SEND => {
            let send: MsgSend = bincode::deserialize(&msg.payload)
                .map_err(|e| TxError::Decode(format!("invalid MsgSend: {e}")))?;
            if send.amount.is_empty() {
                return Err(TxError::InvalidCoins("send amount must not be empty".into()));
            }
            let from = *msg
                .signers
                .first()
                .ok_or_else(|| TxError::InvalidRequest("send requires a signer".into()))?;
            send_coins(ctx, &from, &send.to, &send.amount)?;
            Ok(MsgResult {
                log: format!(
                    "sent {} from {} to {}",
                    send.amount,
                    format_address(&from),
                    format_address(&send.to)
                ),
                ..Default::default()
            })
        }
        other => Err(TxError::UnknownRequest(format!(
            "unrecognized bank message type: {other}"
        ))),
    }
}

fn handle_query(ctx: &Context, path: &[String], req: &RequestQuery) -> Result<Vec<u8>> {
    let [kind, address] = path else {
        return Err(TxError::UnknownRequest(format!(
            "unknown bank query path {}",
            req.path
        )));
    };
    let address = parse_address(address).map_err(|e| TxError::InvalidAddress(e.to_string()))?;
    let account = get_account(ctx, &address)?;

    match kind.as_str() {
        "balance" => {
            let denom = match std::str::from_utf8(&req.data) {
                Ok(denom) if !denom.is_empty() => denom,
                _ => DEFAULT_DENOM,
            };
            let amount = account.map_or(0, |account| account.coins.amount_of(denom));
            Ok(amount.to_string().into_bytes())
        }
        "account" => {
            let account = account.ok_or_else(|| {
                TxError::UnknownAddress(format!("account {} does not exist", format_address(&address)))
            })?;
            serde_json::to_vec(&account).map_err(|e| TxError::Internal(e.to_string()))
        }
        other => Err(TxError::UnknownRequest(format!("unknown bank query {other}"))),
    }
}

/// Register the bank handler and querier.
pub fn register(
    router: &mut Router,
    queries: &mut QueryRouter,
) -> std::result::Result<(), RouterError> {
    let handler: Handler = Arc::new(handle_msg);
    let querier: Querier = Arc::new(handle_query);
    router.add_route(ROUTE, handler)?;
    queries.add_route(ROUTE, querier)?;
    Ok(())
}

/// Genesis callback minting `app_state.bank.balances` and returning the
/// consensus-provided validators unchanged.
pub fn init_chainer() -> InitChainer {
    Arc::new(
        |ctx: &Context, req: &RequestInitChain| -> Result<ResponseInitChain> {
            let genesis: AppGenesis = if req.app_state_bytes.is_empty() {
                AppGenesis::default()
            } else {
                serde_json::from_slice(&req.app_state_bytes)
                    .map_err(|e| TxError::Decode(format!("invalid app state: {e}")))?
            };

            for balance in &genesis.bank.balances {
                let address = parse_address(&balance.address)
                    .map_err(|e| TxError::InvalidAddress(e.to_string()))?;
                mint_coins(ctx, address, &balance.coins)?;
            }
            info!(
                accounts = genesis.bank.balances.len(),
                "[bank] Genesis balances minted"
            );

            let validators: Vec<ValidatorUpdate> = req.validators.clone();
            Ok(ResponseInitChain {
                consensus_params: None,
                validators,
            })
        },
    )
}
