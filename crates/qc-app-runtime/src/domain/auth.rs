//! Account storage.
//!
//! Accounts live under `acc/<address>` in the context's store branch and are
//! bincode-encoded. Every access goes through the metered store, so reading
//! an account during ante costs gas like any other read.

use shared_types::{format_address, Address, Event};

use super::context::Context;
use super::entities::{BaseAccount, Coins};
use crate::error::{Result, TxError};

pub const ACCOUNT_PREFIX: &[u8] = b"acc/";
pub const GLOBAL_ACCOUNT_NUMBER_KEY: &[u8] = b"globalAccountNumber";

pub const EVENT_TRANSFER: &str = "transfer";

pub fn account_key(address: &Address) -> Vec<u8> {
    let mut key = ACCOUNT_PREFIX.to_vec();
    key.extend_from_slice(address);
    key
}

pub fn get_account(ctx: &Context, address: &Address) -> Result<Option<BaseAccount>> {
    ctx.store()
        .get(&account_key(address))?
        .map(|bytes| {
            bincode::deserialize(&bytes).map_err(|e| TxError::Internal(e.to_string()))
        })
        .transpose()
}

pub fn must_get_account(ctx: &Context, address: &Address) -> Result<BaseAccount> {
    get_account(ctx, address)?
        .ok_or_else(|| TxError::UnknownAddress(format_address(address)))
}

pub fn set_account(ctx: &Context, account: &BaseAccount) -> Result<()> {
    let bytes = bincode::serialize(account).map_err(|e| TxError::Internal(e.to_string()))?;
    ctx.store().set(&account_key(&account.address), bytes)
}

fn next_account_number(ctx: &Context) -> Result<u64> {
    let store = ctx.store();
    let current = match store.get(GLOBAL_ACCOUNT_NUMBER_KEY)? {
        Some(bytes) => {
            let raw: [u8; 8] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| TxError::Internal("corrupt account number".into()))?;
            u64::from_be_bytes(raw)
        }
        None => 0,
    };
    store.set(GLOBAL_ACCOUNT_NUMBER_KEY, (current + 1).to_be_bytes().to_vec())?;
    Ok(current)
}

/// Create and store a fresh account with the next account number.
pub fn new_account(ctx: &Context, address: Address) -> Result<BaseAccount> {
    let account = BaseAccount::new(address, next_account_number(ctx)?);
    set_account(ctx, &account)?;
    Ok(account)
}

pub fn get_or_create_account(ctx: &Context, address: Address) -> Result<BaseAccount> {
    match get_account(ctx, &address)? {
        Some(account) => Ok(account),
        None => new_account(ctx, address),
    }
}

/// Move `amount` between accounts, creating the recipient if needed.
pub fn send_coins(ctx: &Context, from: &Address, to: &Address, amount: &Coins) -> Result<()> {
    let mut sender = must_get_account(ctx, from)?;
    sender.coins = sender.coins.checked_sub(amount).ok_or_else(|| {
        TxError::InsufficientFunds(format!("{} is smaller than {}", sender.coins, amount))
    })?;
    set_account(ctx, &sender)?;

    let mut recipient = get_or_create_account(ctx, *to)?;
    recipient.coins = recipient
        .coins
        .checked_add(amount)
        .ok_or_else(|| TxError::InvalidCoins("balance overflow".into()))?;
    set_account(ctx, &recipient)?;

    ctx.emit_event(
        Event::new(EVENT_TRANSFER)
            .with_attribute("recipient", format_address(to))
            .with_attribute("sender", format_address(from))
            .with_attribute("amount", amount.to_string()),
    );
    Ok(())
}

/// Add coins to an account, creating it if needed. Used by genesis.
pub fn mint_coins(ctx: &Context, to: Address, amount: &Coins) -> Result<BaseAccount> {
    let mut account = get_or_create_account(ctx, to)?;
    account.coins = account
        .coins
        .checked_add(amount)
        .ok_or_else(|| TxError::InvalidCoins("balance overflow".into()))?;
    set_account(ctx, &account)?;
    Ok(account)
}
