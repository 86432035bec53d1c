//! Public key registration, signature gas, signature verification and
//! sequence bumps.

use shared_types::{address_from_pubkey, format_address};
use std::sync::Arc;

use super::AnteStage;
use crate::domain::auth;
use crate::domain::context::Context;
use crate::domain::entities::{SignDoc, Tx};
use crate::error::{Result, TxError};
use crate::ports::SignatureVerifier;

/// Binds each signer's public key to its account on first use.
pub struct SetPubKeyStage;

impl AnteStage for SetPubKeyStage {
    fn name(&self) -> &'static str {
        "set_pubkey"
    }

    fn handle(&self, ctx: Context, tx: &Tx, simulate: bool) -> Result<Context> {
        for (signer, sig) in tx.signers().iter().zip(&tx.signatures) {
            // Simulations may omit keys.
            if simulate && sig.pub_key.is_empty() {
                continue;
            }
            if address_from_pubkey(&sig.pub_key) != *signer {
                return Err(TxError::InvalidPubKey(format!(
                    "pubkey does not match signer address {}",
                    format_address(signer)
                )));
            }

            let mut account = auth::must_get_account(&ctx, signer)?;
            if account.pub_key.is_none() {
                account.pub_key = Some(sig.pub_key.clone());
                auth::set_account(&ctx, &account)?;
            }
        }
        Ok(ctx)
    }
}

/// Charges a flat verification cost per signature.
pub struct SigGasConsumeStage {
    cost_per_signature: u64,
}

impl SigGasConsumeStage {
    pub fn new(cost_per_signature: u64) -> Self {
        Self { cost_per_signature }
    }
}

impl AnteStage for SigGasConsumeStage {
    fn name(&self) -> &'static str {
        "sig_gas_consume"
    }

    fn handle(&self, ctx: Context, tx: &Tx, _simulate: bool) -> Result<Context> {
        for _ in &tx.signatures {
            ctx.gas_meter()
                .consume(self.cost_per_signature, "ante verify: secp256k1")?;
        }
        Ok(ctx)
    }
}

/// Checks every signature over the signer's `SignDoc`.
///
/// Skipped when simulating and on ReCheck.
pub struct SigVerificationStage {
    verifier: Arc<dyn SignatureVerifier>,
}

impl SigVerificationStage {
    pub fn new(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self { verifier }
    }
}

impl AnteStage for SigVerificationStage {
    fn name(&self) -> &'static str {
        "sig_verification"
    }

    fn handle(&self, ctx: Context, tx: &Tx, simulate: bool) -> Result<Context> {
        if simulate || ctx.is_recheck_tx() {
            return Ok(ctx);
        }

        for (signer, sig) in tx.signers().iter().zip(&tx.signatures) {
            let account = auth::must_get_account(&ctx, signer)?;
            let pub_key = account
                .pub_key
                .as_deref()
                .ok_or_else(|| TxError::InvalidPubKey("pubkey on account is not set".into()))?;

            if sig.sequence != account.sequence {
                return Err(TxError::InvalidSequence {
                    expected: account.sequence,
                    got: sig.sequence,
                });
            }

            let sign_bytes =
                SignDoc::new(ctx.chain_id(), account.account_number, account.sequence, tx)
                    .sign_bytes()?;
            if !self.verifier.verify(pub_key, &sign_bytes, &sig.signature) {
                return Err(TxError::InvalidSignature(format!(
                    "account number ({}), sequence ({}) and chain-id ({})",
                    account.account_number,
                    account.sequence,
                    ctx.chain_id()
                )));
            }
        }
        Ok(ctx)
    }
}

/// Bumps every signer's sequence, making the transaction non-replayable.
pub struct IncrementSequenceStage;

impl AnteStage for IncrementSequenceStage {
    fn name(&self) -> &'static str {
        "increment_sequence"
    }

    fn handle(&self, ctx: Context, tx: &Tx, _simulate: bool) -> Result<Context> {
        for signer in tx.signers() {
            let mut account = auth::must_get_account(&ctx, &signer)?;
            account.sequence += 1;
            auth::set_account(&ctx, &account)?;
        }
        Ok(ctx)
    }
}
