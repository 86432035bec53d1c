//! Error types for the application runtime.
//!
//! Two tiers:
//! - [`TxError`]: recoverable, returned by every stage, handler and query.
//!   Carries a stable `(codespace, code)` pair for responses.
//! - [`LifecycleFault`]: invariant violations. Routed through [`fatal`],
//!   never returned to consensus.

use qc_app_store::StoreError;
use thiserror::Error;
use tracing::error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, TxError>;

/// Codespace of every error defined by the runtime itself.
pub const ROOT_CODESPACE: &str = "sdk";

/// Code reserved for success.
pub const CODE_OK: u32 = 0;

/// Recoverable transaction and query errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Tx decode error: {0}")]
    Decode(String),

    #[error("Invalid sequence: expected {expected}, got {got}")]
    InvalidSequence { expected: u64, got: u64 },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Unknown request: {0}")]
    UnknownRequest(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid public key: {0}")]
    InvalidPubKey(String),

    #[error("Unknown address: {0}")]
    UnknownAddress(String),

    #[error("Invalid coins: {0}")]
    InvalidCoins(String),

    #[error("Out of gas in location: {descriptor}")]
    OutOfGas { descriptor: String },

    #[error("Memo too large: {length} characters, maximum {max}")]
    MemoTooLarge { length: usize, max: usize },

    #[error("Insufficient fee: {0}")]
    InsufficientFee(String),

    #[error("Too many signatures: {got}, expected {expected}")]
    WrongSignatureCount { expected: usize, got: usize },

    #[error("No signatures supplied")]
    NoSignatures,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unrecognized message route: {0}")]
    UnknownRoute(String),

    #[error("Signature verification failed for {0}")]
    InvalidSignature(String),

    #[error("Tx too large: {size} bytes, maximum {max}")]
    TxTooLarge { size: usize, max: usize },

    #[error("Invalid height: {0}")]
    InvalidHeight(String),

    /// Error defined by a business module.
    #[error("{message}")]
    Module {
        codespace: String,
        code: u32,
        message: String,
    },

    /// A panic caught while executing a stage or handler.
    #[error("Panic recovered: {0}")]
    Panic(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl TxError {
    /// Module error constructor.
    pub fn module(codespace: impl Into<String>, code: u32, message: impl Into<String>) -> Self {
        TxError::Module {
            codespace: codespace.into(),
            code,
            message: message.into(),
        }
    }

    /// Stable numeric code reported in responses.
    pub fn code(&self) -> u32 {
        match self {
            TxError::Internal(_) | TxError::Store(_) => 1,
            TxError::Decode(_) => 2,
            TxError::InvalidSequence { .. } => 3,
            TxError::Unauthorized(_) | TxError::InvalidSignature(_) => 4,
            TxError::InsufficientFunds(_) => 5,
            TxError::UnknownRequest(_) | TxError::UnknownRoute(_) => 6,
            TxError::InvalidAddress(_) => 7,
            TxError::InvalidPubKey(_) => 8,
            TxError::UnknownAddress(_) => 9,
            TxError::InvalidCoins(_) => 10,
            TxError::OutOfGas { .. } => 11,
            TxError::MemoTooLarge { .. } => 12,
            TxError::InsufficientFee(_) => 13,
            TxError::WrongSignatureCount { .. } => 14,
            TxError::NoSignatures => 15,
            TxError::InvalidRequest(_) => 18,
            TxError::TxTooLarge { .. } => 21,
            TxError::InvalidHeight(_) => 26,
            TxError::Panic(_) => 111222,
            TxError::Module { code, .. } => *code,
        }
    }

    pub fn codespace(&self) -> &str {
        match self {
            TxError::Module { codespace, .. } => codespace,
            _ => ROOT_CODESPACE,
        }
    }

    pub fn is_out_of_gas(&self) -> bool {
        matches!(self, TxError::OutOfGas { .. })
    }
}

/// Invariant violations on the block lifecycle path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleFault {
    #[error("{operation} called before the chain was initialized")]
    NotInitialized { operation: &'static str },

    #[error("InitChain called on an initialized chain at height {height}")]
    AlreadyInitialized { height: u64 },

    #[error("Invalid height: expected {expected}, got {got}")]
    InvalidHeight { expected: u64, got: u64 },

    #[error("BeginBlock({height}) called while block {current} is in progress")]
    BlockInProgress { height: u64, current: u64 },

    #[error("{operation} called with no block in progress")]
    NoBlockInProgress { operation: &'static str },

    #[error("Commit called before EndBlock")]
    BlockNotClosed,

    #[error("len(RequestInitChain.Validators) != len(GenesisValidators) ({requested} != {returned})")]
    ValidatorCountMismatch { requested: usize, returned: usize },

    #[error("genesisValidators[{index}] != req.Validators[{index}]")]
    ValidatorMismatch { index: usize },

    #[error("{callback} callback failed: {reason}")]
    Callback {
        callback: &'static str,
        reason: String,
    },

    #[error("Store fault: {0}")]
    Store(#[from] StoreError),
}

/// Abort the current lifecycle call.
///
/// The embedding process treats a panic on the lifecycle path as a halt.
pub fn fatal(fault: LifecycleFault) -> ! {
    error!("[app] Unrecoverable fault: {}", fault);
    panic!("{}", fault);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(TxError::Decode("x".into()).code(), 2);
        assert_eq!(
            TxError::OutOfGas {
                descriptor: "WriteFlat".into()
            }
            .code(),
            11
        );
        assert_eq!(TxError::Panic("boom".into()).code(), 111222);
        assert_eq!(TxError::NoSignatures.codespace(), ROOT_CODESPACE);
    }

    #[test]
    fn test_module_error_keeps_its_codespace() {
        let err = TxError::module("bank", 5, "no balance");
        assert_eq!(err.code(), 5);
        assert_eq!(err.codespace(), "bank");
        assert_eq!(err.to_string(), "no balance");
    }

    #[test]
    fn test_store_error_converts_to_internal_code() {
        let err: TxError = StoreError::ReadOnly.into();
        assert_eq!(err.code(), 1);
    }

    #[test]
    #[should_panic(expected = "Invalid height: expected 5, got 7")]
    fn test_fatal_panics_with_fault_message() {
        fatal(LifecycleFault::InvalidHeight {
            expected: 5,
            got: 7,
        });
    }
}
