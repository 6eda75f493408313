//! Error types for the Crosslock escrow protocol.
//!
//! All errors use the `CL_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Registry / governance errors
//! - 2xx: Trade lifecycle errors
//! - 3xx: Durable authorization errors
//! - 4xx: Payment errors
//! - 5xx: Balance errors
//! - 9xx: General / internal errors
//!
//! Every failing operation is a no-op: validation completes before the
//! transaction is submitted, and the store rejects a transaction as a whole.

use thiserror::Error;

use crate::{Address, Asset, Pubkey, TradeId};

/// Central error enum for all Crosslock operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CrosslockError {
    // =================================================================
    // Registry Errors (1xx)
    // =================================================================
    /// The caller does not hold the role this operation requires.
    #[error("CL_ERR_100: Unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// `initialize` was called on a store that already has a Config.
    #[error("CL_ERR_101: Protocol already initialized")]
    AlreadyInitialized,

    /// No Config record exists yet.
    #[error("CL_ERR_102: Protocol not initialized")]
    NotInitialized,

    #[error("CL_ERR_103: Operator already exists: {0}")]
    OperatorAlreadyExists(Pubkey),

    #[error("CL_ERR_104: Operator not found: {0}")]
    OperatorNotFound(Pubkey),

    #[error("CL_ERR_105: Operator limit reached ({limit})")]
    OperatorLimitReached { limit: usize },

    /// The asset has no whitelist entry.
    #[error("CL_ERR_106: Asset not whitelisted: {0}")]
    NotWhitelisted(Asset),

    /// The deposit exceeds the whitelist cap in force.
    #[error("CL_ERR_107: Deposit of {amount} exceeds cap {cap} for {asset}")]
    CapExceeded { asset: Asset, amount: u64, cap: u64 },

    /// A whitelist entry cannot be removed while deposits reference it.
    #[error("CL_ERR_108: Asset {asset} still has {exposure} outstanding")]
    NonZeroExposure { asset: Asset, exposure: u64 },

    #[error("CL_ERR_109: Fee receiver already registered: {0}")]
    ReceiverAlreadyRegistered(Pubkey),

    #[error("CL_ERR_110: Fee receiver not registered: {0}")]
    ReceiverNotRegistered(Pubkey),

    // =================================================================
    // Trade Errors (2xx)
    // =================================================================
    #[error("CL_ERR_200: Trade not found: {0}")]
    TradeNotFound(TradeId),

    /// A trade with this id already exists.
    #[error("CL_ERR_201: Trade already exists: {0}")]
    DuplicateTrade(TradeId),

    /// The trade is not in the status this operation requires, or a
    /// concurrent transition won the race.
    #[error("CL_ERR_202: Invalid trade state for {trade_id}: {reason}")]
    InvalidState { trade_id: TradeId, reason: String },

    /// The trade (or payment deadline) has passed.
    #[error("CL_ERR_203: Expired at {deadline}, now {now}")]
    Expired { deadline: i64, now: i64 },

    /// The trade timeout has not been reached yet.
    #[error("CL_ERR_204: Not expired until {timeout}, now {now}")]
    NotExpired { timeout: i64, now: i64 },

    #[error("CL_ERR_205: Invalid timeout {timeout}, now {now}")]
    InvalidTimeout { timeout: i64, now: i64 },

    #[error("CL_ERR_206: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("CL_ERR_207: Total fee {fee} exceeds trade amount {amount}")]
    InvalidFee { fee: u64, amount: u64 },

    /// Settlement attempted before the MPC set the total fee.
    #[error("CL_ERR_208: Total fee not set for {0}")]
    FeeNotSet(TradeId),

    #[error("CL_ERR_209: Invalid asset: {reason}")]
    InvalidAsset { reason: String },

    /// Cleanup attempted before the close-wait duration elapsed.
    #[error("CL_ERR_210: Close not available until {available_at}, now {now}")]
    CloseNotAvailable { available_at: i64, now: i64 },

    // =================================================================
    // Authorization Errors (3xx)
    // =================================================================
    /// The ephemeral key already backs a live authorization record.
    #[error("CL_ERR_300: Authorization key in use: {0}")]
    AuthorizationInUse(Pubkey),

    #[error("CL_ERR_301: Authorization record not found for key {0}")]
    AuthorizationNotFound(Pubkey),

    /// The record was consumed or voided, or its nonce moved on.
    #[error("CL_ERR_302: Authorization consumed: {reason}")]
    AuthorizationConsumed { reason: String },

    /// The signed payload does not match the record or the trade.
    #[error("CL_ERR_303: Authorization mismatch: {reason}")]
    AuthorizationMismatch { reason: String },

    /// A serialized presigned settlement could not be decoded.
    #[error("CL_ERR_304: Invalid presigned settlement: {reason}")]
    InvalidPresign { reason: String },

    // =================================================================
    // Payment Errors (4xx)
    // =================================================================
    #[error("CL_ERR_400: Payment already recorded for {trade_id} from {from}")]
    DuplicatePayment { trade_id: TradeId, from: Pubkey },

    #[error("CL_ERR_401: Payment receipt not found for {0}")]
    PaymentNotFound(TradeId),

    // =================================================================
    // Balance Errors (5xx)
    // =================================================================
    #[error("CL_ERR_500: Insufficient funds for {owner} in {asset}: need {needed}, have {available}")]
    InsufficientFunds {
        owner: Pubkey,
        asset: Asset,
        needed: u64,
        available: u64,
    },

    #[error("CL_ERR_501: Balance overflow")]
    BalanceOverflow,

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// A record changed between evaluation and commit. Safe to retry.
    #[error("CL_ERR_900: Stale record {0}")]
    StaleRecord(Address),

    /// The record store rejected the transaction for another reason.
    #[error("CL_ERR_901: Store error: {0}")]
    Store(String),

    /// Configuration error (invalid settings file, out-of-range values).
    #[error("CL_ERR_902: Configuration error: {0}")]
    Configuration(String),

    #[error("CL_ERR_903: Serialization error: {0}")]
    Serialization(String),

    /// Unrecoverable internal error (a stored record has the wrong kind).
    #[error("CL_ERR_904: Internal error: {0}")]
    Internal(String),

    /// A public key string that is not 32 bytes of hex.
    #[error("CL_ERR_905: Invalid key: {reason}")]
    InvalidKey { reason: String },
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, CrosslockError>;

impl From<serde_json::Error> for CrosslockError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl CrosslockError {
    /// Convenience constructor for [`CrosslockError::Unauthorized`].
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`CrosslockError::InvalidState`].
    pub fn invalid_state(trade_id: TradeId, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            trade_id,
            reason: reason.into(),
        }
    }
}
