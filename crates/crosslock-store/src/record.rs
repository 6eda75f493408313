//! Typed records and their storage envelope.

use serde::{Deserialize, Serialize};

use crosslock_types::{
    AuthorizationRecord, Config, FeeReceiver, PaymentReceipt, Pubkey, TokenBalance, Trade,
    WhitelistEntry,
};

/// Every kind of record the protocol stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Record {
    Config(Config),
    Whitelist(WhitelistEntry),
    FeeReceiver(FeeReceiver),
    Trade(Trade),
    Authorization(AuthorizationRecord),
    PaymentReceipt(PaymentReceipt),
    Balance(TokenBalance),
}

impl Record {
    /// Short kind name for logs and errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Whitelist(_) => "whitelist",
            Self::FeeReceiver(_) => "fee_receiver",
            Self::Trade(_) => "trade",
            Self::Authorization(_) => "authorization",
            Self::PaymentReceipt(_) => "payment_receipt",
            Self::Balance(_) => "balance",
        }
    }

    #[must_use]
    pub fn as_config(&self) -> Option<&Config> {
        match self {
            Self::Config(config) => Some(config),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_whitelist(&self) -> Option<&WhitelistEntry> {
        match self {
            Self::Whitelist(entry) => Some(entry),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_fee_receiver(&self) -> Option<&FeeReceiver> {
        match self {
            Self::FeeReceiver(receiver) => Some(receiver),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_trade(&self) -> Option<&Trade> {
        match self {
            Self::Trade(trade) => Some(trade),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_authorization(&self) -> Option<&AuthorizationRecord> {
        match self {
            Self::Authorization(record) => Some(record),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_payment_receipt(&self) -> Option<&PaymentReceipt> {
        match self {
            Self::PaymentReceipt(receipt) => Some(receipt),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_balance(&self) -> Option<&TokenBalance> {
        match self {
            Self::Balance(balance) => Some(balance),
            _ => None,
        }
    }
}

/// A record as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub record: Record,
    /// Commit that last wrote this record.
    pub version: u64,
    /// Who paid the storage cost, if any was charged.
    pub payer: Option<Pubkey>,
    /// Native amount refunded to `payer` on deletion.
    pub rent: u64,
}
