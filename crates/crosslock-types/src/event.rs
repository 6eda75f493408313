//! Events returned by committed ledger operations.
//!
//! Each mutating operation returns the event describing what it committed,
//! so callers can index or relay state changes without re-reading records.

use serde::{Deserialize, Serialize};

use crate::{Asset, Pubkey, TradeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposited {
    pub trade_id: TradeId,
    pub depositor: Pubkey,
    pub asset: Asset,
    pub amount: u64,
    pub timeout: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settled {
    pub trade_id: TradeId,
    pub solver: Pubkey,
    /// Amount paid to the solver.
    pub solver_amount: u64,
    pub fee: u64,
    pub settled_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claimed {
    pub trade_id: TradeId,
    pub refund: Pubkey,
    pub amount: u64,
    pub claimed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransferred {
    pub trade_id: TradeId,
    pub from: Pubkey,
    pub to: Pubkey,
    pub asset: Asset,
    pub amount: u64,
    pub fee: u64,
    pub payment_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeWithdrawn {
    pub asset: Asset,
    pub receiver: Pubkey,
    pub amount: u64,
}

/// A terminal trade and its authorization record were deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeClosed {
    pub trade_id: TradeId,
    /// Residual vault balance returned to the depositor.
    pub swept: u64,
    /// Storage cost returned to the original payer.
    pub rent_refunded: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptClosed {
    pub trade_id: TradeId,
    pub from: Pubkey,
    pub asset: Asset,
    pub rent_refunded: u64,
}
