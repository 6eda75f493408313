//! Payment receipts for the complementary swap leg.
//!
//! When the solver pays the user on the destination side, the payment is
//! recorded as an immutable [`PaymentReceipt`]. At most one receipt exists
//! per `(trade_id, from, asset)`; the triple is the record's address seed.

use serde::{Deserialize, Serialize};

use crate::{Address, Asset, Pubkey, TradeId, constants};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub trade_id: TradeId,
    pub from: Pubkey,
    pub to: Pubkey,
    pub asset: Asset,
    /// Credited to `to`.
    pub payment_amount: u64,
    /// Credited to the fee pool on top of `payment_amount`.
    pub total_fee: u64,
    pub deadline: i64,
    pub payment_time: i64,
}

impl PaymentReceipt {
    #[must_use]
    pub fn address(trade_id: &TradeId, from: &Pubkey, asset: &Asset) -> Address {
        Address::derive(&[
            constants::PAYMENT_RECEIPT_SEED,
            trade_id.as_bytes(),
            from.as_bytes(),
            &asset.seed(),
        ])
    }

    /// Earliest time the receipt may be closed.
    #[must_use]
    pub fn closable_at(&self, close_payment_duration: u64) -> i64 {
        let wait = i64::try_from(close_payment_duration).unwrap_or(i64::MAX);
        self.payment_time.saturating_add(wait)
    }
}
