//! Payment-receipt ledger for the complementary swap leg.
//!
//! A solver pays the user on the destination side with
//! [`create_payment`](Ledger::create_payment); the fee rides on top of the
//! payment and goes to the fee pool. The receipt is immutable and unique
//! per `(trade_id, from, asset)`. Anyone may close it once it has aged past
//! the configured wait.

use serde::{Deserialize, Serialize};
use tracing::info;

use crosslock_store::{Mutation, Precondition, Record, RecordStore, StoreError, Transaction};
use crosslock_types::{
    Asset, CrosslockError, NativeAssetPolicy, PaymentReceipt, Pubkey, Result, TokenBalance,
    TradeId, WhitelistEntry, event,
};

use crate::{Clock, Ledger};

/// A payment from `from` to `to` on behalf of `trade_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub from: Pubkey,
    pub trade_id: TradeId,
    pub to: Pubkey,
    pub asset: Asset,
    pub amount: u64,
    /// Charged to `from` on top of `amount`.
    pub total_fee: u64,
    /// Unix seconds; the payment is rejected after it.
    pub deadline: i64,
}

impl<S: RecordStore, C: Clock> Ledger<S, C> {
    /// Transfer `amount` to `to` and `total_fee` to the fee pool, and record
    /// the receipt.
    ///
    /// # Errors
    /// - `Expired` when `now > deadline`
    /// - `InvalidAmount` for a zero amount
    /// - `NotWhitelisted` unless the asset may be paid in
    /// - `DuplicatePayment` if `from` already paid this trade in `asset`
    /// - `BalanceOverflow` if `amount + total_fee` overflows
    /// - `InsufficientFunds` if `from` cannot cover the payment and rent
    pub fn create_payment(&self, request: PaymentRequest) -> Result<event::PaymentTransferred> {
        let PaymentRequest {
            from,
            trade_id,
            to,
            asset,
            amount,
            total_fee,
            deadline,
        } = request;
        let now = self.now();

        if now > deadline {
            return Err(CrosslockError::Expired { deadline, now });
        }
        if amount == 0 {
            return Err(CrosslockError::InvalidAmount {
                reason: "payment amount is zero".into(),
            });
        }
        let whitelist_address = WhitelistEntry::address(&asset);
        let needs_whitelist = self.requires_whitelist(&asset);
        if needs_whitelist && self.whitelist(&asset)?.is_none() {
            return Err(CrosslockError::NotWhitelisted(asset));
        }
        let receipt_address = PaymentReceipt::address(&trade_id, &from, &asset);
        if self.store.fetch(&receipt_address).is_some() {
            return Err(CrosslockError::DuplicatePayment { trade_id, from });
        }
        amount
            .checked_add(total_fee)
            .ok_or(CrosslockError::BalanceOverflow)?;

        let receipt = PaymentReceipt {
            trade_id,
            from,
            to,
            asset,
            payment_amount: amount,
            total_fee,
            deadline,
            payment_time: now,
        };
        let mut tx = Transaction::new().require(Precondition::Absent(receipt_address));
        if needs_whitelist {
            tx = tx.require(Precondition::Present(whitelist_address));
        }
        let tx = tx
            .apply(Mutation::Create {
                address: receipt_address,
                record: Record::PaymentReceipt(receipt),
                payer: Some(from),
                rent: self.settings.payment_receipt_rent,
            })
            .transfer(from, to, asset, amount)
            .transfer(from, TokenBalance::fee_pool_owner(), asset, total_fee);
        self.commit(tx, |err| match err {
            StoreError::AlreadyExists(address) if *address == receipt_address => {
                Some(CrosslockError::DuplicatePayment { trade_id, from })
            }
            StoreError::Missing(address) if *address == whitelist_address => {
                Some(CrosslockError::NotWhitelisted(asset))
            }
            _ => None,
        })?;

        info!(
            trade_id = %trade_id,
            from = %from.short(),
            to = %to.short(),
            asset = %asset,
            amount,
            fee = total_fee,
            "Payment transferred"
        );
        Ok(event::PaymentTransferred {
            trade_id,
            from,
            to,
            asset,
            amount,
            fee: total_fee,
            payment_time: now,
        })
    }

    /// Delete an aged receipt and refund its rent to the payer. Anyone may
    /// call this.
    ///
    /// # Errors
    /// - `PaymentNotFound` if no such receipt exists
    /// - `CloseNotAvailable` before `payment_time + close_payment_duration`
    pub fn close_payment_receipt(
        &self,
        trade_id: TradeId,
        from: Pubkey,
        asset: Asset,
    ) -> Result<event::ReceiptClosed> {
        let config = self.load_config()?.value;
        let loaded = self.load_payment_receipt(&trade_id, &from, &asset)?;
        let now = self.now();
        let available_at = loaded.value.closable_at(config.close_payment_duration);
        if now < available_at {
            return Err(CrosslockError::CloseNotAvailable { available_at, now });
        }

        let address = PaymentReceipt::address(&trade_id, &from, &asset);
        let tx = Transaction::new()
            .require(Precondition::Version(address, loaded.version))
            .apply(Mutation::Delete { address });
        self.commit(tx, |err| match err {
            StoreError::VersionMismatch { .. } | StoreError::Missing(_) => {
                Some(CrosslockError::PaymentNotFound(trade_id))
            }
            _ => None,
        })?;

        info!(
            trade_id = %trade_id,
            from = %from.short(),
            asset = %asset,
            rent_refunded = loaded.rent,
            "Payment receipt closed"
        );
        Ok(event::ReceiptClosed {
            trade_id,
            from,
            asset,
            rent_refunded: loaded.rent,
        })
    }

    /// Whether paying in `asset` needs a whitelist entry.
    fn requires_whitelist(&self, asset: &Asset) -> bool {
        !(asset.is_native() && self.settings.native_asset_policy == NativeAssetPolicy::Exempt)
    }
}
