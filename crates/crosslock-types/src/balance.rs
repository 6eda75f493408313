//! Token balances.
//!
//! Every holding, including trade vaults and the protocol fee pool, is a
//! [`TokenBalance`] for an `(owner, asset)` pair. Vault and pool owners are
//! derived addresses rather than keys anyone holds.

use serde::{Deserialize, Serialize};

use crate::{Address, Asset, CrosslockError, Pubkey, Result, constants};

/// Balance of one asset held by one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub owner: Pubkey,
    pub asset: Asset,
    pub amount: u64,
}

impl TokenBalance {
    /// Create a zero balance.
    #[must_use]
    pub fn new(owner: Pubkey, asset: Asset) -> Self {
        Self {
            owner,
            asset,
            amount: 0,
        }
    }

    #[must_use]
    pub fn address(owner: &Pubkey, asset: &Asset) -> Address {
        Address::derive(&[constants::BALANCE_SEED, owner.as_bytes(), &asset.seed()])
    }

    /// Owner of the protocol fee pool.
    #[must_use]
    pub fn fee_pool_owner() -> Pubkey {
        Address::derive(&[constants::PROTOCOL_SEED]).as_owner()
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    pub fn credit(&mut self, amount: u64) -> Result<()> {
        self.amount = self
            .amount
            .checked_add(amount)
            .ok_or(CrosslockError::BalanceOverflow)?;
        Ok(())
    }

    /// Fail with `InsufficientFunds` rather than going negative.
    pub fn debit(&mut self, amount: u64) -> Result<()> {
        self.amount = self
            .amount
            .checked_sub(amount)
            .ok_or(CrosslockError::InsufficientFunds {
                owner: self.owner,
                asset: self.asset,
                needed: amount,
                available: self.amount,
            })?;
        Ok(())
    }
}
