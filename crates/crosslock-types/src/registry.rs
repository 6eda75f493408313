//! Governance records gating deposits and fee withdrawals.

use serde::{Deserialize, Serialize};

use crate::{Address, Asset, CrosslockError, Pubkey, Result, constants};

/// Deposit policy for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub asset: Asset,
    /// Largest single deposit accepted.
    pub cap: u64,
    /// Sum of amounts held by `Deposited` trades in this asset.
    pub exposure: u64,
}

impl WhitelistEntry {
    #[must_use]
    pub fn new(asset: Asset, cap: u64) -> Self {
        Self {
            asset,
            cap,
            exposure: 0,
        }
    }

    #[must_use]
    pub fn address(asset: &Asset) -> Address {
        Address::derive(&[constants::WHITELIST_SEED, &asset.seed()])
    }

    /// Fail with `CapExceeded` if `amount` is above the cap.
    pub fn check_cap(&self, amount: u64) -> Result<()> {
        if amount > self.cap {
            return Err(CrosslockError::CapExceeded {
                asset: self.asset,
                amount,
                cap: self.cap,
            });
        }
        Ok(())
    }

    /// Fail with `NonZeroExposure` while deposits reference the entry.
    pub fn check_removable(&self) -> Result<()> {
        if self.exposure > 0 {
            return Err(CrosslockError::NonZeroExposure {
                asset: self.asset,
                exposure: self.exposure,
            });
        }
        Ok(())
    }
}

/// A registered destination for fee withdrawals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeReceiver {
    pub receiver: Pubkey,
}

impl FeeReceiver {
    #[must_use]
    pub fn address(receiver: &Pubkey) -> Address {
        Address::derive(&[constants::FEE_RECEIVER_SEED, receiver.as_bytes()])
    }
}

/// How much of the fee pool to withdraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeAmount {
    Exact(u64),
    /// The whole pool balance at evaluation time.
    All,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_is_a_maximum() {
        let entry = WhitelistEntry::new(Asset::Token(Pubkey([1u8; 32])), 1_000);
        assert!(entry.check_cap(1_000).is_ok());
        let err = entry.check_cap(1_001).unwrap_err();
        assert!(matches!(err, CrosslockError::CapExceeded { cap: 1_000, .. }));
    }

    #[test]
    fn removable_only_without_exposure() {
        let mut entry = WhitelistEntry::new(Asset::Native, 10);
        assert!(entry.check_removable().is_ok());
        entry.exposure = 3;
        assert_eq!(
            entry.check_removable().unwrap_err(),
            CrosslockError::NonZeroExposure {
                asset: Asset::Native,
                exposure: 3
            }
        );
    }

    #[test]
    fn addresses_are_per_asset() {
        let a = WhitelistEntry::address(&Asset::Native);
        let b = WhitelistEntry::address(&Asset::Token(Pubkey([1u8; 32])));
        assert_ne!(a, b);
        assert_ne!(a, FeeReceiver::address(&Pubkey([1u8; 32])));
    }
}
