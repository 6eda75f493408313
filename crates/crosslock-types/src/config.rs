//! Governance record and deployment settings.
//!
//! [`Config`] is the single on-store governance record (admin, operators,
//! close-wait durations). [`ProtocolSettings`] is the off-store deployment
//! configuration a ledger is constructed with: default durations, storage
//! costs, and the native-asset whitelist policy.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Address, CrosslockError, Pubkey, Result, constants};

/// The protocol's governance record. One instance per store, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Manages operators and fee receivers.
    pub admin: Pubkey,
    /// Manage whitelist entries and close-wait durations.
    pub operators: Vec<Pubkey>,
    /// Seconds a terminal trade must age before it can be closed.
    pub close_trade_duration: u64,
    /// Seconds a payment receipt must age before it can be closed.
    pub close_payment_duration: u64,
}

impl Config {
    #[must_use]
    pub fn address() -> Address {
        Address::derive(&[constants::CONFIG_SEED])
    }

    #[must_use]
    pub fn is_admin(&self, who: &Pubkey) -> bool {
        self.admin == *who
    }

    #[must_use]
    pub fn is_operator(&self, who: &Pubkey) -> bool {
        self.operators.contains(who)
    }

    /// Fail with `Unauthorized` unless `who` is the admin.
    pub fn require_admin(&self, who: &Pubkey) -> Result<()> {
        if self.is_admin(who) {
            Ok(())
        } else {
            Err(CrosslockError::unauthorized(format!("{} is not the admin", who.short())))
        }
    }

    /// Fail with `Unauthorized` unless `who` is an operator.
    pub fn require_operator(&self, who: &Pubkey) -> Result<()> {
        if self.is_operator(who) {
            Ok(())
        } else {
            Err(CrosslockError::unauthorized(format!("{} is not an operator", who.short())))
        }
    }

    /// Add an operator.
    ///
    /// # Errors
    /// - `OperatorAlreadyExists` if present
    /// - `OperatorLimitReached` at [`constants::MAX_OPERATORS`]
    pub fn add_operator(&mut self, operator: Pubkey) -> Result<()> {
        if self.operators.contains(&operator) {
            return Err(CrosslockError::OperatorAlreadyExists(operator));
        }
        if self.operators.len() >= constants::MAX_OPERATORS {
            return Err(CrosslockError::OperatorLimitReached {
                limit: constants::MAX_OPERATORS,
            });
        }
        self.operators.push(operator);
        Ok(())
    }

    /// Remove an operator. Fails with `OperatorNotFound` if absent.
    pub fn remove_operator(&mut self, operator: Pubkey) -> Result<()> {
        if !self.operators.contains(&operator) {
            return Err(CrosslockError::OperatorNotFound(operator));
        }
        self.operators.retain(|op| *op != operator);
        Ok(())
    }

    /// Update either duration; `None` keeps the current value.
    pub fn set_close_wait_duration(
        &mut self,
        trade: Option<u64>,
        payment: Option<u64>,
    ) -> Result<()> {
        for duration in trade.iter().chain(payment.iter()) {
            check_close_wait(*duration)?;
        }
        if let Some(duration) = trade {
            self.close_trade_duration = duration;
        }
        if let Some(duration) = payment {
            self.close_payment_duration = duration;
        }
        Ok(())
    }
}

fn check_close_wait(duration: u64) -> Result<()> {
    if duration > constants::MAX_CLOSE_WAIT_SECS {
        return Err(CrosslockError::Configuration(format!(
            "close wait {duration}s exceeds maximum {}s",
            constants::MAX_CLOSE_WAIT_SECS
        )));
    }
    Ok(())
}

/// How deposits of the chain's native asset interact with the whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeAssetPolicy {
    /// Native deposits need no whitelist entry and have no cap. If an entry
    /// for the native asset exists anyway, its cap is still enforced.
    #[default]
    Exempt,
    /// Native deposits need a whitelist entry like any token.
    Whitelisted,
}

/// Deployment settings a ledger is constructed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    /// Close-trade wait written into Config at `initialize`.
    pub default_close_trade_duration: u64,
    /// Close-payment wait written into Config at `initialize`.
    pub default_close_payment_duration: u64,
    /// Storage cost of a trade record, paid by the depositor.
    pub trade_rent: u64,
    /// Storage cost of an authorization record, paid by the depositor.
    pub authorization_rent: u64,
    /// Storage cost of a payment receipt, paid by the payer.
    pub payment_receipt_rent: u64,
    /// Storage cost of whitelist and fee-receiver records.
    pub registry_rent: u64,
    pub native_asset_policy: NativeAssetPolicy,
    /// If set, only this key may call `initialize`.
    pub upgrade_authority: Option<Pubkey>,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            default_close_trade_duration: constants::DEFAULT_CLOSE_TRADE_DURATION_SECS,
            default_close_payment_duration: constants::DEFAULT_CLOSE_PAYMENT_DURATION_SECS,
            trade_rent: constants::DEFAULT_TRADE_RENT,
            authorization_rent: constants::DEFAULT_AUTHORIZATION_RENT,
            payment_receipt_rent: constants::DEFAULT_PAYMENT_RECEIPT_RENT,
            registry_rent: constants::DEFAULT_REGISTRY_RENT,
            native_asset_policy: NativeAssetPolicy::default(),
            upgrade_authority: None,
        }
    }
}

impl ProtocolSettings {
    /// Settings with every storage cost set to zero. Handy for simulations
    /// that only care about trade balances.
    #[must_use]
    pub fn rent_free() -> Self {
        Self {
            trade_rent: 0,
            authorization_rent: 0,
            payment_receipt_rent: 0,
            registry_rent: 0,
            ..Self::default()
        }
    }

    /// Parse settings from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| CrosslockError::Configuration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CrosslockError::Configuration(format!("reading {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<()> {
        check_close_wait(self.default_close_trade_duration)?;
        check_close_wait(self.default_close_payment_duration)
    }
}
