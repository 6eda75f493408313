//! # crosslock-ledger
//!
//! The Crosslock protocol: a user escrows funds under a time-bounded trade;
//! the trade's MPC authority either executes the user's presigned settlement
//! to a solver before the timeout, or anyone refunds the user after it.
//!
//! ## Architecture
//!
//! ```text
//!   Registry ──(roles, whitelist)──▶ Trade ledger ──▶ Durable authorization
//!       │                                │
//!       └──(fee receivers)──▶ Fee pool ◀─┴── Payment ledger
//!                                        │
//!                                   Cleanup (terminal + aged records)
//! ```
//!
//! Every operation reads a snapshot from the [`RecordStore`], validates
//! completely, then submits one [`Transaction`] carrying version
//! preconditions on every record it rewrites. A failed call is a no-op.
//! Two operations racing on one trade cannot both commit: the loser's
//! precondition is stale and it reports `InvalidState`.
//!
//! ## Modules
//!
//! - [`registry`]: initialize, operators, whitelist, fee receivers, fee withdrawal
//! - [`trades`]: deposit, set_total_fee, claim
//! - [`settlement`]: prepare_settlement, settle
//! - [`payments`]: create_payment, close_payment_receipt
//! - [`cleanup`]: close_finished_trade
//! - [`clock`]: wall and manual clocks

pub mod cleanup;
pub mod clock;
pub mod payments;
pub mod registry;
pub mod settlement;
pub mod trades;

pub use clock::{Clock, ManualClock, SystemClock};
pub use payments::PaymentRequest;
pub use trades::DepositRequest;

use tracing::debug;

use crosslock_store::{Record, RecordStore, StoreError, Transaction};
use crosslock_types::{
    Address, Asset, AuthorizationRecord, Config, CrosslockError, FeeReceiver, PaymentReceipt,
    ProtocolSettings, Pubkey, Result, TokenBalance, Trade, TradeId, WhitelistEntry,
};

/// The protocol engine over a record store `S` and a clock `C`.
///
/// The ledger holds no state of its own, so several ledgers may share one
/// store (for example `Arc<MemoryStore>`).
pub struct Ledger<S, C = SystemClock> {
    store: S,
    clock: C,
    settings: ProtocolSettings,
}

/// A record together with the version it was read at.
pub(crate) struct Versioned<T> {
    pub value: T,
    pub version: u64,
    pub rent: u64,
}

impl<S: RecordStore, C: Clock> Ledger<S, C> {
    /// Build a ledger.
    ///
    /// # Errors
    /// Returns `Configuration` if `settings` fail validation.
    pub fn new(store: S, clock: C, settings: ProtocolSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            store,
            clock,
            settings,
        })
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    #[must_use]
    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.now()
    }

    // -----------------------------------------------------------------------
    // Read accessors
    // -----------------------------------------------------------------------

    /// The governance record. Fails with `NotInitialized` before `initialize`.
    pub fn config(&self) -> Result<Config> {
        self.load_config().map(|c| c.value)
    }

    pub fn trade(&self, trade_id: &TradeId) -> Result<Trade> {
        self.load_trade(trade_id).map(|t| t.value)
    }

    /// The authorization record backed by `ephemeral_key`.
    pub fn authorization(&self, ephemeral_key: &Pubkey) -> Result<AuthorizationRecord> {
        self.load_authorization(ephemeral_key).map(|a| a.value)
    }

    pub fn whitelist(&self, asset: &Asset) -> Result<Option<WhitelistEntry>> {
        Ok(self
            .load(&WhitelistEntry::address(asset), "whitelist", Record::as_whitelist)?
            .map(|e| e.value))
    }

    #[must_use]
    pub fn is_fee_receiver(&self, receiver: &Pubkey) -> bool {
        self.store.fetch(&FeeReceiver::address(receiver)).is_some()
    }

    pub fn payment_receipt(
        &self,
        trade_id: &TradeId,
        from: &Pubkey,
        asset: &Asset,
    ) -> Result<PaymentReceipt> {
        self.load_payment_receipt(trade_id, from, asset)
            .map(|r| r.value)
    }

    #[must_use]
    pub fn balance(&self, owner: &Pubkey, asset: &Asset) -> u64 {
        self.store.balance(owner, asset)
    }

    #[must_use]
    pub fn fee_pool_balance(&self, asset: &Asset) -> u64 {
        self.store.balance(&TokenBalance::fee_pool_owner(), asset)
    }

    #[must_use]
    pub fn vault_balance(&self, trade_id: &TradeId, asset: &Asset) -> u64 {
        self.store.balance(&Trade::vault_owner(trade_id), asset)
    }

    // -----------------------------------------------------------------------
    // Typed loads
    // -----------------------------------------------------------------------

    pub(crate) fn load<T: Clone>(
        &self,
        address: &Address,
        kind: &'static str,
        extract: fn(&Record) -> Option<&T>,
    ) -> Result<Option<Versioned<T>>> {
        let Some(stored) = self.store.fetch(address) else {
            return Ok(None);
        };
        let value = extract(&stored.record).cloned().ok_or_else(|| {
            CrosslockError::Internal(format!(
                "{address} holds a {}, expected {kind}",
                stored.record.kind()
            ))
        })?;
        Ok(Some(Versioned {
            value,
            version: stored.version,
            rent: stored.rent,
        }))
    }

    pub(crate) fn load_config(&self) -> Result<Versioned<Config>> {
        self.load(&Config::address(), "config", Record::as_config)?
            .ok_or(CrosslockError::NotInitialized)
    }

    pub(crate) fn load_trade(&self, trade_id: &TradeId) -> Result<Versioned<Trade>> {
        self.load(&Trade::address(trade_id), "trade", Record::as_trade)?
            .ok_or(CrosslockError::TradeNotFound(*trade_id))
    }

    pub(crate) fn load_authorization(
        &self,
        ephemeral_key: &Pubkey,
    ) -> Result<Versioned<AuthorizationRecord>> {
        self.load(
            &AuthorizationRecord::address(ephemeral_key),
            "authorization",
            Record::as_authorization,
        )?
        .ok_or(CrosslockError::AuthorizationNotFound(*ephemeral_key))
    }

    pub(crate) fn load_payment_receipt(
        &self,
        trade_id: &TradeId,
        from: &Pubkey,
        asset: &Asset,
    ) -> Result<Versioned<PaymentReceipt>> {
        self.load(
            &PaymentReceipt::address(trade_id, from, asset),
            "payment_receipt",
            Record::as_payment_receipt,
        )?
        .ok_or(CrosslockError::PaymentNotFound(*trade_id))
    }

    /// Submit `tx`, translating store rejections into protocol errors.
    /// `on_conflict` names the domain error for conflicts the caller can
    /// attribute; anything else maps generically.
    pub(crate) fn commit(
        &self,
        tx: Transaction,
        on_conflict: impl FnOnce(&StoreError) -> Option<CrosslockError>,
    ) -> Result<u64> {
        self.store
            .submit(tx)
            .map(|commit| commit.0)
            .map_err(|err| map_store_error(err, on_conflict))
    }
}

fn map_store_error(
    err: StoreError,
    on_conflict: impl FnOnce(&StoreError) -> Option<CrosslockError>,
) -> CrosslockError {
    debug!(error = %err, "Store rejected transaction");
    if let Some(mapped) = on_conflict(&err) {
        return mapped;
    }
    match err {
        StoreError::InsufficientFunds {
            owner,
            asset,
            needed,
            available,
        } => CrosslockError::InsufficientFunds {
            owner,
            asset,
            needed,
            available,
        },
        StoreError::Overflow(_) => CrosslockError::BalanceOverflow,
        StoreError::CapExceeded { asset, amount, cap } => {
            CrosslockError::CapExceeded { asset, amount, cap }
        }
        StoreError::AlreadyExists(address)
        | StoreError::Missing(address)
        | StoreError::AccountNotEmpty(address)
        | StoreError::VersionMismatch { address, .. } => CrosslockError::StaleRecord(address),
        StoreError::WrongKind { .. } => CrosslockError::Store(err.to_string()),
    }
}

/// `base + secs`, saturating.
pub(crate) fn add_secs(base: i64, secs: u64) -> i64 {
    base.saturating_add(i64::try_from(secs).unwrap_or(i64::MAX))
}
