//! Trade ledger: deposit, fee setting, and refund.
//!
//! ```text
//!   deposit ──▶ DEPOSITED ──settle (now < timeout)──▶ SETTLED
//!                   │
//!                   └──claim (now >= timeout)──▶ CLAIMED
//! ```
//!
//! Deposit validation order:
//! 1. from-leg address is the depositor
//! 2. non-zero amount
//! 3. timeout in the future
//! 4. recognised asset
//! 5. whitelist policy and cap
//! 6. trade id unused
//! 7. ephemeral key not backing another record

use serde::{Deserialize, Serialize};
use tracing::info;

use crosslock_store::{Mutation, Precondition, Record, RecordStore, StoreError, Transaction};
use crosslock_types::{
    Asset, AuthorizationRecord, CrosslockError, NativeAssetPolicy, Pubkey, Result, Trade,
    TradeId, TradeInput, TradeStatus, WhitelistEntry, event,
};

use crate::{Clock, Ledger};

/// Everything a user supplies to open a trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub user: Pubkey,
    pub input: TradeInput,
    /// Authority allowed to set the fee and co-sign settlement.
    pub mpc: Pubkey,
    /// Key the user presigns the settlement with.
    pub ephemeral_key: Pubkey,
    /// Receives the funds on claim.
    pub refund: Pubkey,
    /// Unix seconds.
    pub timeout: i64,
}

impl<S: RecordStore, C: Clock> Ledger<S, C> {
    /// Escrow `input.amount` from the user into the trade's vault.
    ///
    /// The trade and its authorization record are created together; the
    /// user pays both storage costs.
    pub fn deposit(&self, request: DepositRequest) -> Result<event::Deposited> {
        let DepositRequest {
            user,
            input,
            mpc,
            ephemeral_key,
            refund,
            timeout,
        } = request;
        let now = self.now();

        if input.from_chain.address != user.to_string() {
            return Err(CrosslockError::unauthorized(format!(
                "from-leg address {} is not the depositor {}",
                input.from_chain.address,
                user.short()
            )));
        }
        if input.amount == 0 {
            return Err(CrosslockError::InvalidAmount {
                reason: "deposit amount is zero".into(),
            });
        }
        if timeout <= now {
            return Err(CrosslockError::InvalidTimeout { timeout, now });
        }
        let asset = input.deposit_asset()?;
        let tracks_exposure = self.check_deposit_policy(&asset, input.amount)?;

        let trade_id = input.trade_id();
        let trade_address = Trade::address(&trade_id);
        if self.store.fetch(&trade_address).is_some() {
            return Err(CrosslockError::DuplicateTrade(trade_id));
        }
        let auth_address = AuthorizationRecord::address(&ephemeral_key);
        if self.store.fetch(&auth_address).is_some() {
            return Err(CrosslockError::AuthorizationInUse(ephemeral_key));
        }

        let trade = Trade {
            trade_id,
            depositor: user,
            mpc,
            ephemeral_key,
            refund,
            asset,
            amount: input.amount,
            total_fee: None,
            timeout,
            status: TradeStatus::Deposited,
            created_at: now,
            tracks_exposure,
        };
        // Any earlier record for this key was created at or before the
        // commit that deleted it, so this epoch is strictly newer.
        let epoch = self.store.last_commit().0;
        let authorization = AuthorizationRecord::new(ephemeral_key, mpc, trade_id, epoch);

        let mut tx = Transaction::new()
            .require(Precondition::Absent(trade_address))
            .require(Precondition::Absent(auth_address))
            .apply(Mutation::Create {
                address: trade_address,
                record: Record::Trade(trade),
                payer: Some(user),
                rent: self.settings.trade_rent,
            })
            .apply(Mutation::Create {
                address: auth_address,
                record: Record::Authorization(authorization),
                payer: Some(user),
                rent: self.settings.authorization_rent,
            })
            .transfer(user, Trade::vault_owner(&trade_id), asset, input.amount);
        if tracks_exposure {
            tx = tx.apply(Mutation::AddExposure {
                asset,
                amount: input.amount,
            });
        }
        let whitelist_address = WhitelistEntry::address(&asset);
        self.commit(tx, |err| match err {
            StoreError::AlreadyExists(a) if *a == trade_address => {
                Some(CrosslockError::DuplicateTrade(trade_id))
            }
            StoreError::AlreadyExists(a) if *a == auth_address => {
                Some(CrosslockError::AuthorizationInUse(ephemeral_key))
            }
            StoreError::Missing(a) if *a == whitelist_address => {
                Some(CrosslockError::NotWhitelisted(asset))
            }
            _ => None,
        })?;

        info!(
            trade_id = %trade_id,
            user = %user.short(),
            asset = %asset,
            amount = input.amount,
            timeout,
            "Trade deposited"
        );
        Ok(event::Deposited {
            trade_id,
            depositor: user,
            asset,
            amount: input.amount,
            timeout,
        })
    }

    /// Whitelist gate for a deposit. Returns whether the deposit counts
    /// toward a whitelist entry's exposure.
    fn check_deposit_policy(&self, asset: &Asset, amount: u64) -> Result<bool> {
        let entry = self.whitelist(asset)?;
        match entry {
            Some(entry) => {
                entry.check_cap(amount)?;
                Ok(true)
            }
            None if asset.is_native()
                && self.settings.native_asset_policy == NativeAssetPolicy::Exempt =>
            {
                Ok(false)
            }
            None => Err(CrosslockError::NotWhitelisted(*asset)),
        }
    }

    /// Set or revise the trade's total fee (the trade's MPC only).
    ///
    /// # Errors
    /// - `Unauthorized` if `mpc` is not the trade's MPC
    /// - `InvalidState` unless the trade is `Deposited`
    /// - `Expired` at or after the timeout
    /// - `InvalidFee` if the fee exceeds the trade amount
    pub fn set_total_fee(&self, mpc: Pubkey, trade_id: TradeId, fee: u64) -> Result<Trade> {
        let loaded = self.load_trade(&trade_id)?;
        let mut trade = loaded.value;
        if trade.mpc != mpc {
            return Err(CrosslockError::unauthorized(format!(
                "{} is not the mpc for {trade_id}",
                mpc.short()
            )));
        }
        trade.require_deposited()?;
        let now = self.now();
        if trade.is_expired(now) {
            return Err(CrosslockError::Expired {
                deadline: trade.timeout,
                now,
            });
        }
        if fee > trade.amount {
            return Err(CrosslockError::InvalidFee {
                fee,
                amount: trade.amount,
            });
        }

        trade.total_fee = Some(fee);
        let address = Trade::address(&trade_id);
        let tx = Transaction::new()
            .require(Precondition::Version(address, loaded.version))
            .apply(Mutation::Update {
                address,
                record: Record::Trade(trade.clone()),
            });
        self.commit(tx, |err| match err {
            StoreError::VersionMismatch { address: a, .. } if *a == address => Some(
                CrosslockError::invalid_state(trade_id, "trade changed concurrently"),
            ),
            _ => None,
        })?;

        info!(trade_id = %trade_id, fee, "Total fee set");
        Ok(trade)
    }

    /// Refund an expired trade to its refund identity. Anyone may call.
    ///
    /// Voids the trade's authorization record in the same commit, so any
    /// settlement payload still in flight is dead.
    ///
    /// # Errors
    /// - `InvalidState` unless the trade is `Deposited` (checked first)
    /// - `NotExpired` before the timeout
    pub fn claim(&self, caller: Pubkey, trade_id: TradeId) -> Result<event::Claimed> {
        let loaded = self.load_trade(&trade_id)?;
        let mut trade = loaded.value;
        trade.require_deposited()?;
        let now = self.now();
        if !trade.is_expired(now) {
            return Err(CrosslockError::NotExpired {
                timeout: trade.timeout,
                now,
            });
        }

        let auth = self.load_authorization(&trade.ephemeral_key)?;
        let mut authorization = auth.value;
        authorization.void().map_err(|_| {
            CrosslockError::invalid_state(trade_id, "authorization already used")
        })?;
        trade.mark_claimed(now)?;

        let trade_address = Trade::address(&trade_id);
        let auth_address = AuthorizationRecord::address(&trade.ephemeral_key);
        let tx = Transaction::new()
            .require(Precondition::Version(trade_address, loaded.version))
            .require(Precondition::Version(auth_address, auth.version))
            .apply(Mutation::Update {
                address: trade_address,
                record: Record::Trade(trade.clone()),
            })
            .apply(Mutation::Update {
                address: auth_address,
                record: Record::Authorization(authorization),
            })
            .transfer(
                Trade::vault_owner(&trade_id),
                trade.refund,
                trade.asset,
                trade.amount,
            );
        let tx = release_exposure(tx, &trade);
        self.commit(tx, |err| match err {
            StoreError::VersionMismatch { address, .. }
                if *address == trade_address || *address == auth_address =>
            {
                Some(CrosslockError::invalid_state(
                    trade_id,
                    "trade left DEPOSITED concurrently",
                ))
            }
            _ => None,
        })?;

        info!(
            trade_id = %trade_id,
            caller = %caller.short(),
            refund = %trade.refund.short(),
            amount = trade.amount,
            "Trade claimed"
        );
        Ok(event::Claimed {
            trade_id,
            refund: trade.refund,
            amount: trade.amount,
            claimed_at: now,
        })
    }
}

/// Release the trade's share of whitelist exposure, if it took one.
pub(crate) fn release_exposure(tx: Transaction, trade: &Trade) -> Transaction {
    if trade.tracks_exposure {
        tx.apply(Mutation::ReleaseExposure {
            asset: trade.asset,
            amount: trade.amount,
        })
    } else {
        tx
    }
}
