//! Closing terminal trades.
//!
//! ```text
//!   SETTLED / CLAIMED ──(terminal_time + close_trade_duration)──▶ closed
//! ```
//!
//! Closing deletes the trade and its authorization record, sweeps whatever
//! is left in the vault to the depositor, closes the vault account and
//! refunds both rents to whoever paid them.

use tracing::info;

use crosslock_store::{Mutation, Precondition, RecordStore, StoreError, Transaction};
use crosslock_types::{
    AuthorizationRecord, CrosslockError, Result, TokenBalance, Trade, TradeId, event,
};

use crate::{Clock, Ledger, add_secs};

impl<S: RecordStore, C: Clock> Ledger<S, C> {
    /// Remove a finished trade. Anyone may call this.
    ///
    /// # Errors
    /// - `TradeNotFound` if the trade does not exist (or was already closed)
    /// - `InvalidState` while the trade is still `Deposited`
    /// - `CloseNotAvailable` before the close wait has elapsed
    pub fn close_finished_trade(&self, trade_id: TradeId) -> Result<event::TradeClosed> {
        let config = self.load_config()?.value;
        let loaded = self.load_trade(&trade_id)?;
        let trade = loaded.value;
        let Some(finished_at) = trade.status.terminal_time() else {
            return Err(CrosslockError::invalid_state(
                trade_id,
                format!("trade is {}, not finished", trade.status),
            ));
        };
        let now = self.now();
        let available_at = add_secs(finished_at, config.close_trade_duration);
        if now < available_at {
            return Err(CrosslockError::CloseNotAvailable { available_at, now });
        }

        let auth = self.load_authorization(&trade.ephemeral_key)?;
        let trade_address = Trade::address(&trade_id);
        let auth_address = AuthorizationRecord::address(&trade.ephemeral_key);
        let vault = Trade::vault_owner(&trade_id);
        let swept = self.store.balance(&vault, &trade.asset);

        let mut tx = Transaction::new()
            .require(Precondition::Version(trade_address, loaded.version))
            .require(Precondition::Version(auth_address, auth.version))
            .apply(Mutation::Delete {
                address: trade_address,
            })
            .apply(Mutation::Delete {
                address: auth_address,
            })
            .transfer(vault, trade.depositor, trade.asset, swept);
        if self
            .store
            .fetch(&TokenBalance::address(&vault, &trade.asset))
            .is_some()
        {
            tx = tx.apply(Mutation::CloseAccount {
                owner: vault,
                asset: trade.asset,
            });
        }
        self.commit(tx, |err| match err {
            StoreError::VersionMismatch {
                address,
                actual: None,
                ..
            } if *address == trade_address => Some(CrosslockError::TradeNotFound(trade_id)),
            _ => None,
        })?;

        let rent_refunded = loaded.rent.saturating_add(auth.rent);
        info!(
            trade_id = %trade_id,
            status = %trade.status,
            swept,
            rent_refunded,
            "Trade closed"
        );
        Ok(event::TradeClosed {
            trade_id,
            swept,
            rent_refunded,
        })
    }
}
