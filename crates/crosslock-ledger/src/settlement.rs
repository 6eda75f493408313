//! Presigned settlement.
//!
//! 1. [`prepare_settlement`](Ledger::prepare_settlement) builds the intent
//!    against the authorization record's current nonce.
//! 2. The depositor signs it offline with the ephemeral key and hands the
//!    hex form to the MPC.
//! 3. The MPC co-signs and calls [`settle`](Ledger::settle).
//!
//! Settle checks, in order: MPC co-signature, trade status, expiry, fee
//! set, then the authorization (binding, liveness, nonce, user signature,
//! parameters). Nothing moves unless all of them pass.

use tracing::{info, warn};

use crosslock_store::{Mutation, Precondition, Record, RecordStore, StoreError, Transaction};
use crosslock_types::{
    AuthorizationRecord, AuthorizationState, CrosslockError, PresignedSettlement, Pubkey, Result,
    SettlementIntent, TokenBalance, Trade, TradeId, event,
};

use crate::trades::release_exposure;
use crate::{Clock, Ledger};

impl<S: RecordStore, C: Clock> Ledger<S, C> {
    /// Build the intent the depositor should sign to pay `solver`.
    ///
    /// # Errors
    /// - `InvalidState` unless the trade is `Deposited`
    /// - `FeeNotSet` before the MPC set the fee
    /// - `AuthorizationConsumed` if the record is no longer active
    pub fn prepare_settlement(&self, trade_id: TradeId, solver: Pubkey) -> Result<SettlementIntent> {
        let trade = self.load_trade(&trade_id)?.value;
        trade.require_deposited()?;
        let total_fee = trade.total_fee.ok_or(CrosslockError::FeeNotSet(trade_id))?;
        let authorization = self.load_authorization(&trade.ephemeral_key)?.value;
        if authorization.state != AuthorizationState::Active {
            return Err(CrosslockError::AuthorizationConsumed {
                reason: format!("record is {}", authorization.state),
            });
        }
        Ok(SettlementIntent {
            trade_id,
            nonce: authorization.nonce,
            solver,
            amount: trade.amount,
            total_fee,
            mpc: trade.mpc,
        })
    }

    /// Execute a co-signed settlement: pay the solver `amount - fee`, the
    /// fee pool `fee`, consume the authorization and mark the trade
    /// `Settled`.
    ///
    /// # Errors
    /// - `Unauthorized` without a valid co-signature by the trade's MPC
    /// - `InvalidState` unless the trade is `Deposited`
    /// - `Expired` at or after the timeout
    /// - `FeeNotSet` before the fee was set
    /// - `AuthorizationConsumed` if the record was used, voided, or its
    ///   nonce moved on
    /// - `AuthorizationMismatch` if the signature or parameters do not
    ///   match the trade
    pub fn settle(&self, presigned: &PresignedSettlement) -> Result<event::Settled> {
        let trade_id = presigned.intent.trade_id;
        let result = self.try_settle(presigned);
        if let Err(err) = &result {
            warn!(trade_id = %trade_id, error = %err, "Settlement rejected");
        }
        result
    }

    fn try_settle(&self, presigned: &PresignedSettlement) -> Result<event::Settled> {
        let intent = &presigned.intent;
        let trade_id = intent.trade_id;
        let loaded = self.load_trade(&trade_id)?;
        let mut trade = loaded.value;

        if intent.mpc != trade.mpc {
            return Err(CrosslockError::unauthorized(format!(
                "payload names mpc {}, trade expects {}",
                intent.mpc.short(),
                trade.mpc.short()
            )));
        }
        presigned.verify_cosign()?;

        trade.require_deposited()?;
        let now = self.now();
        if trade.is_expired(now) {
            return Err(CrosslockError::Expired {
                deadline: trade.timeout,
                now,
            });
        }
        let fee = trade.total_fee.ok_or(CrosslockError::FeeNotSet(trade_id))?;

        let auth = self.load_authorization(&trade.ephemeral_key)?;
        let mut authorization = auth.value;
        // The record only leaves Active together with the trade, so a
        // non-active record means a racing claim or settle already won.
        if authorization.state != AuthorizationState::Active {
            return Err(CrosslockError::invalid_state(
                trade_id,
                format!("authorization is {}", authorization.state),
            ));
        }
        authorization.check_intent(intent)?;
        presigned.verify_user(&authorization.ephemeral_key)?;
        check_parameters(&trade, fee, intent)?;

        authorization.consume()?;
        trade.mark_settled(intent.solver, now)?;
        let solver_amount = trade.amount.saturating_sub(fee);

        let trade_address = Trade::address(&trade_id);
        let auth_address = AuthorizationRecord::address(&trade.ephemeral_key);
        let vault = Trade::vault_owner(&trade_id);
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
            .transfer(vault, intent.solver, trade.asset, solver_amount)
            .transfer(vault, TokenBalance::fee_pool_owner(), trade.asset, fee);
        let tx = release_exposure(tx, &trade);
        self.commit(tx, |err| match err {
            StoreError::VersionMismatch { address, .. } if *address == trade_address => Some(
                CrosslockError::invalid_state(trade_id, "trade left DEPOSITED concurrently"),
            ),
            StoreError::VersionMismatch { address, .. } if *address == auth_address => {
                Some(CrosslockError::AuthorizationConsumed {
                    reason: "record changed concurrently".into(),
                })
            }
            _ => None,
        })?;

        info!(
            trade_id = %trade_id,
            solver = %intent.solver.short(),
            solver_amount,
            fee,
            "Trade settled"
        );
        Ok(event::Settled {
            trade_id,
            solver: intent.solver,
            solver_amount,
            fee,
            settled_at: now,
        })
    }
}

/// The signed parameters must be the trade's own.
fn check_parameters(trade: &Trade, fee: u64, intent: &SettlementIntent) -> Result<()> {
    if intent.amount != trade.amount {
        return Err(CrosslockError::AuthorizationMismatch {
            reason: format!("payload amount {} != trade amount {}", intent.amount, trade.amount),
        });
    }
    if intent.total_fee != fee {
        return Err(CrosslockError::AuthorizationMismatch {
            reason: format!("payload fee {} != trade fee {fee}", intent.total_fee),
        });
    }
    Ok(())
}
