//! # Trade: one escrowed cross-chain swap
//!
//! A [`Trade`] is created by a deposit and leaves `Deposited` exactly once.
//!
//! ## State Machine
//!
//! ```text
//!   ┌───────────┐  settle (now < timeout)   ┌─────────┐
//!   │ DEPOSITED ├──────────────────────────▶│ SETTLED │
//!   └─────┬─────┘                           └─────────┘
//!         │ claim (now >= timeout)
//!         ▼
//!   ┌─────────┐
//!   │ CLAIMED │
//!   └─────────┘
//! ```
//!
//! Both terminal states carry the time of the transition; cleanup measures
//! the close-wait duration from it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Address, Asset, CrosslockError, Pubkey, Result, TradeId, constants};

// ---------------------------------------------------------------------------
// Trade input
// ---------------------------------------------------------------------------

/// One side of the swap route: who, on which network, in which token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainLeg {
    pub address: String,
    pub network: String,
    pub token: String,
}

impl ChainLeg {
    pub fn new(
        address: impl Into<String>,
        network: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            network: network.into(),
            token: token.into(),
        }
    }
}

/// Everything the trade id is computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeInput {
    /// Off-chain negotiation session.
    pub session_id: [u8; 32],
    /// Solver identity on the quoting side.
    pub solver: [u8; 20],
    pub amount: u64,
    /// The depositing side of the route. `address` is the depositor and
    /// `token` names the escrowed asset (`"native"` or a mint key).
    pub from_chain: ChainLeg,
    /// The receiving side of the route.
    pub to_chain: ChainLeg,
}

impl TradeInput {
    /// Deterministic trade id.
    ///
    /// Format: `"crosslock:trade_id:v1:" || session_id || solver || amount_be
    /// || from leg || to leg`, where each leg field is length-prefixed.
    #[must_use]
    pub fn trade_id(&self) -> TradeId {
        let mut hasher = Sha256::new();
        hasher.update(b"crosslock:trade_id:v1:");
        hasher.update(self.session_id);
        hasher.update(self.solver);
        hasher.update(self.amount.to_be_bytes());
        for leg in [&self.from_chain, &self.to_chain] {
            for field in [&leg.address, &leg.network, &leg.token] {
                hasher.update((field.len() as u64).to_be_bytes());
                hasher.update(field.as_bytes());
            }
        }
        TradeId(hasher.finalize().into())
    }

    /// The asset named by the from leg.
    ///
    /// # Errors
    /// Returns [`CrosslockError::InvalidAsset`] if the token is neither
    /// `"native"` nor a hex mint key.
    pub fn deposit_asset(&self) -> Result<Asset> {
        self.from_chain
            .token
            .parse()
            .map_err(|_| CrosslockError::InvalidAsset {
                reason: format!("unrecognised from-leg token {:?}", self.from_chain.token),
            })
    }
}

// ---------------------------------------------------------------------------
// Trade status
// ---------------------------------------------------------------------------

/// Lifecycle state of a trade. Terminal states are structurally exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TradeStatus {
    Deposited,
    Settled { solver: Pubkey, settled_at: i64 },
    Claimed { claimed_at: i64 },
}

impl TradeStatus {
    /// Can this status transition to the given target?
    #[must_use]
    pub fn can_transition_to(&self, target: &Self) -> bool {
        matches!(
            (self, target),
            (Self::Deposited, Self::Settled { .. } | Self::Claimed { .. })
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Deposited)
    }

    /// When the trade left `Deposited`, if it has.
    #[must_use]
    pub fn terminal_time(&self) -> Option<i64> {
        match self {
            Self::Deposited => None,
            Self::Settled { settled_at, .. } => Some(*settled_at),
            Self::Claimed { claimed_at } => Some(*claimed_at),
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deposited => write!(f, "DEPOSITED"),
            Self::Settled { .. } => write!(f, "SETTLED"),
            Self::Claimed { .. } => write!(f, "CLAIMED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Trade record
// ---------------------------------------------------------------------------

/// The stored record of one escrowed swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    /// Who funded the vault. Receives swept residuals and paid the rent.
    pub depositor: Pubkey,
    /// The only identity allowed to set the fee and co-sign settlement.
    pub mpc: Pubkey,
    /// Key the depositor presigns the settlement with.
    pub ephemeral_key: Pubkey,
    /// Receives the full amount on claim.
    pub refund: Pubkey,
    pub asset: Asset,
    pub amount: u64,
    /// Set by the MPC before settlement.
    pub total_fee: Option<u64>,
    /// Unix seconds. Settlement is allowed strictly before, claim at or after.
    pub timeout: i64,
    pub status: TradeStatus,
    pub created_at: i64,
    /// Whether the amount counts toward the asset's whitelist exposure.
    pub tracks_exposure: bool,
}

impl Trade {
    #[must_use]
    pub fn address(trade_id: &TradeId) -> Address {
        Address::derive(&[constants::TRADE_SEED, trade_id.as_bytes()])
    }

    /// Owner of the vault balance holding this trade's funds.
    #[must_use]
    pub fn vault_owner(trade_id: &TradeId) -> Pubkey {
        Address::derive(&[constants::VAULT_SEED, trade_id.as_bytes()]).as_owner()
    }

    /// `now == timeout` already counts as expired.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.timeout
    }

    #[must_use]
    pub fn timeout_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timeout, 0)
    }

    /// Fail with `InvalidState` unless the trade is still `Deposited`.
    pub fn require_deposited(&self) -> Result<()> {
        if self.status == TradeStatus::Deposited {
            Ok(())
        } else {
            Err(CrosslockError::invalid_state(
                self.trade_id,
                format!("trade is {}, expected DEPOSITED", self.status),
            ))
        }
    }

    /// Transition to `Settled`.
    ///
    /// # Errors
    /// Returns `InvalidState` if the trade already left `Deposited`.
    pub fn mark_settled(&mut self, solver: Pubkey, now: i64) -> Result<()> {
        self.transition(TradeStatus::Settled {
            solver,
            settled_at: now,
        })
    }

    /// Transition to `Claimed`.
    ///
    /// # Errors
    /// Returns `InvalidState` if the trade already left `Deposited`.
    pub fn mark_claimed(&mut self, now: i64) -> Result<()> {
        self.transition(TradeStatus::Claimed { claimed_at: now })
    }

    fn transition(&mut self, target: TradeStatus) -> Result<()> {
        if !self.status.can_transition_to(&target) {
            return Err(CrosslockError::invalid_state(
                self.trade_id,
                format!("cannot transition from {} to {target}", self.status),
            ));
        }
        self.status = target;
        Ok(())
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trade[{}] {} {} by {} until {}",
            self.trade_id,
            self.amount,
            self.asset,
            self.depositor.short(),
            self.timeout,
        )
    }
}

/// Dummy inputs for tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl TradeInput {
    /// A native-asset route deposited by `user` with a random session id.
    pub fn dummy(user: &Pubkey, amount: u64) -> Self {
        Self {
            session_id: rand::random::<[u8; 32]>(),
            solver: [0x5a; 20],
            amount,
            from_chain: ChainLeg::new(user.to_string(), "solana", Asset::NATIVE_LABEL),
            to_chain: ChainLeg::new("0x00000000000000000000000000000000000000ff", "ethereum", "ETH"),
        }
    }
}
