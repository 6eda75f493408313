//! # crosslock-types
//!
//! Shared records, identifiers, errors, and signed payloads for the
//! **Crosslock** cross-chain swap escrow.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`Pubkey`], [`Address`], [`Asset`], [`TradeId`]
//! - **Governance**: [`Config`], [`WhitelistEntry`], [`FeeReceiver`], [`FeeAmount`]
//! - **Trade model**: [`TradeInput`], [`ChainLeg`], [`Trade`], [`TradeStatus`]
//! - **Durable authorization**: [`AuthorizationRecord`], [`NonceValue`],
//!   [`SettlementIntent`], [`PresignedSettlement`]
//! - **Payments**: [`PaymentReceipt`]
//! - **Balances**: [`TokenBalance`]
//! - **Settings**: [`ProtocolSettings`], [`NativeAssetPolicy`]
//! - **Errors**: [`CrosslockError`] with `CL_ERR_` prefix codes
//! - **Events**: one per committed operation, in [`event`]
//! - **Constants**: limits, defaults, address seeds

pub mod authorization;
pub mod balance;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod receipt;
pub mod registry;
pub mod trade;

// Re-export primary types at crate root:
//   use crosslock_types::{Trade, TradeStatus, PresignedSettlement, ...};

pub use authorization::*;
pub use balance::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use receipt::*;
pub use registry::*;
pub use trade::*;

// Constants are accessed via `crosslock_types::constants::FOO` and events via
// `crosslock_types::event::Settled` (event names overlap status names).
