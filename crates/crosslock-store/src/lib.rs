//! # crosslock-store
//!
//! The authoritative record store the Crosslock ledger runs against.
//!
//! ## Contract
//!
//! A store holds typed records at derived [`Address`]es and applies
//! [`Transaction`]s atomically: every [`Precondition`] is checked and every
//! [`Mutation`] staged before anything is written. A rejected transaction
//! leaves the store exactly as it was.
//!
//! Every write stamps the record with the [`CommitId`] of the transaction
//! that wrote it. That stamp is the record's version; a
//! [`Precondition::Version`] turns any read-modify-write into a
//! compare-and-set.
//!
//! Balances move by commutative deltas ([`Mutation::Credit`],
//! [`Mutation::Debit`]), so unrelated transactions touching the same fee
//! pool never conflict.
//!
//! ## Storage cost
//!
//! A created record may carry a rent amount in the native asset, debited
//! from its payer at creation. Deleting the record credits that amount back
//! to that payer and nobody else.

pub mod memory;
pub mod record;
pub mod transaction;

pub use memory::MemoryStore;
pub use record::{Record, StoredRecord};
pub use transaction::{CommitId, Mutation, Precondition, StoreError, Transaction};

use std::sync::Arc;

use crosslock_types::{Address, Asset, Pubkey, TokenBalance};

/// Read and atomic-write access to records.
pub trait RecordStore: Send + Sync {
    /// The record at `address`, if any.
    fn fetch(&self, address: &Address) -> Option<StoredRecord>;

    /// Apply `tx` atomically.
    ///
    /// # Errors
    /// Returns the first failed precondition or mutation. Nothing is
    /// written in that case.
    fn submit(&self, tx: Transaction) -> Result<CommitId, StoreError>;

    /// Id of the most recent commit. Strictly increases with every
    /// successful [`submit`](Self::submit).
    fn last_commit(&self) -> CommitId;

    /// Deterministic address for `seeds`.
    fn derive(&self, seeds: &[&[u8]]) -> Address {
        Address::derive(seeds)
    }

    /// Balance of `asset` held by `owner`; zero if no account exists.
    fn balance(&self, owner: &Pubkey, asset: &Asset) -> u64 {
        self.fetch(&TokenBalance::address(owner, asset))
            .and_then(|stored| stored.record.as_balance().map(|b| b.amount))
            .unwrap_or(0)
    }
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn fetch(&self, address: &Address) -> Option<StoredRecord> {
        (**self).fetch(address)
    }

    fn submit(&self, tx: Transaction) -> Result<CommitId, StoreError> {
        (**self).submit(tx)
    }

    fn last_commit(&self) -> CommitId {
        (**self).last_commit()
    }
}
