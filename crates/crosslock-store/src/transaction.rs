//! Transactions: preconditions plus mutations, applied all-or-nothing.

use std::fmt;

use thiserror::Error;

use crosslock_types::{Address, Asset, Pubkey};

use crate::Record;

/// Sequence number of a committed transaction. Strictly increasing per store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(pub u64);

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "commit#{}", self.0)
    }
}

/// A condition on the store state at commit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// No record exists at the address.
    Absent(Address),
    /// A record exists at the address.
    Present(Address),
    /// The record exists and was last written by this commit.
    Version(Address, u64),
}

/// One change applied by a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Create a record. Fails if the address is taken. A non-zero `rent` is
    /// debited from `payer`'s native balance.
    Create {
        address: Address,
        record: Record,
        payer: Option<Pubkey>,
        rent: u64,
    },
    /// Replace an existing record, keeping its payer and rent.
    Update { address: Address, record: Record },
    /// Delete a record and refund its rent to its payer.
    Delete { address: Address },
    /// Create an empty balance for `(owner, asset)` if none exists.
    EnsureAccount { owner: Pubkey, asset: Asset },
    /// Add to an existing balance.
    Credit {
        owner: Pubkey,
        asset: Asset,
        amount: u64,
    },
    /// Subtract from a balance. Never goes below zero.
    Debit {
        owner: Pubkey,
        asset: Asset,
        amount: u64,
    },
    /// Delete an empty balance.
    CloseAccount { owner: Pubkey, asset: Asset },
    /// Add to a whitelist entry's exposure. Fails if the entry is gone or
    /// `amount` is above the entry's cap at commit time.
    AddExposure { asset: Asset, amount: u64 },
    /// Subtract from a whitelist entry's exposure, saturating at zero. A
    /// missing entry is skipped.
    ReleaseExposure { asset: Asset, amount: u64 },
}

/// An atomic unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    pub preconditions: Vec<Precondition>,
    pub mutations: Vec<Mutation>,
}

impl Transaction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn require(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    #[must_use]
    pub fn apply(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    /// Pay `amount` from `from` to `to`, bootstrapping `to`'s account.
    /// A zero amount adds nothing.
    #[must_use]
    pub fn transfer(self, from: Pubkey, to: Pubkey, asset: Asset, amount: u64) -> Self {
        if amount == 0 {
            return self;
        }
        self.apply(Mutation::Debit {
            owner: from,
            asset,
            amount,
        })
        .apply(Mutation::EnsureAccount { owner: to, asset })
        .apply(Mutation::Credit {
            owner: to,
            asset,
            amount,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.preconditions.is_empty() && self.mutations.is_empty()
    }
}

/// Why a transaction was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record already exists at {0}")]
    AlreadyExists(Address),

    #[error("no record at {0}")]
    Missing(Address),

    #[error("version conflict at {address}: expected {expected}, found {actual:?}")]
    VersionMismatch {
        address: Address,
        expected: u64,
        actual: Option<u64>,
    },

    #[error("record at {address} is not a {expected}")]
    WrongKind {
        address: Address,
        expected: &'static str,
    },

    #[error("insufficient {asset} for {owner}: need {needed}, have {available}")]
    InsufficientFunds {
        owner: Pubkey,
        asset: Asset,
        needed: u64,
        available: u64,
    },

    #[error("balance overflow at {0}")]
    Overflow(Address),

    #[error("account {0} is not empty")]
    AccountNotEmpty(Address),

    #[error("amount {amount} above cap {cap} for {asset}")]
    CapExceeded { asset: Asset, amount: u64, cap: u64 },
}

impl StoreError {
    /// The address whose state caused the rejection, when there is one.
    #[must_use]
    pub fn address(&self) -> Option<Address> {
        match self {
            Self::AlreadyExists(address)
            | Self::Missing(address)
            | Self::Overflow(address)
            | Self::AccountNotEmpty(address)
            | Self::VersionMismatch { address, .. }
            | Self::WrongKind { address, .. } => Some(*address),
            Self::InsufficientFunds { .. } | Self::CapExceeded { .. } => None,
        }
    }
}
