//! In-memory record store.
//!
//! All commits run under one writer lock. A transaction is evaluated into a
//! staging overlay first; the overlay is written back only if every
//! precondition and mutation succeeded.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crosslock_types::{Address, Asset, Pubkey, TokenBalance, WhitelistEntry};

use crate::{CommitId, Mutation, Precondition, Record, RecordStore, StoreError, StoredRecord, Transaction};

#[derive(Default)]
struct Inner {
    records: HashMap<Address, StoredRecord>,
    last_commit: u64,
}

/// Thread-safe in-memory [`RecordStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` of `asset` to `owner` out of thin air. Used to seed
    /// user wallets in simulations and tests.
    pub fn fund(&self, owner: Pubkey, asset: Asset, amount: u64) -> Result<CommitId, StoreError> {
        self.submit(
            Transaction::new()
                .apply(Mutation::EnsureAccount { owner, asset })
                .apply(Mutation::Credit {
                    owner,
                    asset,
                    amount,
                }),
        )
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Everything of `asset` the store accounts for: all balances plus, for
    /// the native asset, rent held by records. Only [`fund`](Self::fund)
    /// changes it.
    #[must_use]
    pub fn total_supply(&self, asset: &Asset) -> u128 {
        let inner = self.inner.read();
        inner
            .records
            .values()
            .map(|stored| {
                let held = match &stored.record {
                    Record::Balance(balance) if balance.asset == *asset => balance.amount,
                    _ => 0,
                };
                let rent = if asset.is_native() { stored.rent } else { 0 };
                u128::from(held) + u128::from(rent)
            })
            .sum()
    }
}

impl RecordStore for MemoryStore {
    fn fetch(&self, address: &Address) -> Option<StoredRecord> {
        self.inner.read().records.get(address).cloned()
    }

    fn submit(&self, tx: Transaction) -> Result<CommitId, StoreError> {
        let mut inner = self.inner.write();
        let commit = inner.last_commit + 1;

        let mut stage = Stage::new(&inner.records, commit);
        for precondition in &tx.preconditions {
            stage.check(precondition)?;
        }
        let mutations = tx.mutations.len();
        for mutation in tx.mutations {
            stage.apply(mutation)?;
        }
        let writes = stage.overlay;

        let touched = writes.len();
        for (address, write) in writes {
            match write {
                Some(stored) => inner.records.insert(address, stored),
                None => inner.records.remove(&address),
            };
        }
        inner.last_commit = commit;

        debug!(commit, mutations, touched, "Committed transaction");
        Ok(CommitId(commit))
    }

    fn last_commit(&self) -> CommitId {
        CommitId(self.inner.read().last_commit)
    }
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

/// Pending writes over a read-only view of the committed records.
/// `None` in the overlay marks a deletion.
struct Stage<'a> {
    base: &'a HashMap<Address, StoredRecord>,
    overlay: HashMap<Address, Option<StoredRecord>>,
    commit: u64,
}

impl<'a> Stage<'a> {
    fn new(base: &'a HashMap<Address, StoredRecord>, commit: u64) -> Self {
        Self {
            base,
            overlay: HashMap::new(),
            commit,
        }
    }

    fn get(&self, address: &Address) -> Option<&StoredRecord> {
        match self.overlay.get(address) {
            Some(write) => write.as_ref(),
            None => self.base.get(address),
        }
    }

    fn put(&mut self, address: Address, stored: StoredRecord) {
        self.overlay.insert(address, Some(stored));
    }

    /// Write `record` over an existing entry, keeping its payer and rent.
    fn replace(&mut self, address: Address, record: Record) -> Result<(), StoreError> {
        let existing = self.get(&address).ok_or(StoreError::Missing(address))?;
        let stored = StoredRecord {
            record,
            version: self.commit,
            payer: existing.payer,
            rent: existing.rent,
        };
        self.put(address, stored);
        Ok(())
    }

    fn check(&self, precondition: &Precondition) -> Result<(), StoreError> {
        match precondition {
            Precondition::Absent(address) => match self.get(address) {
                Some(_) => Err(StoreError::AlreadyExists(*address)),
                None => Ok(()),
            },
            Precondition::Present(address) => match self.get(address) {
                Some(_) => Ok(()),
                None => Err(StoreError::Missing(*address)),
            },
            Precondition::Version(address, expected) => {
                let actual = self.get(address).map(|stored| stored.version);
                if actual == Some(*expected) {
                    Ok(())
                } else {
                    Err(StoreError::VersionMismatch {
                        address: *address,
                        expected: *expected,
                        actual,
                    })
                }
            }
        }
    }

    fn apply(&mut self, mutation: Mutation) -> Result<(), StoreError> {
        match mutation {
            Mutation::Create {
                address,
                record,
                payer,
                rent,
            } => {
                if self.get(&address).is_some() {
                    return Err(StoreError::AlreadyExists(address));
                }
                let rent = match payer {
                    Some(payer) if rent > 0 => {
                        self.debit(payer, Asset::Native, rent)?;
                        rent
                    }
                    _ => 0,
                };
                let stored = StoredRecord {
                    record,
                    version: self.commit,
                    payer,
                    rent,
                };
                self.put(address, stored);
            }
            Mutation::Update { address, record } => self.replace(address, record)?,
            Mutation::Delete { address } => {
                let existing = self.get(&address).ok_or(StoreError::Missing(address))?;
                let refund = existing.payer.filter(|_| existing.rent > 0).map(|p| (p, existing.rent));
                self.overlay.insert(address, None);
                if let Some((payer, rent)) = refund {
                    self.ensure_account(payer, Asset::Native);
                    self.credit(payer, Asset::Native, rent)?;
                }
            }
            Mutation::EnsureAccount { owner, asset } => self.ensure_account(owner, asset),
            Mutation::Credit {
                owner,
                asset,
                amount,
            } => self.credit(owner, asset, amount)?,
            Mutation::Debit {
                owner,
                asset,
                amount,
            } => self.debit(owner, asset, amount)?,
            Mutation::CloseAccount { owner, asset } => {
                let address = TokenBalance::address(&owner, &asset);
                let balance = self.balance(address)?;
                if !balance.is_zero() {
                    return Err(StoreError::AccountNotEmpty(address));
                }
                self.overlay.insert(address, None);
            }
            Mutation::AddExposure { asset, amount } => {
                let address = WhitelistEntry::address(&asset);
                let mut entry = self.whitelist(address)?;
                if amount > entry.cap {
                    return Err(StoreError::CapExceeded {
                        asset,
                        amount,
                        cap: entry.cap,
                    });
                }
                entry.exposure = entry
                    .exposure
                    .checked_add(amount)
                    .ok_or(StoreError::Overflow(address))?;
                self.replace(address, Record::Whitelist(entry))?;
            }
            Mutation::ReleaseExposure { asset, amount } => {
                let address = WhitelistEntry::address(&asset);
                if self.get(&address).is_some() {
                    let mut entry = self.whitelist(address)?;
                    entry.exposure = entry.exposure.saturating_sub(amount);
                    self.replace(address, Record::Whitelist(entry))?;
                }
            }
        }
        Ok(())
    }

    fn balance(&self, address: Address) -> Result<TokenBalance, StoreError> {
        let stored = self.get(&address).ok_or(StoreError::Missing(address))?;
        stored
            .record
            .as_balance()
            .cloned()
            .ok_or(StoreError::WrongKind {
                address,
                expected: "balance",
            })
    }

    fn whitelist(&self, address: Address) -> Result<WhitelistEntry, StoreError> {
        let stored = self.get(&address).ok_or(StoreError::Missing(address))?;
        stored
            .record
            .as_whitelist()
            .cloned()
            .ok_or(StoreError::WrongKind {
                address,
                expected: "whitelist",
            })
    }

    fn ensure_account(&mut self, owner: Pubkey, asset: Asset) {
        let address = TokenBalance::address(&owner, &asset);
        if self.get(&address).is_none() {
            let stored = StoredRecord {
                record: Record::Balance(TokenBalance::new(owner, asset)),
                version: self.commit,
                payer: None,
                rent: 0,
            };
            self.put(address, stored);
        }
    }

    fn credit(&mut self, owner: Pubkey, asset: Asset, amount: u64) -> Result<(), StoreError> {
        let address = TokenBalance::address(&owner, &asset);
        let mut balance = self.balance(address)?;
        balance
            .credit(amount)
            .map_err(|_| StoreError::Overflow(address))?;
        self.replace(address, Record::Balance(balance))
    }

    fn debit(&mut self, owner: Pubkey, asset: Asset, amount: u64) -> Result<(), StoreError> {
        let address = TokenBalance::address(&owner, &asset);
        let insufficient = |available| StoreError::InsufficientFunds {
            owner,
            asset,
            needed: amount,
            available,
        };
        let Some(stored) = self.get(&address) else {
            return Err(insufficient(0));
        };
        let mut balance = stored
            .record
            .as_balance()
            .cloned()
            .ok_or(StoreError::WrongKind {
                address,
                expected: "balance",
            })?;
        balance
            .debit(amount)
            .map_err(|_| insufficient(balance.amount))?;
        self.replace(address, Record::Balance(balance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosslock_types::{FeeReceiver, WhitelistEntry};

    fn receiver_record(key: Pubkey) -> (Address, Record) {
        (FeeReceiver::address(&key), Record::FeeReceiver(FeeReceiver { receiver: key }))
    }

    #[test]
    fn create_and_fetch() {
        let store = MemoryStore::new();
        let key = Pubkey::random();
        let (address, record) = receiver_record(key);
        let commit = store
            .submit(Transaction::new().apply(Mutation::Create {
                address,
                record: record.clone(),
                payer: None,
                rent: 0,
            }))
            .unwrap();
        let stored = store.fetch(&address).unwrap();
        assert_eq!(stored.record, record);
        assert_eq!(stored.version, commit.0);
        assert_eq!(store.last_commit(), commit);
    }

    #[test]
    fn duplicate_create_rejected() {
        let store = MemoryStore::new();
        let (address, record) = receiver_record(Pubkey::random());
        let create = Transaction::new().apply(Mutation::Create {
            address,
            record,
            payer: None,
            rent: 0,
        });
        store.submit(create.clone()).unwrap();
        assert_eq!(
            store.submit(create).unwrap_err(),
            StoreError::AlreadyExists(address)
        );
    }

    #[test]
    fn failed_transaction_writes_nothing() {
        let store = MemoryStore::new();
        let alice = Pubkey::random();
        let bob = Pubkey::random();
        store.fund(alice, Asset::Native, 100).unwrap();
        let before = store.last_commit();

        // The transfer stages fine, the second debit does not.
        let tx = Transaction::new()
            .transfer(alice, bob, Asset::Native, 60)
            .apply(Mutation::Debit {
                owner: alice,
                asset: Asset::Native,
                amount: 60,
            });
        let err = store.submit(tx).unwrap_err();
        assert!(matches!(err, StoreError::InsufficientFunds { available: 40, .. }));

        assert_eq!(store.balance(&alice, &Asset::Native), 100);
        assert!(store.fetch(&TokenBalance::address(&bob, &Asset::Native)).is_none());
        assert_eq!(store.last_commit(), before);
    }

    #[test]
    fn version_precondition_is_compare_and_set() {
        let store = MemoryStore::new();
        let owner = Pubkey::random();
        let first = store.fund(owner, Asset::Native, 1).unwrap();
        let address = TokenBalance::address(&owner, &Asset::Native);

        store
            .submit(Transaction::new().require(Precondition::Version(address, first.0)).apply(
                Mutation::Credit {
                    owner,
                    asset: Asset::Native,
                    amount: 1,
                },
            ))
            .unwrap();

        let err = store
            .submit(Transaction::new().require(Precondition::Version(address, first.0)))
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionMismatch { expected, .. } if expected == first.0));
    }

    #[test]
    fn presence_preconditions() {
        let store = MemoryStore::new();
        let (address, record) = receiver_record(Pubkey::random());
        assert_eq!(
            store
                .submit(Transaction::new().require(Precondition::Present(address)))
                .unwrap_err(),
            StoreError::Missing(address)
        );
        store
            .submit(Transaction::new().require(Precondition::Absent(address)).apply(
                Mutation::Create {
                    address,
                    record,
                    payer: None,
                    rent: 0,
                },
            ))
            .unwrap();
        assert!(store.submit(Transaction::new().require(Precondition::Present(address))).is_ok());
    }

    #[test]
    fn rent_charged_and_refunded_to_payer() {
        let store = MemoryStore::new();
        let payer = Pubkey::random();
        store.fund(payer, Asset::Native, 1_000).unwrap();
        let (address, record) = receiver_record(Pubkey::random());

        store
            .submit(Transaction::new().apply(Mutation::Create {
                address,
                record,
                payer: Some(payer),
                rent: 300,
            }))
            .unwrap();
        assert_eq!(store.balance(&payer, &Asset::Native), 700);
        assert_eq!(store.fetch(&address).unwrap().rent, 300);
        assert_eq!(store.total_supply(&Asset::Native), 1_000);

        store
            .submit(Transaction::new().apply(Mutation::Delete { address }))
            .unwrap();
        assert_eq!(store.balance(&payer, &Asset::Native), 1_000);
        assert!(store.fetch(&address).is_none());
        assert_eq!(store.total_supply(&Asset::Native), 1_000);
    }

    #[test]
    fn rent_requires_funds() {
        let store = MemoryStore::new();
        let (address, record) = receiver_record(Pubkey::random());
        let err = store
            .submit(Transaction::new().apply(Mutation::Create {
                address,
                record,
                payer: Some(Pubkey::random()),
                rent: 1,
            }))
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientFunds { available: 0, .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn credit_needs_account() {
        let store = MemoryStore::new();
        let owner = Pubkey::random();
        let err = store
            .submit(Transaction::new().apply(Mutation::Credit {
                owner,
                asset: Asset::Native,
                amount: 1,
            }))
            .unwrap_err();
        assert_eq!(err, StoreError::Missing(TokenBalance::address(&owner, &Asset::Native)));
    }

    #[test]
    fn close_account_requires_zero() {
        let store = MemoryStore::new();
        let owner = Pubkey::random();
        store.fund(owner, Asset::Native, 5).unwrap();
        let close = Transaction::new().apply(Mutation::CloseAccount {
            owner,
            asset: Asset::Native,
        });
        assert!(matches!(
            store.submit(close.clone()).unwrap_err(),
            StoreError::AccountNotEmpty(_)
        ));

        let drain_and_close = Transaction::new()
            .apply(Mutation::Debit {
                owner,
                asset: Asset::Native,
                amount: 5,
            })
            .apply(Mutation::CloseAccount {
                owner,
                asset: Asset::Native,
            });
        store.submit(drain_and_close).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn exposure_respects_cap_and_saturates() {
        let store = MemoryStore::new();
        let asset = Asset::Token(Pubkey::random());
        let address = WhitelistEntry::address(&asset);
        store
            .submit(Transaction::new().apply(Mutation::Create {
                address,
                record: Record::Whitelist(WhitelistEntry::new(asset, 100)),
                payer: None,
                rent: 0,
            }))
            .unwrap();

        store
            .submit(Transaction::new().apply(Mutation::AddExposure { asset, amount: 80 }))
            .unwrap();
        assert!(matches!(
            store
                .submit(Transaction::new().apply(Mutation::AddExposure { asset, amount: 101 }))
                .unwrap_err(),
            StoreError::CapExceeded { cap: 100, .. }
        ));
        store
            .submit(Transaction::new().apply(Mutation::ReleaseExposure { asset, amount: 500 }))
            .unwrap();
        let entry = store.fetch(&address).unwrap();
        assert_eq!(entry.record.as_whitelist().unwrap().exposure, 0);

        // Missing entries are skipped on release, rejected on add.
        let other = Asset::Token(Pubkey::random());
        store
            .submit(Transaction::new().apply(Mutation::ReleaseExposure { asset: other, amount: 1 }))
            .unwrap();
        assert!(matches!(
            store
                .submit(Transaction::new().apply(Mutation::AddExposure { asset: other, amount: 1 }))
                .unwrap_err(),
            StoreError::Missing(_)
        ));
    }

    #[test]
    fn commits_are_strictly_increasing() {
        let store = MemoryStore::new();
        let owner = Pubkey::random();
        let a = store.fund(owner, Asset::Native, 1).unwrap();
        let b = store.fund(owner, Asset::Native, 1).unwrap();
        assert!(b > a);
        assert_eq!(store.balance(&owner, &Asset::Native), 2);
    }
}
