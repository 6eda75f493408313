//! Governance: roles, deposit whitelist, fee receivers, fee withdrawal.
//!
//! Role checks run first on every call and fail `Unauthorized`. Each
//! governance transaction carries a version precondition on the Config
//! record, so a role revoked between read and commit cannot slip through.

use tracing::info;

use crosslock_store::{Mutation, Precondition, Record, RecordStore, StoreError, Transaction};
use crosslock_types::{
    Asset, Config, CrosslockError, FeeAmount, FeeReceiver, Pubkey, Result, TokenBalance,
    WhitelistEntry, event,
};

use crate::{Clock, Ledger};

impl<S: RecordStore, C: Clock> Ledger<S, C> {
    /// Create the Config record with `admin` and the configured default
    /// close-wait durations.
    ///
    /// # Errors
    /// - `Unauthorized` if an upgrade authority is configured and `caller`
    ///   is not it
    /// - `AlreadyInitialized` if a Config exists
    pub fn initialize(&self, caller: Pubkey, admin: Pubkey) -> Result<Config> {
        if let Some(authority) = self.settings.upgrade_authority {
            if caller != authority {
                return Err(CrosslockError::unauthorized(format!(
                    "{} is not the upgrade authority",
                    caller.short()
                )));
            }
        }
        let address = Config::address();
        if self.store.fetch(&address).is_some() {
            return Err(CrosslockError::AlreadyInitialized);
        }

        let config = Config {
            admin,
            operators: Vec::new(),
            close_trade_duration: self.settings.default_close_trade_duration,
            close_payment_duration: self.settings.default_close_payment_duration,
        };
        let tx = Transaction::new()
            .require(Precondition::Absent(address))
            .apply(Mutation::Create {
                address,
                record: Record::Config(config.clone()),
                payer: None,
                rent: 0,
            });
        self.commit(tx, |err| match err {
            StoreError::AlreadyExists(_) => Some(CrosslockError::AlreadyInitialized),
            _ => None,
        })?;

        info!(admin = %admin.short(), "Protocol initialized");
        Ok(config)
    }

    /// Add an operator (admin only).
    pub fn add_operator(&self, admin: Pubkey, operator: Pubkey) -> Result<Config> {
        let config = self.update_config(|cfg| {
            cfg.require_admin(&admin)?;
            cfg.add_operator(operator)
        })?;
        info!(operator = %operator.short(), "Operator added");
        Ok(config)
    }

    /// Remove an operator (admin only).
    pub fn remove_operator(&self, admin: Pubkey, operator: Pubkey) -> Result<Config> {
        let config = self.update_config(|cfg| {
            cfg.require_admin(&admin)?;
            cfg.remove_operator(operator)
        })?;
        info!(operator = %operator.short(), "Operator removed");
        Ok(config)
    }

    /// Update either close-wait duration (operator only). `None` keeps the
    /// current value.
    pub fn set_close_wait_duration(
        &self,
        operator: Pubkey,
        trade: Option<u64>,
        payment: Option<u64>,
    ) -> Result<Config> {
        let config = self.update_config(|cfg| {
            cfg.require_operator(&operator)?;
            cfg.set_close_wait_duration(trade, payment)
        })?;
        info!(
            close_trade_duration = config.close_trade_duration,
            close_payment_duration = config.close_payment_duration,
            "Close-wait durations updated"
        );
        Ok(config)
    }

    /// Create or update the whitelist entry for `asset` (operator only).
    /// An update keeps the entry's current exposure.
    pub fn add_or_update_whitelist(
        &self,
        operator: Pubkey,
        asset: Asset,
        cap: u64,
    ) -> Result<WhitelistEntry> {
        let config = self.load_config()?;
        config.value.require_operator(&operator)?;

        let address = WhitelistEntry::address(&asset);
        let existing = self.load(&address, "whitelist", Record::as_whitelist)?;
        let tx = Transaction::new().require(Precondition::Version(Config::address(), config.version));
        let (tx, entry) = match existing {
            Some(current) => {
                let entry = WhitelistEntry {
                    cap,
                    ..current.value
                };
                let tx = tx
                    .require(Precondition::Version(address, current.version))
                    .apply(Mutation::Update {
                        address,
                        record: Record::Whitelist(entry.clone()),
                    });
                (tx, entry)
            }
            None => {
                let entry = WhitelistEntry::new(asset, cap);
                let tx = tx.apply(Mutation::Create {
                    address,
                    record: Record::Whitelist(entry.clone()),
                    payer: Some(operator),
                    rent: self.settings.registry_rent,
                });
                (tx, entry)
            }
        };
        self.commit(tx, |_| None)?;

        info!(asset = %asset, cap, exposure = entry.exposure, "Whitelist entry set");
        Ok(entry)
    }

    /// Remove the whitelist entry for `asset` (operator only) and refund its
    /// storage cost to whoever created it.
    ///
    /// # Errors
    /// - `NotWhitelisted` if there is no entry
    /// - `NonZeroExposure` while deposits in `asset` are outstanding
    pub fn remove_whitelist(&self, operator: Pubkey, asset: Asset) -> Result<()> {
        let config = self.load_config()?;
        config.value.require_operator(&operator)?;

        let address = WhitelistEntry::address(&asset);
        let entry = self
            .load(&address, "whitelist", Record::as_whitelist)?
            .ok_or(CrosslockError::NotWhitelisted(asset))?;
        entry.value.check_removable()?;

        let tx = Transaction::new()
            .require(Precondition::Version(Config::address(), config.version))
            .require(Precondition::Version(address, entry.version))
            .apply(Mutation::Delete { address });
        self.commit(tx, |_| None)?;

        info!(asset = %asset, "Whitelist entry removed");
        Ok(())
    }

    /// Register a fee withdrawal destination (admin only).
    pub fn add_fee_receiver(&self, admin: Pubkey, receiver: Pubkey) -> Result<()> {
        let config = self.load_config()?;
        config.value.require_admin(&admin)?;

        let address = FeeReceiver::address(&receiver);
        if self.store.fetch(&address).is_some() {
            return Err(CrosslockError::ReceiverAlreadyRegistered(receiver));
        }
        let tx = Transaction::new()
            .require(Precondition::Version(Config::address(), config.version))
            .apply(Mutation::Create {
                address,
                record: Record::FeeReceiver(FeeReceiver { receiver }),
                payer: Some(admin),
                rent: self.settings.registry_rent,
            });
        self.commit(tx, |err| match err {
            StoreError::AlreadyExists(a) if *a == address => {
                Some(CrosslockError::ReceiverAlreadyRegistered(receiver))
            }
            _ => None,
        })?;

        info!(receiver = %receiver.short(), "Fee receiver added");
        Ok(())
    }

    /// Deregister a fee withdrawal destination (admin only).
    pub fn remove_fee_receiver(&self, admin: Pubkey, receiver: Pubkey) -> Result<()> {
        let config = self.load_config()?;
        config.value.require_admin(&admin)?;

        let address = FeeReceiver::address(&receiver);
        if self.store.fetch(&address).is_none() {
            return Err(CrosslockError::ReceiverNotRegistered(receiver));
        }
        let tx = Transaction::new()
            .require(Precondition::Version(Config::address(), config.version))
            .apply(Mutation::Delete { address });
        self.commit(tx, |err| match err {
            StoreError::Missing(a) if *a == address => {
                Some(CrosslockError::ReceiverNotRegistered(receiver))
            }
            _ => None,
        })?;

        info!(receiver = %receiver.short(), "Fee receiver removed");
        Ok(())
    }

    /// Pay accumulated protocol fees in `asset` to a registered receiver.
    ///
    /// # Errors
    /// - `Unauthorized` unless `authorizer` is the admin or an operator
    /// - `ReceiverNotRegistered` if `receiver` is not registered
    /// - `InvalidAmount` for a zero amount or an empty pool with `All`
    /// - `InsufficientFunds` if the pool holds less than requested
    pub fn withdraw_fee(
        &self,
        authorizer: Pubkey,
        asset: Asset,
        receiver: Pubkey,
        amount: FeeAmount,
    ) -> Result<event::FeeWithdrawn> {
        let config = self.load_config()?;
        if !config.value.is_admin(&authorizer) && !config.value.is_operator(&authorizer) {
            return Err(CrosslockError::unauthorized(format!(
                "{} may not withdraw fees",
                authorizer.short()
            )));
        }
        let receiver_address = FeeReceiver::address(&receiver);
        if self.store.fetch(&receiver_address).is_none() {
            return Err(CrosslockError::ReceiverNotRegistered(receiver));
        }

        let pool = TokenBalance::fee_pool_owner();
        let available = self.store.balance(&pool, &asset);
        let amount = match amount {
            FeeAmount::Exact(0) => {
                return Err(CrosslockError::InvalidAmount {
                    reason: "withdrawal amount is zero".into(),
                });
            }
            FeeAmount::Exact(n) => n,
            FeeAmount::All if available == 0 => {
                return Err(CrosslockError::InvalidAmount {
                    reason: format!("fee pool for {asset} is empty"),
                });
            }
            FeeAmount::All => available,
        };
        if amount > available {
            return Err(CrosslockError::InsufficientFunds {
                owner: pool,
                asset,
                needed: amount,
                available,
            });
        }

        let tx = Transaction::new()
            .require(Precondition::Version(Config::address(), config.version))
            .require(Precondition::Present(receiver_address))
            .transfer(pool, receiver, asset, amount);
        self.commit(tx, |err| match err {
            StoreError::Missing(a) if *a == receiver_address => {
                Some(CrosslockError::ReceiverNotRegistered(receiver))
            }
            _ => None,
        })?;

        info!(asset = %asset, receiver = %receiver.short(), amount, "Fees withdrawn");
        Ok(event::FeeWithdrawn {
            asset,
            receiver,
            amount,
        })
    }

    /// Read-modify-write of the Config record under a version precondition.
    fn update_config(&self, change: impl FnOnce(&mut Config) -> Result<()>) -> Result<Config> {
        let loaded = self.load_config()?;
        let mut config = loaded.value;
        change(&mut config)?;
        let address = Config::address();
        let tx = Transaction::new()
            .require(Precondition::Version(address, loaded.version))
            .apply(Mutation::Update {
                address,
                record: Record::Config(config.clone()),
            });
        self.commit(tx, |_| None)?;
        Ok(config)
    }
}
