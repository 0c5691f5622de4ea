//! Core transfer engine.
//!
//! Orchestrates deposits, withdrawals, and two-account transfers against a
//! [`LedgerStore`], serialized per account by [`AccountLocks`]. Every
//! mutation follows the same protocol: validate before taking any lock,
//! read and check under the lock, then apply the balance write together with
//! its ledger entries in one atomic commit. There is no resumable state:
//! each operation runs to completion or fails leaving nothing behind.

use crate::account::AccountId;
use crate::entry::{EntryDraft, EntryKind, LedgerEntry};
use crate::error::{LedgerError, Result};
use crate::locks::AccountLocks;
use crate::money::Money;
use crate::store::{CommitBatch, LedgerStore};
use log::{debug, warn};
use std::time::Duration;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on waiting for an account lock before the operation
    /// fails with a retryable `LockTimeout`.
    pub lock_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            lock_timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of a committed transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    /// Sender's balance after the transfer.
    pub from_balance: Money,
    /// Recipient's balance after the transfer.
    pub to_balance: Money,
}

/// The funds-transfer engine.
///
/// Owns no persistent state beyond what the store holds. Construct one per
/// store instance and share it by reference across request handlers; all
/// methods take `&self` and serialize through the per-account locks.
pub struct TransferEngine<S: LedgerStore> {
    store: S,
    locks: AccountLocks,
    config: EngineConfig,
}

impl<S: LedgerStore> TransferEngine<S> {
    /// Creates an engine with default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        TransferEngine {
            store,
            locks: AccountLocks::new(),
            config,
        }
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Opens an account with the given opening balance (usually zero).
    pub fn open_account(&self, id: &AccountId, opening: Money) -> Result<()> {
        if opening.is_negative() {
            return Err(LedgerError::InvalidAmount);
        }
        self.store.create_account(id, opening)?;
        debug!("opened account {} with balance {}", id, opening);
        Ok(())
    }

    /// Credits `amount` to the account and returns the new balance.
    pub fn deposit(&self, id: &AccountId, amount: Money) -> Result<Money> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount);
        }

        let _guard = self.locks.acquire(id, self.config.lock_timeout)?;
        let old = self.store.balance(id)?;
        let new = old + amount;

        self.store.commit(CommitBatch {
            balances: vec![(id.clone(), new)],
            entries: vec![EntryDraft::single(
                id.clone(),
                EntryKind::Deposit,
                amount,
                old,
                new,
            )],
        })?;

        debug!("deposit {} to {}: {} -> {}", amount, id, old, new);
        Ok(new)
    }

    /// Debits `amount` from the account and returns the new balance.
    ///
    /// The funds check and the balance write happen under the same lock
    /// hold, so no concurrent operation can observe or mutate the balance
    /// in between. Withdrawing the exact balance is valid and leaves zero.
    pub fn withdraw(&self, id: &AccountId, amount: Money) -> Result<Money> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount);
        }

        let _guard = self.locks.acquire(id, self.config.lock_timeout)?;
        let old = self.store.balance(id)?;
        if old < amount {
            warn!("withdraw {} from {} rejected: balance {}", amount, id, old);
            return Err(LedgerError::InsufficientFunds);
        }
        let new = old - amount;

        self.store.commit(CommitBatch {
            balances: vec![(id.clone(), new)],
            entries: vec![EntryDraft::single(
                id.clone(),
                EntryKind::Withdraw,
                amount,
                old,
                new,
            )],
        })?;

        debug!("withdraw {} from {}: {} -> {}", amount, id, old, new);
        Ok(new)
    }

    /// Moves `amount` from one account to another.
    ///
    /// Both locks are taken in ascending id order before either balance is
    /// read; both balance writes and both ledger entries (TransferOut on the
    /// sender, TransferIn on the recipient, each naming the other as
    /// counterparty) commit as one atomic unit.
    pub fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Money,
    ) -> Result<TransferReceipt> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount);
        }
        if from == to {
            return Err(LedgerError::SelfTransfer);
        }

        let _guards = self
            .locks
            .acquire_pair(from, to, self.config.lock_timeout)?;

        let old_from = self.store.balance(from)?;
        let old_to = self.store.balance(to)?;
        if old_from < amount {
            warn!(
                "transfer {} from {} to {} rejected: balance {}",
                amount, from, to, old_from
            );
            return Err(LedgerError::InsufficientFunds);
        }

        let new_from = old_from - amount;
        let new_to = old_to + amount;

        self.store.commit(CommitBatch {
            balances: vec![(from.clone(), new_from), (to.clone(), new_to)],
            entries: vec![
                EntryDraft::transfer_side(
                    from.clone(),
                    EntryKind::TransferOut,
                    amount,
                    old_from,
                    new_from,
                    to.clone(),
                ),
                EntryDraft::transfer_side(
                    to.clone(),
                    EntryKind::TransferIn,
                    amount,
                    old_to,
                    new_to,
                    from.clone(),
                ),
            ],
        })?;

        debug!("transfer {} from {} to {}", amount, from, to);
        Ok(TransferReceipt {
            from_balance: new_from,
            to_balance: new_to,
        })
    }

    /// Returns the current balance. Read-only; takes no lock.
    pub fn balance(&self, id: &AccountId) -> Result<Money> {
        self.store.balance(id)
    }

    /// Returns the account's ledger entries, newest first. Read-only.
    pub fn history(&self, id: &AccountId) -> Result<Vec<LedgerEntry>> {
        self.store.list_entries(id)
    }
}
