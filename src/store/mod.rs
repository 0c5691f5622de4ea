//! Ledger storage abstraction.
//!
//! The engine is written once against [`LedgerStore`]; each backing store
//! provides the same capability set: keyed account balances, an append-only
//! per-account entry log, and an atomic multi-row commit. Callers must hold
//! the relevant account locks before invoking any mutating operation.

mod journal;
mod memory;

pub use journal::JournalStore;
pub use memory::MemoryStore;

use crate::account::AccountId;
use crate::entry::{EntryDraft, LedgerEntry};
use crate::error::{LedgerError, Result};
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A set of balance overwrites and entry appends applied as one atomic unit.
///
/// A deposit or withdrawal commits one balance and one entry; a transfer
/// commits two of each. Either the whole batch becomes durable or none of it
/// does.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitBatch {
    pub balances: Vec<(AccountId, Money)>,
    pub entries: Vec<EntryDraft>,
}

/// Durable keyed storage for account balances plus an append-only entry log.
///
/// Once a mutating call returns `Ok`, the write survives process restart
/// (trivially so for [`MemoryStore`], which exists for tests and ephemeral
/// use). Absence of an account is always an error, never an implicit zero
/// balance.
pub trait LedgerStore: Send + Sync {
    /// Creates an account with the given opening balance.
    ///
    /// Fails with `AccountExists` if the id is already taken.
    fn create_account(&self, id: &AccountId, opening: Money) -> Result<()>;

    /// Returns the current balance, or `AccountNotFound`.
    fn balance(&self, id: &AccountId) -> Result<Money>;

    /// Atomically applies every write in the batch, assigning monotonic
    /// entry ids and a single capture timestamp. Returns the committed
    /// entries in batch order.
    fn commit(&self, batch: CommitBatch) -> Result<Vec<LedgerEntry>>;

    /// Overwrites one account's balance. One-item [`commit`](Self::commit).
    fn set_balance(&self, id: &AccountId, new_balance: Money) -> Result<()> {
        self.commit(CommitBatch {
            balances: vec![(id.clone(), new_balance)],
            entries: Vec::new(),
        })?;
        Ok(())
    }

    /// Appends one entry. One-item [`commit`](Self::commit).
    fn append_entry(&self, draft: EntryDraft) -> Result<LedgerEntry> {
        let mut committed = self.commit(CommitBatch {
            balances: Vec::new(),
            entries: vec![draft],
        })?;
        // One draft in, one entry out.
        Ok(committed.remove(0))
    }

    /// Returns the account's entries, newest first. Snapshot semantics:
    /// the result reflects one consistent point in time.
    fn list_entries(&self, id: &AccountId) -> Result<Vec<LedgerEntry>>;

    /// Returns every account with its balance, in unspecified order.
    fn list_accounts(&self) -> Result<Vec<(AccountId, Money)>>;
}

/// Shared in-memory state: the account map, per-account entry logs, and the
/// monotonic entry counter. Both stores keep one of these behind a mutex;
/// the journal store additionally persists every mutation as a frame.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    accounts: HashMap<AccountId, Money>,
    entries: HashMap<AccountId, Vec<LedgerEntry>>,
    next_entry_id: u64,
}

impl StoreState {
    pub(crate) fn new() -> Self {
        StoreState {
            accounts: HashMap::new(),
            entries: HashMap::new(),
            next_entry_id: 1,
        }
    }

    pub(crate) fn create_account(&mut self, id: &AccountId, opening: Money) -> Result<()> {
        if self.accounts.contains_key(id) {
            return Err(LedgerError::AccountExists(id.clone()));
        }
        self.accounts.insert(id.clone(), opening);
        self.entries.insert(id.clone(), Vec::new());
        Ok(())
    }

    pub(crate) fn balance(&self, id: &AccountId) -> Result<Money> {
        self.accounts
            .get(id)
            .copied()
            .ok_or_else(|| LedgerError::AccountNotFound(id.clone()))
    }

    /// Validates a batch and finalizes its drafts without mutating state.
    ///
    /// The split from [`install`](Self::install) lets the journal store
    /// persist the frame before the in-memory state changes, so a failed
    /// disk write leaves memory untouched.
    pub(crate) fn stage(
        &self,
        batch: &CommitBatch,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>> {
        for (id, _) in &batch.balances {
            if !self.accounts.contains_key(id) {
                return Err(LedgerError::AccountNotFound(id.clone()));
            }
        }
        for draft in &batch.entries {
            if !self.accounts.contains_key(&draft.account) {
                return Err(LedgerError::AccountNotFound(draft.account.clone()));
            }
        }

        let mut next_id = self.next_entry_id;
        let mut committed = Vec::with_capacity(batch.entries.len());
        for draft in &batch.entries {
            committed.push(draft.clone().into_entry(next_id, timestamp));
            next_id += 1;
        }
        Ok(committed)
    }

    /// Applies a staged batch. Infallible by construction: `stage` has
    /// already validated every target.
    pub(crate) fn install(&mut self, balances: &[(AccountId, Money)], entries: &[LedgerEntry]) {
        for (id, new_balance) in balances {
            self.accounts.insert(id.clone(), *new_balance);
        }
        for entry in entries {
            self.next_entry_id = self.next_entry_id.max(entry.id + 1);
            self.entries
                .entry(entry.account.clone())
                .or_default()
                .push(entry.clone());
        }
    }

    pub(crate) fn list_entries(&self, id: &AccountId) -> Result<Vec<LedgerEntry>> {
        let log = self
            .entries
            .get(id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.clone()))?;
        // Stored oldest first; history reads newest first.
        Ok(log.iter().rev().cloned().collect())
    }

    pub(crate) fn list_accounts(&self) -> Vec<(AccountId, Money)> {
        self.accounts
            .iter()
            .map(|(id, balance)| (id.clone(), *balance))
            .collect()
    }
}
