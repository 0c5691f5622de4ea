//! In-memory ledger store.

use super::{CommitBatch, LedgerStore, StoreState};
use crate::account::AccountId;
use crate::entry::LedgerEntry;
use crate::error::Result;
use crate::money::Money;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};

/// Non-durable store backed by process memory.
///
/// Every operation runs in one critical section, so batch atomicity is
/// trivial. Used for tests and for ephemeral CLI runs; durable deployments
/// use [`super::JournalStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            state: Mutex::new(StoreState::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // Poisoning only matters if a panic happened mid-mutation; the state
        // mutations here are infallible installs, so the data is intact.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LedgerStore for MemoryStore {
    fn create_account(&self, id: &AccountId, opening: Money) -> Result<()> {
        self.lock().create_account(id, opening)
    }

    fn balance(&self, id: &AccountId) -> Result<Money> {
        self.lock().balance(id)
    }

    fn commit(&self, batch: CommitBatch) -> Result<Vec<LedgerEntry>> {
        let mut state = self.lock();
        let entries = state.stage(&batch, Utc::now())?;
        state.install(&batch.balances, &entries);
        Ok(entries)
    }

    fn list_entries(&self, id: &AccountId) -> Result<Vec<LedgerEntry>> {
        self.lock().list_entries(id)
    }

    fn list_accounts(&self) -> Result<Vec<(AccountId, Money)>> {
        Ok(self.lock().list_accounts())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryDraft, EntryKind};
    use std::str::FromStr;

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    #[test]
    fn test_commit_applies_balances_and_entries_together() {
        let store = MemoryStore::new();
        let alice = AccountId::from("alice");
        let bob = AccountId::from("bob");

        store.create_account(&alice, money("150.00")).unwrap();
        store.create_account(&bob, money("0.00")).unwrap();

        let batch = CommitBatch {
            balances: vec![(alice.clone(), money("0.00")), (bob.clone(), money("150.00"))],
            entries: vec![
                EntryDraft::transfer_side(
                    alice.clone(),
                    EntryKind::TransferOut,
                    money("150.00"),
                    money("150.00"),
                    money("0.00"),
                    bob.clone(),
                ),
                EntryDraft::transfer_side(
                    bob.clone(),
                    EntryKind::TransferIn,
                    money("150.00"),
                    money("0.00"),
                    money("150.00"),
                    alice.clone(),
                ),
            ],
        };

        let committed = store.commit(batch).unwrap();
        assert_eq!(committed.len(), 2);
        assert_eq!(committed[0].id + 1, committed[1].id);
        assert_eq!(committed[0].timestamp, committed[1].timestamp);

        assert_eq!(store.balance(&alice).unwrap(), money("0.00"));
        assert_eq!(store.balance(&bob).unwrap(), money("150.00"));
    }

    #[test]
    fn test_list_entries_newest_first() {
        let store = MemoryStore::new();
        let id = AccountId::from("alice");
        store.create_account(&id, money("0.00")).unwrap();

        for (amount, balance) in [("10.00", "10.00"), ("5.00", "15.00")] {
            let before = store.balance(&id).unwrap();
            store
                .commit(CommitBatch {
                    balances: vec![(id.clone(), money(balance))],
                    entries: vec![EntryDraft::single(
                        id.clone(),
                        EntryKind::Deposit,
                        money(amount),
                        before,
                        money(balance),
                    )],
                })
                .unwrap();
        }

        let history = store.list_entries(&id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount, money("5.00"));
        assert_eq!(history[1].amount, money("10.00"));
        assert!(history[0].id > history[1].id);
    }

    #[test]
    fn test_reads_do_not_mutate() {
        let store = MemoryStore::new();
        let id = AccountId::from("alice");
        store.create_account(&id, money("42.00")).unwrap();

        let first = (store.balance(&id).unwrap(), store.list_entries(&id).unwrap());
        let second = (store.balance(&id).unwrap(), store.list_entries(&id).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn test_set_balance_and_append_entry_conveniences() {
        let store = MemoryStore::new();
        let id = AccountId::from("alice");
        store.create_account(&id, money("0.00")).unwrap();

        store.set_balance(&id, money("25.00")).unwrap();
        assert_eq!(store.balance(&id).unwrap(), money("25.00"));

        let entry = store
            .append_entry(EntryDraft::single(
                id.clone(),
                EntryKind::Deposit,
                money("25.00"),
                money("0.00"),
                money("25.00"),
            ))
            .unwrap();
        assert_eq!(entry.id, 1);
        assert_eq!(store.list_entries(&id).unwrap(), vec![entry]);
    }
}
