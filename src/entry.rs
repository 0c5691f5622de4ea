//! Ledger entry models.
//!
//! Entries are the immutable audit trail: one record per balance-changing
//! event, created in the same atomic commit as the balance write and never
//! updated afterward.

use crate::account::AccountId;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of balance-changing event an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Funds credited to the account from outside the system.
    Deposit,

    /// Funds debited from the account out of the system.
    Withdraw,

    /// Funds sent to another account; paired with a `TransferIn`.
    TransferOut,

    /// Funds received from another account; paired with a `TransferOut`.
    TransferIn,
}

impl EntryKind {
    /// Returns `true` if this kind credits the account.
    pub fn is_credit(&self) -> bool {
        matches!(self, EntryKind::Deposit | EntryKind::TransferIn)
    }
}

/// A committed ledger entry.
///
/// `id` is assigned at insertion and is monotonically increasing across the
/// store, which defines the total order of entries for any one account.
/// `balance_after == balance_before ± amount`, with the sign determined by
/// `kind`. `counterparty` is present exactly for the two transfer kinds and
/// names the other side of the transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: u64,
    pub account: AccountId,
    pub kind: EntryKind,
    pub amount: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub counterparty: Option<AccountId>,
    pub timestamp: DateTime<Utc>,
}

/// An entry awaiting insertion: everything but the store-assigned id and
/// timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub account: AccountId,
    pub kind: EntryKind,
    pub amount: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub counterparty: Option<AccountId>,
}

impl EntryDraft {
    /// Draft for a single-account event (deposit or withdraw).
    pub fn single(
        account: AccountId,
        kind: EntryKind,
        amount: Money,
        balance_before: Money,
        balance_after: Money,
    ) -> Self {
        EntryDraft {
            account,
            kind,
            amount,
            balance_before,
            balance_after,
            counterparty: None,
        }
    }

    /// Draft for one side of a transfer, referencing the other side.
    pub fn transfer_side(
        account: AccountId,
        kind: EntryKind,
        amount: Money,
        balance_before: Money,
        balance_after: Money,
        counterparty: AccountId,
    ) -> Self {
        EntryDraft {
            account,
            kind,
            amount,
            balance_before,
            balance_after,
            counterparty: Some(counterparty),
        }
    }

    /// Finalizes the draft with a store-assigned id and capture time.
    pub fn into_entry(self, id: u64, timestamp: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id,
            account: self.account,
            kind: self.kind,
            amount: self.amount,
            balance_before: self.balance_before,
            balance_after: self.balance_after,
            counterparty: self.counterparty,
            timestamp,
        }
    }
}
