//! # Ledger Core
//!
//! A funds-transfer ledger core: deposits, withdrawals, and two-account
//! transfers against exact decimal balances, with an immutable audit trail
//! and correctness under concurrent access.
//!
//! ## Design Principles
//!
//! - **Exact arithmetic**: balances are fixed-point decimals via
//!   `rust_decimal`, never binary floats
//! - **Per-account serialization**: every read-modify-write runs under an
//!   exclusive account lock; transfers take both locks in a fixed global
//!   order so opposing transfers cannot deadlock
//! - **Atomic commits**: a balance write and its ledger entries land
//!   together or not at all, including both sides of a transfer
//! - **Durable journal**: the on-disk store replays an append-only,
//!   checksummed journal on startup and rolls back torn writes
//!
//! ## Example
//!
//! ```
//! use ledger_core::{AccountId, Money, MemoryStore, TransferEngine};
//! use std::str::FromStr;
//!
//! let engine = TransferEngine::new(MemoryStore::new());
//! let alice = AccountId::from("alice");
//! let bob = AccountId::from("bob");
//!
//! engine.open_account(&alice, Money::from_str("100.00").unwrap()).unwrap();
//! engine.open_account(&bob, Money::ZERO).unwrap();
//! engine.transfer(&alice, &bob, Money::from_str("40.00").unwrap()).unwrap();
//!
//! assert_eq!(engine.balance(&bob).unwrap().to_string(), "40.00");
//! ```

pub mod account;
pub mod engine;
pub mod entry;
pub mod error;
pub mod locks;
pub mod money;
pub mod store;

pub use account::AccountId;
pub use engine::{EngineConfig, TransferEngine, TransferReceipt};
pub use entry::{EntryDraft, EntryKind, LedgerEntry};
pub use error::{LedgerError, Result, StorageError};
pub use locks::{AccountGuard, AccountLocks};
pub use money::Money;
pub use store::{CommitBatch, JournalStore, LedgerStore, MemoryStore};
