//! Error types for the ledger core.

use crate::account::AccountId;
use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors surfaced to callers of the ledger core.
///
/// Business errors (`InvalidAmount`, `InsufficientFunds`, `SelfTransfer`) are
/// terminal for the invocation. `LockTimeout` and `Storage` are retryable
/// with the same inputs: no partial state is ever left visible.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Operation amount was zero or negative
    #[error("amount must be positive")]
    InvalidAmount,

    /// Referenced account does not exist
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// Account creation collided with an existing id
    #[error("account already exists: {0}")]
    AccountExists(AccountId),

    /// Withdrawal or transfer exceeds the available balance
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Transfer source and destination are the same account
    #[error("cannot transfer to the same account")]
    SelfTransfer,

    /// Could not acquire the account lock within the configured bound
    #[error("timed out waiting for lock on account {0}")]
    LockTimeout(AccountId),

    /// Underlying storage failed; wraps durability-layer errors
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl LedgerError {
    /// Returns `true` if retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::LockTimeout(_) | LedgerError::Storage(_))
    }
}

/// Errors internal to a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error from the journal file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Journal frame failed to encode or decode
    #[error("journal encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// Checksum mismatch on an interior journal frame
    #[error("corrupt journal frame at offset {offset}")]
    Corrupt { offset: u64 },

    /// A failed append could not be rolled back; the store refuses further
    /// mutations until it is reopened
    #[error("journal is closed after an unrecoverable write failure")]
    Closed,
}
