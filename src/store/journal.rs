//! Durable ledger store backed by an append-only journal file.
//!
//! Every mutation is one journal frame, written and fsynced before the
//! in-memory state changes or the call returns:
//!
//! ```text
//! [payload len: u32 LE][crc32 of payload: u32 LE][bincode payload]
//! ```
//!
//! The frame is the write-ahead staging record for multi-row commits: both
//! balance writes and both entries of a transfer travel in a single frame,
//! so replay applies a transfer whole or not at all. On open the journal is
//! replayed to rebuild state; a torn tail (a frame cut short by a crash
//! mid-write) is rolled back by truncating the file at the last valid frame
//! boundary. A checksum mismatch anywhere else is corruption and refuses to
//! open.

use super::{CommitBatch, LedgerStore, StoreState};
use crate::account::AccountId;
use crate::entry::LedgerEntry;
use crate::error::{LedgerError, Result, StorageError};
use crate::money::Money;
use chrono::Utc;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const FRAME_HEADER_LEN: usize = 8;

/// One durable mutation.
#[derive(Debug, Serialize, Deserialize)]
enum JournalRecord {
    CreateAccount { id: AccountId, opening: Money },
    Commit {
        balances: Vec<(AccountId, Money)>,
        entries: Vec<LedgerEntry>,
    },
}

/// Durable store: in-memory state checkpointed by an append-only journal.
pub struct JournalStore {
    inner: Mutex<Inner>,
}

struct Inner {
    state: StoreState,
    file: File,
    /// Byte offset of the end of the last fully acknowledged frame. A
    /// failed append rolls the file back to this boundary so a retried
    /// commit lands on a clean frame edge.
    committed_len: u64,
    /// Set when a failed append could not be rolled back; every further
    /// mutation then fails closed instead of appending after stray bytes.
    wedged: bool,
}

impl JournalStore {
    /// Opens (or creates) a journal at `path`, replaying existing frames to
    /// rebuild state and rolling back any torn tail before accepting new
    /// operations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StorageError::from)?;
            }
        }

        let buf = match std::fs::read(&path) {
            Ok(buf) => buf,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StorageError::from(e).into()),
        };

        let (state, valid_len) = replay(&buf)?;
        if (valid_len as usize) < buf.len() {
            warn!(
                "journal {}: rolling back torn tail ({} of {} bytes valid)",
                path.display(),
                valid_len,
                buf.len()
            );
            let file = OpenOptions::new()
                .write(true)
                .open(&path)
                .map_err(StorageError::from)?;
            file.set_len(valid_len).map_err(StorageError::from)?;
            file.sync_all().map_err(StorageError::from)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(StorageError::from)?;
        debug!("journal {}: opened, {} bytes replayed", path.display(), valid_len);

        Ok(JournalStore {
            inner: Mutex::new(Inner {
                state,
                file,
                committed_len: valid_len,
                wedged: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LedgerStore for JournalStore {
    fn create_account(&self, id: &AccountId, opening: Money) -> Result<()> {
        let mut inner = self.lock();
        if inner.state.balance(id).is_ok() {
            return Err(LedgerError::AccountExists(id.clone()));
        }

        append_frame(
            &mut inner,
            &JournalRecord::CreateAccount {
                id: id.clone(),
                opening,
            },
        )?;
        inner.state.create_account(id, opening)
    }

    fn balance(&self, id: &AccountId) -> Result<Money> {
        self.lock().state.balance(id)
    }

    fn commit(&self, batch: CommitBatch) -> Result<Vec<LedgerEntry>> {
        let mut inner = self.lock();
        let entries = inner.state.stage(&batch, Utc::now())?;

        // Durable first: if the frame write fails, memory is untouched and
        // the caller sees a retryable storage error with no partial state.
        append_frame(
            &mut inner,
            &JournalRecord::Commit {
                balances: batch.balances.clone(),
                entries: entries.clone(),
            },
        )?;

        inner.state.install(&batch.balances, &entries);
        Ok(entries)
    }

    fn list_entries(&self, id: &AccountId) -> Result<Vec<LedgerEntry>> {
        self.lock().state.list_entries(id)
    }

    fn list_accounts(&self) -> Result<Vec<(AccountId, Money)>> {
        Ok(self.lock().state.list_accounts())
    }
}

/// Appends one frame and forces it to disk.
///
/// A write that fails partway leaves stray bytes after the last good frame;
/// appending again there would make the journal unreadable on restart. So a
/// failed append rolls the file back to the committed boundary before
/// returning, and if even that fails the store wedges shut: no further
/// mutation is accepted, only a reopen (which truncates the tail) recovers.
fn append_frame(inner: &mut Inner, record: &JournalRecord) -> std::result::Result<(), StorageError> {
    if inner.wedged {
        return Err(StorageError::Closed);
    }

    let payload = bincode::serialize(record)?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);

    match write_and_sync(&mut inner.file, &frame) {
        Ok(()) => {
            inner.committed_len += frame.len() as u64;
            Ok(())
        }
        Err(e) => {
            let rollback = inner
                .file
                .set_len(inner.committed_len)
                .and_then(|_| inner.file.sync_all());
            if let Err(rollback_err) = rollback {
                error!(
                    "journal append failed ({}) and rollback failed ({}); closing store",
                    e, rollback_err
                );
                inner.wedged = true;
            }
            Err(StorageError::Io(e))
        }
    }
}

fn write_and_sync(file: &mut File, frame: &[u8]) -> io::Result<()> {
    file.write_all(frame)?;
    file.sync_all()
}

/// Replays the journal buffer into fresh state.
///
/// Returns the rebuilt state and the byte length of the valid prefix. Any
/// incomplete frame at the tail, or a bad checksum on the final frame, marks
/// the end of the valid prefix (crash mid-write). A bad checksum on an
/// interior frame is corruption.
fn replay(buf: &[u8]) -> std::result::Result<(StoreState, u64), StorageError> {
    let mut state = StoreState::new();
    let mut offset = 0usize;

    while offset < buf.len() {
        if buf.len() - offset < FRAME_HEADER_LEN {
            break; // torn header
        }
        let len = u32::from_le_bytes([
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ]) as usize;
        let crc = u32::from_le_bytes([
            buf[offset + 4],
            buf[offset + 5],
            buf[offset + 6],
            buf[offset + 7],
        ]);

        let start = offset + FRAME_HEADER_LEN;
        let end = match start.checked_add(len) {
            Some(end) if end <= buf.len() => end,
            _ => break, // torn payload
        };

        let payload = &buf[start..end];
        if crc32fast::hash(payload) != crc {
            if end == buf.len() {
                break; // torn final frame
            }
            return Err(StorageError::Corrupt {
                offset: offset as u64,
            });
        }

        let record: JournalRecord = bincode::deserialize(payload)?;
        match record {
            JournalRecord::CreateAccount { id, opening } => {
                state.create_account(&id, opening).map_err(|_| {
                    StorageError::Corrupt {
                        offset: offset as u64,
                    }
                })?;
            }
            JournalRecord::Commit { balances, entries } => {
                state.install(&balances, &entries);
            }
        }

        offset = end;
    }

    Ok((state, offset as u64))
}
