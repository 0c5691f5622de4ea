//! Per-account mutual exclusion.
//!
//! Serializes every read-modify-write sequence touching one account, and
//! hands out both locks of a two-account transfer in a fixed global order
//! (ascending [`AccountId`]) so that opposing transfers between the same
//! pair can never deadlock. Acquisition is the only suspension point in the
//! core: it blocks the calling operation, never unrelated accounts.

use crate::account::AccountId;
use crate::error::{LedgerError, Result};
use dashmap::DashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct LockState {
    held: Mutex<bool>,
    available: Condvar,
}

/// Registry of per-account exclusive locks, created on first use.
#[derive(Default)]
pub struct AccountLocks {
    locks: DashMap<AccountId, Arc<LockState>>,
}

/// Exclusive hold on one account; released on drop.
pub struct AccountGuard {
    state: Arc<LockState>,
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        let mut held = self.state.held.lock().unwrap_or_else(|e| e.into_inner());
        *held = false;
        self.state.available.notify_one();
    }
}

impl AccountLocks {
    pub fn new() -> Self {
        AccountLocks {
            locks: DashMap::new(),
        }
    }

    fn slot(&self, id: &AccountId) -> Arc<LockState> {
        // Entry is held only long enough to clone the Arc; the blocking wait
        // happens outside the map so other accounts are never delayed.
        self.locks.entry(id.clone()).or_default().clone()
    }

    /// Acquires the lock for one account, waiting at most `timeout`.
    pub fn acquire(&self, id: &AccountId, timeout: Duration) -> Result<AccountGuard> {
        self.acquire_until(id, Instant::now() + timeout)
    }

    fn acquire_until(&self, id: &AccountId, deadline: Instant) -> Result<AccountGuard> {
        let state = self.slot(id);

        let mut held = state.held.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if !*held {
                *held = true;
                drop(held);
                return Ok(AccountGuard {
                    state: state.clone(),
                });
            }

            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return Err(LedgerError::LockTimeout(id.clone())),
            };

            let (guard, _timed_out) = state
                .available
                .wait_timeout(held, remaining)
                .unwrap_or_else(|e| e.into_inner());
            held = guard;
        }
    }

    /// Acquires two account locks in ascending id order, returning the
    /// guards in argument order. Both acquisitions draw on the one
    /// `timeout` budget, so the caller never waits longer than `timeout`
    /// in total.
    pub fn acquire_pair(
        &self,
        first: &AccountId,
        second: &AccountId,
        timeout: Duration,
    ) -> Result<(AccountGuard, AccountGuard)> {
        debug_assert_ne!(first, second, "pair acquisition needs distinct accounts");
        let deadline = Instant::now() + timeout;

        if first < second {
            let first_guard = self.acquire_until(first, deadline)?;
            let second_guard = self.acquire_until(second, deadline)?;
            Ok((first_guard, second_guard))
        } else {
            let second_guard = self.acquire_until(second, deadline)?;
            let first_guard = self.acquire_until(first, deadline)?;
            Ok((first_guard, second_guard))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    const SHORT: Duration = Duration::from_millis(50);
    const LONG: Duration = Duration::from_secs(5);

    #[test]
    fn test_reacquire_after_release() {
        let locks = AccountLocks::new();
        let id = AccountId::from("alice");

        let guard = locks.acquire(&id, SHORT).unwrap();
        drop(guard);
        locks.acquire(&id, SHORT).unwrap();
    }

    #[test]
    fn test_contended_acquire_times_out() {
        let locks = AccountLocks::new();
        let id = AccountId::from("alice");

        let _guard = locks.acquire(&id, SHORT).unwrap();
        let err = locks.acquire(&id, SHORT).err().expect("must time out");
        assert!(matches!(err, LedgerError::LockTimeout(ref timed) if *timed == id));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_release_wakes_waiter() {
        let locks = Arc::new(AccountLocks::new());
        let id = AccountId::from("alice");

        let guard = locks.acquire(&id, SHORT).unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let locks = Arc::clone(&locks);
            let id = id.clone();
            thread::spawn(move || {
                tx.send(()).unwrap();
                locks.acquire(&id, LONG).map(|_| ())
            })
        };

        rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        drop(guard);

        waiter.join().unwrap().unwrap();
    }

    #[test]
    fn test_distinct_accounts_do_not_block_each_other() {
        let locks = AccountLocks::new();

        let _alice = locks.acquire(&AccountId::from("alice"), SHORT).unwrap();
        locks.acquire(&AccountId::from("bob"), SHORT).unwrap();
    }

    #[test]
    fn test_pair_shares_one_timeout_budget() {
        let locks = Arc::new(AccountLocks::new());
        let alice = AccountId::from("alice");
        let bob = AccountId::from("bob");

        let alice_guard = locks.acquire(&alice, SHORT).unwrap();
        let bob_guard = locks.acquire(&bob, SHORT).unwrap();

        // Release the first lock partway through the budget; the second
        // stays held, so the pair acquisition gets only the remainder of
        // the budget, not a fresh timeout on top.
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            drop(alice_guard);
        });

        let start = Instant::now();
        let err = locks
            .acquire_pair(&alice, &bob, Duration::from_millis(250))
            .err()
            .expect("must time out");
        let elapsed = start.elapsed();

        drop(bob_guard);
        releaser.join().unwrap();

        assert!(matches!(err, LedgerError::LockTimeout(_)));
        assert!(
            elapsed < Duration::from_millis(350),
            "pair acquisition overran its budget: {:?}",
            elapsed
        );
    }

    #[test]
    fn test_pair_acquisition_in_opposite_orders() {
        // Opposing pair acquisitions from many threads: with ordered
        // acquisition every round completes instead of deadlocking.
        let locks = Arc::new(AccountLocks::new());
        let alice = AccountId::from("alice");
        let bob = AccountId::from("bob");

        let mut handles = Vec::new();
        for flip in [false, true] {
            let locks = Arc::clone(&locks);
            let (a, b) = if flip {
                (bob.clone(), alice.clone())
            } else {
                (alice.clone(), bob.clone())
            };
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    let _guards = locks.acquire_pair(&a, &b, LONG).unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
