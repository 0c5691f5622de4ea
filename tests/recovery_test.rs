//! Journal durability and crash-recovery tests: acknowledged writes survive
//! restart, and a torn tail never leaves half a transfer applied.

use ledger_core::{AccountId, EntryKind, JournalStore, LedgerStore, Money, TransferEngine};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

fn money(s: &str) -> Money {
    Money::from_str(s).unwrap()
}

fn engine_at(path: &Path) -> TransferEngine<JournalStore> {
    TransferEngine::new(JournalStore::open(path).unwrap())
}

#[test]
fn test_acknowledged_writes_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.journal");
    let alice = AccountId::from("alice");
    let bob = AccountId::from("bob");

    {
        let engine = engine_at(&path);
        engine.open_account(&alice, money("100.00")).unwrap();
        engine.open_account(&bob, money("0.00")).unwrap();
        engine.deposit(&alice, money("50.00")).unwrap();
        engine.transfer(&alice, &bob, money("150.00")).unwrap();
    }

    let engine = engine_at(&path);
    assert_eq!(engine.balance(&alice).unwrap(), money("0.00"));
    assert_eq!(engine.balance(&bob).unwrap(), money("150.00"));

    let alice_history = engine.history(&alice).unwrap();
    assert_eq!(alice_history.len(), 2);
    assert_eq!(alice_history[0].kind, EntryKind::TransferOut);
    assert_eq!(alice_history[0].counterparty, Some(bob.clone()));

    let bob_history = engine.history(&bob).unwrap();
    assert_eq!(bob_history.len(), 1);
    assert_eq!(bob_history[0].kind, EntryKind::TransferIn);
    assert_eq!(bob_history[0].counterparty, Some(alice.clone()));
}

#[test]
fn test_torn_transfer_frame_rolls_back_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.journal");
    let alice = AccountId::from("alice");
    let bob = AccountId::from("bob");

    {
        let engine = engine_at(&path);
        engine.open_account(&alice, money("100.00")).unwrap();
        engine.open_account(&bob, money("0.00")).unwrap();
        engine.transfer(&alice, &bob, money("40.00")).unwrap();
    }

    // Record where the committed state ends, then run one more transfer and
    // cut its frame in half, as a crash mid-write would.
    let committed_len = std::fs::metadata(&path).unwrap().len();
    {
        let engine = engine_at(&path);
        engine.transfer(&alice, &bob, money("25.00")).unwrap();
    }
    let full_len = std::fs::metadata(&path).unwrap().len();
    let torn_len = committed_len + (full_len - committed_len) / 2;
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(torn_len).unwrap();
    file.sync_all().unwrap();
    drop(file);

    // Recovery discards the torn frame whole: neither balance moved, no
    // one-sided entries exist.
    let engine = engine_at(&path);
    assert_eq!(engine.balance(&alice).unwrap(), money("60.00"));
    assert_eq!(engine.balance(&bob).unwrap(), money("40.00"));
    assert_eq!(engine.history(&alice).unwrap().len(), 1);
    assert_eq!(engine.history(&bob).unwrap().len(), 1);

    // And the store is writable again after the rollback.
    engine.transfer(&alice, &bob, money("25.00")).unwrap();
    assert_eq!(engine.balance(&alice).unwrap(), money("35.00"));
    assert_eq!(engine.balance(&bob).unwrap(), money("65.00"));
}

#[test]
fn test_trailing_garbage_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.journal");
    let alice = AccountId::from("alice");

    {
        let engine = engine_at(&path);
        engine.open_account(&alice, money("10.00")).unwrap();
    }

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"\x03\x00").unwrap();
    file.sync_all().unwrap();
    drop(file);

    let engine = engine_at(&path);
    assert_eq!(engine.balance(&alice).unwrap(), money("10.00"));
}

#[test]
fn test_conservation_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.journal");
    let ids = ["a", "b", "c"];

    {
        let engine = engine_at(&path);
        for id in ids {
            engine
                .open_account(&AccountId::from(id), money("100.00"))
                .unwrap();
        }
        engine
            .transfer(&AccountId::from("a"), &AccountId::from("b"), money("30.00"))
            .unwrap();
    }
    {
        let engine = engine_at(&path);
        engine
            .transfer(&AccountId::from("b"), &AccountId::from("c"), money("70.00"))
            .unwrap();
    }

    let engine = engine_at(&path);
    let total = engine
        .store()
        .list_accounts()
        .unwrap()
        .into_iter()
        .fold(Money::ZERO, |sum, (_, balance)| sum + balance);
    assert_eq!(total, money("300.00"));
}
