//! Crash safety
//!
//! A failed write set stands in for the process dying at that point. After
//! any such failure the durable pointer must be empty or name a ledger whose
//! rows are complete, and a restart must converge on the target ledger.

mod common;

use common::*;
use ledger_sync::{
    CanonicalLedger, CatchUpMode, ClosedLedger, Config, LedgerDatabase, LedgerHash, MemoryBackend,
    Storage, LAST_CLOSED_LEDGER_KEY,
};
use std::sync::Arc;
use tempfile::TempDir;

fn pointer(db: &LedgerDatabase) -> LedgerHash {
    db.get_state(LAST_CLOSED_LEDGER_KEY).unwrap().parse().unwrap()
}

fn assert_pointer_sound(db: &LedgerDatabase, candidates: &[&ClosedLedger]) {
    let lcl = pointer(db);
    if lcl.is_zero() {
        return;
    }
    let ledger = candidates
        .iter()
        .find(|l| l.hash() == lcl)
        .expect("pointer names an unknown ledger");
    assert_eq!(all_rows(db), expected_rows(ledger));
}

fn batched_config() -> Config {
    let mut config = Config::default();
    config.import.batch_size = 2;
    config
}

#[test]
fn test_full_import_crash_at_every_write_set() {
    let entries: Vec<_> = (0..5).map(|i| account(&format!("acct{}", i), i)).collect();
    let l1 = genesis(entries);

    // pointer clear, three table clears, two batches, final batch
    for fail_at in 1..=7 {
        let inner = Arc::new(MemoryBackend::new());
        let faulty = Arc::new(FaultyBackend::over(inner.clone()));
        faulty.fail_after(fail_at);

        let db = Arc::new(LedgerDatabase::new(faulty));
        let (mut m, _) = master_with(db.clone(), &batched_config());
        assert!(!m.ensure_sync(l1.clone(), true), "write set {} should fail", fail_at);
        assert!(m.current().is_empty());
        assert_eq!(db.transaction_level(), 0);
        assert!(pointer(&db).is_zero());

        // Restart on what reached storage
        let db = Arc::new(LedgerDatabase::new(inner));
        let (mut m, _) = master_with(db.clone(), &batched_config());
        assert!(!m.load_last_known_ledger());
        assert!(m.ensure_sync(l1.clone(), true));
        assert_eq!(pointer(&db), l1.hash());
        assert_eq!(all_rows(&db), expected_rows(&l1));
    }
}

#[test]
fn test_reimport_crash_never_exposes_stale_pointer() {
    let l1 = genesis((0..4).map(|i| account(&format!("a{}", i), 1)).collect());
    let l2 = next(&l1, (0..6).map(|i| account(&format!("a{}", i), 2)).collect());

    for fail_at in 1..=7 {
        let inner = Arc::new(MemoryBackend::new());
        let faulty = Arc::new(FaultyBackend::over(inner.clone()));
        let db = Arc::new(LedgerDatabase::new(faulty.clone()));

        let mut config = batched_config();
        config.sync.max_delta_entries = 1;
        let (mut m, _) = master_with(db.clone(), &config);
        assert!(m.ensure_sync(l1.clone(), true));

        faulty.fail_after(fail_at);
        assert!(!m.ensure_sync(l2.clone(), true));
        assert_pointer_sound(&db, &[&l1, &l2]);

        let db = Arc::new(LedgerDatabase::new(inner));
        let (mut m, _) = master_with(db.clone(), &config);
        m.load_last_known_ledger();
        assert!(m.ensure_sync(l2.clone(), true));
        assert_eq!(all_rows(&db), expected_rows(&l2));
    }
}

#[test]
fn test_incremental_commit_failure_keeps_previous_ledger() {
    let inner = Arc::new(MemoryBackend::new());
    let faulty = Arc::new(FaultyBackend::over(inner));
    let db = Arc::new(LedgerDatabase::new(faulty.clone()));
    let mut m = master(db.clone());

    let l1 = genesis(vec![account("a", 1), account("b", 1)]);
    let l2 = next(&l1, vec![account("a", 2), account("b", 1)]);
    assert!(m.ensure_sync(l1.clone(), true));

    faulty.fail_after(1);
    assert!(!m.ensure_sync(l2.clone(), true));
    assert_eq!(m.last_ledger_hash(), l1.hash());
    assert_eq!(pointer(&db), l1.hash());
    assert_eq!(all_rows(&db), expected_rows(&l1));

    // Next attempt succeeds incrementally from the held ledger
    let report = m.catch_up(CanonicalLedger::from_ledger(l2.clone())).unwrap();
    assert_eq!(report.mode, CatchUpMode::Incremental);
    assert_eq!(all_rows(&db), expected_rows(&l2));
}

#[test]
fn test_close_commit_failure_rolls_back() {
    let inner = Arc::new(MemoryBackend::new());
    let faulty = Arc::new(FaultyBackend::over(inner));
    let db = Arc::new(LedgerDatabase::new(faulty.clone()));
    let mut m = master(db.clone());

    let l1 = genesis(vec![account("a", 1)]);
    assert!(m.ensure_sync(l1.clone(), true));

    let l2 = next(&l1, vec![account("a", 9)]);
    m.begin_close().unwrap();
    faulty.fail_after(1);
    assert!(m.commit_close(l2).is_err());

    assert_eq!(db.transaction_level(), 0);
    assert_eq!(m.last_ledger_hash(), l1.hash());
    assert_eq!(pointer(&db), l1.hash());
    assert_eq!(all_rows(&db), expected_rows(&l1));
}

fn rocksdb_config(dir: &TempDir) -> Config {
    let mut config = batched_config();
    config.data_dir = dir.path().to_path_buf();
    config
}

#[test]
fn test_rocksdb_restart_restores_last_closed_ledger() {
    let dir = TempDir::new().unwrap();
    let config = rocksdb_config(&dir);

    let l1 = genesis(vec![
        account("alice", 10),
        account("bob", 20),
        trust_line("alice", "bob", 5),
        offer("bob", 4, 250),
        directory("bob", vec![]),
    ]);
    let l2 = next(&l1, vec![account("alice", 11), account("bob", 20), trust_line("alice", "bob", 6)]);

    {
        let storage = Arc::new(Storage::open(&config).unwrap());
        let db = Arc::new(LedgerDatabase::new(storage));
        let (mut m, _) = master_with(db, &config);
        assert!(m.ensure_sync(l1.clone(), true));
        assert!(m.ensure_sync(l2.clone(), true));
    }

    let storage = Arc::new(Storage::open(&config).unwrap());
    let db = Arc::new(LedgerDatabase::new(storage.clone()));
    let (mut m, _) = master_with(db.clone(), &config);

    assert!(m.load_last_known_ledger());
    assert_eq!(m.last_ledger_hash(), l2.hash());
    assert_eq!(all_rows(&db), expected_rows(&l2));

    let stats = storage.get_stats().unwrap();
    assert!(stats.stored_ledgers >= 1);
}

#[test]
fn test_rocksdb_cleared_pointer_forces_reimport() {
    let dir = TempDir::new().unwrap();
    let config = rocksdb_config(&dir);
    let l1 = genesis((0..5).map(|i| account(&format!("r{}", i), i)).collect());

    {
        let storage = Arc::new(Storage::open(&config).unwrap());
        let db = Arc::new(LedgerDatabase::new(storage));
        let (mut m, _) = master_with(db.clone(), &config);
        assert!(m.ensure_sync(l1.clone(), true));
        // Process dies right after a full import cleared the pointer
        db.set_state(LAST_CLOSED_LEDGER_KEY, "").unwrap();
    }

    let storage = Arc::new(Storage::open(&config).unwrap());
    let db = Arc::new(LedgerDatabase::new(storage));
    let (mut m, detector) = master_with(db.clone(), &config);
    assert!(!m.load_last_known_ledger());

    let report = m.catch_up(CanonicalLedger::from_ledger(l1.clone())).unwrap();
    assert_eq!(report.mode, CatchUpMode::Full);
    assert_eq!(detector.reset_count(), 2);
    assert_eq!(pointer(&db), l1.hash());
    assert_eq!(all_rows(&db), expected_rows(&l1));
}
