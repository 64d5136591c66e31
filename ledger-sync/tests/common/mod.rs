//! Fixtures shared by the integration tests

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use ledger_sync::database::{Backend, Space, WriteOp};
use ledger_sync::projector::EntryProjector;
use ledger_sync::types::{AccountRoot, DirectoryNode, Offer, TrustLine};
use ledger_sync::{
    AccountId, ClosedLedger, Config, Currency, DeadlockDetector, EntryTable, Error, LedgerDatabase,
    LedgerEntry, LedgerKey, LedgerMaster, MemoryBackend, Result, StateMap,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn account(name: &str, balance: i64) -> LedgerEntry {
    LedgerEntry::AccountRoot(AccountRoot {
        account: AccountId::new(name),
        balance,
        sequence: 1,
        owner_count: 0,
        flags: 0,
        inflation_dest: None,
    })
}

pub fn trust_line(a: &str, b: &str, balance: i64) -> LedgerEntry {
    let mut line = TrustLine::between(
        AccountId::new(a),
        AccountId::new(b),
        Currency::from_code("USD").unwrap(),
    );
    line.balance = Decimal::new(balance, 2);
    line.high_limit = Decimal::new(1_000_000, 2);
    LedgerEntry::TrustLine(line)
}

pub fn offer(owner: &str, sequence: u32, drops: i64) -> LedgerEntry {
    LedgerEntry::Offer(Offer {
        account: AccountId::new(owner),
        sequence,
        taker_pays: ledger_sync::types::Amount::Native(drops),
        taker_gets: ledger_sync::types::Amount::Issued {
            currency: Currency::from_code("USD").unwrap(),
            issuer: AccountId::new("gateway"),
            value: Decimal::new(drops, 3),
        },
        expiration: None,
    })
}

pub fn directory(owner: &str, indexes: Vec<LedgerKey>) -> LedgerEntry {
    LedgerEntry::DirectoryNode(DirectoryNode {
        root_index: account(owner, 0).key(),
        page: 0,
        indexes,
    })
}

fn close_time(sequence: u32) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + i64::from(sequence) * 4, 0)
        .single()
        .unwrap()
}

pub fn genesis(entries: Vec<LedgerEntry>) -> Arc<ClosedLedger> {
    Arc::new(ClosedLedger::genesis(StateMap::from_entries(entries), 100_000_000, close_time(1)).unwrap())
}

pub fn next(parent: &ClosedLedger, entries: Vec<LedgerEntry>) -> Arc<ClosedLedger> {
    Arc::new(
        ClosedLedger::close(
            parent,
            StateMap::from_entries(entries),
            close_time(parent.sequence() + 1),
        )
        .unwrap(),
    )
}

/// Successor of `parent` whose state tree is still being acquired
pub fn next_incomplete(parent: &ClosedLedger, entries: Vec<LedgerEntry>) -> Arc<ClosedLedger> {
    let complete = next(parent, entries.clone());
    let mut state = StateMap::from_entries(entries);
    state.mark_missing(ledger_sync::Hash256::from_bytes([0xab; 32]));
    Arc::new(ClosedLedger::from_parts(complete.header().clone(), state).unwrap())
}

pub fn master_with(db: Arc<LedgerDatabase>, config: &Config) -> (LedgerMaster, Arc<DeadlockDetector>) {
    let detector = Arc::new(DeadlockDetector::new(Duration::from_secs(60)));
    (LedgerMaster::new(db, config, detector.clone()), detector)
}

pub fn master(db: Arc<LedgerDatabase>) -> LedgerMaster {
    master_with(db, &Config::default()).0
}

/// Every projected row, per table, in key order
pub fn all_rows(db: &LedgerDatabase) -> Vec<(EntryTable, Vec<(LedgerKey, Vec<u8>)>)> {
    EntryTable::ALL
        .iter()
        .map(|table| (*table, db.rows(*table).unwrap()))
        .collect()
}

/// Rows a from-scratch import of `ledger` produces
pub fn expected_rows(ledger: &ClosedLedger) -> Vec<(EntryTable, Vec<(LedgerKey, Vec<u8>)>)> {
    let db = LedgerDatabase::in_memory();
    let projector = EntryProjector::new(&db);
    ledger
        .state()
        .visit_leaves(|key, entry| projector.store_add(key, entry).map(|_| ()))
        .unwrap();
    all_rows(&db)
}

/// Backend wrapper counting write sets, optionally failing one of them.
///
/// A failed write set is dropped whole, like a process dying before the
/// storage engine acknowledged the batch.
#[derive(Debug)]
pub struct FaultyBackend {
    pub inner: Arc<MemoryBackend>,
    applies: AtomicUsize,
    fail_at: AtomicUsize,
}

impl FaultyBackend {
    pub fn over(inner: Arc<MemoryBackend>) -> Self {
        Self {
            inner,
            applies: AtomicUsize::new(0),
            fail_at: AtomicUsize::new(usize::MAX),
        }
    }

    /// Fail the `n`th write set from now (1-based)
    pub fn fail_after(&self, n: usize) {
        let current = self.applies.load(Ordering::SeqCst);
        self.fail_at.store(current + n, Ordering::SeqCst);
    }

    pub fn applies(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }
}

impl Backend for FaultyBackend {
    fn get(&self, space: Space, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(space, key)
    }

    fn scan(&self, space: Space) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.scan(space)
    }

    fn apply(&self, ops: Vec<WriteOp>) -> Result<()> {
        let n = self.applies.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_at.load(Ordering::SeqCst) {
            return Err(Error::Storage(format!("injected failure at write set {}", n)));
        }
        self.inner.apply(ops)
    }
}
