//! Ledger database
//!
//! Transaction scoping, the key/value state table, ledger-entry rows and the
//! ledger history, layered over a [`Backend`] that only needs point reads,
//! scans and atomic application of a write set.
//!
//! # Transactions
//!
//! - `begin_transaction` pushes one level; `end_transaction` pops one
//! - Only the outermost commit applies the buffered writes, atomically
//! - A rollback at any level makes the whole transaction rollback-only
//! - Writes issued with no open transaction apply immediately
//! - Reads observe committed data only

use crate::crypto::hash_leaf;
use crate::ledger::{ClosedLedger, LedgerHeader};
use crate::memory::MemoryBackend;
use crate::state::{Delta, StateMap};
use crate::types::{Hash256, LedgerEntry, LedgerHash, LedgerKey};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Keyed storage spaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Space {
    /// Small key/value state table
    State,
    /// Account rows
    Accounts,
    /// Trust line rows
    TrustLines,
    /// Offer rows
    Offers,
    /// Header of the last closed ledger, by ledger hash
    Headers,
    /// Leaf index of the last closed ledger: leaf key to leaf hash
    Ledgers,
    /// Leaf bodies of the last closed ledger, by leaf hash
    Nodes,
}

impl Space {
    /// Every space, in column family order
    pub const ALL: [Space; 7] = [
        Space::State,
        Space::Accounts,
        Space::TrustLines,
        Space::Offers,
        Space::Headers,
        Space::Ledgers,
        Space::Nodes,
    ];

    /// Stable name (RocksDB column family)
    pub fn name(&self) -> &'static str {
        match self {
            Space::State => "state",
            Space::Accounts => "accounts",
            Space::TrustLines => "trust_lines",
            Space::Offers => "offers",
            Space::Headers => "headers",
            Space::Ledgers => "ledgers",
            Space::Nodes => "nodes",
        }
    }
}

/// Row tables written by the entry projector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryTable {
    /// One row per account
    Accounts,
    /// One row per trust line
    TrustLines,
    /// One row per offer
    Offers,
}

impl EntryTable {
    /// Every row table
    pub const ALL: [EntryTable; 3] = [EntryTable::Accounts, EntryTable::TrustLines, EntryTable::Offers];

    /// Backing space
    pub fn space(&self) -> Space {
        match self {
            EntryTable::Accounts => Space::Accounts,
            EntryTable::TrustLines => Space::TrustLines,
            EntryTable::Offers => Space::Offers,
        }
    }
}

/// A single buffered mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert or overwrite
    Put {
        /// Target space
        space: Space,
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// Remove one key
    Delete {
        /// Target space
        space: Space,
        /// Key
        key: Vec<u8>,
    },
    /// Remove every key in a space
    Clear {
        /// Target space
        space: Space,
    },
}

/// Storage engine underneath the ledger database
pub trait Backend: Send + Sync {
    /// Point read
    fn get(&self, space: Space, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All pairs of a space in key order
    fn scan(&self, space: Space) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Apply `ops` in order, atomically
    fn apply(&self, ops: Vec<WriteOp>) -> Result<()>;
}

#[derive(Debug, Default)]
struct TxState {
    depth: usize,
    rollback_only: bool,
    pending: Vec<WriteOp>,
}

/// Transaction-scoped ledger database
pub struct LedgerDatabase {
    backend: Arc<dyn Backend>,
    tx: Mutex<TxState>,
}

impl LedgerDatabase {
    /// Wrap a backend
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            tx: Mutex::new(TxState::default()),
        }
    }

    /// Database over a fresh in-memory backend
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    // Transactions

    /// Open a (possibly nested) transaction and return the new depth
    pub fn begin_transaction(&self) -> usize {
        let mut tx = self.tx.lock();
        tx.depth += 1;
        tx.depth
    }

    /// Close the innermost transaction.
    ///
    /// Committing the outermost level applies all buffered writes atomically;
    /// it fails if any nested level rolled back.
    pub fn end_transaction(&self, commit: bool) -> Result<()> {
        let mut tx = self.tx.lock();
        if tx.depth == 0 {
            return Err(Error::Transaction("no open transaction".to_string()));
        }
        tx.depth -= 1;

        if !commit {
            tx.rollback_only = true;
        }
        if tx.depth > 0 {
            return Ok(());
        }

        let ops = std::mem::take(&mut tx.pending);
        let rollback_only = std::mem::replace(&mut tx.rollback_only, false);

        if !commit {
            tracing::debug!(discarded = ops.len(), "Transaction rolled back");
            return Ok(());
        }
        if rollback_only {
            return Err(Error::Transaction(
                "nested transaction rolled back; commit refused".to_string(),
            ));
        }

        let count = ops.len();
        self.backend.apply(ops)?;
        tracing::debug!(writes = count, "Transaction committed");
        Ok(())
    }

    /// Current nesting depth (0 when no transaction is open)
    pub fn transaction_level(&self) -> usize {
        self.tx.lock().depth
    }

    /// Fail unless the nesting depth is exactly `level`
    pub fn expect_level(&self, level: usize) -> Result<()> {
        let depth = self.transaction_level();
        if depth == level {
            Ok(())
        } else {
            Err(Error::Transaction(format!(
                "expected transaction level {}, found {}",
                level, depth
            )))
        }
    }

    fn write(&self, op: WriteOp) -> Result<()> {
        let mut tx = self.tx.lock();
        if tx.depth > 0 {
            tx.pending.push(op);
            Ok(())
        } else {
            drop(tx);
            self.backend.apply(vec![op])
        }
    }

    // State table

    /// Read a state value; absent keys read as the empty string
    pub fn get_state(&self, key: &str) -> Result<String> {
        match self.backend.get(Space::State, key.as_bytes())? {
            Some(value) => String::from_utf8(value)
                .map_err(|e| Error::Corrupt(format!("state {} is not UTF-8: {}", key, e))),
            None => Ok(String::new()),
        }
    }

    /// Write a state value
    pub fn set_state(&self, key: &str, value: &str) -> Result<()> {
        self.write(WriteOp::Put {
            space: Space::State,
            key: key.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
        })
    }

    // Entry rows

    /// Insert or replace a row
    pub fn put_row(&self, table: EntryTable, key: &LedgerKey, row: Vec<u8>) -> Result<()> {
        self.write(WriteOp::Put {
            space: table.space(),
            key: key.as_bytes().to_vec(),
            value: row,
        })
    }

    /// Remove a row
    pub fn delete_row(&self, table: EntryTable, key: &LedgerKey) -> Result<()> {
        self.write(WriteOp::Delete {
            space: table.space(),
            key: key.as_bytes().to_vec(),
        })
    }

    /// Read a row
    pub fn get_row(&self, table: EntryTable, key: &LedgerKey) -> Result<Option<Vec<u8>>> {
        self.backend.get(table.space(), key.as_bytes())
    }

    /// All rows of a table in key order
    pub fn rows(&self, table: EntryTable) -> Result<Vec<(LedgerKey, Vec<u8>)>> {
        let mut rows = Vec::new();
        for (key, row) in self.backend.scan(table.space())? {
            rows.push((decode_hash(&key)?, row));
        }
        Ok(rows)
    }

    /// Remove every row of a table
    pub fn clear_rows(&self, table: EntryTable) -> Result<()> {
        self.write(WriteOp::Clear {
            space: table.space(),
        })
    }

    // Ledger history

    /// Replace the stored history with `ledger`: header, leaf index and leaf bodies.
    ///
    /// Only the last closed ledger is kept; whatever was stored before is cleared
    /// in the same write set.
    pub fn store_ledger(&self, ledger: &ClosedLedger) -> Result<()> {
        let index = ledger.state().leaf_hashes()?;
        for space in [Space::Headers, Space::Ledgers, Space::Nodes] {
            self.write(WriteOp::Clear { space })?;
        }

        for (key, leaf_hash) in &index {
            let entry = ledger.state().get(key).ok_or_else(|| {
                Error::InvariantViolation(format!("leaf {} indexed but absent", key))
            })?;
            self.put_leaf(key, leaf_hash, entry)?;
        }
        self.put_header(ledger)?;

        tracing::debug!(
            ledger_hash = %ledger.hash(),
            sequence = ledger.sequence(),
            leaves = index.len(),
            "Ledger stored"
        );
        Ok(())
    }

    /// Advance the stored history from `previous` to `ledger`, touching only
    /// the leaves in `delta`
    pub fn store_ledger_delta(
        &self,
        previous: &LedgerHash,
        ledger: &ClosedLedger,
        delta: &Delta,
    ) -> Result<()> {
        for (key, item) in delta {
            if let Some(old) = &item.old {
                self.write(WriteOp::Delete {
                    space: Space::Nodes,
                    key: hash_leaf(key, old)?.as_bytes().to_vec(),
                })?;
            }
            match &item.new {
                Some(new) => self.put_leaf(key, &hash_leaf(key, new)?, new)?,
                None => self.write(WriteOp::Delete {
                    space: Space::Ledgers,
                    key: key.as_bytes().to_vec(),
                })?,
            }
        }

        self.write(WriteOp::Delete {
            space: Space::Headers,
            key: previous.as_bytes().to_vec(),
        })?;
        self.put_header(ledger)?;

        tracing::debug!(
            ledger_hash = %ledger.hash(),
            sequence = ledger.sequence(),
            changed = delta.len(),
            "Ledger delta stored"
        );
        Ok(())
    }

    fn put_leaf(&self, key: &LedgerKey, leaf_hash: &Hash256, entry: &LedgerEntry) -> Result<()> {
        self.write(WriteOp::Put {
            space: Space::Nodes,
            key: leaf_hash.as_bytes().to_vec(),
            value: bincode::serialize(entry)?,
        })?;
        self.write(WriteOp::Put {
            space: Space::Ledgers,
            key: key.as_bytes().to_vec(),
            value: leaf_hash.as_bytes().to_vec(),
        })
    }

    fn put_header(&self, ledger: &ClosedLedger) -> Result<()> {
        self.write(WriteOp::Put {
            space: Space::Headers,
            key: ledger.hash().as_bytes().to_vec(),
            value: bincode::serialize(ledger.header())?,
        })
    }

    /// Read a ledger header
    pub fn fetch_header(&self, hash: &LedgerHash) -> Result<Option<LedgerHeader>> {
        match self.backend.get(Space::Headers, hash.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Rebuild a stored ledger.
    ///
    /// `Ok(None)` when no header is stored under `hash`; an error when the
    /// stored data is incomplete or fails hash verification.
    pub fn fetch_ledger(&self, hash: &LedgerHash) -> Result<Option<ClosedLedger>> {
        let Some(header) = self.fetch_header(hash)? else {
            return Ok(None);
        };

        let mut state = StateMap::new();
        for (key, leaf_hash) in self.backend.scan(Space::Ledgers)? {
            let key = decode_hash(&key)?;
            let leaf_hash = decode_hash(&leaf_hash)?;
            let body = self
                .backend
                .get(Space::Nodes, leaf_hash.as_bytes())?
                .ok_or_else(|| Error::Corrupt(format!("leaf node {} missing", leaf_hash)))?;
            let entry: LedgerEntry = bincode::deserialize(&body)?;
            if entry.key() != key || hash_leaf(&key, &entry)? != leaf_hash {
                return Err(Error::Corrupt(format!("leaf node {} fails verification", leaf_hash)));
            }
            state.insert(entry);
        }

        let ledger = ClosedLedger::from_parts(header, state)?;
        if ledger.hash() != *hash {
            return Err(Error::Corrupt(format!(
                "ledger stored under {} hashes to {}",
                hash,
                ledger.hash()
            )));
        }
        Ok(Some(ledger))
    }
}

impl std::fmt::Debug for LedgerDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerDatabase")
            .field("transaction_level", &self.transaction_level())
            .finish()
    }
}

fn decode_hash(bytes: &[u8]) -> Result<Hash256> {
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::Corrupt(format!("row key of {} bytes", bytes.len())))?;
    Ok(Hash256::from_bytes(bytes))
}

/// Transaction that rolls back when dropped without a commit
#[derive(Debug)]
pub struct ScopedTransaction<'a> {
    db: &'a LedgerDatabase,
    active: bool,
}

impl<'a> ScopedTransaction<'a> {
    /// Open a transaction on `db`
    pub fn begin(db: &'a LedgerDatabase) -> Self {
        db.begin_transaction();
        Self { db, active: true }
    }

    /// Commit and end the scope
    pub fn commit(&mut self) -> Result<()> {
        self.finish(true)
    }

    /// Roll back and end the scope
    pub fn rollback(&mut self) -> Result<()> {
        self.finish(false)
    }

    /// Open a fresh transaction after a commit (batch boundary)
    pub fn reopen(&mut self) -> Result<()> {
        if self.active {
            return Err(Error::Transaction("scope is still open".to_string()));
        }
        self.db.begin_transaction();
        self.active = true;
        Ok(())
    }

    fn finish(&mut self, commit: bool) -> Result<()> {
        if !self.active {
            return Err(Error::Transaction("scope already ended".to_string()));
        }
        self.active = false;
        self.db.end_transaction(commit)
    }
}

impl Drop for ScopedTransaction<'_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.db.end_transaction(false) {
                tracing::error!("Rollback on scope exit failed: {}", e);
            }
        }
    }
}
