//! Canonical ledger form
//!
//! The hashable, content-addressed view of a ledger that the ledger master
//! holds and diffs. A form is either the empty sentinel (hash zero, nothing
//! to diff against) or wraps one closed ledger. Forms are immutable; the
//! master replaces its form wholesale on every successful advance.

use crate::database::LedgerDatabase;
use crate::ledger::ClosedLedger;
use crate::state::{Delta, DeltaOutcome, NotComparable};
use crate::types::{Hash256, LedgerEntry, LedgerHash, LedgerKey};
use crate::{Error, Result};
use std::sync::Arc;

/// Canonical ledger form
#[derive(Debug, Clone, Default)]
pub struct CanonicalLedger {
    ledger: Option<Arc<ClosedLedger>>,
}

impl CanonicalLedger {
    /// The "no ledger" sentinel
    pub fn empty() -> Self {
        Self { ledger: None }
    }

    /// Wrap a freshly closed ledger
    pub fn from_ledger(ledger: Arc<ClosedLedger>) -> Self {
        Self {
            ledger: Some(ledger),
        }
    }

    /// Reconstruct a form from the ledger history.
    ///
    /// Returns `Ok(None)` when nothing is stored under `hash`. Stored data that
    /// fails verification is an error.
    pub fn load(db: &LedgerDatabase, hash: &LedgerHash) -> Result<Option<Self>> {
        if hash.is_zero() {
            return Ok(None);
        }
        Ok(db
            .fetch_ledger(hash)?
            .map(|ledger| Self::from_ledger(Arc::new(ledger))))
    }

    /// Content hash; zero for the sentinel
    pub fn hash(&self) -> LedgerHash {
        self.ledger.as_ref().map_or(Hash256::ZERO, |l| l.hash())
    }

    /// Hash of the preceding ledger; zero for the sentinel
    pub fn parent_hash(&self) -> LedgerHash {
        self.ledger.as_ref().map_or(Hash256::ZERO, |l| l.parent_hash())
    }

    /// Sequence of the wrapped ledger; zero for the sentinel
    pub fn sequence(&self) -> u32 {
        self.ledger.as_ref().map_or(0, |l| l.sequence())
    }

    /// True for the sentinel
    pub fn is_empty(&self) -> bool {
        self.ledger.is_none()
    }

    /// The wrapped ledger
    pub fn ledger(&self) -> Option<&Arc<ClosedLedger>> {
        self.ledger.as_ref()
    }

    /// Look up a state leaf
    pub fn entry(&self, key: &LedgerKey) -> Option<&LedgerEntry> {
        self.ledger.as_ref().and_then(|l| l.state().get(key))
    }

    /// Leaves that changed between `older` and this form, bounded by `max_changes`.
    ///
    /// Never fails: anything that prevents a correct, cheap diff is reported as
    /// [`DeltaOutcome::NotComparable`] and callers fall back to a full import.
    pub fn delta_since(&self, older: &CanonicalLedger, max_changes: usize) -> DeltaOutcome {
        match (&self.ledger, &older.ledger) {
            (Some(new), Some(old)) => new.state().compare(old.state(), max_changes),
            _ => DeltaOutcome::NotComparable(NotComparable::Sentinel),
        }
    }

    /// Visit every leaf of the wrapped ledger in key order
    pub fn visit_entries<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(&LedgerKey, &LedgerEntry) -> Result<()>,
    {
        match &self.ledger {
            Some(ledger) => ledger.state().visit_leaves(f),
            None => Ok(()),
        }
    }

    /// Persist header and history for this form, replacing what was stored.
    /// Must run inside an open transaction.
    pub fn save(&self, db: &LedgerDatabase) -> Result<()> {
        db.store_ledger(self.saveable(db)?)
    }

    /// Persist this form as `older` advanced by `delta`. Only the changed
    /// leaves are written. Must run inside an open transaction.
    pub fn save_delta(&self, db: &LedgerDatabase, older: &CanonicalLedger, delta: &Delta) -> Result<()> {
        let ledger = self.saveable(db)?;
        db.store_ledger_delta(&older.hash(), ledger, delta)
    }

    fn saveable(&self, db: &LedgerDatabase) -> Result<&ClosedLedger> {
        if db.transaction_level() == 0 {
            return Err(Error::Transaction(
                "ledger form saved outside a transaction".to_string(),
            ));
        }
        self.ledger
            .as_deref()
            .ok_or_else(|| Error::InvariantViolation("cannot save the empty ledger form".to_string()))
    }
}
