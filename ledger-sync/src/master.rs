//! Ledger master
//!
//! Owns the canonical form of the last closed ledger and keeps the ledger
//! database in step with it.
//!
//! # Catch-up
//!
//! - Held form is the sentinel, or the delta cannot be computed: full import
//! - Otherwise: replay the delta inside one transaction
//!
//! # Durability
//!
//! The `LastClosedLedger` state key always names a ledger whose full leaf set
//! is present in the row tables:
//!
//! - Incremental path: rows, header and pointer are committed in one write set
//! - Full path: the pointer is cleared before any row is touched and only set
//!   again in the final import batch; a crash in between leaves it empty and
//!   the next start reimports from scratch
//! - The in-memory form is published only at transaction depth 0, after commit

use crate::clf::CanonicalLedger;
use crate::config::Config;
use crate::database::{LedgerDatabase, ScopedTransaction};
use crate::ledger::ClosedLedger;
use crate::metrics::Metrics;
use crate::projector::{EntryProjector, Projection};
use crate::state::{Delta, DeltaKind, DeltaOutcome};
use crate::types::LedgerHash;
use crate::watchdog::LivenessMonitor;
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// State table key holding the last closed ledger hash (hex; empty means none)
pub const LAST_CLOSED_LEDGER_KEY: &str = "LastClosedLedger";

/// How a catch-up was carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchUpMode {
    /// Delta replay
    Incremental,
    /// Every row rebuilt from the full leaf set
    Full,
}

impl CatchUpMode {
    /// Label
    pub fn as_str(&self) -> &'static str {
        match self {
            CatchUpMode::Incremental => "incremental",
            CatchUpMode::Full => "full",
        }
    }
}

impl fmt::Display for CatchUpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful catch-up or close
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchUpReport {
    /// Path taken
    pub mode: CatchUpMode,
    /// Ledger now held
    pub ledger_hash: LedgerHash,
    /// Leaves projected as added
    pub added: u64,
    /// Leaves projected as changed
    pub changed: u64,
    /// Leaves projected as deleted
    pub deleted: u64,
    /// Leaves written by a full import
    pub imported: u64,
}

impl CatchUpReport {
    fn new(mode: CatchUpMode, ledger_hash: LedgerHash) -> Self {
        Self {
            mode,
            ledger_hash,
            added: 0,
            changed: 0,
            deleted: 0,
            imported: 0,
        }
    }
}

/// Synchronization orchestrator for the ledger database
pub struct LedgerMaster {
    db: Arc<LedgerDatabase>,
    max_delta_entries: usize,
    require_local: bool,
    import_batch_size: usize,
    monitor: Arc<dyn LivenessMonitor>,
    metrics: Option<Metrics>,
    current: CanonicalLedger,
    last_ledger_hash: LedgerHash,
    caught_up: bool,
}

impl LedgerMaster {
    /// Create a master holding the sentinel form
    pub fn new(db: Arc<LedgerDatabase>, config: &Config, monitor: Arc<dyn LivenessMonitor>) -> Self {
        Self {
            db,
            max_delta_entries: config.sync.max_delta_entries,
            require_local: config.sync.require_local,
            import_batch_size: config.import.batch_size.max(1),
            monitor,
            metrics: None,
            current: CanonicalLedger::empty(),
            last_ledger_hash: LedgerHash::ZERO,
            caught_up: false,
        }
    }

    /// Attach a metrics collector
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Drop the held form; the next catch-up is a full import
    pub fn reset(&mut self) {
        self.current = CanonicalLedger::empty();
        self.last_ledger_hash = LedgerHash::ZERO;
    }

    /// Held form
    pub fn current(&self) -> &CanonicalLedger {
        &self.current
    }

    /// Hash of the held form
    pub fn last_ledger_hash(&self) -> LedgerHash {
        self.last_ledger_hash
    }

    /// True once the last `ensure_sync` or `commit_close` succeeded
    pub fn is_caught_up(&self) -> bool {
        self.caught_up
    }

    /// Underlying database
    pub fn database(&self) -> &Arc<LedgerDatabase> {
        &self.db
    }

    /// Durable last closed ledger pointer
    pub fn last_closed_ledger_hash(&self) -> Result<LedgerHash> {
        self.db.get_state(LAST_CLOSED_LEDGER_KEY)?.parse()
    }

    /// Restore the held form from the durable pointer.
    ///
    /// Anything short of a fully verified ledger (no pointer, ledger absent
    /// from history, corrupt history) resets to the sentinel. Returns whether
    /// a ledger was restored.
    pub fn load_last_known_ledger(&mut self) -> bool {
        let hash = match self.last_closed_ledger_hash() {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable last closed ledger pointer");
                self.reset();
                return false;
            }
        };

        if hash.is_zero() {
            tracing::info!("No last closed ledger; full import required");
            self.reset();
            return false;
        }

        match CanonicalLedger::load(&self.db, &hash) {
            Ok(Some(clf)) => {
                tracing::info!(ledger_hash = %hash, sequence = clf.sequence(), "Restored last closed ledger");
                if let Some(metrics) = &self.metrics {
                    metrics.set_last_closed(clf.sequence());
                }
                self.current = clf;
                self.last_ledger_hash = hash;
                true
            }
            Ok(None) => {
                tracing::warn!(ledger_hash = %hash, "Last closed ledger not in history");
                self.reset();
                false
            }
            Err(e) => {
                tracing::warn!(ledger_hash = %hash, error = %e, "Could not load last closed ledger");
                self.reset();
                false
            }
        }
    }

    /// Make local state match `target`.
    ///
    /// With `require_local`, a target whose state tree still has missing nodes
    /// is refused without touching the database. Returns whether local state
    /// now matches the target.
    pub fn ensure_sync(&mut self, target: Arc<ClosedLedger>, require_local: bool) -> bool {
        if target.hash() == self.last_ledger_hash {
            self.caught_up = true;
            return true;
        }

        if require_local {
            let needed = target.needed_state_hashes(1);
            if !needed.is_empty() {
                tracing::info!(
                    ledger_hash = %target.hash(),
                    sequence = target.sequence(),
                    "State nodes missing locally; not syncing"
                );
                self.caught_up = false;
                return false;
            }
        }

        match self.catch_up(CanonicalLedger::from_ledger(target)) {
            Ok(_) => {
                self.caught_up = true;
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not catch up; database error");
                if let Some(metrics) = &self.metrics {
                    metrics.record_failure();
                }
                self.caught_up = false;
                false
            }
        }
    }

    /// [`ensure_sync`](Self::ensure_sync) with the configured `sync.require_local`
    pub fn sync_to(&mut self, target: Arc<ClosedLedger>) -> bool {
        self.ensure_sync(target, self.require_local)
    }

    /// Advance the database and held form to `candidate`
    pub fn catch_up(&mut self, candidate: CanonicalLedger) -> Result<CatchUpReport> {
        self.db.expect_level(0)?;
        if candidate.is_empty() {
            return Err(Error::InvariantViolation(
                "cannot catch up to the empty ledger form".to_string(),
            ));
        }

        tracing::info!(
            from = %self.current.hash(),
            to = %candidate.hash(),
            "Catching up"
        );

        let delta = if self.current.is_empty() {
            None
        } else {
            match candidate.delta_since(&self.current, self.max_delta_entries) {
                DeltaOutcome::Computed(delta) => Some(delta),
                DeltaOutcome::NotComparable(reason) => {
                    tracing::warn!(%reason, "Could not compute delta");
                    None
                }
            }
        };

        let report = match delta {
            Some(delta) => self.apply_delta(candidate, &delta)?,
            None => self.import_ledger_state(candidate)?,
        };

        tracing::info!(
            ledger_hash = %report.ledger_hash,
            mode = %report.mode,
            "Done catching up"
        );
        Ok(report)
    }

    fn apply_delta(&mut self, candidate: CanonicalLedger, delta: &Delta) -> Result<CatchUpReport> {
        let mut report = CatchUpReport::new(CatchUpMode::Incremental, candidate.hash());
        {
            let mut tx = ScopedTransaction::begin(&self.db);
            self.db.expect_level(1)?;
            self.project_delta(delta, &mut report)?;
            self.update_db_from_delta(&candidate, delta)?;
            tx.commit()?;
        }

        self.set_last_closed_ledger(candidate)?;
        self.record(&report);
        Ok(report)
    }

    fn project_delta(&self, delta: &Delta, report: &mut CatchUpReport) -> Result<()> {
        let projector = EntryProjector::new(&self.db);
        for (key, item) in delta {
            match (item.kind(), item.new.as_ref(), item.old.as_ref()) {
                (Some(DeltaKind::Changed), Some(new), _) => {
                    projector.store_change(key, new)?;
                    report.changed += 1;
                }
                (Some(DeltaKind::Added), Some(new), _) => {
                    projector.store_add(key, new)?;
                    report.added += 1;
                }
                (Some(DeltaKind::Deleted), _, Some(old)) => {
                    projector.store_delete(key, old)?;
                    report.deleted += 1;
                }
                _ => {
                    return Err(Error::InvariantViolation(format!(
                        "delta leaf {} absent from both ledgers",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    fn import_ledger_state(&mut self, candidate: CanonicalLedger) -> Result<CatchUpReport> {
        let hash = candidate.hash();
        tracing::info!(ledger_hash = %hash, "Importing full ledger");

        let target = match CanonicalLedger::load(&self.db, &hash) {
            Ok(Some(stored)) => stored,
            Ok(None) => candidate,
            Err(e) => {
                tracing::warn!(ledger_hash = %hash, error = %e, "Stored copy unusable; importing candidate");
                candidate
            }
        };

        if let Some(ledger) = target.ledger() {
            if !ledger.state().is_complete() {
                return Err(Error::IncompleteState(format!(
                    "ledger {} has missing state nodes",
                    hash
                )));
            }
        }

        // Invalidate the last closed ledger: rows are about to be destroyed
        self.db.set_state(LAST_CLOSED_LEDGER_KEY, "")?;

        let started = Instant::now();
        match self.import_rows(&target, started) {
            Ok(report) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_import_duration(started.elapsed().as_secs_f64());
                }
                self.set_last_closed_ledger(target)?;
                self.record(&report);
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(ledger_hash = %hash, error = %e, "Could not import state");
                // Durable pointer is empty; match what a restart would see
                self.reset();
                Err(e)
            }
        }
    }

    fn import_rows(&self, target: &CanonicalLedger, started: Instant) -> Result<CatchUpReport> {
        let projector = EntryProjector::new(&self.db);
        projector.drop_all()?;

        let mut report = CatchUpReport::new(CatchUpMode::Full, target.hash());
        let mut tx = ScopedTransaction::begin(&self.db);
        self.db.expect_level(1)?;

        let mut in_batch = 0usize;
        target.visit_entries(|key, entry| {
            projector.store_add(key, entry)?;
            report.imported += 1;
            in_batch += 1;

            if in_batch >= self.import_batch_size {
                tx.commit()?;
                tx.reopen()?;
                in_batch = 0;

                let elapsed = started.elapsed().as_secs().max(1);
                tracing::info!(
                    imported = report.imported,
                    rate = report.imported / elapsed,
                    "Imported batch"
                );
                self.monitor.reset_deadlock_detector();
            }
            Ok(())
        })?;

        tracing::info!(imported = report.imported, "Imported all items");

        self.update_db_from_ledger(target)?;
        tx.commit()?;
        Ok(report)
    }

    /// Record `clf` as last closed in the open transaction: pointer plus a
    /// full rewrite of the stored history
    fn update_db_from_ledger(&self, clf: &CanonicalLedger) -> Result<()> {
        self.db
            .set_state(LAST_CLOSED_LEDGER_KEY, &clf.hash().to_state_string())?;
        clf.save(&self.db)
    }

    /// Record `clf` as last closed in the open transaction, advancing the
    /// stored history of the held form by `delta`
    fn update_db_from_delta(&self, clf: &CanonicalLedger, delta: &Delta) -> Result<()> {
        self.db
            .set_state(LAST_CLOSED_LEDGER_KEY, &clf.hash().to_state_string())?;
        clf.save_delta(&self.db, &self.current, delta)
    }

    /// Publish `clf` as the held form. Only valid outside transactions, so the
    /// held form always reflects what is on disk.
    fn set_last_closed_ledger(&mut self, clf: CanonicalLedger) -> Result<()> {
        self.db.expect_level(0)?;
        // Same read a restart performs
        let durable = self.last_closed_ledger_hash()?;
        if durable != clf.hash() {
            return Err(Error::InvariantViolation(format!(
                "committed pointer {} does not name ledger {}",
                durable,
                clf.hash()
            )));
        }
        self.last_ledger_hash = clf.hash();
        if let Some(metrics) = &self.metrics {
            metrics.set_last_closed(clf.sequence());
        }
        tracing::info!(
            ledger_hash = %self.last_ledger_hash,
            sequence = clf.sequence(),
            "Store at"
        );
        self.current = clf;
        Ok(())
    }

    fn record(&self, report: &CatchUpReport) {
        if let Some(metrics) = &self.metrics {
            metrics.record_catch_up(report.mode.as_str());
            metrics.record_projected(Projection::Add, report.added + report.imported);
            metrics.record_projected(Projection::Change, report.changed);
            metrics.record_projected(Projection::Delete, report.deleted);
        }
    }

    // Ledger close

    /// Open the top-level transaction for a ledger close
    ///
    /// Refused while any transaction is open, including a close already in
    /// progress; the open transaction is left untouched.
    pub fn begin_close(&mut self) -> Result<()> {
        let depth = self.db.transaction_level();
        if depth != 0 {
            return Err(Error::Transaction(format!(
                "ledger close must open a top-level transaction, depth was {}",
                depth
            )));
        }
        self.db.begin_transaction();
        Ok(())
    }

    /// Project, persist and commit `ledger` as the successor of the held form.
    ///
    /// A ledger that does not chain from the held form is refused and the
    /// close transaction rolled back; nothing durable changes.
    pub fn commit_close(&mut self, ledger: Arc<ClosedLedger>) -> Result<CatchUpReport> {
        self.db.expect_level(1)?;

        if ledger.parent_hash() != self.last_ledger_hash {
            tracing::error!(
                expected = %self.last_ledger_hash,
                found = %ledger.parent_hash(),
                sequence = ledger.sequence(),
                "commit_close: ledger does not chain from last closed ledger"
            );
            self.abort_close()?;
            if let Some(metrics) = &self.metrics {
                metrics.record_failure();
            }
            return Err(Error::ChainMismatch {
                expected: self.last_ledger_hash,
                found: ledger.parent_hash(),
            });
        }

        let candidate = CanonicalLedger::from_ledger(ledger);
        let report = match self.project_close(&candidate) {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "commit_close: could not update database");
                self.abort_close()?;
                if let Some(metrics) = &self.metrics {
                    metrics.record_failure();
                }
                return Err(e);
            }
        };

        if let Err(e) = self.db.end_transaction(true) {
            tracing::error!(error = %e, "commit_close: could not commit");
            if let Some(metrics) = &self.metrics {
                metrics.record_failure();
            }
            return Err(e);
        }

        self.set_last_closed_ledger(candidate)?;
        self.record(&report);
        self.caught_up = true;
        Ok(report)
    }

    fn project_close(&self, candidate: &CanonicalLedger) -> Result<CatchUpReport> {
        match candidate.delta_since(&self.current, self.max_delta_entries) {
            DeltaOutcome::Computed(delta) => {
                let mut report = CatchUpReport::new(CatchUpMode::Incremental, candidate.hash());
                self.project_delta(&delta, &mut report)?;
                self.update_db_from_delta(candidate, &delta)?;
                Ok(report)
            }
            DeltaOutcome::NotComparable(reason) => {
                tracing::debug!(%reason, "Close without delta; rewriting all rows");
                // Clear and rewrite inside the close transaction: one atomic write set
                let projector = EntryProjector::new(&self.db);
                projector.drop_all()?;
                let mut report = CatchUpReport::new(CatchUpMode::Full, candidate.hash());
                candidate.visit_entries(|key, entry| {
                    projector.store_add(key, entry)?;
                    report.imported += 1;
                    Ok(())
                })?;
                self.update_db_from_ledger(candidate)?;
                Ok(report)
            }
        }
    }

    /// Roll back the close transaction
    pub fn abort_close(&mut self) -> Result<()> {
        self.db.end_transaction(false)
    }
}

impl fmt::Debug for LedgerMaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerMaster")
            .field("last_ledger_hash", &self.last_ledger_hash)
            .field("sequence", &self.current.sequence())
            .field("caught_up", &self.caught_up)
            .finish()
    }
}
