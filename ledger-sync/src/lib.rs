//! Ledger state synchronization
//!
//! Keeps a relational projection of ledger entries (accounts, trust lines,
//! offers) consistent with the canonical, hash-addressed ledger state.
//!
//! # Architecture
//!
//! - **Canonical form**: the last closed ledger, content-addressed by hash
//! - **Delta replay**: advance by the bounded diff between two forms
//! - **Full import**: rebuild every row when no usable diff exists
//! - **Single writer**: one blocking worker owns all database mutation
//!
//! # Invariants
//!
//! - The `LastClosedLedger` pointer only names a ledger whose rows are complete
//! - The in-memory form never runs ahead of committed data
//! - Catch-up is idempotent: syncing to the held ledger writes nothing

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod clf;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod ledger;
pub mod master;
pub mod memory;
pub mod merkle;
pub mod metrics;
pub mod projector;
pub mod state;
pub mod storage;
pub mod types;
pub mod watchdog;

// Re-exports
pub use actor::{spawn_sync_actor, SyncHandle};
pub use clf::CanonicalLedger;
pub use config::Config;
pub use database::{Backend, EntryTable, LedgerDatabase, ScopedTransaction, Space, WriteOp};
pub use error::{Error, Result};
pub use ledger::{ClosedLedger, LedgerHeader};
pub use master::{CatchUpMode, CatchUpReport, LedgerMaster, LAST_CLOSED_LEDGER_KEY};
pub use memory::MemoryBackend;
pub use metrics::Metrics;
pub use state::{DeltaOutcome, NotComparable, StateMap};
pub use storage::Storage;
pub use types::{AccountId, Currency, Hash256, LedgerEntry, LedgerHash, LedgerKey};
pub use watchdog::{DeadlockDetector, LivenessMonitor};
