//! Single-writer actor around the ledger master
//!
//! All database mutation happens on one blocking worker that owns the
//! [`LedgerMaster`]. Callers hold a cloneable [`SyncHandle`] and talk to the
//! worker over a bounded mailbox.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ SyncHandle (Clone)           │  consensus, RPC, bootstrap
//! └──────────────┬───────────────┘
//!                │ mpsc::channel (bounded)
//!                ▼
//! ┌──────────────────────────────┐
//! │ SyncActor (blocking worker)  │
//! │   LedgerMaster               │──► LedgerDatabase ──► RocksDB
//! └──────────────────────────────┘
//! ```
//!
//! The worker runs on the blocking pool: a full import can take minutes and
//! must not stall the async runtime. It resets the deadlock detector for every
//! message it handles; the import itself resets it per batch.

use crate::ledger::ClosedLedger;
use crate::master::{CatchUpReport, LedgerMaster};
use crate::types::LedgerHash;
use crate::watchdog::LivenessMonitor;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Message sent to the sync actor
#[derive(Debug)]
pub enum SyncMessage {
    /// Bring local state to the given ledger
    EnsureSync {
        /// Target ledger
        ledger: Arc<ClosedLedger>,
        /// Refuse targets with missing state nodes; `None` uses `sync.require_local`
        require_local: Option<bool>,
        /// Whether local state now matches the target
        response: oneshot::Sender<bool>,
    },

    /// Open the ledger close transaction
    BeginClose {
        /// Fails when a transaction is already open
        response: oneshot::Sender<Result<()>>,
    },

    /// Commit a closed ledger inside the open close transaction
    CommitClose {
        /// Successor of the last closed ledger
        ledger: Arc<ClosedLedger>,
        /// What was projected
        response: oneshot::Sender<Result<CatchUpReport>>,
    },

    /// Roll back the open close transaction
    AbortClose {
        /// Fails when no close is open
        response: oneshot::Sender<Result<()>>,
    },

    /// Read the durable last closed ledger pointer
    LastClosed {
        /// Pointer value, zero when none
        response: oneshot::Sender<Result<LedgerHash>>,
    },

    /// Stop the worker
    Shutdown,
}

/// Worker owning the ledger master
pub struct SyncActor {
    master: LedgerMaster,
    mailbox: mpsc::Receiver<SyncMessage>,
    monitor: Arc<dyn LivenessMonitor>,
}

impl std::fmt::Debug for SyncActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncActor")
            .field("master", &self.master)
            .finish()
    }
}

impl SyncActor {
    /// Create new actor
    pub fn new(
        master: LedgerMaster,
        mailbox: mpsc::Receiver<SyncMessage>,
        monitor: Arc<dyn LivenessMonitor>,
    ) -> Self {
        Self {
            master,
            mailbox,
            monitor,
        }
    }

    /// Run until shutdown or until every handle is dropped; returns the master
    pub fn run(mut self) -> LedgerMaster {
        while let Some(msg) = self.mailbox.blocking_recv() {
            self.monitor.reset_deadlock_detector();
            match msg {
                SyncMessage::Shutdown => break,
                msg => self.handle_message(msg),
            }
        }

        if self.master.database().transaction_level() > 0 {
            tracing::warn!("Shutting down with an open ledger close; rolling back");
            if let Err(e) = self.master.abort_close() {
                tracing::error!("Rollback on shutdown failed: {}", e);
            }
        }
        tracing::info!(ledger_hash = %self.master.last_ledger_hash(), "Sync actor stopped");
        self.master
    }

    fn handle_message(&mut self, msg: SyncMessage) {
        // A dropped receiver only means the caller stopped waiting
        match msg {
            SyncMessage::EnsureSync {
                ledger,
                require_local,
                response,
            } => {
                let synced = match require_local {
                    Some(require_local) => self.master.ensure_sync(ledger, require_local),
                    None => self.master.sync_to(ledger),
                };
                let _ = response.send(synced);
            }

            SyncMessage::BeginClose { response } => {
                let _ = response.send(self.master.begin_close());
            }

            SyncMessage::CommitClose { ledger, response } => {
                let _ = response.send(self.master.commit_close(ledger));
            }

            SyncMessage::AbortClose { response } => {
                let _ = response.send(self.master.abort_close());
            }

            SyncMessage::LastClosed { response } => {
                let _ = response.send(self.master.last_closed_ledger_hash());
            }

            SyncMessage::Shutdown => {}
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct SyncHandle {
    sender: mpsc::Sender<SyncMessage>,
}

impl SyncHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<SyncMessage>) -> Self {
        Self { sender }
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> SyncMessage) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Bring local state to `ledger`; `Ok(false)` when the sync did not happen
    pub async fn ensure_sync(&self, ledger: Arc<ClosedLedger>, require_local: bool) -> Result<bool> {
        self.call(|response| SyncMessage::EnsureSync {
            ledger,
            require_local: Some(require_local),
            response,
        })
        .await
    }

    /// Bring local state to `ledger` under the configured `sync.require_local`
    pub async fn sync_to(&self, ledger: Arc<ClosedLedger>) -> Result<bool> {
        self.call(|response| SyncMessage::EnsureSync {
            ledger,
            require_local: None,
            response,
        })
        .await
    }

    /// Open the ledger close transaction
    pub async fn begin_close(&self) -> Result<()> {
        self.call(|response| SyncMessage::BeginClose { response })
            .await?
    }

    /// Commit `ledger` as the next closed ledger
    pub async fn commit_close(&self, ledger: Arc<ClosedLedger>) -> Result<CatchUpReport> {
        self.call(|response| SyncMessage::CommitClose { ledger, response })
            .await?
    }

    /// Roll back the ledger close transaction
    pub async fn abort_close(&self) -> Result<()> {
        self.call(|response| SyncMessage::AbortClose { response })
            .await?
    }

    /// Durable last closed ledger hash (zero when none)
    pub async fn last_closed_ledger(&self) -> Result<LedgerHash> {
        self.call(|response| SyncMessage::LastClosed { response })
            .await?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SyncMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the sync actor on the blocking pool
pub fn spawn_sync_actor(
    master: LedgerMaster,
    monitor: Arc<dyn LivenessMonitor>,
    mailbox_capacity: usize,
) -> (SyncHandle, JoinHandle<LedgerMaster>) {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let actor = SyncActor::new(master, rx, monitor);
    let join = tokio::task::spawn_blocking(move || actor.run());
    (SyncHandle::new(tx), join)
}
