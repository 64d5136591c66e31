//! Ledger sync server binary
//!
//! Usage: `ledger-sync [config.toml]`. Without a file, configuration comes
//! from `LEDGER_SYNC_*` environment variables.

use anyhow::Context;
use ledger_sync::{
    spawn_sync_actor, Config, DeadlockDetector, LedgerDatabase, LedgerMaster, Metrics, Storage,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => Config::from_env().context("reading environment")?,
    };

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        data_dir = %config.data_dir.display(),
        "Starting ledger sync server"
    );

    let storage = Arc::new(Storage::open(&config).context("opening storage")?);
    let db = Arc::new(LedgerDatabase::new(storage.clone()));
    let detector = Arc::new(DeadlockDetector::new(Duration::from_secs(
        config.watchdog.stall_threshold_secs,
    )));
    let metrics = Metrics::new().context("registering metrics")?;

    let mut master = LedgerMaster::new(db, &config, detector.clone()).with_metrics(metrics.clone());
    if !master.load_last_known_ledger() {
        tracing::info!("Waiting for a validated ledger to import");
    }

    let (handle, worker) = spawn_sync_actor(master, detector.clone(), config.actor.mailbox_capacity);

    let check_every = Duration::from_secs(config.watchdog.check_interval_secs.max(1));
    let watchdog = tokio::spawn({
        let detector = detector.clone();
        async move {
            let mut ticker = tokio::time::interval(check_every);
            loop {
                ticker.tick().await;
                detector.check();
            }
        }
    });

    let lcl = handle.last_closed_ledger().await?;
    tracing::info!(ledger_hash = %lcl, "Ledger sync server ready");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down ledger sync server");
    handle.shutdown().await?;
    let master = worker.await.context("sync worker panicked")?;
    watchdog.abort();

    match storage.get_stats() {
        Ok(stats) => tracing::info!(?stats, last = %master.last_ledger_hash(), "Storage at shutdown"),
        Err(e) => tracing::warn!(error = %e, "Could not read storage stats"),
    }
    if let Ok(text) = metrics.encode() {
        tracing::debug!("{}", text);
    }
    Ok(())
}
