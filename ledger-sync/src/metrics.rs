//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring ledger synchronization.
//!
//! # Metrics
//!
//! - `ledger_sync_catchups_total{mode}` - Completed catch-ups (incremental / full)
//! - `ledger_sync_entries_projected_total{op}` - Row mutations (add / change / delete)
//! - `ledger_sync_failures_total` - Failed sync or close attempts
//! - `ledger_sync_import_duration_seconds` - Histogram of full import durations
//! - `ledger_sync_last_closed_sequence` - Sequence of the last closed ledger

use crate::projector::Projection;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Completed catch-ups by mode
    pub catchups_total: IntCounterVec,

    /// Row mutations by operation
    pub entries_projected: IntCounterVec,

    /// Failed attempts
    pub failures_total: IntCounter,

    /// Full import duration histogram
    pub import_duration: Histogram,

    /// Last closed ledger sequence
    pub last_closed_sequence: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector on a private registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let catchups_total = IntCounterVec::new(
            Opts::new("ledger_sync_catchups_total", "Completed catch-ups by mode"),
            &["mode"],
        )?;
        registry.register(Box::new(catchups_total.clone()))?;

        let entries_projected = IntCounterVec::new(
            Opts::new(
                "ledger_sync_entries_projected_total",
                "Ledger entry row mutations by operation",
            ),
            &["op"],
        )?;
        registry.register(Box::new(entries_projected.clone()))?;

        let failures_total = IntCounter::new(
            "ledger_sync_failures_total",
            "Failed sync or close attempts",
        )?;
        registry.register(Box::new(failures_total.clone()))?;

        let import_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_sync_import_duration_seconds",
                "Histogram of full import durations",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0]),
        )?;
        registry.register(Box::new(import_duration.clone()))?;

        let last_closed_sequence = IntGauge::new(
            "ledger_sync_last_closed_sequence",
            "Sequence of the last closed ledger",
        )?;
        registry.register(Box::new(last_closed_sequence.clone()))?;

        Ok(Self {
            catchups_total,
            entries_projected,
            failures_total,
            import_duration,
            last_closed_sequence,
            registry,
        })
    }

    /// Record a completed catch-up
    pub fn record_catch_up(&self, mode: &str) {
        self.catchups_total.with_label_values(&[mode]).inc();
    }

    /// Record row mutations
    pub fn record_projected(&self, op: Projection, count: u64) {
        self.entries_projected
            .with_label_values(&[op.as_str()])
            .inc_by(count);
    }

    /// Record a failed attempt
    pub fn record_failure(&self) {
        self.failures_total.inc();
    }

    /// Record full import duration
    pub fn record_import_duration(&self, duration_seconds: f64) {
        self.import_duration.observe(duration_seconds);
    }

    /// Update last closed ledger sequence
    pub fn set_last_closed(&self, sequence: u32) {
        self.last_closed_sequence.set(i64::from(sequence));
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("failures_total", &self.failures_total.get())
            .field("last_closed_sequence", &self.last_closed_sequence.get())
            .finish()
    }
}
