//! Deadlock detection for the ledger writer
//!
//! The writer resets the detector whenever it makes progress (every handled
//! request, every full-import batch). A monitor task calls
//! [`DeadlockDetector::check`] periodically and reports a stall once no reset
//! has happened for longer than the threshold.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Receiver of liveness signals from long-running work
pub trait LivenessMonitor: Send + Sync {
    /// Signal that the caller is still making progress
    fn reset_deadlock_detector(&self);
}

/// Monotonic-clock deadlock detector
#[derive(Debug)]
pub struct DeadlockDetector {
    origin: Instant,
    last_reset_ms: AtomicU64,
    resets: AtomicU64,
    threshold: Duration,
}

impl DeadlockDetector {
    /// Detector reporting stalls longer than `threshold`
    pub fn new(threshold: Duration) -> Self {
        Self {
            origin: Instant::now(),
            last_reset_ms: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            threshold,
        }
    }

    /// Number of resets so far
    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    /// Time since the last reset (or since creation)
    pub fn since_last_reset(&self) -> Duration {
        let now_ms = self.elapsed_ms();
        let last_ms = self.last_reset_ms.load(Ordering::Relaxed);
        Duration::from_millis(now_ms.saturating_sub(last_ms))
    }

    /// True, with a warning logged, when the writer has been silent past the threshold
    pub fn check(&self) -> bool {
        let silent = self.since_last_reset();
        if silent > self.threshold {
            tracing::warn!(
                silent_secs = silent.as_secs(),
                threshold_secs = self.threshold.as_secs(),
                "Ledger writer may be deadlocked"
            );
            true
        } else {
            false
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl LivenessMonitor for DeadlockDetector {
    fn reset_deadlock_detector(&self) {
        self.last_reset_ms.store(self.elapsed_ms(), Ordering::Relaxed);
        self.resets.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_counts() {
        let detector = DeadlockDetector::new(Duration::from_secs(60));
        assert_eq!(detector.reset_count(), 0);
        detector.reset_deadlock_detector();
        detector.reset_deadlock_detector();
        assert_eq!(detector.reset_count(), 2);
        assert!(!detector.check());
    }

    #[test]
    fn test_stall_detected() {
        let detector = DeadlockDetector::new(Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(20));
        assert!(detector.check());

        detector.reset_deadlock_detector();
        assert!(!detector.check());
    }
}
