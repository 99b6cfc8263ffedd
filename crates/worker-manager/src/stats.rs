//! Per-outcome task counters
//!
//! Lock-free counters shared by all workers of one manager.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Outcome of processing a single task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Handler returned `Ok`
    Completed,
    /// Handler returned an error or panicked
    Failed,
    /// Handler exceeded the configured timeout
    TimedOut,
}

/// Counters updated by workers
#[derive(Debug, Default)]
pub struct PoolStats {
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    callback_failed: AtomicU64,
}

impl PoolStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one task outcome
    pub fn record(&self, outcome: TaskOutcome) {
        let counter = match outcome {
            TaskOutcome::Completed => &self.completed,
            TaskOutcome::Failed => &self.failed,
            TaskOutcome::TimedOut => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a timeout callback that returned an error or panicked
    pub fn record_callback_failure(&self) {
        self.callback_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            callback_failed: self.callback_failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`PoolStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub callback_failed: u64,
}

impl StatsSnapshot {
    /// Tasks that reached a terminal outcome
    pub fn processed(&self) -> u64 {
        self.completed + self.failed + self.timed_out
    }
}
