//! Scheduler metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};

/// Scheduler counters.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    /// Tasks accepted by `schedule`.
    pub scheduled: AtomicU64,

    /// Completed runs, successful or not.
    pub executions: AtomicU64,

    /// Runs that returned an error or panicked.
    pub failures: AtomicU64,

    /// Tasks cancelled through a handle or by `stop`.
    pub cancelled: AtomicU64,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_execution(&self, failed: bool) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters plus queue gauges.
    pub fn snapshot(&self, pending: usize, active: usize) -> SchedulerMetricsSnapshot {
        SchedulerMetricsSnapshot {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            executions: self.executions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            pending,
            active,
        }
    }
}

/// Snapshot of [`SchedulerMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerMetricsSnapshot {
    pub scheduled: u64,
    pub executions: u64,
    pub failures: u64,
    pub cancelled: u64,
    /// Tasks waiting in the delay queue.
    pub pending: usize,
    /// Tasks currently executing.
    pub active: usize,
}
