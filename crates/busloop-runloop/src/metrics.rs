//! Loop lifecycle metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

/// Lifetime counters for one [`BusLoop`](crate::BusLoop).
#[derive(Debug, Default)]
pub struct LoopMetrics {
    /// Operations announced with `operation_started`.
    pub operations_started: AtomicU64,

    /// Operations accounted with `operation_completed`.
    pub operations_completed: AtomicU64,

    /// Quit requests issued to the loop.
    pub quit_requests: AtomicU64,

    /// When the loop was confirmed live.
    started_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
}

impl LoopMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mark_start(&self) {
        *self.started_at.write() = Some(Utc::now());
    }

    pub(crate) fn record_started(&self) {
        self.operations_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.operations_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_quit(&self) {
        self.quit_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of the metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started_at: *self.started_at.read(),
            operations_started: self.operations_started.load(Ordering::Relaxed),
            operations_completed: self.operations_completed.load(Ordering::Relaxed),
            quit_requests: self.quit_requests.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub started_at: Option<DateTime<Utc>>,
    pub operations_started: u64,
    pub operations_completed: u64,
    pub quit_requests: u64,
}

impl MetricsSnapshot {
    /// Operations started but not yet completed when the snapshot was taken.
    pub fn in_flight(&self) -> u64 {
        self.operations_started
            .saturating_sub(self.operations_completed)
    }
}
