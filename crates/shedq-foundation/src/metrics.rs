//! Queue Metrics
//!
//! Monotonic counters describing what happened to inserted requests.
//!
//! The queue records every counter while holding its lock, so a request is
//! always counted as inserted before it is counted as dequeued or shed.
//! [`QueueMetrics::snapshot`] reads the outcomes before `inserted`, which keeps
//! `inserted >= dequeued + shed_total` in every snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters owned by a queue
#[derive(Debug, Default)]
pub struct QueueMetrics {
    /// Requests accepted by `insert`
    inserted: AtomicU64,
    /// Requests handed out by `remove`
    dequeued: AtomicU64,
    /// Requests shed because their context had terminated
    shed_terminated: AtomicU64,
    /// Requests shed because they were projected to miss their deadline
    shed_deadline: AtomicU64,
    /// Shed passes that evicted at least one request
    evicting_passes: AtomicU64,
}

impl QueueMetrics {
    /// Create new metrics
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_insert(&self) {
        self.inserted.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn record_dequeue(&self) {
        self.dequeued.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn record_shed(&self, terminated: usize, missed_deadline: usize) {
        if terminated == 0 && missed_deadline == 0 {
            return;
        }
        self.shed_terminated
            .fetch_add(terminated as u64, Ordering::Release);
        self.shed_deadline
            .fetch_add(missed_deadline as u64, Ordering::Release);
        self.evicting_passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time copy of the counters
    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        let dequeued = self.dequeued.load(Ordering::Acquire);
        let shed_terminated = self.shed_terminated.load(Ordering::Acquire);
        let shed_deadline = self.shed_deadline.load(Ordering::Acquire);
        let evicting_passes = self.evicting_passes.load(Ordering::Relaxed);
        QueueMetricsSnapshot {
            inserted: self.inserted.load(Ordering::Acquire),
            dequeued,
            shed_terminated,
            shed_deadline,
            evicting_passes,
        }
    }
}

/// Serializable copy of [`QueueMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMetricsSnapshot {
    pub inserted: u64,
    pub dequeued: u64,
    pub shed_terminated: u64,
    pub shed_deadline: u64,
    pub evicting_passes: u64,
}

impl QueueMetricsSnapshot {
    /// Total requests shed for any reason
    pub fn shed_total(&self) -> u64 {
        self.shed_terminated + self.shed_deadline
    }

    /// Fraction of finished requests that were shed (0.0 when none finished)
    pub fn shed_ratio(&self) -> f64 {
        let finished = self.dequeued + self.shed_total();
        if finished == 0 {
            return 0.0;
        }
        self.shed_total() as f64 / finished as f64
    }
}
