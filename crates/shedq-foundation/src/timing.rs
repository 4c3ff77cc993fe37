//! Service-time estimation.
//!
//! The queue measures the interval between consecutive dequeues and keeps the
//! most recent `history_size` of them. The expected per-item wait is the mean
//! of that history after discarding `discard_outliers` samples from each end,
//! so a single latency spike or burst does not swing the estimate.
//!
//! Until the history is full the estimate is [`Duration::ZERO`], which the shed
//! planner reads as "unknown": no deadline-based shedding happens on a cold queue.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::check_history;
use crate::error::QueueResult;

/// Rolling trimmed-mean estimate of the per-item service interval.
#[derive(Debug, Clone)]
pub struct TimingEstimator {
    history_size: usize,
    discard_outliers: usize,
    last_dequeue_at: Instant,
    intervals: VecDeque<Duration>,
    /// Dequeues recorded so far; the memoization key for `expected_wait`.
    recorded: u64,
    expected_wait: Duration,
    computed_for: Option<u64>,
}

impl TimingEstimator {
    /// Create an estimator whose first interval is measured from `started_at`.
    ///
    /// The history grows as samples arrive; nothing is allocated up front.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`](crate::QueueError::InvalidConfig)
    /// unless `history_size > 2 * discard_outliers`.
    pub fn new(
        history_size: usize,
        discard_outliers: usize,
        started_at: Instant,
    ) -> QueueResult<Self> {
        check_history(history_size, discard_outliers)?;
        Ok(Self {
            history_size,
            discard_outliers,
            last_dequeue_at: started_at,
            intervals: VecDeque::new(),
            recorded: 0,
            expected_wait: Duration::ZERO,
            computed_for: None,
        })
    }

    /// Record a dequeue at `at`, evicting the oldest interval when full.
    pub fn record_dequeue(&mut self, at: Instant) {
        let interval = at.saturating_duration_since(self.last_dequeue_at);
        self.last_dequeue_at = at;
        while self.intervals.len() >= self.history_size {
            self.intervals.pop_front();
        }
        self.intervals.push_back(interval);
        self.recorded += 1;
    }

    /// The current estimate, recomputed if a dequeue happened since the last call.
    pub fn expected_wait(&mut self) -> Duration {
        self.refresh();
        self.expected_wait
    }

    /// The last computed estimate without recomputing.
    pub fn last_estimate(&self) -> Duration {
        self.expected_wait
    }

    /// Whether the history holds enough samples to produce an estimate.
    pub fn is_warm(&self) -> bool {
        self.intervals.len() >= self.history_size
    }

    /// Number of intervals currently held.
    pub fn samples(&self) -> usize {
        self.intervals.len()
    }

    /// When the most recent dequeue happened (or the estimator was created).
    pub fn last_dequeue_at(&self) -> Instant {
        self.last_dequeue_at
    }

    fn refresh(&mut self) {
        if !self.is_warm() {
            self.expected_wait = Duration::ZERO;
            return;
        }
        if self.computed_for == Some(self.recorded) {
            return;
        }

        let mut sorted: Vec<Duration> = self.intervals.iter().copied().collect();
        sorted.sort_unstable();
        let trimmed = &sorted[self.discard_outliers..sorted.len() - self.discard_outliers];

        let total: u128 = trimmed.iter().map(Duration::as_nanos).sum();
        let mean = total / trimmed.len() as u128;
        self.expected_wait = Duration::from_nanos(u64::try_from(mean).unwrap_or(u64::MAX));
        self.computed_for = Some(self.recorded);

        tracing::trace!(
            expected_wait_us = self.expected_wait.as_micros() as u64,
            samples = trimmed.len(),
            "Recomputed expected wait"
        );
    }
}
