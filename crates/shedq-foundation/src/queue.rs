//! The shedding queue.
//!
//! [`ShedQueue`] is a FIFO buffer of requests that, under overload, proactively
//! drops the requests unlikely to be served before their deadline, preferring
//! to sacrifice low-criticality work so high-criticality work stays on time.
//!
//! # Architecture
//!
//! ```text
//! insert ──► buffer (arrival order) ◄── remove ──► timing estimator
//!    │             ▲                       │
//!    ▼             │ shed pass             │ shed pass first
//! watcher ─────────┘                       ▼
//!  (immediate, then on context termination)
//! ```
//!
//! A single [`parking_lot::Mutex`] guards the buffer and the timing state. It is
//! held for the whole of every insert, remove, len and shed pass, and never
//! across an `.await`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shedq_foundation::{QueueConfig, ShedQueue};
//! use shedq_kernel::{Criticality, DeadlineContext};
//!
//! let queue = Arc::new(ShedQueue::new(QueueConfig::default())?);
//!
//! let ctx = DeadlineContext::new().with_timeout(Duration::from_millis(500));
//! queue.insert(ctx.clone(), Criticality::Critical, request, ctx.cancel_fn());
//!
//! // Worker side
//! while let Some(request) = queue.remove() {
//!     serve(request).await;
//! }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shedq_kernel::{CancelFn, Clock, Criticality, RequestContext};
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::element::Element;
use crate::error::QueueResult;
use crate::metrics::{QueueMetrics, QueueMetricsSnapshot};
use crate::planner;
use crate::timing::TimingEstimator;
use crate::watcher;

/// What one shed pass evicted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShedSummary {
    /// Elements whose context had already terminated
    pub terminated: usize,
    /// Elements projected to miss their deadline
    pub missed_deadline: usize,
}

impl ShedSummary {
    /// Total elements evicted.
    pub fn total(&self) -> usize {
        self.terminated + self.missed_deadline
    }
}

struct State<T, C> {
    buffer: VecDeque<Element<T, C>>,
    timing: TimingEstimator,
}

/// Queue state shared between the public handle and the watchers.
pub(crate) struct Shared<T, C> {
    clock: Arc<dyn Clock>,
    state: Mutex<State<T, C>>,
    metrics: QueueMetrics,
}

impl<T, C: Ord> Shared<T, C> {
    /// Run one shed pass under the lock.
    pub(crate) fn shed(&self) -> ShedSummary {
        let mut state = self.state.lock();
        self.shed_locked(&mut state)
    }

    fn shed_locked(&self, state: &mut State<T, C>) -> ShedSummary {
        let expected_wait = state.timing.expected_wait();
        let now = self.clock.now();

        let plan = planner::plan(state.buffer.drain(..), now, expected_wait);
        state.buffer = plan.kept.into();

        let summary = ShedSummary {
            terminated: plan.terminated.len(),
            missed_deadline: plan.missed_deadline.len(),
        };
        if summary.total() == 0 {
            return summary;
        }

        for element in plan.terminated.into_iter().chain(plan.missed_deadline) {
            element.shed();
        }
        self.metrics
            .record_shed(summary.terminated, summary.missed_deadline);

        tracing::debug!(
            terminated = summary.terminated,
            missed_deadline = summary.missed_deadline,
            remaining = state.buffer.len(),
            expected_wait_us = expected_wait.as_micros() as u64,
            "Shed pass evicted elements"
        );
        summary
    }
}

/// A FIFO admission queue that sheds by deadline and criticality.
///
/// Share it between producers and consumers behind an [`Arc`]. Inserting
/// requires a tokio runtime for the per-element watchers; without one the
/// queue still works but only notices cancellations on its next shed pass.
pub struct ShedQueue<T, C = Criticality> {
    shared: Arc<Shared<T, C>>,
    timing_history_size: usize,
    discard_outliers: usize,
}

impl<T, C> ShedQueue<T, C>
where
    T: Send + 'static,
    C: Ord + Send + 'static,
{
    /// Create a queue, validating `config` eagerly.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`](crate::QueueError::InvalidConfig)
    /// unless `timing_history_size > 2 * discard_outliers`.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let config = config.resolved();
        config.validate()?;

        let started_at = config.clock.now();
        let timing = TimingEstimator::new(
            config.timing_history_size,
            config.discard_outliers,
            started_at,
        )?;

        Ok(Self {
            shared: Arc::new(Shared {
                clock: config.clock,
                state: Mutex::new(State {
                    buffer: VecDeque::new(),
                    timing,
                }),
                metrics: QueueMetrics::new(),
            }),
            timing_history_size: config.timing_history_size,
            discard_outliers: config.discard_outliers,
        })
    }

    /// Append a request at the tail and start its watcher.
    ///
    /// `cancel` is called exactly once if the request is shed and never if it
    /// is dequeued. It runs while the queue lock is held and must not call
    /// back into the queue.
    pub fn insert<X>(&self, ctx: X, criticality: C, value: T, cancel: CancelFn)
    where
        X: RequestContext + 'static,
    {
        let ctx: Arc<dyn RequestContext> = Arc::new(ctx);
        let removed = CancellationToken::new();
        {
            let mut state = self.shared.state.lock();
            let enqueued_at = self.shared.clock.now();
            state.buffer.push_back(Element {
                ctx: Arc::clone(&ctx),
                cancel,
                criticality,
                value,
                enqueued_at,
                removed: removed.clone(),
            });
            self.shared.metrics.record_insert();
        }

        watcher::spawn(Arc::downgrade(&self.shared), ctx, removed);
    }

    /// Run a shed pass, then pop the head. `None` means the queue is empty.
    pub fn remove(&self) -> Option<T> {
        let mut state = self.shared.state.lock();
        self.shared.shed_locked(&mut state);

        let element = state.buffer.pop_front()?;
        let now = self.shared.clock.now();
        state.timing.record_dequeue(now);
        self.shared.metrics.record_dequeue();
        drop(state);

        tracing::trace!(
            waited_us = now.saturating_duration_since(element.enqueued_at).as_micros() as u64,
            "Dequeued element"
        );
        Some(element.into_value())
    }

    /// Run a shed pass now. The watchers call this; callers rarely need to.
    pub fn shed(&self) -> ShedSummary {
        self.shared.shed()
    }
}

impl<T, C> ShedQueue<T, C> {
    /// Number of buffered requests as of the most recent shed pass.
    pub fn len(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    /// Whether no requests are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current per-item wait estimate; zero until the history is full.
    pub fn expected_wait(&self) -> Duration {
        self.shared.state.lock().timing.expected_wait()
    }

    /// Point-in-time copy of the queue counters.
    pub fn metrics(&self) -> QueueMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Intervals averaged for the wait estimate.
    pub fn timing_history_size(&self) -> usize {
        self.timing_history_size
    }

    /// Samples discarded from each end of the sorted history.
    pub fn discard_outliers(&self) -> usize {
        self.discard_outliers
    }
}

impl<T, C> fmt::Debug for ShedQueue<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShedQueue")
            .field("len", &self.len())
            .field("timing_history_size", &self.timing_history_size)
            .field("discard_outliers", &self.discard_outliers)
            .finish_non_exhaustive()
    }
}

impl<T, C> Drop for ShedQueue<T, C> {
    /// Requests still buffered will never be served: shed them all.
    fn drop(&mut self) {
        let remaining: Vec<_> = {
            let mut state = self.shared.state.lock();
            let remaining: Vec<_> = state.buffer.drain(..).collect();
            self.shared.metrics.record_shed(remaining.len(), 0);
            remaining
        };
        if remaining.is_empty() {
            return;
        }
        tracing::debug!(count = remaining.len(), "Shedding buffered elements on drop");
        for element in remaining {
            element.shed();
        }
    }
}
