//! One buffered unit of work.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use shedq_kernel::{CancelFn, RequestContext};
use tokio_util::sync::CancellationToken;

/// A queued request. Owned by the queue from insertion until it is dequeued
/// or shed; never mutated in between.
pub(crate) struct Element<T, C> {
    pub(crate) ctx: Arc<dyn RequestContext>,
    pub(crate) cancel: CancelFn,
    pub(crate) criticality: C,
    pub(crate) value: T,
    pub(crate) enqueued_at: Instant,
    /// Fired when the element leaves the buffer for any reason, releasing its watcher.
    pub(crate) removed: CancellationToken,
}

impl<T, C> Element<T, C> {
    pub(crate) fn is_terminated(&self) -> bool {
        self.ctx.is_terminated()
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.ctx.deadline()
    }

    /// Release the watcher and notify the owner. Consumes the element, so the
    /// cancel callback cannot run twice.
    pub(crate) fn shed(self) {
        self.removed.cancel();
        (self.cancel)();
    }

    /// Release the watcher and hand back the payload without notifying the owner.
    pub(crate) fn into_value(self) -> T {
        self.removed.cancel();
        self.value
    }
}

impl<T, C: fmt::Debug> fmt::Debug for Element<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("criticality", &self.criticality)
            .field("enqueued_at", &self.enqueued_at)
            .field("deadline", &self.ctx.deadline())
            .finish_non_exhaustive()
    }
}
