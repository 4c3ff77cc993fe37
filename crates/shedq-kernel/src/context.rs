//! Cancellable request context contract.
//!
//! A queued element is bound to the [`RequestContext`] of the caller that
//! submitted it. The queue only ever *observes* the context: whether it has
//! already terminated, its optional deadline, and a future that resolves once
//! it terminates.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};

/// Callback invoked at most once to tell a caller its request will not be served.
pub type CancelFn = Box<dyn FnOnce() + Send + 'static>;

/// The caller-side view of an in-flight request.
#[async_trait]
pub trait RequestContext: Send + Sync {
    /// Whether the request has been cancelled or its deadline has passed.
    fn is_terminated(&self) -> bool;

    /// The point in time after which serving the request is useless, if any.
    fn deadline(&self) -> Option<Instant>;

    /// Resolves once the context terminates.
    async fn terminated(&self);
}

/// [`RequestContext`] backed by a [`CancellationToken`] and an optional deadline.
///
/// Deadline expiry is judged against the context's own [`Clock`], so a context
/// sharing a [`ManualClock`](crate::clock::ManualClock) with the queue expires
/// exactly when the test advances time past its deadline.
#[derive(Clone)]
pub struct DeadlineContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    clock: Arc<dyn Clock>,
}

impl DeadlineContext {
    /// A context with no deadline, judged by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// A context with no deadline, judged by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            clock,
        }
    }

    /// Attach a deadline. An existing earlier deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Attach a deadline `timeout` from the context clock's current time.
    ///
    /// A timeout too large to represent as an [`Instant`] adds no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match self.clock.now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Derive a child context: cancelling the parent cancels the child, not the
    /// other way round. The child inherits the parent's deadline and clock.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            clock: Arc::clone(&self.clock),
        }
    }

    /// Cancel the request.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called (ignores the deadline).
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A [`CancelFn`] that cancels this context, suitable for handing to the queue.
    pub fn cancel_fn(&self) -> CancelFn {
        let token = self.token.clone();
        Box::new(move || token.cancel())
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn deadline_passed(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| self.clock.now() >= deadline)
    }
}

impl Default for DeadlineContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DeadlineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadlineContext")
            .field("cancelled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .finish()
    }
}

#[async_trait]
impl RequestContext for DeadlineContext {
    fn is_terminated(&self) -> bool {
        self.token.is_cancelled() || self.deadline_passed()
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    async fn terminated(&self) {
        if self.is_terminated() {
            return;
        }
        let Some(deadline) = self.deadline else {
            self.token.cancelled().await;
            return;
        };

        let remaining = deadline.saturating_duration_since(self.clock.now());
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep(remaining) => {
                // A non-wall clock may disagree with the timer; only explicit
                // cancellation can end the wait then.
                if !self.deadline_passed() {
                    self.token.cancelled().await;
                }
            }
        }
    }
}
