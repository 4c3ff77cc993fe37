//! Per-element cancellation watcher.
//!
//! Every inserted element gets one watcher task. It runs a shed pass right away
//! (so an element that is already unviable is rejected immediately), then waits
//! for whichever comes first:
//!
//! - the caller's context terminating: run one more shed pass so the element is
//!   evicted now rather than when it reaches the head;
//! - the element leaving the buffer (dequeued or shed): nothing left to watch.
//!
//! The watcher holds only a weak reference to the queue and never touches the
//! buffer itself; it only asks the queue for shed passes.

use std::sync::{Arc, Weak};

use shedq_kernel::RequestContext;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::queue::Shared;

/// Start watching one element.
///
/// Outside a tokio runtime the immediate shed pass runs inline and no task is
/// spawned; a cancelled element is then reaped by the next shed pass.
pub(crate) fn spawn<T, C>(
    queue: Weak<Shared<T, C>>,
    ctx: Arc<dyn RequestContext>,
    removed: CancellationToken,
) where
    T: Send + 'static,
    C: Ord + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(watch(queue, ctx, removed));
        }
        Err(_) => {
            tracing::warn!("No tokio runtime for queue watcher; shedding inline");
            if let Some(shared) = queue.upgrade() {
                shared.shed();
            }
        }
    }
}

async fn watch<T, C>(
    queue: Weak<Shared<T, C>>,
    ctx: Arc<dyn RequestContext>,
    removed: CancellationToken,
) where
    T: Send + 'static,
    C: Ord + Send + 'static,
{
    if !shed_once(&queue) {
        return;
    }

    tokio::select! {
        _ = removed.cancelled() => {
            tracing::trace!("Element left the queue; watcher exiting");
            return;
        }
        _ = ctx.terminated() => {}
    }

    tracing::trace!("Element context terminated; running shed pass");
    shed_once(&queue);
}

/// Run a shed pass if the queue still exists. The strong reference is released
/// before returning so a parked watcher never keeps the queue alive.
fn shed_once<T, C>(queue: &Weak<Shared<T, C>>) -> bool
where
    C: Ord,
{
    match queue.upgrade() {
        Some(shared) => {
            shared.shed();
            true
        }
        None => false,
    }
}
