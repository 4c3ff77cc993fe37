//! Shed planning.
//!
//! A shed pass runs in two phases over the buffered elements:
//!
//! 1. **Dead on arrival**: every element whose context already terminated is
//!    dropped. This needs no timing estimate.
//! 2. **Predictive, criticality tiered**: only with a warm estimate
//!    (`expected_wait > 0`). The survivors are projected in order of
//!    criticality descending, ties by arrival. The element in slot `k` is
//!    expected to be served at `now + k * expected_wait`; an element whose
//!    deadline falls before that is dropped and does not take a slot.
//!
//! More critical work is projected first and therefore claims the earliest
//! slots, so less critical work is only granted whatever capacity is left.
//! The projection order is a planning artifact: the kept elements come back
//! in their original arrival order.

use std::time::{Duration, Instant};

use crate::element::Element;

/// The partition produced by one shed pass.
pub(crate) struct ShedPlan<T, C> {
    /// Survivors, in arrival order
    pub(crate) kept: Vec<Element<T, C>>,
    /// Dropped in phase 1
    pub(crate) terminated: Vec<Element<T, C>>,
    /// Dropped in phase 2
    pub(crate) missed_deadline: Vec<Element<T, C>>,
}

/// Partition `elements` (in arrival order) into kept and shed elements.
pub(crate) fn plan<T, C, I>(elements: I, now: Instant, expected_wait: Duration) -> ShedPlan<T, C>
where
    C: Ord,
    I: IntoIterator<Item = Element<T, C>>,
{
    let (terminated, live): (Vec<_>, Vec<_>) =
        elements.into_iter().partition(Element::is_terminated);

    if expected_wait.is_zero() {
        return ShedPlan {
            kept: live,
            terminated,
            missed_deadline: Vec::new(),
        };
    }

    let keep = project(&live, now, expected_wait);
    let mut kept = Vec::with_capacity(live.len());
    let mut missed_deadline = Vec::new();
    for (element, keep) in live.into_iter().zip(keep) {
        if keep {
            kept.push(element);
        } else {
            missed_deadline.push(element);
        }
    }

    ShedPlan {
        kept,
        terminated,
        missed_deadline,
    }
}

/// Walk the projection order and decide, per arrival index, whether to keep.
fn project<T, C: Ord>(live: &[Element<T, C>], now: Instant, expected_wait: Duration) -> Vec<bool> {
    let mut order: Vec<usize> = (0..live.len()).collect();
    // Stable: equal criticalities stay in arrival order.
    order.sort_by(|&a, &b| live[b].criticality.cmp(&live[a].criticality));

    let mut keep = vec![true; live.len()];
    let mut slot: u32 = 0;
    for idx in order {
        if let Some(deadline) = live[idx].deadline() {
            let projected = expected_wait
                .checked_mul(slot)
                .and_then(|offset| now.checked_add(offset));
            // An unrepresentable projection is later than any deadline.
            let misses = projected.is_none_or(|at| deadline < at);
            if misses {
                keep[idx] = false;
                continue;
            }
        }
        slot = slot.saturating_add(1);
    }
    keep
}
