//! shedq kernel contracts.
//!
//! The kernel defines what the queue engine in `shedq-foundation` consumes
//! from its surroundings and nothing else:
//!
//! - [`Clock`]: the time source, with [`SystemClock`] and [`ManualClock`].
//! - [`RequestContext`]: the caller's cancellable request, with the concrete
//!   [`DeadlineContext`].
//! - [`Criticality`]: the ordered importance tiers.
//!
//! The kernel must never depend on foundation.

// clock module
pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

// context module
pub mod context;
pub use context::{CancelFn, DeadlineContext, RequestContext};

// criticality module
pub mod criticality;
pub use criticality::{Criticality, ParseCriticalityError};
