//! shedq foundation: the load-shedding queue engine.
//!
//! - [`ShedQueue`]: FIFO buffer with Insert / Remove / Len, shedding on demand.
//! - [`TimingEstimator`]: rolling trimmed mean of inter-dequeue intervals.
//! - Shed planner: dead-context removal, then criticality-tiered deadline projection.
//! - Cancellation watcher: one task per element bridging caller cancellation
//!   into shed passes.

// config module
pub mod config;
pub use config::{DEFAULT_DISCARD_OUTLIERS, DEFAULT_TIMING_HISTORY_SIZE, QueueConfig};

// error module
pub mod error;
pub use error::{QueueError, QueueResult};

// metrics module
pub mod metrics;
pub use metrics::{QueueMetrics, QueueMetricsSnapshot};

// queue module
pub mod queue;
pub use queue::{ShedQueue, ShedSummary};

// timing module
pub mod timing;
pub use timing::TimingEstimator;

mod element;
mod planner;
mod watcher;

// Re-export kernel contracts for convenience
pub use shedq_kernel::{
    CancelFn, Clock, Criticality, DeadlineContext, ManualClock, RequestContext, SystemClock,
};
