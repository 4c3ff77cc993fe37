//! Queue Configuration
//!
//! The numeric knobs of the timing estimator plus the clock the queue reads.
//! Only the numeric fields are (de)serialized; a deserialized config always
//! runs on the system clock until [`QueueConfig::with_clock`] says otherwise.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shedq_kernel::{Clock, SystemClock};

use crate::error::{QueueError, QueueResult};

/// Number of dequeue intervals averaged when nothing else is configured.
pub const DEFAULT_TIMING_HISTORY_SIZE: usize = 100;

/// Samples dropped from each end of the sorted history by default.
pub const DEFAULT_DISCARD_OUTLIERS: usize = 1;

fn default_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// Configuration for a [`ShedQueue`](crate::ShedQueue)
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Time source for enqueue stamps, dequeue intervals and deadline projection
    #[serde(skip, default = "default_clock")]
    pub clock: Arc<dyn Clock>,
    /// Estimate the dequeue rate from this many recent intervals.
    /// `0` means unset and restores both numeric defaults.
    pub timing_history_size: usize,
    /// Drop this many samples from each end of the sorted history before averaging
    pub discard_outliers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            clock: default_clock(),
            timing_history_size: DEFAULT_TIMING_HISTORY_SIZE,
            discard_outliers: DEFAULT_DISCARD_OUTLIERS,
        }
    }
}

impl fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueConfig")
            .field("timing_history_size", &self.timing_history_size)
            .field("discard_outliers", &self.discard_outliers)
            .finish_non_exhaustive()
    }
}

impl QueueConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the number of intervals kept for the rate estimate
    pub fn with_timing_history_size(mut self, size: usize) -> Self {
        self.timing_history_size = size;
        self
    }

    /// Set the number of outliers discarded from each end
    pub fn with_discard_outliers(mut self, discard: usize) -> Self {
        self.discard_outliers = discard;
        self
    }

    /// Apply the "unset" rule: a zero history size restores both defaults.
    pub fn resolved(mut self) -> Self {
        if self.timing_history_size == 0 {
            self.timing_history_size = DEFAULT_TIMING_HISTORY_SIZE;
            self.discard_outliers = DEFAULT_DISCARD_OUTLIERS;
        }
        self
    }

    /// Check that the trimmed mean keeps at least one sample.
    pub fn validate(&self) -> QueueResult<()> {
        check_history(self.timing_history_size, self.discard_outliers)
    }
}

/// `history_size` must exceed `2 * discard_outliers`.
pub(crate) fn check_history(history_size: usize, discard_outliers: usize) -> QueueResult<()> {
    if history_size <= discard_outliers.saturating_mul(2) {
        return Err(QueueError::InvalidConfig {
            timing_history_size: history_size,
            discard_outliers,
        });
    }
    Ok(())
}
