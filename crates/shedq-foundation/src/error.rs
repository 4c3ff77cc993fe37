//! Error types for `shedq-foundation`.
//!
//! Shedding is not an error: a shed request is reported to its owner through
//! its cancel callback. The only error the queue returns is a misconfiguration
//! caught at construction time.

/// Errors returned by the queue engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum QueueError {
    /// The trimmed mean would be computed over no samples.
    #[error(
        "timing_history_size ({timing_history_size}) must be greater than 2 * discard_outliers ({discard_outliers})"
    )]
    InvalidConfig {
        timing_history_size: usize,
        discard_outliers: usize,
    },
}

/// Convenience alias for results produced by the queue engine.
pub type QueueResult<T> = Result<T, QueueError>;
