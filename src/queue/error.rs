//! Error types for request queue configuration.

use thiserror::Error;

/// Errors that can occur while configuring the request queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The concurrency cap must admit at least one transfer.
    #[error("invalid max concurrent requests {value}: must be 1 or greater")]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
    },
}
