//! Error types for the TTL containers.

use thiserror::Error;

/// Errors returned by container and scheduler operations.
#[derive(Error, Debug)]
pub enum TtlError {
    /// Invalid interval or other construction setting
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Insert-only operation targeted a key that is already present
    #[error("An entry with the same key already exists")]
    DuplicateKey,

    /// Strict lookup on a key that is absent or already swept
    #[error("The given key was not present")]
    KeyNotFound,

    /// List position outside the valid range
    #[error("Index {index} is out of range for length {len}")]
    IndexOutOfRange {
        /// Requested position
        index: usize,
        /// Length of the list when the request was made
        len: usize,
    },

    /// The sweep thread or its timer runtime could not be created
    #[error("Failed to start sweep thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A failure inside a sweep callback.
///
/// Faults are caught by the scheduler and reported through `tracing`; they
/// never reach foreground callers and never stop later ticks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SweepFault {
    /// The callback returned an error
    #[error("sweep failed: {0}")]
    Failed(String),

    /// The callback panicked
    #[error("sweep panicked: {0}")]
    Panicked(String),
}
