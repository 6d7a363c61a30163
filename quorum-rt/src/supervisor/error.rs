//! Supervisor error types.

// Layer 1: Standard library
use std::time::Duration;

// Layer 2: Third-party
use thiserror::Error;

// Layer 3: Internal
// (none)

/// Errors raised by supervisor operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// A child's start (or restart) failed
    #[error("Child start failed for {id}: {message}")]
    StartFailed {
        /// Spec id of the failing child
        id: String,
        /// Failure description
        message: String,
    },

    /// The restart intensity window overflowed; the supervisor gave up
    #[error("Max restarts exceeded: {max_restarts} within {within:?}")]
    MaxRestartsExceeded {
        /// Configured restart ceiling
        max_restarts: u32,
        /// Width of the sliding window
        within: Duration,
    },

    /// No child spec with the given id
    #[error("Unknown child: {0}")]
    UnknownChild(String),

    /// A child spec with the given id already exists
    #[error("Duplicate child: {0}")]
    DuplicateChild(String),

    /// The supervisor has terminated and accepts no commands
    #[error("Supervisor stopped")]
    Stopped,

    /// The operation needs a `simple_one_for_one` supervisor
    #[error("Operation requires a simple_one_for_one supervisor")]
    RequiresDynamic,

    /// The operation is not available on a `simple_one_for_one` supervisor
    #[error("Operation not available on a simple_one_for_one supervisor")]
    RequiresStatic,
}

impl SupervisorError {
    /// Whether this is the intensity-overflow terminal failure.
    pub fn is_max_restarts(&self) -> bool {
        matches!(self, SupervisorError::MaxRestartsExceeded { .. })
    }
}
