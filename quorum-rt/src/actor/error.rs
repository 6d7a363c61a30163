//! Actor lifecycle and call error types.

// Layer 1: Standard library
use std::time::Duration;

// Layer 2: Third-party
use thiserror::Error;

// Layer 3: Internal
use super::exit::ExitReason;
use crate::util::ServerId;

/// Errors raised by local actor operations (start, call, cast, stop).
#[derive(Error, Debug, Clone)]
pub enum ActorError {
    /// The target actor does not exist or is no longer running
    #[error("Server not running")]
    ServerNotRunning,

    /// The behavior's `init` did not complete within the allowed time
    #[error("Actor init timed out after {0:?}")]
    InitTimeout(Duration),

    /// The behavior's `init` returned an error
    #[error("Actor init failed: {0}")]
    InitFailed(String),

    /// The caller's deadline expired before the actor replied
    #[error("Call timed out after {0:?}")]
    CallTimeout(Duration),

    /// The `handle_call` transition failed; the actor itself survives
    #[error("Handler error: {message}")]
    Handler {
        /// Message of the error the handler raised
        message: String,
    },

    /// The requested name is already registered to a different actor
    #[error("Name already registered: {0}")]
    NameConflict(String),

    /// A mailbox payload could not be downcast to the behavior's message type
    #[error("Message type mismatch for actor {0}")]
    TypeMismatch(ServerId),

    /// A wire payload could not be encoded or decoded
    #[error("Message serialization failed: {0}")]
    Serialization(String),

    /// The actor system is shutting down and refuses new work
    #[error("System shutting down")]
    ShuttingDown,

    /// The configured actor limit was reached
    #[error("Actor limit exceeded: current {current}, max {max}")]
    LimitExceeded {
        /// Actors currently alive
        current: usize,
        /// Configured ceiling
        max: usize,
    },
}

impl ActorError {
    /// Check if this error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ActorError::InitTimeout(_) | ActorError::CallTimeout(_)
        )
    }

    /// Check if this error came from user handler code rather than the runtime.
    pub fn is_handler(&self) -> bool {
        matches!(self, ActorError::Handler { .. })
    }

    /// Exit reason corresponding to a failed start, used when the actor never
    /// reached the running state.
    pub fn start_exit_reason(&self) -> ExitReason {
        match self {
            ActorError::InitTimeout(d) => ExitReason::error(format!("init timeout after {d:?}")),
            ActorError::InitFailed(msg) => ExitReason::error(msg.clone()),
            other => ExitReason::error(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_not_running_display() {
        assert_eq!(ActorError::ServerNotRunning.to_string(), "Server not running");
    }

    #[test]
    fn test_timeout_classification() {
        assert!(ActorError::InitTimeout(Duration::from_secs(5)).is_timeout());
        assert!(ActorError::CallTimeout(Duration::from_secs(5)).is_timeout());
        assert!(!ActorError::ServerNotRunning.is_timeout());
    }

    #[test]
    fn test_handler_classification() {
        let err = ActorError::Handler {
            message: "div by zero".to_string(),
        };
        assert!(err.is_handler());
        assert!(err.to_string().contains("div by zero"));
        assert!(!ActorError::ServerNotRunning.is_handler());
    }

    #[test]
    fn test_name_conflict_display() {
        let err = ActorError::NameConflict("counter".to_string());
        assert!(err.to_string().contains("counter"));
    }

    #[test]
    fn test_start_exit_reason_preserves_message() {
        let err = ActorError::InitFailed("no database".to_string());
        assert_eq!(err.start_exit_reason(), ExitReason::error("no database"));
    }
}
