//! Errors for distributed operations.

// Layer 1: Standard library
use std::time::Duration;

// Layer 2: Third-party
use thiserror::Error;

// Layer 3: Internal
use crate::cluster::NodeId;
use crate::proto::CallErrorKind;

/// Errors raised by remote call/cast/spawn/monitor/link operations.
///
/// Categories are rebuilt from the wire on the calling side; the message
/// string is preserved, the remote stack is not.
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    /// The target node is not connected
    #[error("Node not reachable: {0}")]
    NodeNotReachable(NodeId),

    /// The remote call did not complete before the caller's deadline
    #[error("Remote call timed out after {0:?}")]
    CallTimeout(Duration),

    /// The remote actor does not exist or is not running
    #[error("Remote server not running")]
    ServerNotRunning,

    /// The remote handler failed; transparent to the caller
    #[error("{message}")]
    Handler {
        /// The remote handler's error message
        message: String,
    },

    /// No behavior registered under the requested name on the target node
    #[error("Behavior not found: {0}")]
    BehaviorNotFound(String),

    /// The spawn request did not complete before the deadline
    #[error("Remote spawn timed out after {0:?}")]
    SpawnTimeout(Duration),

    /// The remote actor's init failed or timed out
    #[error("Remote spawn init failed: {0}")]
    SpawnInit(String),

    /// The spawned actor could not be registered; it was stopped again
    #[error("Remote spawn registration failed: {0}")]
    SpawnRegistration(String),

    /// Monitor or link setup did not complete before the deadline
    #[error("Remote monitor setup timed out after {0:?}")]
    MonitorTimeout(Duration),

    /// A payload could not be encoded or decoded
    #[error("Message serialization failed: {0}")]
    Serialization(String),

    /// The operation is not defined across nodes
    #[error("Unsupported remote operation: {0}")]
    Unsupported(String),

    /// Uncategorized remote failure
    #[error("Remote error: {0}")]
    Unknown(String),
}

impl RemoteError {
    /// Check if this error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            RemoteError::CallTimeout(_)
                | RemoteError::SpawnTimeout(_)
                | RemoteError::MonitorTimeout(_)
        )
    }

    /// Rebuild a typed error from a `call_error` frame.
    pub fn from_call_error(kind: CallErrorKind, message: String) -> Self {
        match kind {
            CallErrorKind::ServerNotRunning => RemoteError::ServerNotRunning,
            CallErrorKind::CallTimeout => RemoteError::Unknown(message),
            CallErrorKind::HandlerError => RemoteError::Handler { message },
            CallErrorKind::Serialization => RemoteError::Serialization(message),
            CallErrorKind::Unknown => RemoteError::Unknown(message),
        }
    }
}
