//! Top-level error type for public runtime operations.
//!
//! Operations like `call` are transparent over locality, so their error
//! surface spans several component taxonomies. Each component keeps its own
//! precise error type; this enum is the union used at the public seam.

// Layer 1: Standard library
// (none)

// Layer 2: Third-party
use thiserror::Error;

// Layer 3: Internal
use crate::actor::ActorError;
use crate::cluster::ClusterError;
use crate::registry::RegistryError;
use crate::remote::RemoteError;
use crate::supervisor::SupervisorError;
use crate::table::TableError;

/// Union of component errors surfaced by public runtime operations.
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    /// Local actor lifecycle or call failure
    #[error(transparent)]
    Actor(#[from] ActorError),

    /// Name registry failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Table operation failure
    #[error(transparent)]
    Table(#[from] TableError),

    /// Supervision failure
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// Cluster configuration or membership failure
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Distributed operation failure
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl RuntimeError {
    /// Check if this error is any kind of deadline expiry.
    pub fn is_timeout(&self) -> bool {
        match self {
            RuntimeError::Actor(err) => err.is_timeout(),
            RuntimeError::Remote(err) => err.is_timeout(),
            _ => false,
        }
    }

    /// The local actor error, when that is what this wraps.
    pub fn as_actor(&self) -> Option<&ActorError> {
        match self {
            RuntimeError::Actor(err) => Some(err),
            _ => None,
        }
    }

    /// The remote error, when that is what this wraps.
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            RuntimeError::Remote(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transparent_display() {
        let err: RuntimeError = ActorError::ServerNotRunning.into();
        assert_eq!(err.to_string(), "Server not running");
    }

    #[test]
    fn test_timeout_detection() {
        let err: RuntimeError = ActorError::CallTimeout(Duration::from_secs(5)).into();
        assert!(err.is_timeout());

        let err: RuntimeError = ActorError::ServerNotRunning.into();
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_accessors() {
        let err: RuntimeError = ActorError::ServerNotRunning.into();
        assert!(err.as_actor().is_some());
        assert!(err.as_remote().is_none());
    }
}
