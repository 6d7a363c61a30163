//! Cluster-level error types.

// Layer 1: Standard library
// (none)

// Layer 2: Third-party
use thiserror::Error;

// Layer 3: Internal
// (none)

/// Errors raised by cluster configuration and membership operations.
#[derive(Error, Debug, Clone)]
pub enum ClusterError {
    /// Node identifier does not match `name@host:port`
    #[error("Invalid node id: {0}")]
    InvalidNodeId(String),

    /// Cluster configuration failed validation
    #[error("Invalid cluster config: {0}")]
    InvalidConfig(String),

    /// A distributed operation was attempted before the cluster was started
    #[error("Cluster not started")]
    NotStarted,

    /// The cluster runtime was already started on this node
    #[error("Cluster already started")]
    AlreadyStarted,

    /// The TCP listener could not be bound
    #[error("Failed to bind {addr}: {message}")]
    Bind { addr: String, message: String },
}

impl ClusterError {
    /// Check if this error stems from user-supplied input.
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            ClusterError::InvalidNodeId(_) | ClusterError::InvalidConfig(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_node_id_display() {
        let err = ClusterError::InvalidNodeId("x y z".to_string());
        assert!(err.to_string().contains("Invalid node id"));
        assert!(err.to_string().contains("x y z"));
    }

    #[test]
    fn test_not_started_display() {
        assert_eq!(ClusterError::NotStarted.to_string(), "Cluster not started");
    }

    #[test]
    fn test_bind_display() {
        let err = ClusterError::Bind {
            addr: "0.0.0.0:4369".to_string(),
            message: "address in use".to_string(),
        };
        assert!(err.to_string().contains("0.0.0.0:4369"));
        assert!(err.to_string().contains("address in use"));
    }

    #[test]
    fn test_user_input_classification() {
        assert!(ClusterError::InvalidNodeId("a".into()).is_user_input());
        assert!(ClusterError::InvalidConfig("b".into()).is_user_input());
        assert!(!ClusterError::NotStarted.is_user_input());
    }
}
