//! Cluster membership: node identity, configuration, and the TCP runtime.

pub mod config;
pub mod error;
pub mod node_id;

pub(crate) mod runtime;

pub use config::{ClusterConfig, ClusterConfigBuilder, DEFAULT_CLUSTER_PORT};
pub use error::ClusterError;
pub use node_id::NodeId;
pub use runtime::NodeEvent;
