//! Process introspection: local snapshots and cluster-wide aggregation.

pub mod cluster;
pub mod local;
pub mod snapshot;

pub use cluster::{ClusterObserver, ClusterSnapshot, NodeObservation, NodeObservationStatus};
pub use local::{Observer, ObserverBehavior, ObserverCall};
pub use snapshot::{ActorStats, NodeSnapshot, SupervisorStats, TreeChild, TreeEntry};
