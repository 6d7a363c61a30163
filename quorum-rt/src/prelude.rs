//! Curated re-exports for application code.
//!
//! ```rust
//! use quorum_rt::prelude::*;
//! ```

pub use crate::actor::{
    ActorError, ActorRef, Behavior, BehaviorError, CallOutcome, CastOutcome, ExitReason, InfoMsg,
    Registration, ServerRef, StartOptions,
};
pub use crate::cluster::{ClusterConfig, ClusterError, NodeEvent, NodeId};
pub use crate::error::RuntimeError;
pub use crate::events::{LifecycleEvent, Subscription};
pub use crate::node::Node;
pub use crate::observer::{ClusterObserver, Observer};
pub use crate::proto::WireSpawnOptions;
pub use crate::registry::{LocalRegistry, RegistryError, RegistryMode};
pub use crate::remote::RemoteError;
pub use crate::supervisor::{
    ChildSpec, DynamicTemplate, RestartIntensity, RestartPolicy, Supervisor, SupervisorError,
    SupervisorSpec, SupervisorStrategy,
};
pub use crate::system::{ActorStatus, ActorSystem, SystemConfig};
pub use crate::table::{Table, TableType};
