//! # quorum-rt - Erlang-Style Distributed Actor Runtime
//!
//! Fault-tolerant services built from independent state machines that
//! communicate only by message passing, organized into supervision trees,
//! and transparently distributed across a TCP cluster of nodes.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use quorum_rt::prelude::*;
//! use async_trait::async_trait;
//! use serde::{Deserialize, Serialize};
//!
//! // 1. Define your message types (serde-capable so they can cross nodes)
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Get;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Inc;
//!
//! // 2. Define your behavior
//! struct Counter;
//!
//! #[async_trait]
//! impl Behavior for Counter {
//!     type State = u64;
//!     type Call = Get;
//!     type Cast = Inc;
//!     type Reply = u64;
//!
//!     async fn init(&self) -> Result<u64, BehaviorError> {
//!         Ok(0)
//!     }
//!
//!     async fn handle_call(&self, _msg: Get, state: u64) -> CallOutcome<u64, u64> {
//!         CallOutcome::reply(state, state)
//!     }
//!
//!     async fn handle_cast(&self, _msg: Inc, state: u64) -> CastOutcome<u64> {
//!         CastOutcome::next(state + 1)
//!     }
//! }
//!
//! // 3. Start an actor and talk to it
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let system = ActorSystem::standalone();
//!     let counter = system.start(Counter, StartOptions::default()).await?;
//!
//!     system.cast(&counter, Inc);
//!     let value = system.call(&counter, Get).await?;
//!     assert_eq!(value, 1);
//!     Ok(())
//! }
//! ```
//!
//! # Core Guarantees
//!
//! - **Sequential mailboxes**: one handler at a time per actor; per-sender
//!   FIFO delivery; an actor's observations of its own state never
//!   interleave.
//! - **Crash containment**: a failing `handle_call` reaches only its caller,
//!   a failing `handle_cast` surfaces only as a `Crashed` lifecycle event;
//!   the actor survives both with its prior state.
//! - **Supervision**: `one_for_one` / `one_for_all` / `rest_for_one` /
//!   `simple_one_for_one` strategies with sliding-window restart intensity
//!   and ordered start/reverse-order shutdown.
//! - **Distribution**: heartbeat failure detection with gossip discovery,
//!   length-prefixed HMAC-signed framing, remote call/cast/spawn, cross-node
//!   monitors and links with `noconnection` propagation, and a replicated
//!   name registry with deterministic conflict resolution.
//!
//! # Module Organization
//!
//! ## Core Actor System
//! - [`actor`] - The `Behavior` trait, refs, exit reasons, and start options
//! - [`system`] - `ActorSystem`: spawn, call/cast, links, monitors
//! - [`events`] - Lifecycle event bus
//! - [`registry`] - Local name registry with glob matching
//! - [`table`] - ETS-style keyed tables
//!
//! ## Fault Tolerance
//! - [`supervisor`] - Child specs, strategies, restart intensity, trees
//!
//! ## Distribution
//! - [`cluster`] - Node identity, config, TCP membership
//! - [`proto`] - Envelopes, the tagged message set, framing, signing
//! - [`remote`] - Pending-op correlation, behavior registry, remote errors
//! - [`global`] - Replicated global registry
//! - [`observer`] - Local and cluster-wide process snapshots
//!
//! The [`Node`] facade composes an actor system with the cluster runtime.

pub mod actor;
pub mod cluster;
pub mod error;
pub mod events;
pub mod global;
pub mod node;
pub mod observer;
pub mod prelude;
pub mod proto;
pub mod registry;
pub mod remote;
pub mod supervisor;
pub mod system;
pub mod table;
pub mod util;

// Re-export commonly used types
pub use actor::{
    ActorError, ActorRef, Behavior, BehaviorError, CallOutcome, CastOutcome, ExitReason, InfoMsg,
    Registration, ServerRef, StartOptions,
};
pub use cluster::{ClusterConfig, ClusterError, NodeEvent, NodeId};
pub use error::RuntimeError;
pub use events::{EventBus, LifecycleEvent, Subscription};
pub use global::GlobalNames;
pub use node::Node;
pub use observer::{ClusterObserver, ClusterSnapshot, NodeSnapshot, Observer};
pub use registry::{LocalRegistry, NamePattern, RegistryError, RegistryMode};
pub use remote::{BehaviorRegistry, RemoteError};
pub use supervisor::{
    ChildSpec, DynamicTemplate, RestartIntensity, RestartPolicy, Supervisor, SupervisorError,
    SupervisorSpec, SupervisorStrategy,
};
pub use system::{ActorStatus, ActorSystem, SystemConfig};
pub use table::{Table, TableError, TableType};
pub use util::{CorrelationId, LinkId, MonitorId, ServerId};
