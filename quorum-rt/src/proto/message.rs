//! The tagged cluster message set.
//!
//! Tags are stable lowercase snake_case; payload fields are camelCase on the
//! wire. The set is closed: every frame a node emits carries exactly one of
//! these payloads.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Layer 3: Internal module imports
use crate::actor::{ExitReason, Registration, ServerRef};
use crate::cluster::NodeId;
use crate::util::{CorrelationId, LinkId, MonitorId, ServerId};

/// Connection status of a known node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Dialing or awaiting the first heartbeat.
    Connecting,

    /// Heartbeats are flowing.
    Connected,

    /// Declared down; reconnect may be in progress.
    Disconnected,
}

/// Descriptive facts about one node, carried inside heartbeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// The node's identity.
    pub id: NodeId,

    /// Host it listens on.
    pub host: String,

    /// Port it listens on.
    pub port: u16,

    /// Connection status from the sender's point of view.
    pub status: NodeStatus,

    /// Live actors on the node.
    pub process_count: usize,

    /// Millisecond timestamp of the last heartbeat seen from this node.
    pub last_heartbeat_at: i64,

    /// Node uptime in milliseconds.
    pub uptime_ms: u64,
}

/// Why a node was declared down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeDownReason {
    /// No heartbeat inside `interval × miss_threshold`.
    HeartbeatTimeout,

    /// The TCP connection closed.
    ConnectionClosed,

    /// The dial attempt was refused.
    ConnectionRefused,

    /// The peer announced a graceful shutdown.
    GracefulShutdown,
}

/// Error category carried by `call_error`, rebuilt into a typed error on the
/// calling side. The message string is preserved; stacks are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallErrorKind {
    ServerNotRunning,
    CallTimeout,
    HandlerError,
    Serialization,
    Unknown,
}

/// Error category carried by `spawn_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnErrorKind {
    BehaviorNotFound,
    InitFailed,
    InitTimeout,
    RegistrationFailed,
    UnknownError,
}

/// Start options as they travel inside `spawn_request`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSpawnOptions {
    /// Name to register on the spawning node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Which registry receives the name.
    #[serde(default)]
    pub registration: Registration,

    /// Bound on init, milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_timeout_ms: Option<u64>,
}

impl WireSpawnOptions {
    /// Convert into the local start options.
    pub fn into_start_options(self) -> crate::actor::StartOptions {
        crate::actor::StartOptions {
            name: self.name,
            registration: self.registration,
            init_timeout: self
                .init_timeout_ms
                .map(std::time::Duration::from_millis),
            trap_exit: false,
        }
    }
}

/// One replicated-registry mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RegistryDelta {
    /// Insert or overwrite, subject to priority comparison.
    #[serde(rename_all = "camelCase")]
    Upsert {
        name: String,
        server: ServerRef,
        registered_at: i64,
    },

    /// Remove exactly the entry with this priority key.
    #[serde(rename_all = "camelCase")]
    Remove {
        name: String,
        registered_at: i64,
        node: NodeId,
    },
}

/// The closed set of cluster payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterMessage {
    /// Liveness + gossip: the sender's info and every node it knows.
    #[serde(rename_all = "camelCase")]
    Heartbeat {
        node_info: NodeInfo,
        known_nodes: Vec<NodeId>,
    },

    /// Remote call request.
    #[serde(rename_all = "camelCase")]
    Call {
        call_id: CorrelationId,
        target: ServerRef,
        payload: Value,
        timeout_ms: u64,
    },

    /// Successful call reply.
    #[serde(rename_all = "camelCase")]
    CallReply {
        call_id: CorrelationId,
        result: Value,
    },

    /// Failed call reply.
    #[serde(rename_all = "camelCase")]
    CallError {
        call_id: CorrelationId,
        error_type: CallErrorKind,
        message: String,
    },

    /// Fire-and-forget message.
    #[serde(rename_all = "camelCase")]
    Cast { target: ServerRef, payload: Value },

    /// Full or incremental replicated-registry sync.
    #[serde(rename_all = "camelCase")]
    RegistrySync {
        full_sync: bool,
        entries: Vec<RegistryDelta>,
    },

    /// A node is down (announced on graceful shutdown, or relayed).
    #[serde(rename_all = "camelCase")]
    NodeDown {
        node_id: NodeId,
        detected_at: i64,
        reason: NodeDownReason,
    },

    /// Remote spawn request, resolved through the receiver's behavior
    /// registry.
    #[serde(rename_all = "camelCase")]
    SpawnRequest {
        spawn_id: CorrelationId,
        behavior_name: String,
        options: WireSpawnOptions,
        timeout_ms: u64,
    },

    /// Successful spawn reply.
    #[serde(rename_all = "camelCase")]
    SpawnReply {
        spawn_id: CorrelationId,
        server_id: ServerId,
        node_id: NodeId,
    },

    /// Failed spawn reply.
    #[serde(rename_all = "camelCase")]
    SpawnError {
        spawn_id: CorrelationId,
        error_type: SpawnErrorKind,
        message: String,
    },

    /// Cross-node monitor setup.
    #[serde(rename_all = "camelCase")]
    MonitorRequest {
        monitor_id: MonitorId,
        owner: ServerRef,
        target: ServerRef,
    },

    /// Monitor setup acknowledgement.
    #[serde(rename_all = "camelCase")]
    MonitorAck {
        monitor_id: MonitorId,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Cross-node monitor teardown; fire-and-forget.
    #[serde(rename_all = "camelCase")]
    DemonitorRequest { monitor_id: MonitorId },

    /// A monitored actor terminated on its owning node.
    #[serde(rename_all = "camelCase")]
    ProcessDown {
        monitor_id: MonitorId,
        monitored: ServerRef,
        reason: ExitReason,
    },

    /// Cross-node link setup.
    #[serde(rename_all = "camelCase")]
    LinkRequest {
        link_id: LinkId,
        a: ServerRef,
        b: ServerRef,
    },

    /// Link setup acknowledgement.
    #[serde(rename_all = "camelCase")]
    LinkAck {
        link_id: LinkId,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Cross-node link teardown; fire-and-forget.
    #[serde(rename_all = "camelCase")]
    UnlinkRequest { link_id: LinkId },

    /// A linked actor exited abnormally on its owning node.
    #[serde(rename_all = "camelCase")]
    ExitSignal {
        link_id: LinkId,
        from: ServerRef,
        reason: ExitReason,
    },
}

impl ClusterMessage {
    /// The stable wire tag of this payload.
    pub fn tag(&self) -> &'static str {
        match self {
            ClusterMessage::Heartbeat { .. } => "heartbeat",
            ClusterMessage::Call { .. } => "call",
            ClusterMessage::CallReply { .. } => "call_reply",
            ClusterMessage::CallError { .. } => "call_error",
            ClusterMessage::Cast { .. } => "cast",
            ClusterMessage::RegistrySync { .. } => "registry_sync",
            ClusterMessage::NodeDown { .. } => "node_down",
            ClusterMessage::SpawnRequest { .. } => "spawn_request",
            ClusterMessage::SpawnReply { .. } => "spawn_reply",
            ClusterMessage::SpawnError { .. } => "spawn_error",
            ClusterMessage::MonitorRequest { .. } => "monitor_request",
            ClusterMessage::MonitorAck { .. } => "monitor_ack",
            ClusterMessage::DemonitorRequest { .. } => "demonitor_request",
            ClusterMessage::ProcessDown { .. } => "process_down",
            ClusterMessage::LinkRequest { .. } => "link_request",
            ClusterMessage::LinkAck { .. } => "link_ack",
            ClusterMessage::UnlinkRequest { .. } => "unlink_request",
            ClusterMessage::ExitSignal { .. } => "exit_signal",
        }
    }
}
