//! Snapshot data types produced by the observer.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::actor::ServerRef;
use crate::cluster::NodeId;
use crate::system::ActorStatus;

/// Per-actor statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorStats {
    /// The actor's ref.
    pub server: ServerRef,

    /// Registered name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Current lifecycle status.
    pub status: ActorStatus,

    /// Messages waiting in the mailbox.
    pub mailbox_len: usize,

    /// Messages processed since start.
    pub total_messages: u64,

    /// When the actor was spawned.
    pub started_at: DateTime<Utc>,

    /// Milliseconds since spawn.
    pub uptime_ms: u64,
}

/// Per-supervisor statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorStats {
    /// Supervisor id (uuid string form).
    pub id: String,

    /// Strategy name (`one_for_one`, ...).
    pub strategy: String,

    /// Number of child specs.
    pub child_count: usize,

    /// Restarts performed over the supervisor's lifetime.
    pub restart_count: u32,

    /// Milliseconds since the supervisor started.
    pub uptime_ms: u64,
}

/// One supervised child inside the process tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeChild {
    /// Child spec id.
    pub spec_id: String,

    /// Live instance ref, when the child is a running actor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerRef>,
}

/// One entry of the derived process tree: supervisors (with their children)
/// first, then standalone actors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeEntry {
    /// A supervisor with its current children.
    #[serde(rename_all = "camelCase")]
    Supervisor {
        id: String,
        strategy: String,
        children: Vec<TreeChild>,
    },

    /// An actor not owned by any supervisor.
    #[serde(rename_all = "camelCase")]
    Actor {
        server: ServerRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

/// Everything the observer knows about one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    /// The observed node.
    pub node: NodeId,

    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,

    /// Live actor count.
    pub process_count: usize,

    /// Per-actor statistics.
    pub actors: Vec<ActorStats>,

    /// Per-supervisor statistics.
    pub supervisors: Vec<SupervisorStats>,

    /// Derived process tree.
    pub tree: Vec<TreeEntry>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::util::ServerId;

    #[test]
    fn test_snapshot_serde_round_trip() {
        let node = NodeId::parse("n@h:1").unwrap();
        let server = ServerRef::new(ServerId::new(), node.clone());
        let snapshot = NodeSnapshot {
            node,
            taken_at: Utc::now(),
            process_count: 1,
            actors: vec![ActorStats {
                server: server.clone(),
                name: Some("db".to_string()),
                status: ActorStatus::Running,
                mailbox_len: 0,
                total_messages: 5,
                started_at: Utc::now(),
                uptime_ms: 100,
            }],
            supervisors: vec![SupervisorStats {
                id: "sup-1".to_string(),
                strategy: "one_for_one".to_string(),
                child_count: 1,
                restart_count: 0,
                uptime_ms: 100,
            }],
            tree: vec![
                TreeEntry::Supervisor {
                    id: "sup-1".to_string(),
                    strategy: "one_for_one".to_string(),
                    children: vec![TreeChild {
                        spec_id: "db".to_string(),
                        server: Some(server.clone()),
                    }],
                },
                TreeEntry::Actor {
                    server,
                    name: None,
                },
            ],
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: NodeSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_tree_entry_wire_tags() {
        let json = serde_json::to_value(TreeEntry::Actor {
            server: ServerRef::new(ServerId::new(), NodeId::parse("n@h:1").unwrap()),
            name: None,
        })
        .unwrap();
        assert_eq!(json["kind"], "actor");
    }
}
