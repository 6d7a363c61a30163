//! The per-node observer and the actor that serves snapshots remotely.

// Layer 1: Standard library imports
use std::collections::HashSet;
use std::sync::atomic::Ordering;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use super::snapshot::{ActorStats, NodeSnapshot, SupervisorStats, TreeChild, TreeEntry};
use crate::actor::{Behavior, BehaviorError, CallOutcome, CastOutcome};
use crate::system::ActorSystem;
use crate::util::ServerId;

/// Reads local process state and derives the process tree.
#[derive(Clone)]
pub struct Observer {
    system: ActorSystem,
}

impl Observer {
    /// An observer over the given system.
    pub fn new(system: ActorSystem) -> Self {
        Self { system }
    }

    /// Live actor count.
    pub fn process_count(&self) -> usize {
        self.system.actor_count()
    }

    /// Take a full snapshot of this node.
    pub fn snapshot(&self) -> NodeSnapshot {
        let shared = self.system.shared();
        let now = Utc::now();

        let mut actors: Vec<ActorStats> = shared
            .cells
            .iter()
            .map(|entry| {
                let cell = entry.value();
                ActorStats {
                    server: cell.server.clone(),
                    name: cell.name.clone(),
                    status: cell.status.get(),
                    mailbox_len: cell.metrics.queued(),
                    total_messages: cell.metrics.total(),
                    started_at: cell.started_at,
                    uptime_ms: (now - cell.started_at).num_milliseconds().max(0) as u64,
                }
            })
            .collect();
        actors.sort_by(|a, b| a.started_at.cmp(&b.started_at));

        let mut supervisors = Vec::new();
        let mut tree = Vec::new();
        let mut supervised: HashSet<ServerId> = HashSet::new();
        for entry in shared.supervisors.iter() {
            let stats = entry.value();
            let children = stats.children.lock().clone();
            for child in &children {
                if let Some(server) = &child.server {
                    supervised.insert(server.id);
                }
            }
            supervisors.push(SupervisorStats {
                id: stats.id.to_string(),
                strategy: stats.strategy.as_str().to_string(),
                child_count: children.len(),
                restart_count: stats.restart_count.load(Ordering::Relaxed),
                uptime_ms: (now - stats.started_at).num_milliseconds().max(0) as u64,
            });
            tree.push(TreeEntry::Supervisor {
                id: stats.id.to_string(),
                strategy: stats.strategy.as_str().to_string(),
                children: children
                    .into_iter()
                    .map(|child| TreeChild {
                        spec_id: child.spec_id,
                        server: child.server,
                    })
                    .collect(),
            });
        }
        supervisors.sort_by(|a, b| a.id.cmp(&b.id));

        // Standalone actors follow the supervisors in the tree.
        for stats in &actors {
            if !supervised.contains(&stats.server.id) {
                tree.push(TreeEntry::Actor {
                    server: stats.server.clone(),
                    name: stats.name.clone(),
                });
            }
        }

        NodeSnapshot {
            node: self.system.node_id().clone(),
            taken_at: now,
            process_count: actors.len(),
            actors,
            supervisors,
            tree,
        }
    }
}

/// Requests served by the observer actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObserverCall {
    /// Take and return a node snapshot.
    GetSnapshot,
}

/// The actor each node registers globally as `observer:<node_id>`, queried
/// by cluster observers through the ordinary remote-call machinery.
pub struct ObserverBehavior {
    observer: Observer,
}

impl ObserverBehavior {
    /// Build the behavior over a system.
    pub fn new(system: ActorSystem) -> Self {
        Self {
            observer: Observer::new(system),
        }
    }

    /// The global-registry name of the observer actor on `node`.
    pub fn global_name(node: &crate::cluster::NodeId) -> String {
        format!("observer:{node}")
    }
}

#[async_trait]
impl Behavior for ObserverBehavior {
    type State = ();
    type Call = ObserverCall;
    type Cast = ();
    type Reply = NodeSnapshot;

    async fn init(&self) -> Result<(), BehaviorError> {
        Ok(())
    }

    async fn handle_call(&self, msg: ObserverCall, state: ()) -> CallOutcome<NodeSnapshot, ()> {
        match msg {
            ObserverCall::GetSnapshot => CallOutcome::reply(self.observer.snapshot(), state),
        }
    }

    async fn handle_cast(&self, _msg: (), state: ()) -> CastOutcome<()> {
        CastOutcome::next(state)
    }
}
