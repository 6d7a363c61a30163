//! Cluster-wide snapshot aggregation.
//!
//! The coordinator fans a `get_snapshot` call out to every connected node's
//! observer actor (located through the replicated registry), bounded by one
//! timeout per node. Unreachable or slow nodes appear in the result as
//! `disconnected`, `timeout`, or `error`; a partial snapshot is a normal
//! outcome, not a failure.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

// Layer 3: Internal module imports
use super::local::{Observer, ObserverBehavior, ObserverCall};
use super::snapshot::NodeSnapshot;
use crate::actor::ActorRef;
use crate::cluster::runtime::ClusterRuntime;
use crate::cluster::NodeId;
use crate::error::RuntimeError;
use crate::global::GlobalNames;
use crate::system::ActorSystem;

/// Default per-node snapshot timeout.
pub const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_millis(5000);

/// How long an aggregated snapshot stays cached.
const CACHE_TTL: Duration = Duration::from_millis(2000);

/// Outcome of querying one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeObservationStatus {
    /// The node answered.
    Ok,

    /// The node is not connected (or exposes no observer).
    Disconnected,

    /// The node did not answer inside the timeout.
    Timeout,

    /// The query failed.
    Error,
}

/// One node's slice of the aggregated snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeObservation {
    /// The queried node.
    pub node: NodeId,

    /// How the query went.
    pub status: NodeObservationStatus,

    /// The node's snapshot when `status` is `Ok`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<NodeSnapshot>,

    /// Failure description otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The aggregated, possibly partial, cluster view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    /// When the aggregation was performed.
    pub taken_at: DateTime<Utc>,

    /// One observation per node, the local node first.
    pub nodes: Vec<NodeObservation>,
}

impl ClusterSnapshot {
    /// Total live actors across the nodes that answered.
    pub fn total_processes(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(|obs| obs.snapshot.as_ref())
            .map(|snap| snap.process_count)
            .sum()
    }

    /// Nodes that answered.
    pub fn responsive_nodes(&self) -> usize {
        self.nodes
            .iter()
            .filter(|obs| obs.status == NodeObservationStatus::Ok)
            .count()
    }
}

/// Fans snapshot queries out to the cluster and caches the result briefly.
pub struct ClusterObserver {
    system: ActorSystem,
    runtime: Arc<ClusterRuntime>,
    global: Arc<GlobalNames>,
    timeout: Duration,
    cache: Mutex<Option<(Instant, ClusterSnapshot)>>,
}

impl ClusterObserver {
    pub(crate) fn new(
        system: ActorSystem,
        runtime: Arc<ClusterRuntime>,
        global: Arc<GlobalNames>,
    ) -> Self {
        Self {
            system,
            runtime,
            global,
            timeout: DEFAULT_SNAPSHOT_TIMEOUT,
            cache: Mutex::new(None),
        }
    }

    /// Override the per-node query timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Aggregate a cluster snapshot, serving a cached one when fresh.
    pub async fn snapshot(&self) -> Result<ClusterSnapshot, RuntimeError> {
        if let Some((at, cached)) = self.cache.lock().clone() {
            if at.elapsed() < CACHE_TTL {
                return Ok(cached);
            }
        }

        let local = Observer::new(self.system.clone()).snapshot();
        let mut nodes = vec![NodeObservation {
            node: self.system.node_id().clone(),
            status: NodeObservationStatus::Ok,
            snapshot: Some(local),
            error: None,
        }];

        let mut queries = Vec::new();
        for node in self.runtime.connected_nodes() {
            let system = self.system.clone();
            let global = Arc::clone(&self.global);
            let timeout = self.timeout;
            queries.push(tokio::spawn(async move {
                observe_node(system, global, node, timeout).await
            }));
        }
        for query in queries {
            match query.await {
                Ok(observation) => nodes.push(observation),
                Err(err) => {
                    tracing::warn!(error = %err, "snapshot query task failed");
                }
            }
        }

        let snapshot = ClusterSnapshot {
            taken_at: Utc::now(),
            nodes,
        };
        *self.cache.lock() = Some((Instant::now(), snapshot.clone()));
        Ok(snapshot)
    }
}

async fn observe_node(
    system: ActorSystem,
    global: Arc<GlobalNames>,
    node: NodeId,
    timeout: Duration,
) -> NodeObservation {
    let Some(server) = global.whereis(&ObserverBehavior::global_name(&node)) else {
        return NodeObservation {
            node,
            status: NodeObservationStatus::Disconnected,
            snapshot: None,
            error: Some("observer not registered".to_string()),
        };
    };
    let observer: ActorRef<ObserverBehavior> = ActorRef::from_server_ref(server);
    match system
        .call_with_timeout(&observer, ObserverCall::GetSnapshot, timeout)
        .await
    {
        Ok(snapshot) => NodeObservation {
            node,
            status: NodeObservationStatus::Ok,
            snapshot: Some(snapshot),
            error: None,
        },
        Err(err) if err.is_timeout() => NodeObservation {
            node,
            status: NodeObservationStatus::Timeout,
            snapshot: None,
            error: Some(err.to_string()),
        },
        Err(err) => NodeObservation {
            node,
            status: NodeObservationStatus::Error,
            snapshot: None,
            error: Some(err.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_status_serde_names() {
        assert_eq!(
            serde_json::to_string(&NodeObservationStatus::Disconnected).unwrap(),
            "\"disconnected\""
        );
        assert_eq!(
            serde_json::to_string(&NodeObservationStatus::Timeout).unwrap(),
            "\"timeout\""
        );
    }

    #[test]
    fn test_cluster_snapshot_totals() {
        let snapshot = ClusterSnapshot {
            taken_at: Utc::now(),
            nodes: vec![],
        };
        assert_eq!(snapshot.total_processes(), 0);
        assert_eq!(snapshot.responsive_nodes(), 0);
    }
}
