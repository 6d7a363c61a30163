//! Two-node clustering over loopback TCP: remote spawn/call/cast, failure
//! detection, envelope signing, the replicated registry, and the cluster
//! observer.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use quorum_rt::actor::{ActorRef, Behavior, BehaviorError, CallOutcome, CastOutcome, StartOptions};
use quorum_rt::cluster::{ClusterConfig, NodeEvent, NodeId};
use quorum_rt::node::Node;
use quorum_rt::proto::{
    ClusterMessage, Envelope, NodeDownReason, NodeInfo, NodeStatus, WireCodec, WireSpawnOptions,
};
use quorum_rt::remote::RemoteError;
use quorum_rt::util::ServerId;

#[derive(Debug, Serialize, Deserialize)]
enum CounterCall {
    Get,
}

#[derive(Debug, Serialize, Deserialize)]
enum CounterCast {
    Inc,
}

#[derive(Default)]
struct Counter;

#[async_trait]
impl Behavior for Counter {
    type State = i64;
    type Call = CounterCall;
    type Cast = CounterCast;
    type Reply = i64;

    async fn init(&self) -> Result<i64, BehaviorError> {
        Ok(0)
    }

    async fn handle_call(&self, _msg: CounterCall, state: i64) -> CallOutcome<i64, i64> {
        CallOutcome::reply(state, state)
    }

    async fn handle_cast(&self, _msg: CounterCast, state: i64) -> CastOutcome<i64> {
        CastOutcome::next(state + 1)
    }
}

fn fast_config(name: &str, port: u16) -> ClusterConfig {
    ClusterConfig::builder(name)
        .with_host("127.0.0.1")
        .with_port(port)
        .with_heartbeat_interval(Duration::from_millis(100))
        .with_heartbeat_miss_threshold(3)
        .with_reconnect_delays(Duration::from_millis(50), Duration::from_millis(200))
        .build()
        .unwrap()
}

async fn wait_connected(node: &Node, peer: &NodeId, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !node.connected_nodes().contains(peer) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "{} never connected to {}",
            node.id(),
            peer
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn start_pair(a_port: u16, b_port: u16) -> (Node, Node) {
    let node_b = Node::new(fast_config("beta", b_port)).unwrap();
    node_b.register_behavior("counter", Counter);
    node_b.start().await.unwrap();

    let mut a_config = fast_config("alpha", a_port);
    a_config.seeds = vec![format!("beta@127.0.0.1:{b_port}")];
    let node_a = Node::new(a_config).unwrap();
    node_a.register_behavior("counter", Counter);
    node_a.start().await.unwrap();

    wait_connected(&node_a, node_b.id(), Duration::from_secs(5)).await;
    wait_connected(&node_b, node_a.id(), Duration::from_secs(5)).await;
    (node_a, node_b)
}

#[tokio::test]
async fn remote_spawn_call_and_cast_round_trip() {
    let (node_a, node_b) = start_pair(46101, 46102).await;

    let server = node_a
        .spawn_at(node_b.id(), "counter", WireSpawnOptions::default())
        .await
        .unwrap();
    assert_eq!(&server.node, node_b.id());

    let counter: ActorRef<Counter> = ActorRef::from_server_ref(server);
    let value = node_a.system().call(&counter, CounterCall::Get).await.unwrap();
    assert_eq!(value, 0);

    node_a.system().cast(&counter, CounterCast::Inc);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let value = node_a.system().call(&counter, CounterCall::Get).await.unwrap();
        if value == 1 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "cast never arrived");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    node_a.stop().await;
    node_b.stop().await;
}

#[tokio::test]
async fn spawn_of_unknown_behavior_fails_with_behavior_not_found() {
    let (node_a, node_b) = start_pair(46103, 46104).await;

    let err = node_a
        .spawn_at(node_b.id(), "missing", WireSpawnOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_remote(),
        Some(RemoteError::BehaviorNotFound(_))
    ));

    node_a.stop().await;
    node_b.stop().await;
}

#[tokio::test]
async fn graceful_shutdown_fails_pending_and_subsequent_calls() {
    let (node_a, node_b) = start_pair(46105, 46106).await;
    let mut events = node_a.node_events().unwrap();

    let server = node_a
        .spawn_at(node_b.id(), "counter", WireSpawnOptions::default())
        .await
        .unwrap();
    let counter: ActorRef<Counter> = ActorRef::from_server_ref(server);

    node_b.stop().await;

    // The peer announced node_down {graceful_shutdown}; alpha sees it and
    // fails calls to beta from then on.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        match events.try_recv() {
            Ok(NodeEvent::NodeDown { node, reason, .. }) => {
                assert_eq!(&node, node_b.id());
                assert!(matches!(
                    reason,
                    NodeDownReason::GracefulShutdown | NodeDownReason::ConnectionClosed
                ));
                break;
            }
            _ => {
                assert!(
                    tokio::time::Instant::now() < deadline,
                    "no node_down observed"
                );
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }

    let err = node_a
        .system()
        .call(&counter, CounterCall::Get)
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_remote(),
        Some(RemoteError::NodeNotReachable(_))
    ));

    node_a.stop().await;
}

#[tokio::test]
async fn silent_peer_is_declared_down_and_pending_calls_fail() {
    let config = fast_config("alpha", 46107);
    let interval = config.heartbeat_interval();
    let node_a = Node::new(config).unwrap();
    node_a.start().await.unwrap();

    // A scripted peer: completes the heartbeat handshake, then goes silent.
    let fake_id = NodeId::parse("ghost@127.0.0.1:59991").unwrap();
    let stream = TcpStream::connect("127.0.0.1:46107").await.unwrap();
    let mut framed = Framed::new(stream, WireCodec::default());
    let hello = Envelope::sealed(
        fake_id.clone(),
        ClusterMessage::Heartbeat {
            node_info: NodeInfo {
                id: fake_id.clone(),
                host: "127.0.0.1".to_string(),
                port: 59991,
                status: NodeStatus::Connected,
                process_count: 0,
                last_heartbeat_at: 0,
                uptime_ms: 0,
            },
            known_nodes: vec![],
        },
        None,
    )
    .unwrap();
    framed.send(hello).await.unwrap();
    // Alpha's own handshake heartbeat.
    let greeting = framed.next().await.unwrap().unwrap();
    assert_eq!(&greeting.from, node_a.id());

    wait_connected(&node_a, &fake_id, Duration::from_secs(2)).await;

    // A call towards the silent peer sits pending until detection.
    let target: ActorRef<Counter> =
        ActorRef::from_server_ref(quorum_rt::actor::ServerRef::new(ServerId::new(), fake_id));
    let started = tokio::time::Instant::now();
    let err = node_a
        .system()
        .call_with_timeout(&target, CounterCall::Get, Duration::from_secs(10))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(
        err.as_remote(),
        Some(RemoteError::NodeNotReachable(_))
    ));
    // Declared down by heartbeat silence, well before the call timeout and
    // within a few multiples of the heartbeat interval.
    assert!(elapsed < interval * 10, "detection took {elapsed:?}");

    node_a.stop().await;
}

#[tokio::test]
async fn unsigned_frames_are_rejected_when_a_secret_is_set() {
    let mut config = fast_config("alpha", 46108);
    config.cluster_secret = Some("s3cret".to_string());
    let node_a = Node::new(config).unwrap();
    node_a.start().await.unwrap();

    let fake_id = NodeId::parse("mallory@127.0.0.1:59992").unwrap();
    let stream = TcpStream::connect("127.0.0.1:46108").await.unwrap();
    let mut framed = Framed::new(stream, WireCodec::default());
    // Unsigned heartbeat: must be dropped and the connection closed.
    let unsigned = Envelope::sealed(
        fake_id.clone(),
        ClusterMessage::Heartbeat {
            node_info: NodeInfo {
                id: fake_id.clone(),
                host: "127.0.0.1".to_string(),
                port: 59992,
                status: NodeStatus::Connected,
                process_count: 0,
                last_heartbeat_at: 0,
                uptime_ms: 0,
            },
            known_nodes: vec![],
        },
        None,
    )
    .unwrap();
    framed.send(unsigned).await.unwrap();

    // The forged peer never becomes part of the membership.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(node_a.connected_nodes().is_empty());

    node_a.stop().await;
}

#[tokio::test]
async fn wrongly_signed_frames_are_rejected() {
    let mut config = fast_config("alpha", 46109);
    config.cluster_secret = Some("s3cret".to_string());
    let node_a = Node::new(config).unwrap();
    node_a.start().await.unwrap();

    let fake_id = NodeId::parse("mallory@127.0.0.1:59993").unwrap();
    let stream = TcpStream::connect("127.0.0.1:46109").await.unwrap();
    let mut framed = Framed::new(stream, WireCodec::default());
    let wrong = Envelope::sealed(
        fake_id.clone(),
        ClusterMessage::Heartbeat {
            node_info: NodeInfo {
                id: fake_id.clone(),
                host: "127.0.0.1".to_string(),
                port: 59993,
                status: NodeStatus::Connected,
                process_count: 0,
                last_heartbeat_at: 0,
                uptime_ms: 0,
            },
            known_nodes: vec![],
        },
        Some("wrong-secret"),
    )
    .unwrap();
    framed.send(wrong).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(node_a.connected_nodes().is_empty());

    node_a.stop().await;
}

#[tokio::test]
async fn global_registry_converges_and_cleans_up() {
    let (node_a, node_b) = start_pair(46110, 46111).await;

    let actor = node_a
        .system()
        .start(Counter, StartOptions::global("svc:shared"))
        .await
        .unwrap();

    // Beta converges on the registration via the incremental sync.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(server) = node_b.global().whereis("svc:shared") {
            assert_eq!(&server, actor.server_ref());
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "registration never synced"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // A conflicting registration on beta loses deterministically.
    let loser = node_b
        .system()
        .start(Counter, StartOptions::global("svc:shared"))
        .await;
    assert!(loser.is_err());

    // Terminating the owner removes the name everywhere.
    node_a.system().stop(actor.server_ref()).await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while node_b.global().whereis("svc:shared").is_some() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "registration never cleaned up"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    node_a.stop().await;
    node_b.stop().await;
}

#[tokio::test]
async fn downed_node_names_are_swept_from_replicas() {
    let (node_a, node_b) = start_pair(46112, 46113).await;

    let _actor = node_b
        .system()
        .start(Counter, StartOptions::global("svc:beta"))
        .await
        .unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while node_a.global().whereis("svc:beta").is_none() {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    node_b.stop().await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while node_a.global().whereis("svc:beta").is_some() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "names of a downed node must be swept"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    node_a.stop().await;
}

#[tokio::test]
async fn cluster_observer_aggregates_both_nodes() {
    let (node_a, node_b) = start_pair(46114, 46115).await;

    let _worker = node_b
        .system()
        .start(Counter, StartOptions::named("worker"))
        .await
        .unwrap();

    let observer = node_a.cluster_observer().unwrap();
    let snapshot = observer.snapshot().await.unwrap();

    assert_eq!(snapshot.nodes.len(), 2);
    assert_eq!(snapshot.responsive_nodes(), 2);
    // Each node runs at least its observer actor.
    assert!(snapshot.total_processes() >= 2);
    let beta = snapshot
        .nodes
        .iter()
        .find(|obs| &obs.node == node_b.id())
        .unwrap();
    let beta_snapshot = beta.snapshot.as_ref().unwrap();
    assert!(beta_snapshot
        .actors
        .iter()
        .any(|stats| stats.name.as_deref() == Some("worker")));

    node_a.stop().await;
    node_b.stop().await;
}
