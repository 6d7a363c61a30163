//! The cluster runtime: TCP membership, heartbeats, gossip, reconnect, and
//! the wire-side of every distributed operation.
//!
//! Membership mutations happen only here. Each connection gets a dedicated
//! writer task draining an unbounded outbox (sends serialize per peer) and a
//! reader loop dispatching verified envelopes. Peers are declared down by
//! heartbeat silence, socket closure, or an announced graceful shutdown;
//! every pending operation targeting a downed node fails with
//! `NodeNotReachable`, remote monitors resolve with `noconnection`, and the
//! global registry drops the node's names.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

// Layer 3: Internal module imports
use super::config::ClusterConfig;
use super::error::ClusterError;
use super::node_id::NodeId;
use crate::actor::{ActorError, ExitReason, ServerRef, StartOptions};
use crate::error::RuntimeError;
use crate::global::GlobalNames;
use crate::proto::{
    CallErrorKind, ClusterMessage, Envelope, NodeDownReason, NodeInfo, NodeStatus, SpawnErrorKind,
    WireCodec, WireSpawnOptions,
};
use crate::remote::error::RemoteError;
use crate::remote::pending::PendingTable;
use crate::remote::registry::BehaviorRegistry;
use crate::remote::router::RemoteRouter;
use crate::system::ActorSystem;
use crate::util::{CorrelationId, LinkId, MonitorId};

/// Membership change notification.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// A peer connection completed its handshake.
    NodeUp {
        /// The peer that came up.
        node: NodeId,
    },

    /// A peer was declared down.
    NodeDown {
        /// The peer that went down.
        node: NodeId,
        /// Why it was declared down.
        reason: NodeDownReason,
        /// Millisecond timestamp of the detection.
        detected_at: i64,
    },
}

/// One endpoint pair of a cross-node monitor or link, as stored locally.
#[derive(Debug, Clone)]
struct RemotePair {
    local: ServerRef,
    remote: ServerRef,
}

struct PeerState {
    info: NodeInfo,
    outbox: Option<UnboundedSender<Envelope>>,
    /// Which side initiated the live connection; the duplicate-connection
    /// tiebreak keeps the connection initiated by the smaller node id.
    initiator: Option<NodeId>,
    /// Bumped on every connection change; stale readers observe the bump and
    /// exit without declaring the peer down.
    epoch: u64,
}

enum Direction {
    Inbound,
    Outbound,
}

pub(crate) struct ClusterRuntime {
    system: ActorSystem,
    config: ClusterConfig,
    local: NodeId,
    started_at: DateTime<Utc>,
    peers: DashMap<NodeId, PeerState>,
    dial_guards: DashMap<NodeId, ()>,
    pending_calls: PendingTable<CorrelationId, Value>,
    pending_spawns: PendingTable<CorrelationId, ServerRef>,
    pending_monitors: PendingTable<MonitorId, ()>,
    pending_links: PendingTable<LinkId, ()>,
    behaviors: Arc<BehaviorRegistry>,
    global: Arc<GlobalNames>,
    monitors_out: DashMap<MonitorId, RemotePair>,
    monitors_in: DashMap<MonitorId, RemotePair>,
    links: DashMap<LinkId, RemotePair>,
    events_tx: broadcast::Sender<NodeEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    epoch_counter: AtomicU64,
}

impl ClusterRuntime {
    /// Bind the listener, wire the system seams, and start the background
    /// tasks (accept loop, heartbeats, seed dialers).
    pub(crate) async fn start(
        system: ActorSystem,
        config: ClusterConfig,
        behaviors: Arc<BehaviorRegistry>,
        global: Arc<GlobalNames>,
    ) -> Result<Arc<Self>, ClusterError> {
        config.validate()?;
        let local = config.node_id()?;
        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|err| ClusterError::Bind {
                addr: bind_addr.clone(),
                message: err.to_string(),
            })?;
        info!(node = %local, addr = %bind_addr, "cluster listener bound");

        let (events_tx, _) = broadcast::channel(256);
        let seeds = config.seed_nodes()?;
        let runtime = Arc::new(Self {
            system: system.clone(),
            config,
            local,
            started_at: Utc::now(),
            peers: DashMap::new(),
            dial_guards: DashMap::new(),
            pending_calls: PendingTable::new(),
            pending_spawns: PendingTable::new(),
            pending_monitors: PendingTable::new(),
            pending_links: PendingTable::new(),
            behaviors,
            global: Arc::clone(&global),
            monitors_out: DashMap::new(),
            monitors_in: DashMap::new(),
            links: DashMap::new(),
            events_tx,
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
            epoch_counter: AtomicU64::new(1),
        });

        if system
            .shared()
            .router
            .set(Arc::clone(&runtime) as Arc<dyn RemoteRouter>)
            .is_err()
        {
            return Err(ClusterError::AlreadyStarted);
        }

        // Replicated-registry deltas fan out over live connections.
        let broadcaster_rt = Arc::downgrade(&runtime);
        global.attach_broadcaster(Arc::new(move |deltas| {
            if let Some(rt) = broadcaster_rt.upgrade() {
                rt.broadcast(ClusterMessage::RegistrySync {
                    full_sync: false,
                    entries: deltas,
                });
            }
        }));

        // Local terminations drive remote monitor/link notification.
        let hook_rt: Weak<ClusterRuntime> = Arc::downgrade(&runtime);
        system
            .shared()
            .add_terminate_hook(Arc::new(move |server, reason| {
                if let Some(rt) = hook_rt.upgrade() {
                    rt.on_local_terminated(server, reason);
                }
            }));

        // Accept loop.
        let accept_rt = Arc::clone(&runtime);
        runtime.track(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        let conn_rt = Arc::clone(&accept_rt);
                        conn_rt.track(tokio::spawn(
                            Arc::clone(&accept_rt).run_connection(stream, Direction::Inbound),
                        ));
                    }
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }));

        // Heartbeat + failure detection.
        let hb_rt = Arc::clone(&runtime);
        runtime.track(tokio::spawn(async move {
            hb_rt.heartbeat_loop().await;
        }));

        for seed in seeds {
            runtime.ensure_dial(seed);
        }

        Ok(runtime)
    }

    fn secret(&self) -> Option<&str> {
        self.config.cluster_secret.as_deref()
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Membership event stream.
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events_tx.subscribe()
    }

    pub(crate) fn is_connected(&self, node: &NodeId) -> bool {
        self.peers
            .get(node)
            .map(|peer| peer.info.status == NodeStatus::Connected)
            .unwrap_or(false)
    }

    /// Info for every known peer.
    pub(crate) fn known_peers(&self) -> Vec<NodeInfo> {
        self.peers.iter().map(|peer| peer.info.clone()).collect()
    }

    /// Identities of peers with a live connection.
    pub(crate) fn connected_nodes(&self) -> Vec<NodeId> {
        self.peers
            .iter()
            .filter(|peer| peer.info.status == NodeStatus::Connected)
            .map(|peer| peer.key().clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    fn send_to(&self, node: &NodeId, payload: ClusterMessage) -> bool {
        let Some(peer) = self.peers.get(node) else {
            return false;
        };
        let Some(outbox) = peer.outbox.clone() else {
            return false;
        };
        drop(peer);
        match Envelope::sealed(self.local.clone(), payload, self.secret()) {
            Ok(envelope) => outbox.send(envelope).is_ok(),
            Err(err) => {
                warn!(error = %err, "failed to seal envelope");
                false
            }
        }
    }

    fn broadcast(&self, payload: ClusterMessage) {
        let nodes = self.connected_nodes();
        for node in nodes {
            self.send_to(&node, payload.clone());
        }
    }

    fn self_info(&self) -> NodeInfo {
        NodeInfo {
            id: self.local.clone(),
            host: self.config.host.clone(),
            port: self.config.port,
            status: NodeStatus::Connected,
            process_count: self.system.actor_count(),
            last_heartbeat_at: Utc::now().timestamp_millis(),
            uptime_ms: (Utc::now() - self.started_at).num_milliseconds().max(0) as u64,
        }
    }

    fn heartbeat_message(&self) -> ClusterMessage {
        ClusterMessage::Heartbeat {
            node_info: self.self_info(),
            known_nodes: self.connected_nodes(),
        }
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Register a completed handshake, applying the duplicate-connection
    /// tiebreak: the connection initiated by the smaller node id survives.
    fn register_connection(
        &self,
        peer: &NodeId,
        outbox: UnboundedSender<Envelope>,
        initiator: NodeId,
    ) -> Option<u64> {
        let epoch = self.epoch_counter.fetch_add(1, Ordering::SeqCst);
        let mut entry = self.peers.entry(peer.clone()).or_insert_with(|| PeerState {
            info: NodeInfo {
                id: peer.clone(),
                host: peer.host().to_string(),
                port: peer.port(),
                status: NodeStatus::Connecting,
                process_count: 0,
                last_heartbeat_at: 0,
                uptime_ms: 0,
            },
            outbox: None,
            initiator: None,
            epoch: 0,
        });

        if entry.outbox.is_some() {
            let keep_existing = match &entry.initiator {
                Some(existing) => existing <= &initiator,
                None => false,
            };
            if keep_existing {
                debug!(peer = %peer, "duplicate connection rejected by tiebreak");
                return None;
            }
        }

        entry.outbox = Some(outbox);
        entry.initiator = Some(initiator);
        entry.info.status = NodeStatus::Connected;
        entry.info.last_heartbeat_at = Utc::now().timestamp_millis();
        entry.epoch = epoch;
        Some(epoch)
    }

    fn current_epoch(&self, peer: &NodeId) -> Option<u64> {
        self.peers.get(peer).map(|entry| entry.epoch)
    }

    async fn run_connection(self: Arc<Self>, stream: TcpStream, direction: Direction) {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        let mut reader: FramedRead<OwnedReadHalf, WireCodec> =
            FramedRead::new(read_half, WireCodec::new(self.config.max_frame_bytes));
        let mut writer: FramedWrite<OwnedWriteHalf, WireCodec> =
            FramedWrite::new(write_half, WireCodec::new(self.config.max_frame_bytes));

        // Handshake: the first envelope each way is a heartbeat revealing
        // the sender's identity and known nodes.
        let hello = match Envelope::sealed(self.local.clone(), self.heartbeat_message(), self.secret())
        {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "handshake seal failed");
                return;
            }
        };
        if writer.send(hello).await.is_err() {
            return;
        }

        let first = match reader.next().await {
            Some(Ok(envelope)) if envelope.verify(self.secret()) => envelope,
            Some(Ok(_)) => {
                warn!("handshake envelope failed verification, closing");
                return;
            }
            _ => return,
        };
        let peer = first.from.clone();
        if peer == self.local {
            return;
        }

        let initiator = match direction {
            Direction::Outbound => self.local.clone(),
            Direction::Inbound => peer.clone(),
        };
        let (outbox_tx, mut outbox_rx) = unbounded_channel::<Envelope>();
        let Some(epoch) = self.register_connection(&peer, outbox_tx, initiator) else {
            return;
        };
        info!(peer = %peer, "node connected");

        // Dedicated writer: serializes sends, drains fully before closing.
        self.track(tokio::spawn(async move {
            while let Some(envelope) = outbox_rx.recv().await {
                if writer.send(envelope).await.is_err() {
                    break;
                }
            }
            let _ = writer.flush().await;
            let _ = writer.close().await;
        }));

        let _ = self.events_tx.send(NodeEvent::NodeUp { node: peer.clone() });

        // A fresh connection receives our full replicated-registry state.
        self.send_to(
            &peer,
            ClusterMessage::RegistrySync {
                full_sync: true,
                entries: self.global.snapshot(),
            },
        );

        self.handle_envelope(first).await;

        while let Some(item) = reader.next().await {
            if self.current_epoch(&peer) != Some(epoch) {
                // Superseded by a newer connection; bow out quietly.
                return;
            }
            match item {
                Ok(envelope) => {
                    if !envelope.verify(self.secret()) {
                        warn!(peer = %peer, "dropping frame with bad signature, closing connection");
                        break;
                    }
                    self.handle_envelope(envelope).await;
                }
                Err(err) => {
                    debug!(peer = %peer, error = %err, "connection read error");
                    break;
                }
            }
        }

        if self.current_epoch(&peer) == Some(epoch) {
            self.mark_down(&peer, NodeDownReason::ConnectionClosed);
        }
    }

    /// Start (at most one) dial loop for `target` with full-jitter backoff.
    fn ensure_dial(self: &Arc<Self>, target: NodeId) {
        if !self.is_running() || target == self.local || self.is_connected(&target) {
            return;
        }
        if self.dial_guards.insert(target.clone(), ()).is_some() {
            return;
        }

        let runtime = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let base = runtime.config.reconnect_base_delay();
            let max = runtime.config.reconnect_max_delay();
            let mut rng = SmallRng::from_entropy();
            let mut attempt: u32 = 0;
            while runtime.is_running() {
                if runtime.is_connected(&target) {
                    break;
                }
                match TcpStream::connect(target.addr()).await {
                    Ok(stream) => {
                        attempt = 0;
                        Arc::clone(&runtime)
                            .run_connection(stream, Direction::Outbound)
                            .await;
                        if !runtime.is_running() {
                            break;
                        }
                    }
                    Err(err) => {
                        debug!(target = %target, error = %err, "dial failed");
                        if let Some(mut peer) = runtime.peers.get_mut(&target) {
                            if peer.info.status == NodeStatus::Connected {
                                drop(peer);
                                runtime.mark_down(&target, NodeDownReason::ConnectionRefused);
                            } else {
                                peer.info.status = NodeStatus::Disconnected;
                            }
                        }
                    }
                }
                // Full jitter between 0 and the exponential ceiling.
                let ceiling = base
                    .saturating_mul(2u32.saturating_pow(attempt.min(16)))
                    .min(max);
                let sleep_ms = rng.gen_range(0..=ceiling.as_millis().max(1) as u64);
                tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
                attempt = attempt.saturating_add(1);
            }
            runtime.dial_guards.remove(&target);
        });
        self.track(handle);
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !self.is_running() {
                break;
            }
            let heartbeat = self.heartbeat_message();
            for node in self.connected_nodes() {
                self.send_to(&node, heartbeat.clone());
            }

            // Failure detection: declared down after threshold silent
            // intervals.
            let deadline = Utc::now().timestamp_millis()
                - self.config.down_after().as_millis() as i64;
            let stale: Vec<NodeId> = self
                .peers
                .iter()
                .filter(|peer| {
                    peer.info.status == NodeStatus::Connected
                        && peer.info.last_heartbeat_at < deadline
                })
                .map(|peer| peer.key().clone())
                .collect();
            for node in stale {
                self.mark_down(&node, NodeDownReason::HeartbeatTimeout);
            }
        }
    }

    /// Declare a peer down and run every consequence in one place.
    fn mark_down(self: &Arc<Self>, node: &NodeId, reason: NodeDownReason) {
        {
            let Some(mut peer) = self.peers.get_mut(node) else {
                return;
            };
            if peer.info.status == NodeStatus::Disconnected {
                return;
            }
            peer.info.status = NodeStatus::Disconnected;
            peer.outbox = None;
            peer.initiator = None;
            peer.epoch = self.epoch_counter.fetch_add(1, Ordering::SeqCst);
        }
        let detected_at = Utc::now().timestamp_millis();
        warn!(node = %node, reason = ?reason, "node down");

        // Every pending operation targeting the node fails now.
        self.pending_calls.fail_node(node);
        self.pending_spawns.fail_node(node);
        self.pending_monitors.fail_node(node);
        self.pending_links.fail_node(node);

        // Outgoing monitors resolve locally with `noconnection`.
        let lost_monitors: Vec<(MonitorId, RemotePair)> = self
            .monitors_out
            .iter()
            .filter(|entry| &entry.value().remote.node == node)
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        for (monitor_id, pair) in lost_monitors {
            self.monitors_out.remove(&monitor_id);
            self.system.shared().notify_monitor_down(
                monitor_id,
                &pair.local,
                &pair.remote,
                ExitReason::NoConnection,
            );
        }
        // Incoming monitors from the node are erased silently.
        self.monitors_in.retain(|_, pair| &pair.remote.node != node);

        // Remote links deliver `noconnection` exit signals locally.
        let lost_links: Vec<(LinkId, RemotePair)> = self
            .links
            .iter()
            .filter(|entry| &entry.value().remote.node == node)
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        for (link_id, pair) in lost_links {
            self.links.remove(&link_id);
            let shared = self.system.shared();
            if shared.trap_exit_of(pair.local.id) {
                shared.deliver_exit_signal(
                    &pair.local,
                    &pair.remote,
                    ExitReason::NoConnection,
                    link_id,
                );
            } else {
                shared.initiate_stop(pair.local.id, ExitReason::NoConnection);
            }
        }

        // The node's global names disappear from every replica.
        self.global.cleanup_node(node);

        let _ = self.events_tx.send(NodeEvent::NodeDown {
            node: node.clone(),
            reason,
            detected_at,
        });

        if self.is_running() && reason != NodeDownReason::GracefulShutdown {
            self.ensure_dial(node.clone());
        }
    }

    // ------------------------------------------------------------------
    // Inbound dispatch
    // ------------------------------------------------------------------

    async fn handle_envelope(self: &Arc<Self>, envelope: Envelope) {
        let from = envelope.from.clone();
        match envelope.payload {
            ClusterMessage::Heartbeat {
                node_info,
                known_nodes,
            } => {
                if let Some(mut peer) = self.peers.get_mut(&from) {
                    peer.info.process_count = node_info.process_count;
                    peer.info.uptime_ms = node_info.uptime_ms;
                    peer.info.host = node_info.host;
                    peer.info.port = node_info.port;
                    peer.info.last_heartbeat_at = Utc::now().timestamp_millis();
                }
                // Gossip: dial any node we have not met yet.
                for node in known_nodes {
                    if node != self.local && !self.is_connected(&node) {
                        self.ensure_dial(node);
                    }
                }
            }

            ClusterMessage::Call {
                call_id,
                target,
                payload,
                timeout_ms,
            } => {
                let runtime = Arc::clone(self);
                let task = tokio::spawn(async move {
                    let reply = if target.node != runtime.local {
                        ClusterMessage::CallError {
                            call_id,
                            error_type: CallErrorKind::Unknown,
                            message: "call routed to the wrong node".to_string(),
                        }
                    } else {
                        let timeout = Duration::from_millis(timeout_ms.max(1));
                        match runtime.system.call_value(target.id, payload, timeout).await {
                            Ok(result) => ClusterMessage::CallReply { call_id, result },
                            Err(err) => ClusterMessage::CallError {
                                call_id,
                                error_type: call_error_kind(&err),
                                message: err.to_string(),
                            },
                        }
                    };
                    runtime.send_to(&from, reply);
                });
                self.track(task);
            }

            ClusterMessage::CallReply { call_id, result } => {
                self.pending_calls.resolve(call_id, result);
            }

            ClusterMessage::CallError {
                call_id,
                error_type,
                message,
            } => {
                self.pending_calls
                    .reject(call_id, RemoteError::from_call_error(error_type, message));
            }

            ClusterMessage::Cast { target, payload } => {
                if target.node == self.local {
                    self.system.cast_value(&target, payload);
                }
            }

            ClusterMessage::RegistrySync { entries, .. } => {
                self.global.apply_sync(entries);
            }

            ClusterMessage::NodeDown {
                node_id, reason, ..
            } => {
                // Only act on a node announcing its own shutdown; third-party
                // rumors are left to our own failure detector.
                if node_id == from {
                    self.mark_down(&from, reason);
                }
            }

            ClusterMessage::SpawnRequest {
                spawn_id,
                behavior_name,
                options,
                ..
            } => {
                let runtime = Arc::clone(self);
                let task = tokio::spawn(async move {
                    let reply = runtime.handle_spawn(spawn_id, &behavior_name, options).await;
                    runtime.send_to(&from, reply);
                });
                self.track(task);
            }

            ClusterMessage::SpawnReply {
                spawn_id,
                server_id,
                node_id,
            } => {
                self.pending_spawns
                    .resolve(spawn_id, ServerRef::new(server_id, node_id));
            }

            ClusterMessage::SpawnError {
                spawn_id,
                error_type,
                message,
            } => {
                self.pending_spawns
                    .reject(spawn_id, spawn_error(error_type, message));
            }

            ClusterMessage::MonitorRequest {
                monitor_id,
                owner,
                target,
            } => {
                if target.node != self.local {
                    self.send_to(
                        &from,
                        ClusterMessage::MonitorAck {
                            monitor_id,
                            success: false,
                            reason: Some("wrong node".to_string()),
                        },
                    );
                } else if self.system.shared().is_alive(target.id) {
                    self.monitors_in.insert(
                        monitor_id,
                        RemotePair {
                            local: target,
                            remote: owner,
                        },
                    );
                    self.send_to(
                        &from,
                        ClusterMessage::MonitorAck {
                            monitor_id,
                            success: true,
                            reason: None,
                        },
                    );
                } else {
                    // Monitoring a dead actor succeeds and fires immediately.
                    self.send_to(
                        &from,
                        ClusterMessage::MonitorAck {
                            monitor_id,
                            success: true,
                            reason: None,
                        },
                    );
                    let reason = self
                        .system
                        .shared()
                        .exit_log
                        .lock()
                        .get(target.id)
                        .unwrap_or(ExitReason::NoProc);
                    self.send_to(
                        &from,
                        ClusterMessage::ProcessDown {
                            monitor_id,
                            monitored: target,
                            reason,
                        },
                    );
                }
            }

            ClusterMessage::MonitorAck {
                monitor_id,
                success,
                reason,
            } => {
                if success {
                    self.pending_monitors.resolve(monitor_id, ());
                } else {
                    let reason = reason.unwrap_or_else(|| "monitor refused".to_string());
                    let error = if reason == "noproc" {
                        RemoteError::ServerNotRunning
                    } else {
                        RemoteError::Unknown(reason)
                    };
                    self.pending_monitors.reject(monitor_id, error);
                }
            }

            ClusterMessage::DemonitorRequest { monitor_id } => {
                self.monitors_in.remove(&monitor_id);
            }

            ClusterMessage::ProcessDown {
                monitor_id,
                monitored,
                reason,
            } => {
                if let Some((_, pair)) = self.monitors_out.remove(&monitor_id) {
                    self.system
                        .shared()
                        .notify_monitor_down(monitor_id, &pair.local, &monitored, reason);
                }
            }

            ClusterMessage::LinkRequest { link_id, a, b } => {
                let (local_end, remote_end) = if b.node == self.local { (b, a) } else { (a, b) };
                if local_end.node == self.local && self.system.shared().is_alive(local_end.id) {
                    self.links.insert(
                        link_id,
                        RemotePair {
                            local: local_end,
                            remote: remote_end,
                        },
                    );
                    self.send_to(
                        &from,
                        ClusterMessage::LinkAck {
                            link_id,
                            success: true,
                            reason: None,
                        },
                    );
                } else {
                    self.send_to(
                        &from,
                        ClusterMessage::LinkAck {
                            link_id,
                            success: false,
                            reason: Some("noproc".to_string()),
                        },
                    );
                }
            }

            ClusterMessage::LinkAck {
                link_id,
                success,
                reason,
            } => {
                if success {
                    self.pending_links.resolve(link_id, ());
                } else {
                    let reason = reason.unwrap_or_else(|| "link refused".to_string());
                    let error = if reason == "noproc" {
                        RemoteError::ServerNotRunning
                    } else {
                        RemoteError::Unknown(reason)
                    };
                    self.pending_links.reject(link_id, error);
                }
            }

            ClusterMessage::UnlinkRequest { link_id } => {
                self.links.remove(&link_id);
            }

            ClusterMessage::ExitSignal {
                link_id,
                from: origin,
                reason,
            } => {
                if let Some((_, pair)) = self.links.remove(&link_id) {
                    let shared = self.system.shared();
                    if shared.trap_exit_of(pair.local.id) {
                        shared.deliver_exit_signal(&pair.local, &origin, reason, link_id);
                    } else {
                        shared.initiate_stop(pair.local.id, reason);
                    }
                }
            }
        }
    }

    async fn handle_spawn(
        &self,
        spawn_id: CorrelationId,
        behavior_name: &str,
        options: WireSpawnOptions,
    ) -> ClusterMessage {
        let opts: StartOptions = options.into_start_options();
        match self.behaviors.spawn(&self.system, behavior_name, opts).await {
            None => ClusterMessage::SpawnError {
                spawn_id,
                error_type: SpawnErrorKind::BehaviorNotFound,
                message: format!("no behavior registered as '{behavior_name}'"),
            },
            Some(Ok(server)) => ClusterMessage::SpawnReply {
                spawn_id,
                server_id: server.id,
                node_id: self.local.clone(),
            },
            Some(Err(err)) => {
                let error_type = match &err {
                    RuntimeError::Actor(ActorError::InitTimeout(_)) => SpawnErrorKind::InitTimeout,
                    RuntimeError::Actor(ActorError::InitFailed(_)) => SpawnErrorKind::InitFailed,
                    RuntimeError::Actor(ActorError::NameConflict(_))
                    | RuntimeError::Registry(_)
                    | RuntimeError::Cluster(_) => SpawnErrorKind::RegistrationFailed,
                    _ => SpawnErrorKind::UnknownError,
                };
                ClusterMessage::SpawnError {
                    spawn_id,
                    error_type,
                    message: err.to_string(),
                }
            }
        }
    }

    /// Terminate hook: notify remote monitors/links of a local death.
    fn on_local_terminated(&self, server: &ServerRef, reason: &ExitReason) {
        let fired: Vec<(MonitorId, RemotePair)> = self
            .monitors_in
            .iter()
            .filter(|entry| &entry.value().local == server)
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        for (monitor_id, pair) in fired {
            self.monitors_in.remove(&monitor_id);
            self.send_to(
                &pair.remote.node,
                ClusterMessage::ProcessDown {
                    monitor_id,
                    monitored: server.clone(),
                    reason: reason.clone(),
                },
            );
        }

        let linked: Vec<(LinkId, RemotePair)> = self
            .links
            .iter()
            .filter(|entry| &entry.value().local == server)
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        for (link_id, pair) in linked {
            self.links.remove(&link_id);
            let message = if reason.is_abnormal() {
                ClusterMessage::ExitSignal {
                    link_id,
                    from: server.clone(),
                    reason: reason.clone(),
                }
            } else {
                ClusterMessage::UnlinkRequest { link_id }
            };
            self.send_to(&pair.remote.node, message);
        }
    }

    // ------------------------------------------------------------------
    // Outbound distributed operations
    // ------------------------------------------------------------------

    /// Remote spawn via the target node's behavior registry.
    pub(crate) async fn spawn_remote(
        &self,
        node: &NodeId,
        behavior_name: &str,
        options: WireSpawnOptions,
        timeout: Duration,
    ) -> Result<ServerRef, RemoteError> {
        if !self.is_connected(node) {
            return Err(RemoteError::NodeNotReachable(node.clone()));
        }
        let spawn_id = CorrelationId::new();
        let rx = self.pending_spawns.insert(spawn_id, node.clone());
        let sent = self.send_to(
            node,
            ClusterMessage::SpawnRequest {
                spawn_id,
                behavior_name: behavior_name.to_string(),
                options,
                timeout_ms: timeout.as_millis() as u64,
            },
        );
        if !sent {
            self.pending_spawns.cancel(spawn_id);
            return Err(RemoteError::NodeNotReachable(node.clone()));
        }
        match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                self.pending_spawns.cancel(spawn_id);
                Err(RemoteError::SpawnTimeout(timeout))
            }
            Ok(Err(_)) => Err(RemoteError::NodeNotReachable(node.clone())),
            Ok(Ok(result)) => result,
        }
    }

    /// Cross-node monitor setup with a request/ack round trip.
    pub(crate) async fn monitor_remote(
        &self,
        owner: ServerRef,
        target: ServerRef,
        timeout: Duration,
    ) -> Result<MonitorId, RemoteError> {
        let node = target.node.clone();
        if !self.is_connected(&node) {
            return Err(RemoteError::NodeNotReachable(node));
        }
        let monitor_id = MonitorId::new();
        // Insert before sending so an immediate process_down finds the pair.
        self.monitors_out.insert(
            monitor_id,
            RemotePair {
                local: owner.clone(),
                remote: target.clone(),
            },
        );
        let rx = self.pending_monitors.insert(monitor_id, node.clone());
        let sent = self.send_to(
            &node,
            ClusterMessage::MonitorRequest {
                monitor_id,
                owner,
                target,
            },
        );
        if !sent {
            self.monitors_out.remove(&monitor_id);
            self.pending_monitors.cancel(monitor_id);
            return Err(RemoteError::NodeNotReachable(node));
        }
        match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                self.monitors_out.remove(&monitor_id);
                self.pending_monitors.cancel(monitor_id);
                self.send_to(&node, ClusterMessage::DemonitorRequest { monitor_id });
                Err(RemoteError::MonitorTimeout(timeout))
            }
            Ok(Err(_)) => {
                self.monitors_out.remove(&monitor_id);
                Err(RemoteError::NodeNotReachable(node))
            }
            Ok(Ok(Ok(()))) => Ok(monitor_id),
            Ok(Ok(Err(err))) => {
                self.monitors_out.remove(&monitor_id);
                Err(err)
            }
        }
    }

    /// Cross-node monitor teardown; fire-and-forget.
    pub(crate) fn demonitor_remote(&self, monitor_id: MonitorId) {
        if let Some((_, pair)) = self.monitors_out.remove(&monitor_id) {
            self.send_to(
                &pair.remote.node,
                ClusterMessage::DemonitorRequest { monitor_id },
            );
        }
    }

    /// Cross-node link setup with a request/ack round trip.
    pub(crate) async fn link_remote(
        &self,
        local: ServerRef,
        remote: ServerRef,
        timeout: Duration,
    ) -> Result<LinkId, RemoteError> {
        let node = remote.node.clone();
        if !self.is_connected(&node) {
            return Err(RemoteError::NodeNotReachable(node));
        }
        let link_id = LinkId::new();
        self.links.insert(
            link_id,
            RemotePair {
                local: local.clone(),
                remote: remote.clone(),
            },
        );
        let rx = self.pending_links.insert(link_id, node.clone());
        let sent = self.send_to(
            &node,
            ClusterMessage::LinkRequest {
                link_id,
                a: local,
                b: remote,
            },
        );
        if !sent {
            self.links.remove(&link_id);
            self.pending_links.cancel(link_id);
            return Err(RemoteError::NodeNotReachable(node));
        }
        match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                self.links.remove(&link_id);
                self.pending_links.cancel(link_id);
                self.send_to(&node, ClusterMessage::UnlinkRequest { link_id });
                Err(RemoteError::MonitorTimeout(timeout))
            }
            Ok(Err(_)) => {
                self.links.remove(&link_id);
                Err(RemoteError::NodeNotReachable(node))
            }
            Ok(Ok(Ok(()))) => Ok(link_id),
            Ok(Ok(Err(err))) => {
                self.links.remove(&link_id);
                Err(err)
            }
        }
    }

    /// Cross-node link teardown; fire-and-forget.
    pub(crate) fn unlink_remote(&self, link_id: LinkId) {
        if let Some((_, pair)) = self.links.remove(&link_id) {
            self.send_to(&pair.remote.node, ClusterMessage::UnlinkRequest { link_id });
        }
    }

    /// Graceful shutdown: announce, drain writers, then tear everything down.
    pub(crate) async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(node = %self.local, "cluster shutting down");
        self.broadcast(ClusterMessage::NodeDown {
            node_id: self.local.clone(),
            detected_at: Utc::now().timestamp_millis(),
            reason: NodeDownReason::GracefulShutdown,
        });

        // Dropping the outboxes lets each writer drain its queue (the final
        // node_down included) and close the socket.
        for mut peer in self.peers.iter_mut() {
            peer.outbox = None;
            peer.info.status = NodeStatus::Disconnected;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
        }
    }
}

fn call_error_kind(err: &ActorError) -> CallErrorKind {
    match err {
        ActorError::ServerNotRunning => CallErrorKind::ServerNotRunning,
        ActorError::CallTimeout(_) => CallErrorKind::CallTimeout,
        ActorError::Handler { .. } => CallErrorKind::HandlerError,
        ActorError::Serialization(_) => CallErrorKind::Serialization,
        _ => CallErrorKind::Unknown,
    }
}

fn spawn_error(kind: SpawnErrorKind, message: String) -> RemoteError {
    match kind {
        SpawnErrorKind::BehaviorNotFound => RemoteError::BehaviorNotFound(message),
        SpawnErrorKind::InitFailed | SpawnErrorKind::InitTimeout => RemoteError::SpawnInit(message),
        SpawnErrorKind::RegistrationFailed => RemoteError::SpawnRegistration(message),
        SpawnErrorKind::UnknownError => RemoteError::Unknown(message),
    }
}

#[async_trait]
impl RemoteRouter for ClusterRuntime {
    async fn call_value(
        &self,
        target: &ServerRef,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, RemoteError> {
        if !self.is_connected(&target.node) {
            return Err(RemoteError::NodeNotReachable(target.node.clone()));
        }
        let call_id = CorrelationId::new();
        let rx = self.pending_calls.insert(call_id, target.node.clone());
        let sent = self.send_to(
            &target.node,
            ClusterMessage::Call {
                call_id,
                target: target.clone(),
                payload,
                timeout_ms: timeout.as_millis() as u64,
            },
        );
        if !sent {
            self.pending_calls.cancel(call_id);
            return Err(RemoteError::NodeNotReachable(target.node.clone()));
        }
        match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                // Caller-side timeout; the late reply, if any, is discarded.
                self.pending_calls.cancel(call_id);
                Err(RemoteError::CallTimeout(timeout))
            }
            Ok(Err(_)) => Err(RemoteError::NodeNotReachable(target.node.clone())),
            Ok(Ok(result)) => result,
        }
    }

    fn cast_value(&self, target: &ServerRef, payload: Value) {
        // Fire-and-forget: silently dropped when the node is unreachable.
        self.send_to(
            &target.node,
            ClusterMessage::Cast {
                target: target.clone(),
                payload,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_error_categorization() {
        assert_eq!(
            call_error_kind(&ActorError::ServerNotRunning),
            CallErrorKind::ServerNotRunning
        );
        assert_eq!(
            call_error_kind(&ActorError::CallTimeout(Duration::from_secs(1))),
            CallErrorKind::CallTimeout
        );
        assert_eq!(
            call_error_kind(&ActorError::Handler {
                message: "x".to_string()
            }),
            CallErrorKind::HandlerError
        );
        assert_eq!(
            call_error_kind(&ActorError::Serialization("x".to_string())),
            CallErrorKind::Serialization
        );
        assert_eq!(
            call_error_kind(&ActorError::ShuttingDown),
            CallErrorKind::Unknown
        );
    }

    #[test]
    fn test_spawn_error_rebuild_preserves_category_and_message() {
        assert!(matches!(
            spawn_error(SpawnErrorKind::BehaviorNotFound, "c".to_string()),
            RemoteError::BehaviorNotFound(_)
        ));
        assert!(matches!(
            spawn_error(SpawnErrorKind::InitFailed, "c".to_string()),
            RemoteError::SpawnInit(_)
        ));
        assert!(matches!(
            spawn_error(SpawnErrorKind::InitTimeout, "c".to_string()),
            RemoteError::SpawnInit(_)
        ));
        assert!(matches!(
            spawn_error(SpawnErrorKind::RegistrationFailed, "c".to_string()),
            RemoteError::SpawnRegistration(_)
        ));
        let err = spawn_error(SpawnErrorKind::UnknownError, "kept".to_string());
        assert!(err.to_string().contains("kept"));
    }
}
