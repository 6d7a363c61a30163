//! The public actor system: start, call, cast, stop, links and monitors.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

// Layer 3: Internal module imports
use super::cell::spawn_cell;
use super::config::SystemConfig;
use super::mailbox::{MailboxMetrics, MailboxMsg};
use super::shared::{CellHandle, SystemShared, SystemState, TermState};
use super::status::{ActorStatus, StatusFlag};
use crate::actor::{ActorError, ActorRef, Behavior, ExitReason, Registration, ServerRef, StartOptions};
use crate::cluster::{ClusterError, NodeId};
use crate::error::RuntimeError;
use crate::events::{LifecycleEvent, Subscription};
use crate::registry::{LocalRegistry, RegistryError, RegistryMode};
use crate::remote::RemoteError;
use crate::util::{LinkId, MonitorId, ServerId};

/// The local actor runtime: owns every actor on this node.
///
/// Cloning is cheap; all clones share the same runtime.
///
/// # Example
/// ```rust,ignore
/// let system = ActorSystem::standalone();
/// let counter = system.start(Counter, StartOptions::default()).await?;
/// system.cast(&counter, Inc);
/// let n = system.call(&counter, Get).await?;
/// ```
pub struct ActorSystem {
    shared: Arc<SystemShared>,
}

impl Clone for ActorSystem {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl std::fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSystem")
            .field("node_id", &self.shared.node_id)
            .field("actors", &self.shared.cells.len())
            .finish()
    }
}

impl ActorSystem {
    /// Create a system owned by the given node identity.
    pub fn new(node_id: NodeId, config: SystemConfig) -> Self {
        Self {
            shared: SystemShared::new(node_id, config),
        }
    }

    /// Create a system with a placeholder node identity, for purely local
    /// (non-clustered) use.
    pub fn standalone() -> Self {
        // The placeholder id always parses.
        #[allow(clippy::unwrap_used)]
        let node_id = NodeId::parse("nonode@nohost:0").unwrap();
        Self::new(node_id, SystemConfig::default())
    }

    /// This node's identity.
    pub fn node_id(&self) -> &NodeId {
        &self.shared.node_id
    }

    /// The system configuration.
    pub fn config(&self) -> &SystemConfig {
        &self.shared.config
    }

    pub(crate) fn shared(&self) -> &Arc<SystemShared> {
        &self.shared
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start an actor from a behavior.
    ///
    /// Blocks until `init` completes (bounded by the init timeout) and the
    /// requested name registration is applied. Fails with `InitFailed`,
    /// `InitTimeout`, or `NameConflict`.
    pub async fn start<B: Behavior>(
        &self,
        behavior: B,
        opts: StartOptions,
    ) -> Result<ActorRef<B>, RuntimeError> {
        self.start_arc(Arc::new(behavior), opts).await
    }

    pub(crate) async fn start_arc<B: Behavior>(
        &self,
        behavior: Arc<B>,
        opts: StartOptions,
    ) -> Result<ActorRef<B>, RuntimeError> {
        let shared = &self.shared;
        if shared.is_shutting_down() {
            return Err(ActorError::ShuttingDown.into());
        }
        if shared.config.max_actors > 0 {
            let current = shared.cells.len();
            if current >= shared.config.max_actors {
                return Err(ActorError::LimitExceeded {
                    current,
                    max: shared.config.max_actors,
                }
                .into());
            }
        }

        let id = ServerId::new();
        let server = ServerRef::new(id, shared.node_id.clone());
        let (tx, rx) = unbounded_channel();
        let handle = Arc::new(CellHandle {
            server: server.clone(),
            name: opts.name.clone(),
            sender: tx,
            status: StatusFlag::new(ActorStatus::Initializing),
            metrics: MailboxMetrics::default(),
            trap_exit: AtomicBool::new(opts.trap_exit),
            started_at: Utc::now(),
            started: AtomicBool::new(false),
            term: Mutex::new(TermState::default()),
            kill_reason: Mutex::new(None),
            abort: Mutex::new(None),
        });
        shared.cells.insert(id, Arc::clone(&handle));

        let init_timeout = opts.init_timeout.unwrap_or(shared.config.init_timeout);
        let init_rx = spawn_cell(
            shared,
            behavior,
            handle,
            rx,
            init_timeout,
            shared.config.shutdown_timeout,
        );

        match init_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => return Err(ActorError::InitFailed("init aborted".to_string()).into()),
        }

        if let Some(name) = &opts.name {
            match opts.registration {
                Registration::None => {}
                Registration::Local => {
                    if let Err(RegistryError::AlreadyRegistered(taken)) =
                        shared.registry.register(name.clone(), server.clone())
                    {
                        shared
                            .stop_and_wait(id, ExitReason::Shutdown, shared.config.shutdown_timeout)
                            .await;
                        return Err(ActorError::NameConflict(taken).into());
                    }
                }
                Registration::Global => {
                    let Some(global) = shared.global_names.get() else {
                        shared
                            .stop_and_wait(id, ExitReason::Shutdown, shared.config.shutdown_timeout)
                            .await;
                        return Err(ClusterError::NotStarted.into());
                    };
                    if global.register(name.clone(), server.clone()).is_err() {
                        shared
                            .stop_and_wait(id, ExitReason::Shutdown, shared.config.shutdown_timeout)
                            .await;
                        return Err(ActorError::NameConflict(name.clone()).into());
                    }
                }
            }
        }

        Ok(ActorRef::from_server_ref(server))
    }

    /// Stop an actor with reason `Normal`, waiting for its terminate hook.
    pub async fn stop(&self, server: &ServerRef) -> Result<(), RuntimeError> {
        self.stop_with_reason(server, ExitReason::Normal).await
    }

    /// Stop an actor with an explicit reason.
    ///
    /// Pending callers are drained with `ServerNotRunning`; `terminate` runs
    /// bounded by the shutdown timeout, then links, monitors, and name
    /// registrations are released.
    pub async fn stop_with_reason(
        &self,
        server: &ServerRef,
        reason: ExitReason,
    ) -> Result<(), RuntimeError> {
        if server.node != self.shared.node_id {
            return Err(RemoteError::Unsupported(
                "stop is node-local; stop actors on their owning node".to_string(),
            )
            .into());
        }
        self.shared
            .stop_and_wait(server.id, reason, self.shared.config.shutdown_timeout)
            .await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------

    /// Synchronous request with the default call timeout.
    pub async fn call<B: Behavior>(
        &self,
        target: &ActorRef<B>,
        msg: B::Call,
    ) -> Result<B::Reply, RuntimeError> {
        self.call_with_timeout(target, msg, self.shared.config.call_timeout)
            .await
    }

    /// Synchronous request with an explicit timeout.
    ///
    /// Calls from one sender to one actor are processed in send order. A
    /// handler failure reaches only this caller; the actor survives it.
    pub async fn call_with_timeout<B: Behavior>(
        &self,
        target: &ActorRef<B>,
        msg: B::Call,
        timeout: Duration,
    ) -> Result<B::Reply, RuntimeError> {
        let server = target.server_ref();
        if server.node != self.shared.node_id {
            let router = self
                .shared
                .router
                .get()
                .ok_or(ClusterError::NotStarted)?;
            let value = serde_json::to_value(&msg)
                .map_err(|err| RemoteError::Serialization(err.to_string()))?;
            let reply = router.call_value(server, value, timeout).await?;
            return serde_json::from_value(reply)
                .map_err(|err| RemoteError::Serialization(err.to_string()).into());
        }

        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + timeout;
        self.shared.send_mailbox(
            server.id,
            MailboxMsg::Call {
                msg: Box::new(msg),
                reply: tx,
                deadline,
            },
        )?;
        match tokio::time::timeout(timeout, rx).await {
            Err(_) => Err(ActorError::CallTimeout(timeout).into()),
            Ok(Err(_)) => Err(ActorError::ServerNotRunning.into()),
            Ok(Ok(Err(err))) => Err(err.into()),
            Ok(Ok(Ok(boxed))) => boxed
                .downcast::<B::Reply>()
                .map(|reply| *reply)
                .map_err(|_| ActorError::TypeMismatch(server.id).into()),
        }
    }

    /// Fire-and-forget message. Silently dropped when the target is unknown
    /// or its node unreachable; handler errors surface only as `Crashed`
    /// lifecycle events.
    pub fn cast<B: Behavior>(&self, target: &ActorRef<B>, msg: B::Cast) {
        let server = target.server_ref();
        if server.node != self.shared.node_id {
            if let Some(router) = self.shared.router.get() {
                if let Ok(value) = serde_json::to_value(&msg) {
                    router.cast_value(server, value);
                }
            }
            return;
        }
        let _ = self.shared.send_mailbox(
            server.id,
            MailboxMsg::Cast { msg: Box::new(msg) },
        );
    }

    /// Wire-level call dispatch: JSON in, JSON out. Used by the remote
    /// handler on the receiving node and by registry dispatch.
    pub(crate) async fn call_value(
        &self,
        id: ServerId,
        msg: Value,
        timeout: Duration,
    ) -> Result<Value, ActorError> {
        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + timeout;
        self.shared.send_mailbox(
            id,
            MailboxMsg::WireCall {
                msg,
                reply: tx,
                deadline,
            },
        )?;
        match tokio::time::timeout(timeout, rx).await {
            Err(_) => Err(ActorError::CallTimeout(timeout)),
            Ok(Err(_)) => Err(ActorError::ServerNotRunning),
            Ok(Ok(result)) => result,
        }
    }

    /// Wire-level cast dispatch, transparent over locality.
    pub(crate) fn cast_value(&self, server: &ServerRef, msg: Value) {
        if server.node == self.shared.node_id {
            let _ = self
                .shared
                .send_mailbox(server.id, MailboxMsg::WireCast { msg });
        } else if let Some(router) = self.shared.router.get() {
            router.cast_value(server, msg);
        }
    }

    // ------------------------------------------------------------------
    // Links and monitors
    // ------------------------------------------------------------------

    /// Establish a bidirectional link between two local actors.
    ///
    /// Idempotent per pair. Abnormal exit of either side propagates to the
    /// other unless it traps exits.
    pub fn link(&self, a: &ServerRef, b: &ServerRef) -> Result<LinkId, RuntimeError> {
        if !self.shared.is_alive(a.id) || !self.shared.is_alive(b.id) {
            return Err(ActorError::ServerNotRunning.into());
        }
        let id = self.shared.links.link(a.clone(), b.clone());
        // One side may have died while the entry was being inserted; settle
        // the race the same way termination would have.
        for (dead, peer) in [(a, b), (b, a)] {
            if !self.shared.is_alive(dead.id) {
                if let Some(entry) = self.shared.links.unlink(id) {
                    let reason = self
                        .shared
                        .exit_log
                        .lock()
                        .get(dead.id)
                        .unwrap_or(ExitReason::NoProc);
                    if reason.is_abnormal() {
                        if self.shared.trap_exit_of(peer.id) {
                            self.shared
                                .deliver_exit_signal(peer, dead, reason, entry.id);
                        } else {
                            self.shared.initiate_stop(peer.id, reason);
                        }
                    }
                }
                return Err(ActorError::ServerNotRunning.into());
            }
        }
        Ok(id)
    }

    /// Remove a link; fire-and-forget.
    pub fn unlink(&self, id: LinkId) {
        self.shared.links.unlink(id);
    }

    /// Monitor a local actor. The owner receives exactly one `ProcessDown`
    /// when the target terminates; monitoring a dead actor fires immediately
    /// with reason `noproc`.
    pub fn monitor(&self, owner: &ServerRef, target: &ServerRef) -> Result<MonitorId, RuntimeError> {
        if owner.node != self.shared.node_id {
            return Err(RemoteError::Unsupported(
                "monitor owner must live on this node".to_string(),
            )
            .into());
        }
        let id = MonitorId::new();
        if !self.shared.is_alive(target.id) {
            self.shared
                .notify_monitor_down(id, owner, target, ExitReason::NoProc);
            return Ok(id);
        }
        self.shared.monitors.insert(id, owner.clone(), target.clone());
        if !self.shared.is_alive(target.id) {
            // Termination swept the table concurrently; deliver here instead.
            if self.shared.monitors.remove(id).is_some() {
                let reason = self
                    .shared
                    .exit_log
                    .lock()
                    .get(target.id)
                    .unwrap_or(ExitReason::NoProc);
                self.shared.notify_monitor_down(id, owner, target, reason);
            }
        }
        Ok(id)
    }

    /// Remove a monitor; fire-and-forget.
    pub fn demonitor(&self, id: MonitorId) {
        self.shared.monitors.remove(id);
    }

    /// Toggle exit-signal trapping for a running actor.
    pub fn set_trap_exit(&self, server: &ServerRef, trap: bool) {
        if let Some(cell) = self.shared.cells.get(&server.id) {
            cell.trap_exit.store(trap, Ordering::SeqCst);
        }
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// The built-in unique registry holding actors started with a name.
    pub fn registry(&self) -> &Arc<LocalRegistry> {
        &self.shared.registry
    }

    /// Resolve a locally registered name.
    pub fn whereis(&self, name: &str) -> Option<ServerRef> {
        self.shared.registry.whereis(name)
    }

    /// Create a registry bound to this system's termination path.
    pub fn new_registry(&self, mode: RegistryMode) -> Arc<LocalRegistry> {
        let registry = Arc::new(LocalRegistry::new(mode, self.shared.alive_check()));
        self.shared
            .user_registries
            .lock()
            .push(Arc::downgrade(&registry));
        registry
    }

    /// Cast `msg` to every actor registered under `name` in `registry`.
    /// Returns how many actors were addressed.
    pub fn dispatch<M: Serialize>(&self, registry: &LocalRegistry, name: &str, msg: &M) -> usize {
        let Ok(value) = serde_json::to_value(msg) else {
            debug!(name, "dispatch payload failed to serialize; dropped");
            return 0;
        };
        registry.dispatch_with(name, |server| self.cast_value(server, value.clone()))
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Whether the actor is alive (running or still initializing).
    pub fn alive(&self, server: &ServerRef) -> bool {
        server.node == self.shared.node_id && self.shared.is_alive(server.id)
    }

    /// Current status of a local actor, `None` once it is gone.
    pub fn status(&self, server: &ServerRef) -> Option<ActorStatus> {
        self.shared.status_of(server.id)
    }

    /// Number of live actors on this node.
    pub fn actor_count(&self) -> usize {
        self.shared.cells.len()
    }

    /// Subscribe to lifecycle events with a callback; returns the
    /// unsubscribe handle.
    pub fn on_lifecycle_event<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe_fn(handler)
    }

    /// Subscribe to lifecycle events through a channel.
    pub fn lifecycle_events(
        &self,
    ) -> (
        Subscription,
        tokio::sync::mpsc::UnboundedReceiver<LifecycleEvent>,
    ) {
        self.shared.events.subscribe()
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Gracefully stop every actor and refuse new work.
    pub async fn shutdown(&self) {
        {
            let mut state = self.shared.state.write();
            if *state != SystemState::Running {
                return;
            }
            *state = SystemState::ShuttingDown;
        }

        let ids: Vec<ServerId> = self.shared.cells.iter().map(|entry| *entry.key()).collect();
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            let shared = Arc::clone(&self.shared);
            let grace = shared.config.shutdown_timeout;
            tasks.push(tokio::spawn(async move {
                shared.stop_and_wait(id, ExitReason::Shutdown, grace).await;
            }));
        }
        for task in tasks {
            let _ = task.await;
        }

        *self.shared.state.write() = SystemState::Stopped;
    }
}
