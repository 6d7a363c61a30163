//! The node facade: one actor system plus the cluster runtime around it.
//!
//! A `Node` can run standalone (local actors, supervisors, registries) and
//! join a cluster when started: it binds the listener, dials seeds, wires the
//! replicated registry, and registers its observer actor globally.

// Layer 1: Standard library imports
use std::sync::{Arc, OnceLock};

// Layer 2: Third-party crate imports
use tokio::sync::broadcast;

// Layer 3: Internal module imports
use crate::actor::{Behavior, ServerRef, StartOptions};
use crate::cluster::runtime::ClusterRuntime;
use crate::cluster::{ClusterConfig, ClusterError, NodeEvent, NodeId};
use crate::error::RuntimeError;
use crate::global::GlobalNames;
use crate::observer::{ClusterObserver, Observer, ObserverBehavior};
use crate::proto::{NodeInfo, WireSpawnOptions};
use crate::remote::{BehaviorRegistry, RemoteError};
use crate::system::{ActorSystem, SystemConfig};
use crate::util::{LinkId, MonitorId};

struct NodeInner {
    system: ActorSystem,
    config: ClusterConfig,
    node_id: NodeId,
    behaviors: Arc<BehaviorRegistry>,
    global: Arc<GlobalNames>,
    runtime: OnceLock<Arc<ClusterRuntime>>,
}

/// One runtime instance, standalone or clustered.
///
/// # Example
/// ```rust,ignore
/// let config = ClusterConfig::builder("alpha")
///     .with_host("127.0.0.1")
///     .with_seed("beta@127.0.0.1:4370")
///     .build()?;
/// let node = Node::new(config)?;
/// node.register_behavior("counter", CounterBehavior::default());
/// node.start().await?;
///
/// let beta = NodeId::parse("beta@127.0.0.1:4370")?;
/// let counter = node.spawn_at(&beta, "counter", WireSpawnOptions::default()).await?;
/// ```
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.node_id)
            .field("started", &self.inner.runtime.get().is_some())
            .finish()
    }
}

impl Node {
    /// Build a node from a cluster configuration, with a default system
    /// configuration.
    pub fn new(config: ClusterConfig) -> Result<Self, RuntimeError> {
        Self::with_system_config(config, SystemConfig::default())
    }

    /// Build a node with explicit system configuration.
    pub fn with_system_config(
        config: ClusterConfig,
        system_config: SystemConfig,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;
        let node_id = config.node_id()?;
        let system = ActorSystem::new(node_id.clone(), system_config);

        let global = Arc::new(GlobalNames::new(node_id.clone()));
        let _ = system.shared().global_names.set(Arc::clone(&global));

        // Global names of a terminated local actor are removed (and the
        // removal broadcast) by the owning node.
        let gc_global = Arc::clone(&global);
        system
            .shared()
            .add_terminate_hook(Arc::new(move |server, _reason| {
                gc_global.cleanup_server(server);
            }));

        Ok(Self {
            inner: Arc::new(NodeInner {
                system,
                config,
                node_id,
                behaviors: Arc::new(BehaviorRegistry::new()),
                global,
                runtime: OnceLock::new(),
            }),
        })
    }

    /// This node's identity.
    pub fn id(&self) -> &NodeId {
        &self.inner.node_id
    }

    /// The local actor system.
    pub fn system(&self) -> &ActorSystem {
        &self.inner.system
    }

    /// The replicated global registry replica.
    pub fn global(&self) -> &Arc<GlobalNames> {
        &self.inner.global
    }

    /// The behavior registry consulted by remote spawns targeting this node.
    pub fn behaviors(&self) -> &Arc<BehaviorRegistry> {
        &self.inner.behaviors
    }

    /// Register a behavior for remote spawn. Must happen before `start` so a
    /// spawn request arriving right after the handshake can find it.
    pub fn register_behavior<B: Behavior>(&self, name: impl Into<String>, behavior: B) {
        self.inner.behaviors.register(name, behavior);
    }

    /// Join the cluster: bind the listener, dial seeds, and register this
    /// node's observer actor globally.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        if self.inner.runtime.get().is_some() {
            return Err(ClusterError::AlreadyStarted.into());
        }
        let runtime = ClusterRuntime::start(
            self.inner.system.clone(),
            self.inner.config.clone(),
            Arc::clone(&self.inner.behaviors),
            Arc::clone(&self.inner.global),
        )
        .await?;
        if self.inner.runtime.set(runtime).is_err() {
            return Err(ClusterError::AlreadyStarted.into());
        }

        self.inner
            .system
            .start(
                ObserverBehavior::new(self.inner.system.clone()),
                StartOptions::global(ObserverBehavior::global_name(&self.inner.node_id)),
            )
            .await?;
        Ok(())
    }

    fn runtime(&self) -> Result<&Arc<ClusterRuntime>, ClusterError> {
        self.inner.runtime.get().ok_or(ClusterError::NotStarted)
    }

    /// Whether the cluster runtime is up.
    pub fn is_started(&self) -> bool {
        self.inner.runtime.get().is_some()
    }

    // ------------------------------------------------------------------
    // Distributed operations
    // ------------------------------------------------------------------

    /// Spawn an actor of a registered behavior on `node` (possibly this one).
    pub async fn spawn_at(
        &self,
        node: &NodeId,
        behavior_name: &str,
        options: WireSpawnOptions,
    ) -> Result<ServerRef, RuntimeError> {
        if node == &self.inner.node_id {
            return match self
                .inner
                .behaviors
                .spawn(
                    &self.inner.system,
                    behavior_name,
                    options.into_start_options(),
                )
                .await
            {
                None => Err(RemoteError::BehaviorNotFound(behavior_name.to_string()).into()),
                Some(result) => result,
            };
        }
        let runtime = self.runtime()?;
        let server = runtime
            .spawn_remote(node, behavior_name, options, self.inner.config.setup_timeout())
            .await?;
        Ok(server)
    }

    /// Monitor an actor anywhere in the cluster. The owner must be local.
    pub async fn monitor(
        &self,
        owner: &ServerRef,
        target: &ServerRef,
    ) -> Result<MonitorId, RuntimeError> {
        if target.node == self.inner.node_id {
            return self.inner.system.monitor(owner, target);
        }
        let runtime = self.runtime()?;
        let id = runtime
            .monitor_remote(
                owner.clone(),
                target.clone(),
                self.inner.config.setup_timeout(),
            )
            .await?;
        Ok(id)
    }

    /// Remove a monitor, local or remote; fire-and-forget.
    pub fn demonitor(&self, id: MonitorId) {
        self.inner.system.demonitor(id);
        if let Some(runtime) = self.inner.runtime.get() {
            runtime.demonitor_remote(id);
        }
    }

    /// Link two actors; one of them must be local.
    pub async fn link(&self, a: &ServerRef, b: &ServerRef) -> Result<LinkId, RuntimeError> {
        let local_node = &self.inner.node_id;
        match (a.node == *local_node, b.node == *local_node) {
            (true, true) => self.inner.system.link(a, b),
            (true, false) => {
                let runtime = self.runtime()?;
                Ok(runtime
                    .link_remote(a.clone(), b.clone(), self.inner.config.setup_timeout())
                    .await?)
            }
            (false, true) => {
                let runtime = self.runtime()?;
                Ok(runtime
                    .link_remote(b.clone(), a.clone(), self.inner.config.setup_timeout())
                    .await?)
            }
            (false, false) => Err(RemoteError::Unsupported(
                "link requires at least one local endpoint".to_string(),
            )
            .into()),
        }
    }

    /// Remove a link, local or remote; fire-and-forget.
    pub fn unlink(&self, id: LinkId) {
        self.inner.system.unlink(id);
        if let Some(runtime) = self.inner.runtime.get() {
            runtime.unlink_remote(id);
        }
    }

    // ------------------------------------------------------------------
    // Membership and observation
    // ------------------------------------------------------------------

    /// Info for every peer this node knows about.
    pub fn peers(&self) -> Vec<NodeInfo> {
        self.inner
            .runtime
            .get()
            .map(|runtime| runtime.known_peers())
            .unwrap_or_default()
    }

    /// Identities of currently connected peers.
    pub fn connected_nodes(&self) -> Vec<NodeId> {
        self.inner
            .runtime
            .get()
            .map(|runtime| runtime.connected_nodes())
            .unwrap_or_default()
    }

    /// Subscribe to membership events.
    pub fn node_events(&self) -> Result<broadcast::Receiver<NodeEvent>, RuntimeError> {
        Ok(self.runtime()?.subscribe())
    }

    /// The local observer.
    pub fn observer(&self) -> Observer {
        Observer::new(self.inner.system.clone())
    }

    /// The cluster-wide snapshot coordinator.
    pub fn cluster_observer(&self) -> Result<ClusterObserver, RuntimeError> {
        let runtime = Arc::clone(self.runtime()?);
        Ok(ClusterObserver::new(
            self.inner.system.clone(),
            runtime,
            Arc::clone(&self.inner.global),
        ))
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Graceful shutdown: announce `node_down` to peers, drain outboxes,
    /// close sockets, then stop every local actor.
    pub async fn stop(&self) {
        if let Some(runtime) = self.inner.runtime.get() {
            runtime.stop().await;
        }
        self.inner.system.shutdown().await;
    }
}
