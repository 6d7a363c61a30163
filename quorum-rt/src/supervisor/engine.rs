//! The supervisor engine: ordered start, strategy-driven restarts, sliding
//! restart intensity, reverse-order shutdown, and dynamic children.
//!
//! A supervisor runs as one task owning all supervision state. Children
//! report exits through per-instance forwarder tasks into the engine's
//! channel; commands arrive on a second channel. Deliberate stops are marked
//! expected so their exit events do not trigger restarts.

// Layer 1: Standard library imports
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::error::SupervisorError;
use super::intensity::{RestartIntensity, RestartWindow};
use super::stats::{ChildStat, SupervisorStatsCell};
use super::types::{
    ChildFactory, ChildSpec, DynamicTemplate, StartedChild, StopFn, SupervisorId,
    SupervisorStrategy,
};
use crate::actor::{ExitReason, ServerRef};
use crate::system::ActorSystem;

/// Static supervisor definition: strategy, intensity, ordered children.
///
/// # Example
/// ```rust,ignore
/// let spec = SupervisorSpec::new(SupervisorStrategy::RestForOne)
///     .with_intensity(RestartIntensity::new(3, Duration::from_secs(5)))
///     .with_child(ChildSpec::actor("db", &system, || Db))
///     .with_child(ChildSpec::actor("cache", &system, || Cache))
///     .with_child(ChildSpec::actor("api", &system, || Api));
/// let sup = Supervisor::start(&system, spec).await?;
/// ```
#[derive(Debug)]
pub struct SupervisorSpec {
    /// Restart strategy for the whole group.
    pub strategy: SupervisorStrategy,

    /// Restart intensity bound.
    pub intensity: RestartIntensity,

    /// Children, started in list order and stopped in reverse.
    pub children: Vec<ChildSpec>,
}

impl SupervisorSpec {
    /// A spec with default intensity and no children yet.
    pub fn new(strategy: SupervisorStrategy) -> Self {
        Self {
            strategy,
            intensity: RestartIntensity::default(),
            children: Vec::new(),
        }
    }

    /// Set the restart intensity.
    pub fn with_intensity(mut self, intensity: RestartIntensity) -> Self {
        self.intensity = intensity;
        self
    }

    /// Append a child.
    pub fn with_child(mut self, child: ChildSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// One child as reported by `get_child` / `children`.
#[derive(Debug, Clone)]
pub struct ChildInfo {
    /// Spec id.
    pub spec_id: String,

    /// Actor ref of the live instance, when the child is a running actor.
    pub server: Option<ServerRef>,

    /// How many times this child has been restarted.
    pub restart_count: u32,

    /// Whether an instance is currently live.
    pub running: bool,

    /// When the last instance exited.
    pub last_exit_at: Option<DateTime<Utc>>,
}

/// Child spec/instance counts, as reported by `count_children`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildCounts {
    /// Number of child specs (instances for dynamic supervisors).
    pub specs: usize,

    /// Number of live instances.
    pub active: usize,
}

type Terminal = Option<Result<(), SupervisorError>>;

enum Command {
    StartChild {
        spec: ChildSpec,
        reply: oneshot::Sender<Result<Option<ServerRef>, SupervisorError>>,
    },
    StartDynamicChild {
        args: Value,
        reply: oneshot::Sender<Result<Option<ServerRef>, SupervisorError>>,
    },
    TerminateChild {
        id: String,
        reply: oneshot::Sender<Result<(), SupervisorError>>,
    },
    RestartChild {
        id: String,
        reply: oneshot::Sender<Result<(), SupervisorError>>,
    },
    GetChild {
        id: String,
        reply: oneshot::Sender<Option<ChildInfo>>,
    },
    GetChildren {
        reply: oneshot::Sender<Vec<ChildInfo>>,
    },
    CountChildren {
        reply: oneshot::Sender<ChildCounts>,
    },
    Stop { reply: oneshot::Sender<()> },
}

struct ExitEvent {
    seq: u64,
    reason: ExitReason,
}

struct RunningChild {
    seq: u64,
    server: Option<ServerRef>,
    stop: StopFn,
}

struct ChildState {
    spec: ChildSpec,
    running: Option<RunningChild>,
    restart_count: u32,
    last_exit_at: Option<DateTime<Utc>>,
    dynamic: bool,
}

impl ChildState {
    fn info(&self) -> ChildInfo {
        ChildInfo {
            spec_id: self.spec.id.clone(),
            server: self
                .running
                .as_ref()
                .and_then(|running| running.server.clone()),
            restart_count: self.restart_count,
            running: self.running.is_some(),
            last_exit_at: self.last_exit_at,
        }
    }
}

/// Handle to a running supervisor. Cloning shares the same engine.
#[derive(Clone)]
pub struct Supervisor {
    id: SupervisorId,
    strategy: SupervisorStrategy,
    cmd_tx: UnboundedSender<Command>,
    terminal: watch::Receiver<Terminal>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("id", &self.id)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl Supervisor {
    /// Start a static supervisor: children start in list order; if any child
    /// fails to start, the ones already started are shut down in reverse
    /// order and the whole start fails.
    pub async fn start(
        system: &ActorSystem,
        spec: SupervisorSpec,
    ) -> Result<Supervisor, SupervisorError> {
        if spec.strategy == SupervisorStrategy::SimpleOneForOne {
            return Err(SupervisorError::RequiresStatic);
        }
        let mut seen = HashSet::new();
        for child in &spec.children {
            if !seen.insert(child.id.clone()) {
                return Err(SupervisorError::DuplicateChild(child.id.clone()));
            }
        }

        let (engine, handle) = Engine::new(system.clone(), spec.strategy, spec.intensity, None);
        let mut engine = engine;
        for child in spec.children {
            engine.children.push(ChildState {
                spec: child,
                running: None,
                restart_count: 0,
                last_exit_at: None,
                dynamic: false,
            });
        }

        // Ordered startup with reverse unwind on the first failure.
        for idx in 0..engine.children.len() {
            if let Err(err) = engine.start_instance(idx).await {
                for stop_idx in (0..idx).rev() {
                    engine.stop_instance(stop_idx, ExitReason::Shutdown).await;
                }
                return Err(err);
            }
        }

        Ok(engine.launch(handle))
    }

    /// Start a `simple_one_for_one` supervisor from a template. Instances are
    /// spawned later with [`Supervisor::start_dynamic_child`].
    pub fn start_dynamic(
        system: &ActorSystem,
        template: DynamicTemplate,
        intensity: RestartIntensity,
    ) -> Supervisor {
        let (engine, handle) = Engine::new(
            system.clone(),
            SupervisorStrategy::SimpleOneForOne,
            intensity,
            Some(template),
        );
        engine.launch(handle)
    }

    /// This supervisor's id.
    pub fn id(&self) -> SupervisorId {
        self.id
    }

    /// This supervisor's strategy.
    pub fn strategy(&self) -> SupervisorStrategy {
        self.strategy
    }

    /// Add and start a new child on a static supervisor.
    pub async fn start_child(
        &self,
        spec: ChildSpec,
    ) -> Result<Option<ServerRef>, SupervisorError> {
        self.command(|reply| Command::StartChild { spec, reply })
            .await?
    }

    /// Spawn a dynamic instance from the template with the given arguments.
    pub async fn start_dynamic_child(
        &self,
        args: Value,
    ) -> Result<Option<ServerRef>, SupervisorError> {
        self.command(|reply| Command::StartDynamicChild { args, reply })
            .await?
    }

    /// Stop a child without restarting it.
    pub async fn terminate_child(&self, id: &str) -> Result<(), SupervisorError> {
        let id = id.to_string();
        self.command(|reply| Command::TerminateChild { id, reply })
            .await?
    }

    /// Manually restart a child (stops the live instance first). Manual
    /// restarts do not count against the intensity window.
    pub async fn restart_child(&self, id: &str) -> Result<(), SupervisorError> {
        let id = id.to_string();
        self.command(|reply| Command::RestartChild { id, reply })
            .await?
    }

    /// Look up one child.
    pub async fn get_child(&self, id: &str) -> Result<Option<ChildInfo>, SupervisorError> {
        let id = id.to_string();
        self.command(|reply| Command::GetChild { id, reply }).await
    }

    /// All children in start order.
    pub async fn children(&self) -> Result<Vec<ChildInfo>, SupervisorError> {
        self.command(|reply| Command::GetChildren { reply }).await
    }

    /// Spec and live-instance counts.
    pub async fn count_children(&self) -> Result<ChildCounts, SupervisorError> {
        self.command(|reply| Command::CountChildren { reply }).await
    }

    /// Gracefully stop: children shut down in reverse start order, each
    /// bounded by its own shutdown timeout.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        match self.command(|reply| Command::Stop { reply }).await {
            Ok(()) => Ok(()),
            // Already terminated counts as stopped.
            Err(SupervisorError::Stopped) => Ok(()),
            Err(other) => Err(other),
        }
    }

    /// Wait for the supervisor's terminal outcome: `Ok` after a deliberate
    /// stop or significant-child auto-shutdown, `Err(MaxRestartsExceeded)`
    /// when the intensity window overflowed.
    pub async fn wait_terminated(&self) -> Result<(), SupervisorError> {
        let mut terminal = self.terminal.clone();
        loop {
            let current = terminal.borrow().clone();
            if let Some(outcome) = current {
                return outcome;
            }
            if terminal.changed().await.is_err() {
                return Err(SupervisorError::Stopped);
            }
        }
    }

    pub(crate) fn terminal_watch(&self) -> watch::Receiver<Terminal> {
        self.terminal.clone()
    }

    async fn command<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .map_err(|_| SupervisorError::Stopped)?;
        rx.await.map_err(|_| SupervisorError::Stopped)
    }
}

impl ChildSpec {
    /// A child that is itself a supervisor, enabling nested trees. The
    /// parent treats intensity overflow in the nested tree like any other
    /// child failure.
    pub fn supervisor<F>(id: impl Into<String>, system: &ActorSystem, make: F) -> ChildSpec
    where
        F: Fn() -> SupervisorSpec + Send + Sync + 'static,
    {
        let id = id.into();
        let spec_id = id.clone();
        let system = system.clone();
        let factory: ChildFactory = Arc::new(move || {
            let system = system.clone();
            let spec = make();
            let spec_id = spec_id.clone();
            Box::pin(async move {
                let sup = Supervisor::start(&system, spec).await.map_err(|err| {
                    SupervisorError::StartFailed {
                        id: spec_id,
                        message: err.to_string(),
                    }
                })?;

                let (exit_tx, exit_rx) = oneshot::channel();
                let mut terminal = sup.terminal_watch();
                tokio::spawn(async move {
                    let outcome = loop {
                        let current = terminal.borrow().clone();
                        if let Some(outcome) = current {
                            break outcome;
                        }
                        if terminal.changed().await.is_err() {
                            break Err(SupervisorError::Stopped);
                        }
                    };
                    let reason = match outcome {
                        Ok(()) => ExitReason::Shutdown,
                        Err(err) => ExitReason::error(err.to_string()),
                    };
                    let _ = exit_tx.send(reason);
                });

                let stop_sup = sup.clone();
                let stop: StopFn = Arc::new(move |_reason, _grace| {
                    let sup = stop_sup.clone();
                    Box::pin(async move {
                        let _ = sup.stop().await;
                    })
                });

                Ok(StartedChild::new(None, stop, exit_rx))
            })
        });
        ChildSpec::new(id, factory)
    }
}

struct Engine {
    id: SupervisorId,
    system: ActorSystem,
    strategy: SupervisorStrategy,
    window: RestartWindow,
    children: Vec<ChildState>,
    template: Option<DynamicTemplate>,
    next_seq: u64,
    dyn_counter: u64,
    expected: HashSet<u64>,
    exit_tx: UnboundedSender<ExitEvent>,
    exit_rx: Option<UnboundedReceiver<ExitEvent>>,
    stats: Arc<SupervisorStatsCell>,
}

struct EngineHandle {
    cmd_tx: UnboundedSender<Command>,
    cmd_rx: UnboundedReceiver<Command>,
    terminal_tx: watch::Sender<Terminal>,
    terminal_rx: watch::Receiver<Terminal>,
}

impl Engine {
    fn new(
        system: ActorSystem,
        strategy: SupervisorStrategy,
        intensity: RestartIntensity,
        template: Option<DynamicTemplate>,
    ) -> (Engine, EngineHandle) {
        let id = SupervisorId::new();
        let (exit_tx, exit_rx) = unbounded_channel();
        let (cmd_tx, cmd_rx) = unbounded_channel();
        let (terminal_tx, terminal_rx) = watch::channel(None);
        let stats = Arc::new(SupervisorStatsCell::new(id, strategy));
        let engine = Engine {
            id,
            system,
            strategy,
            window: RestartWindow::new(intensity),
            children: Vec::new(),
            template,
            next_seq: 0,
            dyn_counter: 0,
            expected: HashSet::new(),
            exit_tx,
            exit_rx: Some(exit_rx),
            stats,
        };
        let handle = EngineHandle {
            cmd_tx,
            cmd_rx,
            terminal_tx,
            terminal_rx,
        };
        (engine, handle)
    }

    fn launch(mut self, handle: EngineHandle) -> Supervisor {
        self.sync_stats();
        self.system
            .shared()
            .supervisors
            .insert(self.id, Arc::clone(&self.stats));
        let supervisor = Supervisor {
            id: self.id,
            strategy: self.strategy,
            cmd_tx: handle.cmd_tx,
            terminal: handle.terminal_rx,
        };
        let exit_rx = self.exit_rx.take();
        let cmd_rx = handle.cmd_rx;
        let terminal_tx = handle.terminal_tx;
        tokio::spawn(async move {
            if let Some(exit_rx) = exit_rx {
                self.run(cmd_rx, exit_rx, terminal_tx).await;
            }
        });
        supervisor
    }

    async fn run(
        mut self,
        mut cmd_rx: UnboundedReceiver<Command>,
        mut exit_rx: UnboundedReceiver<ExitEvent>,
        terminal_tx: watch::Sender<Terminal>,
    ) {
        let outcome: Result<(), SupervisorError> = loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    None => break Ok(()),
                    Some(cmd) => {
                        if let Some(outcome) = self.handle_command(cmd).await {
                            break outcome;
                        }
                    }
                },
                Some(event) = exit_rx.recv() => {
                    if let Some(outcome) = self.handle_exit(event).await {
                        break outcome;
                    }
                }
            }
        };

        if outcome.is_err() {
            // Intensity overflow: unwind whatever is still running.
            self.shutdown_children().await;
        }
        self.system.shared().supervisors.remove(&self.id);
        let _ = terminal_tx.send(Some(outcome));
    }

    async fn handle_command(&mut self, cmd: Command) -> Option<Result<(), SupervisorError>> {
        match cmd {
            Command::StartChild { spec, reply } => {
                let _ = reply.send(self.add_static_child(spec).await);
                None
            }
            Command::StartDynamicChild { args, reply } => {
                let _ = reply.send(self.add_dynamic_child(args).await);
                None
            }
            Command::TerminateChild { id, reply } => {
                let _ = reply.send(self.terminate_child(&id).await);
                None
            }
            Command::RestartChild { id, reply } => {
                let _ = reply.send(self.manual_restart(&id).await);
                None
            }
            Command::GetChild { id, reply } => {
                let info = self
                    .children
                    .iter()
                    .find(|child| child.spec.id == id)
                    .map(ChildState::info);
                let _ = reply.send(info);
                None
            }
            Command::GetChildren { reply } => {
                let _ = reply.send(self.children.iter().map(ChildState::info).collect());
                None
            }
            Command::CountChildren { reply } => {
                let active = self
                    .children
                    .iter()
                    .filter(|child| child.running.is_some())
                    .count();
                let _ = reply.send(ChildCounts {
                    specs: self.children.len(),
                    active,
                });
                None
            }
            Command::Stop { reply } => {
                self.shutdown_children().await;
                let _ = reply.send(());
                Some(Ok(()))
            }
        }
    }

    async fn handle_exit(&mut self, event: ExitEvent) -> Option<Result<(), SupervisorError>> {
        if self.expected.remove(&event.seq) {
            return None;
        }
        let idx = self.children.iter().position(|child| {
            child
                .running
                .as_ref()
                .map(|running| running.seq == event.seq)
                .unwrap_or(false)
        })?;

        self.children[idx].running = None;
        self.children[idx].last_exit_at = Some(Utc::now());
        let spec_id = self.children[idx].spec.id.clone();
        debug!(
            supervisor = %self.id,
            child = %spec_id,
            reason = %event.reason,
            "child exited"
        );

        let restart = self.children[idx].spec.restart.should_restart(&event.reason);
        if restart {
            if let Err(err) = self.perform_restart(idx).await {
                warn!(supervisor = %self.id, child = %spec_id, error = %err, "giving up");
                return Some(Err(err));
            }
            self.sync_stats();
            None
        } else {
            let significant = self.children[idx].spec.significant;
            if self.children[idx].dynamic {
                self.children.remove(idx);
            }
            self.sync_stats();
            if significant {
                debug!(supervisor = %self.id, child = %spec_id, "significant child stopped, shutting down");
                self.shutdown_children().await;
                return Some(Ok(()));
            }
            None
        }
    }

    /// Strategy dispatch for one unexpected abnormal-or-restartable exit.
    async fn perform_restart(&mut self, idx: usize) -> Result<(), SupervisorError> {
        match self.strategy {
            SupervisorStrategy::OneForOne | SupervisorStrategy::SimpleOneForOne => {
                self.restart_group(&[idx]).await
            }
            SupervisorStrategy::OneForAll => {
                for stop_idx in (0..self.children.len()).rev() {
                    if stop_idx != idx {
                        self.stop_instance(stop_idx, ExitReason::Shutdown).await;
                    }
                }
                let all: Vec<usize> = (0..self.children.len()).collect();
                self.restart_group(&all).await
            }
            SupervisorStrategy::RestForOne => {
                for stop_idx in ((idx + 1)..self.children.len()).rev() {
                    self.stop_instance(stop_idx, ExitReason::Shutdown).await;
                }
                let tail: Vec<usize> = (idx..self.children.len()).collect();
                self.restart_group(&tail).await
            }
        }
    }

    /// Restart a group of children in forward order. Each attempt (including
    /// retries after a failed start) charges the intensity window once.
    async fn restart_group(&mut self, indices: &[usize]) -> Result<(), SupervisorError> {
        loop {
            if !self.window.try_restart(Instant::now()) {
                let intensity = self.window.intensity();
                return Err(SupervisorError::MaxRestartsExceeded {
                    max_restarts: intensity.max_restarts,
                    within: intensity.within,
                });
            }
            self.stats.restart_count.fetch_add(1, Ordering::Relaxed);

            let mut started = Vec::new();
            let mut failed = None;
            for &idx in indices {
                match self.start_instance(idx).await {
                    Ok(()) => {
                        self.children[idx].restart_count += 1;
                        started.push(idx);
                    }
                    Err(err) => {
                        failed = Some(err);
                        break;
                    }
                }
            }
            match failed {
                None => return Ok(()),
                Some(err) => {
                    warn!(supervisor = %self.id, error = %err, "restart attempt failed, retrying");
                    for &idx in started.iter().rev() {
                        self.stop_instance(idx, ExitReason::Shutdown).await;
                    }
                }
            }
        }
    }

    async fn add_static_child(
        &mut self,
        spec: ChildSpec,
    ) -> Result<Option<ServerRef>, SupervisorError> {
        if self.template.is_some() {
            return Err(SupervisorError::RequiresStatic);
        }
        if self.children.iter().any(|child| child.spec.id == spec.id) {
            return Err(SupervisorError::DuplicateChild(spec.id));
        }
        self.children.push(ChildState {
            spec,
            running: None,
            restart_count: 0,
            last_exit_at: None,
            dynamic: false,
        });
        let idx = self.children.len() - 1;
        match self.start_instance(idx).await {
            Ok(()) => {
                self.sync_stats();
                Ok(self.children[idx]
                    .running
                    .as_ref()
                    .and_then(|running| running.server.clone()))
            }
            Err(err) => {
                self.children.pop();
                Err(err)
            }
        }
    }

    async fn add_dynamic_child(
        &mut self,
        args: Value,
    ) -> Result<Option<ServerRef>, SupervisorError> {
        let Some(template) = self.template.clone() else {
            return Err(SupervisorError::RequiresDynamic);
        };
        self.dyn_counter += 1;
        let id = format!("{}-{}", template.id_prefix, self.dyn_counter);
        let instance_factory = template.factory;
        let factory: ChildFactory = Arc::new(move || (instance_factory)(args.clone()));
        let spec = ChildSpec::new(id, factory)
            .with_restart(template.restart)
            .with_shutdown_timeout(template.shutdown_timeout);

        self.children.push(ChildState {
            spec,
            running: None,
            restart_count: 0,
            last_exit_at: None,
            dynamic: true,
        });
        let idx = self.children.len() - 1;
        match self.start_instance(idx).await {
            Ok(()) => {
                self.sync_stats();
                Ok(self.children[idx]
                    .running
                    .as_ref()
                    .and_then(|running| running.server.clone()))
            }
            Err(err) => {
                self.children.pop();
                Err(err)
            }
        }
    }

    async fn terminate_child(&mut self, id: &str) -> Result<(), SupervisorError> {
        let idx = self
            .children
            .iter()
            .position(|child| child.spec.id == id)
            .ok_or_else(|| SupervisorError::UnknownChild(id.to_string()))?;
        self.stop_instance(idx, ExitReason::Shutdown).await;
        if self.children[idx].dynamic {
            self.children.remove(idx);
        }
        self.sync_stats();
        Ok(())
    }

    async fn manual_restart(&mut self, id: &str) -> Result<(), SupervisorError> {
        let idx = self
            .children
            .iter()
            .position(|child| child.spec.id == id)
            .ok_or_else(|| SupervisorError::UnknownChild(id.to_string()))?;
        self.stop_instance(idx, ExitReason::Shutdown).await;
        self.start_instance(idx).await?;
        self.children[idx].restart_count += 1;
        self.sync_stats();
        Ok(())
    }

    /// Start a fresh instance for the spec at `idx` and wire its exit
    /// forwarder.
    async fn start_instance(&mut self, idx: usize) -> Result<(), SupervisorError> {
        let factory = Arc::clone(&self.children[idx].spec.factory);
        let started: StartedChild = factory().await?;
        let (server, stop, exit) = started.into_parts();

        let seq = self.next_seq;
        self.next_seq += 1;
        let exit_tx = self.exit_tx.clone();
        tokio::spawn(async move {
            let reason = exit.await.unwrap_or(ExitReason::NoProc);
            let _ = exit_tx.send(ExitEvent { seq, reason });
        });

        self.children[idx].running = Some(RunningChild { seq, server, stop });
        Ok(())
    }

    /// Deliberately stop the instance at `idx`; its exit event is expected.
    async fn stop_instance(&mut self, idx: usize, reason: ExitReason) {
        let grace = self.children[idx].spec.shutdown_timeout;
        if let Some(running) = self.children[idx].running.take() {
            self.expected.insert(running.seq);
            (running.stop)(reason, grace).await;
        }
    }

    /// Shut every live child down in reverse start order.
    async fn shutdown_children(&mut self) {
        for idx in (0..self.children.len()).rev() {
            self.stop_instance(idx, ExitReason::Shutdown).await;
        }
        self.sync_stats();
    }

    fn sync_stats(&self) {
        let mut stats = self.stats.children.lock();
        *stats = self
            .children
            .iter()
            .map(|child| ChildStat {
                spec_id: child.spec.id.clone(),
                server: child
                    .running
                    .as_ref()
                    .and_then(|running| running.server.clone()),
                restart_count: child.restart_count,
            })
            .collect();
    }
}
