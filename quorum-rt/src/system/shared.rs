//! Shared state behind an `ActorSystem` handle.
//!
//! Every mutation of the registries, link/monitor tables, and the cell map
//! flows through methods here, so the termination cascade is one code path:
//! monitors fire, links propagate or trap, names are released, hooks run,
//! and the lifecycle event is published, in that order.

// Layer 1: Standard library imports
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::config::SystemConfig;
use super::links::{LinkTable, MonitorTable};
use super::mailbox::{MailboxMetrics, MailboxMsg};
use super::status::{ActorStatus, StatusFlag};
use crate::actor::{ActorError, ExitReason, InfoMsg, ServerRef};
use crate::cluster::NodeId;
use crate::events::{EventBus, LifecycleEvent};
use crate::global::GlobalNames;
use crate::registry::local::AliveCheck;
use crate::registry::{LocalRegistry, RegistryMode};
use crate::remote::router::RemoteRouter;
use crate::supervisor::stats::SupervisorStatsCell;
use crate::supervisor::SupervisorId;
use crate::util::{MonitorId, ServerId};

/// Hook invoked synchronously on every actor termination; used by the
/// cluster layer for remote monitor/link notification and global-registry GC.
pub(crate) type TerminateHook = Arc<dyn Fn(&ServerRef, &ExitReason) + Send + Sync>;

/// Overall system state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SystemState {
    Running,
    ShuttingDown,
    Stopped,
}

/// Termination bookkeeping guarded by one mutex per actor.
#[derive(Default)]
pub(crate) struct TermState {
    /// Set exactly once by the first (and only) termination pass.
    pub claimed: bool,
    /// Exit watchers fired when termination completes.
    pub watchers: Vec<oneshot::Sender<ExitReason>>,
}

/// Runtime handle to one actor, shared by senders, the cell task, and the
/// watchdog.
pub(crate) struct CellHandle {
    pub server: ServerRef,
    pub name: Option<String>,
    pub sender: UnboundedSender<MailboxMsg>,
    pub status: StatusFlag,
    pub metrics: MailboxMetrics,
    pub trap_exit: AtomicBool,
    pub started_at: DateTime<Utc>,
    /// Became running at least once; controls lifecycle event emission.
    pub started: AtomicBool,
    pub term: Mutex<TermState>,
    /// Reason recorded before aborting the task, read by the watchdog.
    pub kill_reason: Mutex<Option<ExitReason>>,
    pub abort: Mutex<Option<AbortHandle>>,
}

impl CellHandle {
    /// Whether termination has been claimed.
    pub fn terminated(&self) -> bool {
        self.term.lock().claimed
    }
}

/// Bounded log of recent exits, consulted by late watchers and monitors set
/// against already-dead actors.
pub(crate) struct ExitLog {
    reasons: HashMap<ServerId, ExitReason>,
    order: VecDeque<ServerId>,
    capacity: usize,
}

impl ExitLog {
    fn new(capacity: usize) -> Self {
        Self {
            reasons: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    pub(crate) fn record(&mut self, id: ServerId, reason: ExitReason) {
        if self.reasons.contains_key(&id) {
            return;
        }
        if self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.reasons.remove(&evicted);
            }
        }
        self.order.push_back(id);
        self.reasons.insert(id, reason);
    }

    pub(crate) fn get(&self, id: ServerId) -> Option<ExitReason> {
        self.reasons.get(&id).cloned()
    }
}

/// The single-writer core every system operation goes through.
pub(crate) struct SystemShared {
    pub node_id: NodeId,
    pub config: SystemConfig,
    pub cells: DashMap<ServerId, Arc<CellHandle>>,
    /// Built-in unique registry for actors started with a local name.
    pub registry: Arc<LocalRegistry>,
    /// User-created registries, cleaned on actor termination.
    pub user_registries: Mutex<Vec<Weak<LocalRegistry>>>,
    pub links: LinkTable,
    pub monitors: MonitorTable,
    pub events: EventBus,
    pub exit_log: Mutex<ExitLog>,
    pub terminate_hooks: RwLock<Vec<TerminateHook>>,
    pub state: RwLock<SystemState>,
    /// Supervisors register themselves here for the observer.
    pub supervisors: DashMap<SupervisorId, Arc<SupervisorStatsCell>>,
    /// Replicated registry, attached when the node joins a cluster.
    pub global_names: OnceLock<Arc<GlobalNames>>,
    /// Remote dispatch seam, attached when the cluster runtime starts.
    pub router: OnceLock<Arc<dyn RemoteRouter>>,
}

impl SystemShared {
    pub(crate) fn new(node_id: NodeId, config: SystemConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<SystemShared>| {
            let registry_weak = weak.clone();
            let alive: AliveCheck = Arc::new(move |server: &ServerRef| {
                match registry_weak.upgrade() {
                    Some(shared) => {
                        if server.node != shared.node_id {
                            // Remote refs are not tracked locally; treat as live.
                            return true;
                        }
                        shared.is_alive(server.id)
                    }
                    None => false,
                }
            });
            SystemShared {
                node_id,
                config,
                cells: DashMap::new(),
                registry: Arc::new(LocalRegistry::new(RegistryMode::Unique, alive)),
                user_registries: Mutex::new(Vec::new()),
                links: LinkTable::default(),
                monitors: MonitorTable::default(),
                events: EventBus::new(),
                exit_log: Mutex::new(ExitLog::new(4096)),
                terminate_hooks: RwLock::new(Vec::new()),
                state: RwLock::new(SystemState::Running),
                supervisors: DashMap::new(),
                global_names: OnceLock::new(),
                router: OnceLock::new(),
            }
        })
    }

    /// Build an alive-check closure for a user registry.
    pub(crate) fn alive_check(self: &Arc<Self>) -> AliveCheck {
        let weak = Arc::downgrade(self);
        Arc::new(move |server: &ServerRef| match weak.upgrade() {
            Some(shared) => server.node != shared.node_id || shared.is_alive(server.id),
            None => false,
        })
    }

    /// Whether the actor exists and has not begun termination cleanup.
    pub(crate) fn is_alive(&self, id: ServerId) -> bool {
        match self.cells.get(&id) {
            Some(cell) => !cell.terminated(),
            None => false,
        }
    }

    pub(crate) fn status_of(&self, id: ServerId) -> Option<ActorStatus> {
        self.cells.get(&id).map(|cell| cell.status.get())
    }

    pub(crate) fn trap_exit_of(&self, id: ServerId) -> bool {
        self.cells
            .get(&id)
            .map(|cell| cell.trap_exit.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Enqueue a message, rejecting actors that no longer accept mail.
    pub(crate) fn send_mailbox(&self, id: ServerId, msg: MailboxMsg) -> Result<(), ActorError> {
        let cell = self.cells.get(&id).ok_or(ActorError::ServerNotRunning)?;
        if !cell.status.get().accepts_mail() {
            return Err(ActorError::ServerNotRunning);
        }
        cell.metrics.on_enqueue();
        cell.sender
            .send(msg)
            .map_err(|_| ActorError::ServerNotRunning)
    }

    /// Register an exit watcher. Resolves immediately for dead actors.
    pub(crate) fn watch(&self, id: ServerId) -> oneshot::Receiver<ExitReason> {
        let (tx, rx) = oneshot::channel();
        if let Some(cell) = self.cells.get(&id) {
            let mut term = cell.term.lock();
            if !term.claimed {
                term.watchers.push(tx);
                return rx;
            }
        }
        let reason = self
            .exit_log
            .lock()
            .get(id)
            .unwrap_or(ExitReason::NoProc);
        let _ = tx.send(reason);
        rx
    }

    /// Begin a graceful stop: advance the status and enqueue the stop request.
    pub(crate) fn initiate_stop(&self, id: ServerId, reason: ExitReason) {
        if let Some(cell) = self.cells.get(&id) {
            cell.status.advance(ActorStatus::Stopping);
            cell.metrics.on_enqueue();
            let _ = cell.sender.send(MailboxMsg::Stop { reason });
        }
    }

    /// Force-terminate: abort the cell task; the watchdog completes cleanup.
    pub(crate) fn kill(&self, id: ServerId, reason: ExitReason) {
        if let Some(cell) = self.cells.get(&id) {
            *cell.kill_reason.lock() = Some(reason);
            cell.status.advance(ActorStatus::Stopping);
            if let Some(abort) = cell.abort.lock().as_ref() {
                abort.abort();
            }
        }
    }

    /// Graceful stop bounded by `grace`, escalating to a kill.
    pub(crate) async fn stop_and_wait(
        self: &Arc<Self>,
        id: ServerId,
        reason: ExitReason,
        grace: std::time::Duration,
    ) {
        if !self.cells.contains_key(&id) {
            return;
        }
        let mut rx = self.watch(id);
        self.initiate_stop(id, reason);
        match tokio::time::timeout(grace, &mut rx).await {
            Ok(_) => {}
            Err(_) => {
                debug!(actor = %id, "graceful stop timed out, killing");
                self.kill(id, ExitReason::Kill);
                let _ = rx.await;
            }
        }
    }

    /// The one termination cleanup pass; idempotent via the claim flag.
    pub(crate) fn finish_termination(self: &Arc<Self>, id: ServerId, reason: ExitReason) {
        let Some(cell) = self.cells.get(&id).map(|c| Arc::clone(c.value())) else {
            return;
        };

        let watchers = {
            let mut term = cell.term.lock();
            if term.claimed {
                return;
            }
            term.claimed = true;
            // Record the exit before releasing the lock so any watcher that
            // observes the claim finds the reason in the log.
            self.exit_log.lock().record(id, reason.clone());
            std::mem::take(&mut term.watchers)
        };

        cell.status.advance(ActorStatus::Stopped);
        let server = cell.server.clone();
        let started = cell.started.load(Ordering::SeqCst);

        for tx in watchers {
            let _ = tx.send(reason.clone());
        }

        self.cells.remove(&id);

        // Release every name held by the actor.
        self.registry.remove_id(id);
        {
            let mut registries = self.user_registries.lock();
            registries.retain(|weak| match weak.upgrade() {
                Some(registry) => {
                    registry.remove_id(id);
                    true
                }
                None => false,
            });
        }

        // Monitors observing the dying actor fire exactly once each.
        for entry in self.monitors.take_for_target(id) {
            self.notify_monitor_down(entry.id, &entry.owner, &server, reason.clone());
        }
        // Monitors the dying actor owned are silently erased.
        self.monitors.take_for_owner(id);

        // Links: clean exits just unlink; abnormal exits trap or cascade.
        for entry in self.links.take_for(id) {
            let peer = entry.peer_of(id).clone();
            if !reason.is_abnormal() {
                continue;
            }
            if peer.node != self.node_id {
                // Remote peers are handled by the cluster layer's link tables
                // through the terminate hooks below.
                continue;
            }
            if self.trap_exit_of(peer.id) {
                self.deliver_exit_signal(&peer, &server, reason.clone(), entry.id);
            } else {
                debug!(actor = %peer.id, from = %id, reason = %reason, "exit signal cascades");
                self.initiate_stop(peer.id, reason.clone());
            }
        }

        // Cluster layer: remote monitors/links, global registry GC.
        for hook in self.terminate_hooks.read().iter() {
            hook(&server, &reason);
        }

        if started {
            self.events.publish(LifecycleEvent::Terminated {
                server,
                reason,
                at: Utc::now(),
            });
        }
    }

    /// Deliver a `process_down` to a local monitor owner and publish it.
    pub(crate) fn notify_monitor_down(
        self: &Arc<Self>,
        monitor_id: MonitorId,
        owner: &ServerRef,
        monitored: &ServerRef,
        reason: ExitReason,
    ) {
        if owner.node == self.node_id {
            let info = InfoMsg::ProcessDown {
                monitored: monitored.clone(),
                reason: reason.clone(),
                monitor_id,
            };
            if self.send_mailbox(owner.id, MailboxMsg::Info(info)).is_err() {
                debug!(owner = %owner.id, "monitor owner gone before down delivery");
            }
        }
        self.events.publish(LifecycleEvent::ProcessDown {
            server: owner.clone(),
            monitored: monitored.clone(),
            reason,
            monitor_id,
            at: Utc::now(),
        });
    }

    /// Deliver a trapped exit signal as an info message and publish it.
    pub(crate) fn deliver_exit_signal(
        self: &Arc<Self>,
        to: &ServerRef,
        from: &ServerRef,
        reason: ExitReason,
        link_id: crate::util::LinkId,
    ) {
        let info = InfoMsg::ExitSignal {
            from: from.clone(),
            reason: reason.clone(),
            link_id,
        };
        if self.send_mailbox(to.id, MailboxMsg::Info(info)).is_err() {
            warn!(actor = %to.id, "trap-exit target gone before signal delivery");
        }
        self.events.publish(LifecycleEvent::ExitSignal {
            server: to.clone(),
            from: from.clone(),
            reason,
            link_id,
            at: Utc::now(),
        });
    }

    /// Register a termination hook.
    pub(crate) fn add_terminate_hook(&self, hook: TerminateHook) {
        self.terminate_hooks.write().push(hook);
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        *self.state.read() != SystemState::Running
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_log_record_once() {
        let mut log = ExitLog::new(4);
        let id = ServerId::new();
        log.record(id, ExitReason::Normal);
        log.record(id, ExitReason::Kill);
        assert_eq!(log.get(id), Some(ExitReason::Normal));
    }

    #[test]
    fn test_exit_log_eviction() {
        let mut log = ExitLog::new(2);
        let a = ServerId::new();
        let b = ServerId::new();
        let c = ServerId::new();
        log.record(a, ExitReason::Normal);
        log.record(b, ExitReason::Normal);
        log.record(c, ExitReason::Normal);
        assert_eq!(log.get(a), None);
        assert!(log.get(b).is_some());
        assert!(log.get(c).is_some());
    }
}
