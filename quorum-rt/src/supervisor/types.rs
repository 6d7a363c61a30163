//! Type definitions for the supervision framework: child specs, restart
//! policies, strategies, and the started-child handle.

// Layer 1: Standard library imports
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

// Layer 3: Internal module imports
use super::error::SupervisorError;
use crate::actor::{Behavior, ExitReason, ServerRef, StartOptions};
use crate::system::ActorSystem;

/// Default grace given to one child's shutdown.
pub const DEFAULT_CHILD_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(5000);

/// Unique identifier for a supervisor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SupervisorId(Uuid);

impl SupervisorId {
    /// Creates a new unique supervisor id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SupervisorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SupervisorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Restart policy for supervised children.
///
/// # Examples
///
/// ```rust
/// use quorum_rt::actor::ExitReason;
/// use quorum_rt::supervisor::RestartPolicy;
///
/// assert!(RestartPolicy::Permanent.should_restart(&ExitReason::Normal));
/// assert!(!RestartPolicy::Transient.should_restart(&ExitReason::Shutdown));
/// assert!(RestartPolicy::Transient.should_restart(&ExitReason::error("x")));
/// assert!(!RestartPolicy::Temporary.should_restart(&ExitReason::error("x")));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Always restart, regardless of exit reason.
    Permanent,

    /// Restart only on abnormal exits (`normal` and `shutdown` excluded).
    Transient,

    /// Never restart.
    Temporary,
}

impl RestartPolicy {
    /// Whether a child exiting with `reason` should be restarted.
    pub fn should_restart(&self, reason: &ExitReason) -> bool {
        match self {
            RestartPolicy::Permanent => true,
            RestartPolicy::Transient => reason.is_abnormal(),
            RestartPolicy::Temporary => false,
        }
    }
}

/// Which siblings restart alongside a failed child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorStrategy {
    /// Restart only the failed child.
    OneForOne,

    /// Stop every other child (reverse order), then start all in order.
    OneForAll,

    /// Stop the children after the failed one, then restart from it onward.
    RestForOne,

    /// One templated spec; dynamic instances restart independently.
    SimpleOneForOne,
}

impl SupervisorStrategy {
    /// Stable lowercase name, used in observer snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorStrategy::OneForOne => "one_for_one",
            SupervisorStrategy::OneForAll => "one_for_all",
            SupervisorStrategy::RestForOne => "rest_for_one",
            SupervisorStrategy::SimpleOneForOne => "simple_one_for_one",
        }
    }
}

impl fmt::Display for SupervisorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Future returned by a child factory.
pub type StartFuture = Pin<Box<dyn Future<Output = Result<StartedChild, SupervisorError>> + Send>>;

/// Factory producing a fresh child instance per (re)start.
pub type ChildFactory = Arc<dyn Fn() -> StartFuture + Send + Sync>;

/// Factory producing a dynamic child instance from spawn arguments.
pub type DynamicFactory = Arc<dyn Fn(Value) -> StartFuture + Send + Sync>;

/// Bounded stop function: `(reason, grace)` → completion.
pub type StopFn =
    Arc<dyn Fn(ExitReason, Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A live child instance handed back by a factory.
///
/// Carries the optional actor ref (supervisor children have none), a bounded
/// stop function, and the exit notification the engine watches.
pub struct StartedChild {
    server: Option<ServerRef>,
    stop: StopFn,
    exit: oneshot::Receiver<ExitReason>,
}

impl StartedChild {
    /// Assemble a started child from its parts.
    pub fn new(
        server: Option<ServerRef>,
        stop: StopFn,
        exit: oneshot::Receiver<ExitReason>,
    ) -> Self {
        Self { server, stop, exit }
    }

    /// The child's actor ref, when it is an actor.
    pub fn server(&self) -> Option<&ServerRef> {
        self.server.as_ref()
    }

    pub(crate) fn into_parts(self) -> (Option<ServerRef>, StopFn, oneshot::Receiver<ExitReason>) {
        (self.server, self.stop, self.exit)
    }
}

impl fmt::Debug for StartedChild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartedChild")
            .field("server", &self.server)
            .finish()
    }
}

/// Specification of one supervised child.
///
/// # Example
/// ```rust,ignore
/// let spec = ChildSpec::actor("db", &system, || DbBehavior::connect(url.clone()))
///     .with_restart(RestartPolicy::Permanent)
///     .with_shutdown_timeout(Duration::from_secs(2));
/// ```
#[derive(Clone)]
pub struct ChildSpec {
    /// Spec id, unique inside one supervisor.
    pub id: String,

    /// When to restart this child.
    pub restart: RestartPolicy,

    /// Grace given to this child's shutdown before force-kill.
    pub shutdown_timeout: Duration,

    /// A significant child's permanent stop shuts the supervisor down.
    pub significant: bool,

    pub(crate) factory: ChildFactory,
}

impl fmt::Debug for ChildSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildSpec")
            .field("id", &self.id)
            .field("restart", &self.restart)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("significant", &self.significant)
            .finish()
    }
}

impl ChildSpec {
    /// A spec from a raw factory.
    pub fn new(id: impl Into<String>, factory: ChildFactory) -> Self {
        Self {
            id: id.into(),
            restart: RestartPolicy::Permanent,
            shutdown_timeout: DEFAULT_CHILD_SHUTDOWN_TIMEOUT,
            significant: false,
            factory,
        }
    }

    /// A spec whose child is an actor built by `make` on every (re)start.
    pub fn actor<B, F>(id: impl Into<String>, system: &ActorSystem, make: F) -> Self
    where
        B: Behavior,
        F: Fn() -> B + Send + Sync + 'static,
    {
        Self::actor_with(id, system, make, StartOptions::default())
    }

    /// Like [`ChildSpec::actor`] with explicit start options.
    pub fn actor_with<B, F>(
        id: impl Into<String>,
        system: &ActorSystem,
        make: F,
        opts: StartOptions,
    ) -> Self
    where
        B: Behavior,
        F: Fn() -> B + Send + Sync + 'static,
    {
        let id = id.into();
        let spec_id = id.clone();
        let system = system.clone();
        let factory: ChildFactory = Arc::new(move || {
            let system = system.clone();
            let opts = opts.clone();
            let spec_id = spec_id.clone();
            let behavior = make();
            Box::pin(async move {
                actor_child(&system, behavior, opts, &spec_id).await
            })
        });
        Self::new(id, factory)
    }

    /// Set the restart policy.
    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    /// Set the shutdown grace period.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Mark the child significant.
    pub fn with_significant(mut self, significant: bool) -> Self {
        self.significant = significant;
        self
    }
}

/// Start an actor child and wire its stop/exit plumbing.
pub(crate) async fn actor_child<B: Behavior>(
    system: &ActorSystem,
    behavior: B,
    opts: StartOptions,
    spec_id: &str,
) -> Result<StartedChild, SupervisorError> {
    let aref = system
        .start(behavior, opts)
        .await
        .map_err(|err| SupervisorError::StartFailed {
            id: spec_id.to_string(),
            message: err.to_string(),
        })?;
    let server = aref.server_ref().clone();
    let exit = system.shared().watch(server.id);

    let stop_system = system.clone();
    let stop_server = server.clone();
    let stop: StopFn = Arc::new(move |reason, grace| {
        let system = stop_system.clone();
        let server = stop_server.clone();
        Box::pin(async move {
            system.shared().stop_and_wait(server.id, reason, grace).await;
        })
    });

    Ok(StartedChild::new(Some(server), stop, exit))
}

/// Template for `simple_one_for_one` dynamic children.
#[derive(Clone)]
pub struct DynamicTemplate {
    /// Prefix for generated instance ids (`prefix-N`).
    pub id_prefix: String,

    /// Restart policy applied to every instance.
    pub restart: RestartPolicy,

    /// Shutdown grace for every instance.
    pub shutdown_timeout: Duration,

    pub(crate) factory: DynamicFactory,
}

impl fmt::Debug for DynamicTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicTemplate")
            .field("id_prefix", &self.id_prefix)
            .field("restart", &self.restart)
            .finish()
    }
}

impl DynamicTemplate {
    /// A template from a raw factory taking spawn arguments.
    pub fn new(id_prefix: impl Into<String>, factory: DynamicFactory) -> Self {
        Self {
            id_prefix: id_prefix.into(),
            restart: RestartPolicy::Permanent,
            shutdown_timeout: DEFAULT_CHILD_SHUTDOWN_TIMEOUT,
            factory,
        }
    }

    /// A template whose instances are actors built by `make(args)`.
    pub fn actor<B, F>(id_prefix: impl Into<String>, system: &ActorSystem, make: F) -> Self
    where
        B: Behavior,
        F: Fn(Value) -> B + Send + Sync + 'static,
    {
        let id_prefix = id_prefix.into();
        let spec_id = id_prefix.clone();
        let system = system.clone();
        let factory: DynamicFactory = Arc::new(move |args: Value| {
            let system = system.clone();
            let spec_id = spec_id.clone();
            let behavior = make(args);
            Box::pin(async move {
                actor_child(&system, behavior, StartOptions::default(), &spec_id).await
            })
        });
        Self::new(id_prefix, factory)
    }

    /// Set the restart policy.
    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    /// Set the shutdown grace period.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_policy_permanent() {
        assert!(RestartPolicy::Permanent.should_restart(&ExitReason::Normal));
        assert!(RestartPolicy::Permanent.should_restart(&ExitReason::error("x")));
    }

    #[test]
    fn test_restart_policy_transient() {
        assert!(!RestartPolicy::Transient.should_restart(&ExitReason::Normal));
        assert!(!RestartPolicy::Transient.should_restart(&ExitReason::Shutdown));
        assert!(RestartPolicy::Transient.should_restart(&ExitReason::Kill));
        assert!(RestartPolicy::Transient.should_restart(&ExitReason::error("x")));
    }

    #[test]
    fn test_restart_policy_temporary() {
        assert!(!RestartPolicy::Temporary.should_restart(&ExitReason::Normal));
        assert!(!RestartPolicy::Temporary.should_restart(&ExitReason::error("x")));
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(SupervisorStrategy::OneForOne.as_str(), "one_for_one");
        assert_eq!(SupervisorStrategy::OneForAll.as_str(), "one_for_all");
        assert_eq!(SupervisorStrategy::RestForOne.as_str(), "rest_for_one");
        assert_eq!(
            SupervisorStrategy::SimpleOneForOne.as_str(),
            "simple_one_for_one"
        );
    }

    #[test]
    fn test_supervisor_id_uniqueness() {
        assert_ne!(SupervisorId::new(), SupervisorId::new());
    }

    #[test]
    fn test_child_spec_builder() {
        let factory: ChildFactory = Arc::new(|| {
            Box::pin(async {
                Err(SupervisorError::StartFailed {
                    id: "x".to_string(),
                    message: "unused".to_string(),
                })
            })
        });
        let spec = ChildSpec::new("worker", factory)
            .with_restart(RestartPolicy::Transient)
            .with_shutdown_timeout(Duration::from_secs(1))
            .with_significant(true);

        assert_eq!(spec.id, "worker");
        assert_eq!(spec.restart, RestartPolicy::Transient);
        assert_eq!(spec.shutdown_timeout, Duration::from_secs(1));
        assert!(spec.significant);
    }
}
