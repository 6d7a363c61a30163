//! The per-node behavior registry backing remote spawn.
//!
//! Behavior code cannot travel on the wire, so each node maps behavior names
//! to local factories. Registration should happen before the cluster starts;
//! a spawn request for an unknown name fails with `behavior_not_found`.

// Layer 1: Standard library imports
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use dashmap::DashMap;

// Layer 3: Internal module imports
use crate::actor::{Behavior, ServerRef, StartOptions};
use crate::error::RuntimeError;
use crate::system::ActorSystem;

type SpawnFuture = Pin<Box<dyn Future<Output = Result<ServerRef, RuntimeError>> + Send>>;

/// Type-erased spawnable behavior.
trait DynBehavior: Send + Sync {
    fn spawn(&self, system: ActorSystem, opts: StartOptions) -> SpawnFuture;
}

struct Entry<B: Behavior> {
    behavior: Arc<B>,
}

impl<B: Behavior> DynBehavior for Entry<B> {
    fn spawn(&self, system: ActorSystem, opts: StartOptions) -> SpawnFuture {
        let behavior = Arc::clone(&self.behavior);
        Box::pin(async move {
            let aref = system.start_arc(behavior, opts).await?;
            Ok(aref.into_server_ref())
        })
    }
}

/// Map from behavior name to spawnable behavior.
///
/// # Example
/// ```rust,ignore
/// let behaviors = BehaviorRegistry::new();
/// behaviors.register("counter", CounterBehavior::default());
/// assert!(behaviors.contains("counter"));
/// ```
pub struct BehaviorRegistry {
    entries: DashMap<String, Arc<dyn DynBehavior>>,
}

impl Default for BehaviorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BehaviorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register a behavior under a name. Re-registering a name replaces the
    /// previous behavior.
    pub fn register<B: Behavior>(&self, name: impl Into<String>, behavior: B) {
        self.entries.insert(
            name.into(),
            Arc::new(Entry {
                behavior: Arc::new(behavior),
            }),
        );
    }

    /// Whether a behavior is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered behavior names.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of registered behaviors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start an actor of the named behavior on the given system.
    pub(crate) async fn spawn(
        &self,
        system: &ActorSystem,
        name: &str,
        opts: StartOptions,
    ) -> Option<Result<ServerRef, RuntimeError>> {
        let entry = self.entries.get(name).map(|e| Arc::clone(e.value()))?;
        Some(entry.spawn(system.clone(), opts).await)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::actor::{BehaviorError, CallOutcome, CastOutcome};
    use async_trait::async_trait;

    #[derive(Default)]
    struct Echo;

    #[async_trait]
    impl Behavior for Echo {
        type State = ();
        type Call = String;
        type Cast = String;
        type Reply = String;

        async fn init(&self) -> Result<(), BehaviorError> {
            Ok(())
        }

        async fn handle_call(&self, msg: String, state: ()) -> CallOutcome<String, ()> {
            CallOutcome::reply(msg, state)
        }

        async fn handle_cast(&self, _msg: String, state: ()) -> CastOutcome<()> {
            CastOutcome::next(state)
        }
    }

    #[test]
    fn test_register_and_contains() {
        let registry = BehaviorRegistry::new();
        assert!(registry.is_empty());

        registry.register("echo", Echo);
        assert!(registry.contains("echo"));
        assert!(!registry.contains("other"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn test_spawn_unknown_name_is_none() {
        let registry = BehaviorRegistry::new();
        let system = ActorSystem::standalone();
        assert!(registry
            .spawn(&system, "ghost", StartOptions::default())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_spawn_known_behavior() {
        let registry = BehaviorRegistry::new();
        registry.register("echo", Echo);
        let system = ActorSystem::standalone();

        let server = registry
            .spawn(&system, "echo", StartOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert!(system.alive(&server));
    }
}
