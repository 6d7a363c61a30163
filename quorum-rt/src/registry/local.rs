//! The node-local name registry.
//!
//! One instance supports one of two modes: `Unique` (name → single actor,
//! used for service discovery) or `Duplicate` (name → set of actors, used for
//! pub/sub fan-out). The system binds every registry to its termination path
//! so a name can never resolve to a dead actor.

// Layer 1: Standard library imports
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::RwLock;

// Layer 3: Internal module imports
use super::error::RegistryError;
use super::pattern::NamePattern;
use crate::actor::ServerRef;
use crate::util::ServerId;

/// Liveness oracle injected by the actor system.
pub(crate) type AliveCheck = Arc<dyn Fn(&ServerRef) -> bool + Send + Sync>;

/// Key-uniqueness mode of a registry instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryMode {
    /// One actor per name; conflicting registration fails.
    Unique,

    /// Many actors per name; `(name, ref)` pairs form a set.
    Duplicate,
}

#[derive(Default)]
struct Inner {
    names: HashMap<String, Vec<ServerRef>>,
    by_id: HashMap<ServerId, HashSet<String>>,
}

/// Process-wide name → actor map with automatic dead-ref cleanup.
///
/// # Example
/// ```rust
/// use quorum_rt::registry::{LocalRegistry, RegistryMode};
/// # use quorum_rt::actor::ServerRef;
/// # use quorum_rt::cluster::NodeId;
/// # use quorum_rt::util::ServerId;
///
/// let registry = LocalRegistry::detached(RegistryMode::Unique);
/// let node = NodeId::parse("n@h:1").unwrap();
/// let actor = ServerRef::new(ServerId::new(), node);
///
/// registry.register("db", actor.clone()).unwrap();
/// assert_eq!(registry.whereis("db"), Some(actor));
/// ```
pub struct LocalRegistry {
    mode: RegistryMode,
    inner: RwLock<Inner>,
    alive: AliveCheck,
}

impl LocalRegistry {
    /// Create a registry bound to a liveness oracle.
    pub(crate) fn new(mode: RegistryMode, alive: AliveCheck) -> Self {
        Self {
            mode,
            inner: RwLock::new(Inner::default()),
            alive,
        }
    }

    /// Create a registry with no liveness oracle (every ref counts as alive).
    ///
    /// Registries obtained from an `ActorSystem` are bound to the system's
    /// termination path instead; this constructor exists for standalone use
    /// and tests.
    pub fn detached(mode: RegistryMode) -> Self {
        Self::new(mode, Arc::new(|_| true))
    }

    /// This registry's mode.
    pub fn mode(&self) -> RegistryMode {
        self.mode
    }

    /// Register `server` under `name`.
    ///
    /// Unique mode: fails with [`RegistryError::AlreadyRegistered`] when the
    /// name is held by a different live actor; re-registering the same pair is
    /// a no-op. Duplicate mode: the pair is added once, other pairs coexist.
    pub fn register(&self, name: impl Into<String>, server: ServerRef) -> Result<(), RegistryError> {
        let name = name.into();
        let mut inner = self.inner.write();
        prune_dead(&mut inner, &name, &self.alive);

        let entries = inner.names.entry(name.clone()).or_default();
        match self.mode {
            RegistryMode::Unique => {
                if let Some(existing) = entries.first() {
                    if existing == &server {
                        return Ok(());
                    }
                    return Err(RegistryError::AlreadyRegistered(name));
                }
                entries.push(server.clone());
            }
            RegistryMode::Duplicate => {
                if entries.contains(&server) {
                    return Ok(());
                }
                entries.push(server.clone());
            }
        }
        inner.by_id.entry(server.id).or_default().insert(name);
        Ok(())
    }

    /// Remove every entry under `name`.
    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        let removed = inner
            .names
            .remove(name)
            .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))?;
        for server in &removed {
            detach_reverse(&mut inner, server.id, name);
        }
        Ok(())
    }

    /// Remove one `(name, server)` pair (duplicate mode).
    pub fn unregister_ref(&self, name: &str, server: &ServerRef) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        let entries = inner
            .names
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))?;
        let before = entries.len();
        entries.retain(|s| s != server);
        if entries.len() == before {
            return Err(RegistryError::NotRegistered(name.to_string()));
        }
        if entries.is_empty() {
            inner.names.remove(name);
        }
        detach_reverse(&mut inner, server.id, name);
        Ok(())
    }

    /// Resolve a name, failing when absent.
    pub fn lookup(&self, name: &str) -> Result<ServerRef, RegistryError> {
        self.whereis(name)
            .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))
    }

    /// Resolve a name to its first live entry, or `None`.
    ///
    /// Never returns a ref to a terminated actor.
    pub fn whereis(&self, name: &str) -> Option<ServerRef> {
        {
            let inner = self.inner.read();
            let entries = inner.names.get(name)?;
            if let Some(server) = entries.iter().find(|s| (self.alive)(s)) {
                return Some(server.clone());
            }
        }
        // Every entry under the name was dead; prune eagerly.
        let mut inner = self.inner.write();
        prune_dead(&mut inner, name, &self.alive);
        None
    }

    /// All live entries under a name (duplicate-mode fan-out set).
    pub fn entries(&self, name: &str) -> Vec<ServerRef> {
        let inner = self.inner.read();
        inner
            .names
            .get(name)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|s| (self.alive)(s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the name has at least one live entry.
    pub fn is_registered(&self, name: &str) -> bool {
        self.whereis(name).is_some()
    }

    /// All currently registered names.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().names.keys().cloned().collect()
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.inner.read().names.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().names.is_empty()
    }

    /// All `(name, server)` pairs whose name matches the pattern.
    ///
    /// See [`NamePattern`] for the wildcard rules (`*`, `**`, `?`).
    pub fn match_names(&self, pattern: impl Into<NamePattern>) -> Vec<(String, ServerRef)> {
        let pattern = pattern.into();
        let inner = self.inner.read();
        let mut out = Vec::new();
        for (name, entries) in &inner.names {
            if !pattern.matches(name) {
                continue;
            }
            for server in entries {
                if (self.alive)(server) {
                    out.push((name.clone(), server.clone()));
                }
            }
        }
        out
    }

    /// Like [`match_names`](Self::match_names) with an extra predicate over
    /// each candidate pair.
    pub fn match_names_with<F>(
        &self,
        pattern: impl Into<NamePattern>,
        predicate: F,
    ) -> Vec<(String, ServerRef)>
    where
        F: Fn(&str, &ServerRef) -> bool,
    {
        self.match_names(pattern)
            .into_iter()
            .filter(|(name, server)| predicate(name, server))
            .collect()
    }

    /// Visit every live entry under `name`.
    ///
    /// This is the fan-out primitive behind `ActorSystem::dispatch`, which
    /// casts a message to each entry.
    pub fn dispatch_with<F>(&self, name: &str, mut f: F) -> usize
    where
        F: FnMut(&ServerRef),
    {
        let entries = self.entries(name);
        for server in &entries {
            f(server);
        }
        entries.len()
    }

    /// Remove every registration of a terminated actor.
    ///
    /// Called from the system's termination path.
    pub(crate) fn remove_id(&self, id: ServerId) {
        let mut inner = self.inner.write();
        let Some(names) = inner.by_id.remove(&id) else {
            return;
        };
        for name in names {
            if let Some(entries) = inner.names.get_mut(&name) {
                entries.retain(|s| s.id != id);
                if entries.is_empty() {
                    inner.names.remove(&name);
                }
            }
        }
    }
}

fn detach_reverse(inner: &mut Inner, id: ServerId, name: &str) {
    if let Some(set) = inner.by_id.get_mut(&id) {
        set.remove(name);
        if set.is_empty() {
            inner.by_id.remove(&id);
        }
    }
}

fn prune_dead(inner: &mut Inner, name: &str, alive: &AliveCheck) {
    let Some(entries) = inner.names.get_mut(name) else {
        return;
    };
    let dead: Vec<ServerRef> = entries.iter().filter(|s| !(alive)(s)).cloned().collect();
    if dead.is_empty() {
        return;
    }
    entries.retain(|s| (alive)(s));
    if entries.is_empty() {
        inner.names.remove(name);
    }
    for server in dead {
        detach_reverse(inner, server.id, name);
    }
}
