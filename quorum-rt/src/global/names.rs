//! The replicated global name registry.
//!
//! Every node holds a full replica; lookups never touch the network. Local
//! mutations apply optimistically and broadcast as incremental sync deltas;
//! a joining node receives a full sync from each peer. Conflicts resolve
//! deterministically: for the same name, the entry with the smaller
//! `(registered_at, node_id)` tuple wins everywhere. Registration timestamps
//! are taken under the registry lock and forced strictly monotonic per node,
//! so one node can never produce two conflicting entries with an identical
//! priority key.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

// Layer 2: Third-party crate imports
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use crate::actor::ServerRef;
use crate::cluster::NodeId;
use crate::proto::RegistryDelta;
use crate::registry::RegistryError;

/// Broadcast seam wired in by the cluster runtime; absent when the node is
/// not clustered (mutations then stay local).
pub(crate) type DeltaBroadcast = Arc<dyn Fn(Vec<RegistryDelta>) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GlobalEntry {
    pub server: ServerRef,
    pub registered_at: i64,
}

impl GlobalEntry {
    /// Priority key; lexicographically lower wins conflicts.
    fn priority(&self) -> (i64, &NodeId) {
        (self.registered_at, &self.server.node)
    }
}

struct Inner {
    names: HashMap<String, GlobalEntry>,
    /// Last timestamp issued locally; enforces per-node monotonicity.
    last_ts: i64,
}

/// One node's replica of the cluster-wide name table.
pub struct GlobalNames {
    local: NodeId,
    inner: RwLock<Inner>,
    broadcaster: OnceLock<DeltaBroadcast>,
}

impl GlobalNames {
    /// An empty replica owned by `local`.
    pub fn new(local: NodeId) -> Self {
        Self {
            local,
            inner: RwLock::new(Inner {
                names: HashMap::new(),
                last_ts: 0,
            }),
            broadcaster: OnceLock::new(),
        }
    }

    pub(crate) fn attach_broadcaster(&self, broadcaster: DeltaBroadcast) {
        let _ = self.broadcaster.set(broadcaster);
    }

    fn broadcast(&self, deltas: Vec<RegistryDelta>) {
        if let Some(broadcaster) = self.broadcaster.get() {
            broadcaster(deltas);
        }
    }

    /// Register `server` under `name`, cluster-wide.
    ///
    /// Applied optimistically to the local replica, then broadcast. Fails
    /// with [`RegistryError::AlreadyRegistered`] when a live entry with a
    /// winning priority already holds the name.
    pub fn register(&self, name: impl Into<String>, server: ServerRef) -> Result<(), RegistryError> {
        let name = name.into();
        let delta = {
            let mut inner = self.inner.write();
            let mut ts = Utc::now().timestamp_millis();
            if ts <= inner.last_ts {
                ts = inner.last_ts + 1;
            }

            if let Some(existing) = inner.names.get(&name) {
                if existing.server == server {
                    return Ok(());
                }
                // The existing entry was registered earlier: it wins.
                return Err(RegistryError::AlreadyRegistered(name));
            }

            inner.last_ts = ts;
            let entry = GlobalEntry {
                server: server.clone(),
                registered_at: ts,
            };
            inner.names.insert(name.clone(), entry);
            RegistryDelta::Upsert {
                name,
                server,
                registered_at: ts,
            }
        };
        self.broadcast(vec![delta]);
        Ok(())
    }

    /// Remove a name, cluster-wide.
    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let delta = {
            let mut inner = self.inner.write();
            let entry = inner
                .names
                .remove(name)
                .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))?;
            RegistryDelta::Remove {
                name: name.to_string(),
                registered_at: entry.registered_at,
                node: entry.server.node,
            }
        };
        self.broadcast(vec![delta]);
        Ok(())
    }

    /// Resolve a name against the local replica; no network involved.
    pub fn whereis(&self, name: &str) -> Option<ServerRef> {
        self.inner.read().names.get(name).map(|e| e.server.clone())
    }

    /// All registered names.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().names.keys().cloned().collect()
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.inner.read().names.len()
    }

    /// Whether the replica is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().names.is_empty()
    }

    /// Full-sync snapshot for a newly connected peer.
    pub(crate) fn snapshot(&self) -> Vec<RegistryDelta> {
        self.inner
            .read()
            .names
            .iter()
            .map(|(name, entry)| RegistryDelta::Upsert {
                name: name.clone(),
                server: entry.server.clone(),
                registered_at: entry.registered_at,
            })
            .collect()
    }

    /// Merge deltas received from a peer.
    ///
    /// Upserts apply the deterministic priority rule; removes only take
    /// effect when they name exactly the entry currently held, so a
    /// superseding re-registration survives a stale remove.
    pub(crate) fn apply_sync(&self, entries: Vec<RegistryDelta>) {
        let mut lost_local = Vec::new();
        {
            let mut inner = self.inner.write();
            for delta in entries {
                match delta {
                    RegistryDelta::Upsert {
                        name,
                        server,
                        registered_at,
                    } => {
                        let incoming = GlobalEntry {
                            server,
                            registered_at,
                        };
                        match inner.names.get(&name) {
                            None => {
                                inner.names.insert(name, incoming);
                            }
                            Some(existing) if existing == &incoming => {}
                            Some(existing) => {
                                if incoming.priority() < existing.priority() {
                                    if existing.server.node == self.local {
                                        lost_local.push(name.clone());
                                    }
                                    inner.names.insert(name, incoming);
                                }
                                // Otherwise the held entry wins; drop the
                                // incoming one.
                            }
                        }
                    }
                    RegistryDelta::Remove {
                        name,
                        registered_at,
                        node,
                    } => {
                        let matches = inner.names.get(&name).map(|existing| {
                            existing.registered_at == registered_at && existing.server.node == node
                        });
                        if matches == Some(true) {
                            inner.names.remove(&name);
                        }
                    }
                }
            }
        }
        for name in lost_local {
            // The caller of the losing registration has long returned; the
            // loss is surfaced through the log and the replica itself.
            warn!(name, "global registration lost conflict to an earlier peer entry");
        }
    }

    /// Drop every entry owned by a node declared down. Local sweep only;
    /// every peer performs the same sweep on its own replica.
    pub(crate) fn cleanup_node(&self, node: &NodeId) -> usize {
        let mut inner = self.inner.write();
        let before = inner.names.len();
        inner.names.retain(|_, entry| &entry.server.node != node);
        let removed = before - inner.names.len();
        if removed > 0 {
            debug!(node = %node, removed, "dropped global names of downed node");
        }
        removed
    }

    /// Remove every name held by a terminated local actor and broadcast the
    /// removals.
    pub(crate) fn cleanup_server(&self, server: &ServerRef) {
        let deltas = {
            let mut inner = self.inner.write();
            let names: Vec<(String, GlobalEntry)> = inner
                .names
                .iter()
                .filter(|(_, entry)| &entry.server == server)
                .map(|(name, entry)| (name.clone(), entry.clone()))
                .collect();
            for (name, _) in &names {
                inner.names.remove(name);
            }
            names
                .into_iter()
                .map(|(name, entry)| RegistryDelta::Remove {
                    name,
                    registered_at: entry.registered_at,
                    node: entry.server.node,
                })
                .collect::<Vec<_>>()
        };
        if !deltas.is_empty() {
            self.broadcast(deltas);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::util::ServerId;
    use parking_lot::Mutex;

    fn node(n: &str) -> NodeId {
        NodeId::parse(&format!("{n}@h:1")).unwrap()
    }

    fn server_on(n: &str) -> ServerRef {
        ServerRef::new(ServerId::new(), node(n))
    }

    #[test]
    fn test_register_and_whereis() {
        let reg = GlobalNames::new(node("a"));
        let s = server_on("a");
        reg.register("db", s.clone()).unwrap();
        assert_eq!(reg.whereis("db"), Some(s));
        assert_eq!(reg.whereis("nope"), None);
    }

    #[test]
    fn test_register_conflict_held_entry_wins() {
        let reg = GlobalNames::new(node("a"));
        reg.register("svc", server_on("a")).unwrap();
        let err = reg.register("svc", server_on("a")).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(_)));
    }

    #[test]
    fn test_register_same_server_is_noop() {
        let reg = GlobalNames::new(node("a"));
        let s = server_on("a");
        reg.register("svc", s.clone()).unwrap();
        reg.register("svc", s).unwrap();
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_unregister_round_trip() {
        let reg = GlobalNames::new(node("a"));
        reg.register("tmp", server_on("a")).unwrap();
        reg.unregister("tmp").unwrap();
        assert!(reg.whereis("tmp").is_none());
        assert!(reg.unregister("tmp").is_err());
    }

    #[test]
    fn test_merge_lower_priority_wins() {
        let reg = GlobalNames::new(node("b"));
        reg.register("svc", server_on("b")).unwrap();
        let held_ts = {
            let inner = reg.inner.read();
            inner.names.get("svc").unwrap().registered_at
        };

        // A peer entry registered earlier wins.
        let winner = server_on("a");
        reg.apply_sync(vec![RegistryDelta::Upsert {
            name: "svc".to_string(),
            server: winner.clone(),
            registered_at: held_ts - 10,
        }]);
        assert_eq!(reg.whereis("svc"), Some(winner));

        // A peer entry registered later loses.
        reg.apply_sync(vec![RegistryDelta::Upsert {
            name: "svc".to_string(),
            server: server_on("c"),
            registered_at: held_ts + 10,
        }]);
        assert_eq!(reg.whereis("svc").unwrap().node, node("a"));
    }

    #[test]
    fn test_merge_timestamp_tie_breaks_on_node_id() {
        let reg = GlobalNames::new(node("c"));
        let ts = 1000;
        reg.apply_sync(vec![RegistryDelta::Upsert {
            name: "svc".to_string(),
            server: server_on("b"),
            registered_at: ts,
        }]);
        reg.apply_sync(vec![RegistryDelta::Upsert {
            name: "svc".to_string(),
            server: server_on("a"),
            registered_at: ts,
        }]);
        // Same millisecond: lexicographically smaller node id wins.
        assert_eq!(reg.whereis("svc").unwrap().node, node("a"));
    }

    #[test]
    fn test_stale_remove_does_not_clobber_reregistration() {
        let reg = GlobalNames::new(node("a"));
        let old = server_on("b");
        reg.apply_sync(vec![RegistryDelta::Upsert {
            name: "svc".to_string(),
            server: old.clone(),
            registered_at: 100,
        }]);
        // Re-registration from another node supersedes.
        let new = server_on("c");
        reg.apply_sync(vec![
            RegistryDelta::Remove {
                name: "svc".to_string(),
                registered_at: 100,
                node: old.node.clone(),
            },
            RegistryDelta::Upsert {
                name: "svc".to_string(),
                server: new.clone(),
                registered_at: 200,
            },
        ]);
        // A duplicate of the old remove arrives late; it must not remove the
        // superseding entry.
        reg.apply_sync(vec![RegistryDelta::Remove {
            name: "svc".to_string(),
            registered_at: 100,
            node: old.node,
        }]);
        assert_eq!(reg.whereis("svc"), Some(new));
    }

    #[test]
    fn test_snapshot_and_full_sync_converge() {
        let a = GlobalNames::new(node("a"));
        a.register("one", server_on("a")).unwrap();
        a.register("two", server_on("a")).unwrap();

        let b = GlobalNames::new(node("b"));
        b.apply_sync(a.snapshot());
        assert_eq!(b.len(), 2);
        assert_eq!(b.whereis("one"), a.whereis("one"));
    }

    #[test]
    fn test_cleanup_node_sweeps_owned_entries() {
        let reg = GlobalNames::new(node("a"));
        reg.apply_sync(vec![
            RegistryDelta::Upsert {
                name: "x".to_string(),
                server: server_on("b"),
                registered_at: 1,
            },
            RegistryDelta::Upsert {
                name: "y".to_string(),
                server: server_on("b"),
                registered_at: 2,
            },
            RegistryDelta::Upsert {
                name: "z".to_string(),
                server: server_on("c"),
                registered_at: 3,
            },
        ]);
        assert_eq!(reg.cleanup_node(&node("b")), 2);
        assert!(reg.whereis("x").is_none());
        assert!(reg.whereis("z").is_some());
    }

    #[test]
    fn test_cleanup_server_broadcasts_removes() {
        let reg = GlobalNames::new(node("a"));
        let broadcasts: Arc<Mutex<Vec<Vec<RegistryDelta>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&broadcasts);
        reg.attach_broadcaster(Arc::new(move |deltas| sink.lock().push(deltas)));

        let s = server_on("a");
        reg.register("svc", s.clone()).unwrap();
        reg.cleanup_server(&s);

        assert!(reg.whereis("svc").is_none());
        let seen = broadcasts.lock();
        // One broadcast for the register, one for the cleanup.
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[1][0], RegistryDelta::Remove { .. }));
    }

    #[test]
    fn test_local_timestamps_strictly_monotonic() {
        let reg = GlobalNames::new(node("a"));
        reg.register("x", server_on("a")).unwrap();
        reg.register("y", server_on("a")).unwrap();
        let inner = reg.inner.read();
        let tx = inner.names.get("x").unwrap().registered_at;
        let ty = inner.names.get("y").unwrap().registered_at;
        assert!(ty > tx);
    }
}
