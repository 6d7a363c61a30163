//! Correlation table for in-flight distributed operations.
//!
//! Every remote call, spawn, and monitor/link setup registers an entry
//! keyed by its correlation id. The entry leaves the table through exactly
//! one terminal transition: a reply resolves it, the caller's timeout cancels
//! it, or a node-down sweep fails it.

// Layer 1: Standard library imports
use std::hash::Hash;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::oneshot;

// Layer 3: Internal module imports
use super::error::RemoteError;
use crate::cluster::NodeId;

struct PendingOp<T> {
    target: NodeId,
    tx: oneshot::Sender<Result<T, RemoteError>>,
    #[allow(dead_code)] // Kept for diagnostics dumps.
    started_at: DateTime<Utc>,
}

/// One class of pending operations (calls, spawns, monitors, links).
pub(crate) struct PendingTable<K, T>
where
    K: Eq + Hash + Copy,
{
    entries: DashMap<K, PendingOp<T>>,
}

impl<K, T> PendingTable<K, T>
where
    K: Eq + Hash + Copy,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register an operation; the receiver completes on any terminal
    /// transition.
    pub fn insert(&self, key: K, target: NodeId) -> oneshot::Receiver<Result<T, RemoteError>> {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            key,
            PendingOp {
                target,
                tx,
                started_at: Utc::now(),
            },
        );
        rx
    }

    /// Resolve with a success value; no-op when already terminal.
    pub fn resolve(&self, key: K, value: T) -> bool {
        match self.entries.remove(&key) {
            Some((_, op)) => op.tx.send(Ok(value)).is_ok(),
            None => false,
        }
    }

    /// Resolve with an error; no-op when already terminal.
    pub fn reject(&self, key: K, error: RemoteError) -> bool {
        match self.entries.remove(&key) {
            Some((_, op)) => op.tx.send(Err(error)).is_ok(),
            None => false,
        }
    }

    /// Drop the entry after the caller's own timeout fired; a late reply
    /// arriving afterwards finds nothing and is discarded.
    pub fn cancel(&self, key: K) {
        self.entries.remove(&key);
    }

    /// Fail every operation targeting `node`.
    pub fn fail_node(&self, node: &NodeId) -> usize {
        let keys: Vec<K> = self
            .entries
            .iter()
            .filter(|entry| &entry.value().target == node)
            .map(|entry| *entry.key())
            .collect();
        let mut failed = 0;
        for key in keys {
            if self.reject(key, RemoteError::NodeNotReachable(node.clone())) {
                failed += 1;
            }
        }
        failed
    }

    /// In-flight operation count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::util::CorrelationId;

    fn node(n: &str) -> NodeId {
        NodeId::parse(&format!("{n}@h:1")).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_completes_receiver() {
        let table: PendingTable<CorrelationId, u32> = PendingTable::new();
        let id = CorrelationId::new();
        let rx = table.insert(id, node("a"));

        assert!(table.resolve(id, 42));
        assert_eq!(rx.await.unwrap().unwrap(), 42);
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_reject_completes_with_error() {
        let table: PendingTable<CorrelationId, u32> = PendingTable::new();
        let id = CorrelationId::new();
        let rx = table.insert(id, node("a"));

        assert!(table.reject(id, RemoteError::ServerNotRunning));
        assert!(matches!(
            rx.await.unwrap(),
            Err(RemoteError::ServerNotRunning)
        ));
    }

    #[tokio::test]
    async fn test_exactly_one_terminal_transition() {
        let table: PendingTable<CorrelationId, u32> = PendingTable::new();
        let id = CorrelationId::new();
        let _rx = table.insert(id, node("a"));

        assert!(table.resolve(id, 1));
        // A second completion finds nothing.
        assert!(!table.resolve(id, 2));
        assert!(!table.reject(id, RemoteError::ServerNotRunning));
    }

    #[tokio::test]
    async fn test_cancel_discards_late_reply() {
        let table: PendingTable<CorrelationId, u32> = PendingTable::new();
        let id = CorrelationId::new();
        let rx = table.insert(id, node("a"));

        table.cancel(id);
        drop(rx);
        // The late reply is silently discarded.
        assert!(!table.resolve(id, 9));
    }

    #[tokio::test]
    async fn test_fail_node_sweeps_only_that_target() {
        let table: PendingTable<CorrelationId, u32> = PendingTable::new();
        let a1 = CorrelationId::new();
        let a2 = CorrelationId::new();
        let b1 = CorrelationId::new();
        let rx_a1 = table.insert(a1, node("a"));
        let rx_a2 = table.insert(a2, node("a"));
        let rx_b1 = table.insert(b1, node("b"));

        assert_eq!(table.fail_node(&node("a")), 2);
        assert!(matches!(
            rx_a1.await.unwrap(),
            Err(RemoteError::NodeNotReachable(_))
        ));
        assert!(matches!(
            rx_a2.await.unwrap(),
            Err(RemoteError::NodeNotReachable(_))
        ));
        assert_eq!(table.len(), 1);
        assert!(table.resolve(b1, 7));
        assert_eq!(rx_b1.await.unwrap().unwrap(), 7);
    }
}
