//! Local link and monitor tables.
//!
//! Entries are stored by id and indexed by actor id on both endpoints, so
//! termination cleanup is a table sweep rather than a pointer chase. Remote
//! links and monitors live in the cluster layer's own tables; these hold
//! node-local pairs only.

// Layer 1: Standard library imports
use std::collections::{HashMap, HashSet};

// Layer 2: Third-party crate imports
use parking_lot::Mutex;

// Layer 3: Internal module imports
use crate::actor::ServerRef;
use crate::util::{LinkId, MonitorId, ServerId};

/// One bidirectional link.
#[derive(Debug, Clone)]
pub(crate) struct LinkEntry {
    pub id: LinkId,
    pub a: ServerRef,
    pub b: ServerRef,
}

impl LinkEntry {
    /// The endpoint that is not `id`.
    pub fn peer_of(&self, id: ServerId) -> &ServerRef {
        if self.a.id == id {
            &self.b
        } else {
            &self.a
        }
    }
}

#[derive(Default)]
struct LinkInner {
    entries: HashMap<LinkId, LinkEntry>,
    by_actor: HashMap<ServerId, HashSet<LinkId>>,
    by_pair: HashMap<(ServerId, ServerId), LinkId>,
}

fn pair_key(a: ServerId, b: ServerId) -> (ServerId, ServerId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// All local links, behind one mutex.
#[derive(Default)]
pub(crate) struct LinkTable {
    inner: Mutex<LinkInner>,
}

impl LinkTable {
    /// Establish a link; idempotent per unordered pair.
    pub fn link(&self, a: ServerRef, b: ServerRef) -> LinkId {
        let mut inner = self.inner.lock();
        let key = pair_key(a.id, b.id);
        if let Some(existing) = inner.by_pair.get(&key) {
            return *existing;
        }
        let id = LinkId::new();
        inner.by_actor.entry(a.id).or_default().insert(id);
        inner.by_actor.entry(b.id).or_default().insert(id);
        inner.by_pair.insert(key, id);
        inner.entries.insert(id, LinkEntry { id, a, b });
        id
    }

    /// Remove a link by id.
    pub fn unlink(&self, id: LinkId) -> Option<LinkEntry> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.remove(&id)?;
        inner.by_pair.remove(&pair_key(entry.a.id, entry.b.id));
        for endpoint in [entry.a.id, entry.b.id] {
            if let Some(set) = inner.by_actor.get_mut(&endpoint) {
                set.remove(&id);
                if set.is_empty() {
                    inner.by_actor.remove(&endpoint);
                }
            }
        }
        Some(entry)
    }

    /// Remove and return every link involving `actor`.
    pub fn take_for(&self, actor: ServerId) -> Vec<LinkEntry> {
        let ids: Vec<LinkId> = {
            let inner = self.inner.lock();
            inner
                .by_actor
                .get(&actor)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default()
        };
        ids.into_iter().filter_map(|id| self.unlink(id)).collect()
    }

    /// Current number of links.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

/// One unidirectional monitor: `owner` observes `target`.
#[derive(Debug, Clone)]
pub(crate) struct MonitorEntry {
    pub id: MonitorId,
    pub owner: ServerRef,
    pub target: ServerRef,
}

#[derive(Default)]
struct MonitorInner {
    entries: HashMap<MonitorId, MonitorEntry>,
    by_owner: HashMap<ServerId, HashSet<MonitorId>>,
    by_target: HashMap<ServerId, HashSet<MonitorId>>,
}

/// All local monitors, behind one mutex.
#[derive(Default)]
pub(crate) struct MonitorTable {
    inner: Mutex<MonitorInner>,
}

impl MonitorTable {
    /// Record a monitor under a caller-chosen id.
    pub fn insert(&self, id: MonitorId, owner: ServerRef, target: ServerRef) {
        let mut inner = self.inner.lock();
        inner.by_owner.entry(owner.id).or_default().insert(id);
        inner.by_target.entry(target.id).or_default().insert(id);
        inner.entries.insert(id, MonitorEntry { id, owner, target });
    }

    /// Remove exactly the matching monitor.
    pub fn remove(&self, id: MonitorId) -> Option<MonitorEntry> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.remove(&id)?;
        if let Some(set) = inner.by_owner.get_mut(&entry.owner.id) {
            set.remove(&id);
            if set.is_empty() {
                inner.by_owner.remove(&entry.owner.id);
            }
        }
        if let Some(set) = inner.by_target.get_mut(&entry.target.id) {
            set.remove(&id);
            if set.is_empty() {
                inner.by_target.remove(&entry.target.id);
            }
        }
        Some(entry)
    }

    /// Remove and return every monitor observing `target`.
    pub fn take_for_target(&self, target: ServerId) -> Vec<MonitorEntry> {
        let ids: Vec<MonitorId> = {
            let inner = self.inner.lock();
            inner
                .by_target
                .get(&target)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default()
        };
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Remove and return every monitor owned by `owner`.
    pub fn take_for_owner(&self, owner: ServerId) -> Vec<MonitorEntry> {
        let ids: Vec<MonitorId> = {
            let inner = self.inner.lock();
            inner
                .by_owner
                .get(&owner)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default()
        };
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Current number of monitors.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
}
