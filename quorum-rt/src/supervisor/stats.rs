//! Shared supervisor counters read by the observer.

// Layer 1: Standard library imports
use std::sync::atomic::AtomicU32;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

// Layer 3: Internal module imports
use super::types::{SupervisorId, SupervisorStrategy};
use crate::actor::ServerRef;

/// One child as seen by the observer.
#[derive(Debug, Clone)]
pub(crate) struct ChildStat {
    pub spec_id: String,
    pub server: Option<ServerRef>,
    pub restart_count: u32,
}

/// Counters a supervisor keeps current for the observer.
pub(crate) struct SupervisorStatsCell {
    pub id: SupervisorId,
    pub strategy: SupervisorStrategy,
    pub started_at: DateTime<Utc>,
    pub restart_count: AtomicU32,
    pub children: Mutex<Vec<ChildStat>>,
}

impl SupervisorStatsCell {
    pub fn new(id: SupervisorId, strategy: SupervisorStrategy) -> Self {
        Self {
            id,
            strategy,
            started_at: Utc::now(),
            restart_count: AtomicU32::new(0),
            children: Mutex::new(Vec::new()),
        }
    }
}
