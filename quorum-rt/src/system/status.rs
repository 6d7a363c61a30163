//! Actor status and its lock-free runtime representation.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU8, Ordering};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Lifecycle status of an actor.
///
/// Transitions move strictly forward:
///
/// ```text
/// Initializing → Running → Stopping → Stopped
/// ```
///
/// A restart yields a brand-new actor; no status ever moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorStatus {
    /// `init` is running; mail is queued but not processed.
    Initializing,

    /// The actor is processing its mailbox.
    Running,

    /// Termination has begun; new calls are rejected.
    Stopping,

    /// The actor is gone.
    Stopped,
}

impl ActorStatus {
    /// Whether the actor still accepts mail.
    pub fn accepts_mail(&self) -> bool {
        matches!(self, ActorStatus::Initializing | ActorStatus::Running)
    }

    /// Whether the actor is fully terminated.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActorStatus::Stopped)
    }

    fn as_u8(self) -> u8 {
        match self {
            ActorStatus::Initializing => 0,
            ActorStatus::Running => 1,
            ActorStatus::Stopping => 2,
            ActorStatus::Stopped => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => ActorStatus::Initializing,
            1 => ActorStatus::Running,
            2 => ActorStatus::Stopping,
            _ => ActorStatus::Stopped,
        }
    }
}

/// Atomic cell holding an [`ActorStatus`].
///
/// Forward-only: `advance` never moves the status backward, which makes the
/// state machine's no-backward-transition invariant locally checkable.
#[derive(Debug)]
pub(crate) struct StatusFlag(AtomicU8);

impl StatusFlag {
    pub(crate) fn new(status: ActorStatus) -> Self {
        Self(AtomicU8::new(status.as_u8()))
    }

    pub(crate) fn get(&self) -> ActorStatus {
        ActorStatus::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Advance to `status` if it is a forward transition; returns the status
    /// actually in effect afterwards.
    pub(crate) fn advance(&self, status: ActorStatus) -> ActorStatus {
        let target = status.as_u8();
        let prev = self.0.fetch_max(target, Ordering::SeqCst);
        ActorStatus::from_u8(prev.max(target))
    }
}
