//! Mailbox message plumbing and per-actor counters.
//!
//! The runtime is uniform and untyped: local messages travel as boxed `Any`
//! payloads (no serialization), wire messages as JSON values. The generic
//! cell downcasts or decodes into the behavior's concrete types.

// Layer 1: Standard library imports
use std::any::Any;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

// Layer 2: Third-party crate imports
use chrono::Utc;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

// Layer 3: Internal module imports
use crate::actor::{ActorError, ExitReason, InfoMsg};

/// Erased local message payload.
pub(crate) type AnyMsg = Box<dyn Any + Send>;

/// Reply channel for a local call.
pub(crate) type AnyReplySender = oneshot::Sender<Result<AnyMsg, ActorError>>;

/// Reply channel for a wire call.
pub(crate) type ValueReplySender = oneshot::Sender<Result<Value, ActorError>>;

/// One message in an actor's mailbox.
///
/// A single unbounded mpsc per actor gives per-sender FIFO delivery; only the
/// actor's own task reads.
pub(crate) enum MailboxMsg {
    /// Synchronous request, local sender.
    Call {
        msg: AnyMsg,
        reply: AnyReplySender,
        /// Caller deadline; stale calls are skipped, the late reply discarded.
        deadline: Instant,
    },

    /// Fire-and-forget, local sender.
    Cast { msg: AnyMsg },

    /// Synchronous request arriving from another node as JSON.
    WireCall {
        msg: Value,
        reply: ValueReplySender,
        deadline: Instant,
    },

    /// Fire-and-forget arriving from another node as JSON.
    WireCast { msg: Value },

    /// Runtime-generated notification (trapped exit, down notification).
    Info(InfoMsg),

    /// Stop request; processed in mailbox order like any other message.
    /// Completion is observed through exit watchers, not an ack.
    Stop { reason: ExitReason },
}

/// Lock-free per-actor counters, shared between senders and the cell.
#[derive(Debug, Default)]
pub(crate) struct MailboxMetrics {
    queued: AtomicUsize,
    total: AtomicU64,
    last_activity_ms: AtomicI64,
}

impl MailboxMetrics {
    pub(crate) fn on_enqueue(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_dequeue(&self) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Messages waiting in the mailbox.
    pub(crate) fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    /// Messages processed over the actor's lifetime.
    pub(crate) fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Millisecond timestamp of the last processed message (0 = never).
    pub(crate) fn last_activity_ms(&self) -> i64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }
}
