//! The lifecycle event bus.
//!
//! A closed, tagged event type plus a subscriber list. Events are published
//! synchronously in the order they are generated by each source, satisfying
//! the per-source ordering guarantee.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

// Layer 3: Internal module imports
use crate::actor::{ExitReason, ServerRef};
use crate::util::{LinkId, MonitorId};

/// Actor lifecycle event.
///
/// The set is closed: every observable actor transition maps to exactly one
/// of these tags.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// The actor finished `init` and entered the running state.
    Started {
        /// The new actor.
        server: ServerRef,
        /// Registered name, when one was requested.
        name: Option<String>,
        /// When the transition happened.
        at: DateTime<Utc>,
    },

    /// The actor terminated.
    Terminated {
        /// The terminated actor.
        server: ServerRef,
        /// Why it terminated.
        reason: ExitReason,
        /// When the transition happened.
        at: DateTime<Utc>,
    },

    /// A handler failed without stopping the actor.
    Crashed {
        /// The surviving actor.
        server: ServerRef,
        /// The handler error message.
        error: String,
        /// When the failure happened.
        at: DateTime<Utc>,
    },

    /// A monitored actor went down; mirrors the mailbox notification.
    ProcessDown {
        /// The monitoring actor.
        server: ServerRef,
        /// The actor that went down.
        monitored: ServerRef,
        /// Why it went down.
        reason: ExitReason,
        /// The monitor that fired.
        monitor_id: MonitorId,
        /// When the notification was generated.
        at: DateTime<Utc>,
    },

    /// An exit signal reached a trapping actor as an info message.
    ExitSignal {
        /// The trapping actor that received the signal.
        server: ServerRef,
        /// The linked peer that terminated.
        from: ServerRef,
        /// The peer's exit reason.
        reason: ExitReason,
        /// The link that carried the signal.
        link_id: LinkId,
        /// When the signal was generated.
        at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    /// The actor this event is about (the receiver for down/signal events).
    pub fn server(&self) -> &ServerRef {
        match self {
            LifecycleEvent::Started { server, .. }
            | LifecycleEvent::Terminated { server, .. }
            | LifecycleEvent::Crashed { server, .. }
            | LifecycleEvent::ProcessDown { server, .. }
            | LifecycleEvent::ExitSignal { server, .. } => server,
        }
    }
}

type Callback = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

enum Sink {
    Callback(Callback),
    Channel(UnboundedSender<LifecycleEvent>),
}

struct Subscriber {
    id: u64,
    sink: Sink,
}

/// Handle returned by `subscribe`; call [`Subscription::unsubscribe`] to stop
/// receiving events. Dropping the handle without unsubscribing keeps the
/// subscription alive.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    bus: std::sync::Weak<BusInner>,
}

impl Subscription {
    /// Remove this subscriber from the bus.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.subscribers.write().retain(|s| s.id != self.id);
        }
    }
}

#[derive(Default)]
struct BusInner {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for BusInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusInner")
            .field("subscribers", &self.subscribers.read().len())
            .finish()
    }
}

/// Process-wide lifecycle event bus.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe with a callback invoked synchronously for every event.
    pub fn subscribe_fn<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.add(Sink::Callback(Arc::new(handler)))
    }

    /// Subscribe with a channel; useful in tests and async consumers.
    pub fn subscribe(&self) -> (Subscription, UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = unbounded_channel();
        (self.add(Sink::Channel(tx)), rx)
    }

    fn add(&self, sink: Sink) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.write().push(Subscriber { id, sink });
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Publish an event to every subscriber, in subscription order.
    pub fn publish(&self, event: LifecycleEvent) {
        let mut closed = Vec::new();
        {
            let subscribers = self.inner.subscribers.read();
            for subscriber in subscribers.iter() {
                match &subscriber.sink {
                    Sink::Callback(cb) => cb(&event),
                    Sink::Channel(tx) => {
                        if tx.send(event.clone()).is_err() {
                            closed.push(subscriber.id);
                        }
                    }
                }
            }
        }
        if !closed.is_empty() {
            self.inner
                .subscribers
                .write()
                .retain(|s| !closed.contains(&s.id));
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }
}
