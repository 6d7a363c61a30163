//! The `Behavior` trait: the four callbacks that define an actor kind.
//!
//! A behavior is an immutable descriptor. Its state lives inside the actor's
//! task; every transition takes the state by value and returns the next state,
//! so the runtime seam never mutates state in place. A failed transition hands
//! the untouched state back inside the outcome, which is how a handler error
//! leaves the actor running with its previous state.

// Layer 1: Standard library imports
use std::error::Error;
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use super::exit::ExitReason;
use super::refs::ServerRef;
use crate::util::{LinkId, MonitorId};

/// Error raised by behavior callbacks.
///
/// Handler errors are transparent to the caller: only the message string
/// travels (to the caller locally, or inside a `call_error` across nodes).
///
/// # Example
/// ```rust
/// use quorum_rt::actor::BehaviorError;
///
/// let err = BehaviorError::from("resource exhausted");
/// assert_eq!(err.to_string(), "resource exhausted");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorError {
    message: String,
}

impl BehaviorError {
    /// Create a behavior error from anything printable.
    pub fn new(message: impl Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for BehaviorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for BehaviorError {}

impl From<String> for BehaviorError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for BehaviorError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Outcome of a `handle_call` transition.
///
/// Both variants carry the state the actor continues with. A `Fail` outcome
/// delivers the error to the single caller and keeps the actor running; by
/// contract the state inside `Fail` is the pre-transition state, unchanged.
#[derive(Debug)]
pub enum CallOutcome<R, S> {
    /// Deliver the reply and continue with the new state.
    Reply(R, S),

    /// Deliver an error to the caller; the actor keeps running.
    Fail(BehaviorError, S),
}

impl<R, S> CallOutcome<R, S> {
    /// Shorthand for `CallOutcome::Reply`.
    pub fn reply(reply: R, state: S) -> Self {
        CallOutcome::Reply(reply, state)
    }

    /// Shorthand for `CallOutcome::Fail`.
    pub fn fail(error: impl Into<BehaviorError>, state: S) -> Self {
        CallOutcome::Fail(error.into(), state)
    }
}

/// Outcome of a `handle_cast` transition.
///
/// A `Fail` outcome is swallowed by the runtime (there is no caller); it is
/// observable only through a `Crashed` lifecycle event, and the actor keeps
/// running with the state carried in the outcome.
#[derive(Debug)]
pub enum CastOutcome<S> {
    /// Continue with the new state.
    Next(S),

    /// Record a crash event; the actor keeps running.
    Fail(BehaviorError, S),
}

impl<S> CastOutcome<S> {
    /// Shorthand for `CastOutcome::Next`.
    pub fn next(state: S) -> Self {
        CastOutcome::Next(state)
    }

    /// Shorthand for `CastOutcome::Fail`.
    pub fn fail(error: impl Into<BehaviorError>, state: S) -> Self {
        CastOutcome::Fail(error.into(), state)
    }
}

/// Runtime-generated informational message delivered to an actor's mailbox.
///
/// Exit signals reach a trapping actor this way instead of terminating it;
/// down notifications reach the monitoring actor this way. Both are also
/// published on the lifecycle event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InfoMsg {
    /// A linked peer terminated abnormally and this actor traps exits.
    ExitSignal {
        /// The peer that terminated.
        from: ServerRef,
        /// Why the peer terminated.
        reason: ExitReason,
        /// The link that carried the signal.
        link_id: LinkId,
    },

    /// An actor this one monitors has terminated.
    ProcessDown {
        /// The monitored actor.
        monitored: ServerRef,
        /// Why it terminated (`NoConnection` when its node was lost).
        reason: ExitReason,
        /// The monitor that fired; it is removed after delivery.
        monitor_id: MonitorId,
    },
}

/// The callbacks defining an actor kind.
///
/// Generic over four types: private `State`, synchronous `Call` requests with
/// their `Reply`, and fire-and-forget `Cast` messages. Message and reply types
/// must be serde-capable so any actor can be reached transparently from a
/// remote node; local delivery never serializes.
///
/// # Example
/// ```rust
/// use async_trait::async_trait;
/// use quorum_rt::actor::{Behavior, BehaviorError, CallOutcome, CastOutcome};
/// use serde::{Deserialize, Serialize};
///
/// struct Counter;
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Get;
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Inc;
///
/// #[async_trait]
/// impl Behavior for Counter {
///     type State = u64;
///     type Call = Get;
///     type Cast = Inc;
///     type Reply = u64;
///
///     async fn init(&self) -> Result<u64, BehaviorError> {
///         Ok(0)
///     }
///
///     async fn handle_call(&self, _msg: Get, state: u64) -> CallOutcome<u64, u64> {
///         CallOutcome::reply(state, state)
///     }
///
///     async fn handle_cast(&self, _msg: Inc, state: u64) -> CastOutcome<u64> {
///         CastOutcome::next(state + 1)
///     }
/// }
/// ```
#[async_trait]
pub trait Behavior: Send + Sync + 'static {
    /// Private state owned by the actor's task.
    type State: Send + 'static;

    /// Synchronous request message.
    type Call: Serialize + DeserializeOwned + Send + 'static;

    /// Fire-and-forget message.
    type Cast: Serialize + DeserializeOwned + Send + 'static;

    /// Reply to a `Call`.
    type Reply: Serialize + DeserializeOwned + Send + 'static;

    /// Produce the initial state. Runs once, bounded by the init timeout;
    /// failure means the actor never becomes running.
    async fn init(&self) -> Result<Self::State, BehaviorError>;

    /// Process one synchronous request and produce `(reply, new_state)`.
    async fn handle_call(
        &self,
        msg: Self::Call,
        state: Self::State,
    ) -> CallOutcome<Self::Reply, Self::State>;

    /// Process one fire-and-forget message and produce the new state.
    async fn handle_cast(&self, msg: Self::Cast, state: Self::State) -> CastOutcome<Self::State>;

    /// Process a runtime-generated informational message (trapped exit
    /// signals, down notifications). Default: state unchanged.
    async fn handle_info(&self, _info: InfoMsg, state: Self::State) -> Self::State {
        state
    }

    /// Cleanup hook, run best-effort on every termination path that reached
    /// a running state. Bounded by the shutdown timeout; errors are logged
    /// and never propagated.
    async fn terminate(&self, _reason: &ExitReason, _state: Self::State) {}
}
