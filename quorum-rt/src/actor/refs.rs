//! Actor handles: the untyped `ServerRef` and the typed `ActorRef<B>` wrapper.

// Layer 1: Standard library imports
use std::fmt::{self, Display};
use std::marker::PhantomData;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use super::behavior::Behavior;
use crate::cluster::NodeId;
use crate::util::ServerId;

/// External handle to an actor: `(id, node)`.
///
/// The same shape is used for local and remote actors; identity is the pair.
/// Refs are plain data and travel freely across the wire, through registries,
/// and inside monitor/link entries.
///
/// # Example
/// ```rust
/// use quorum_rt::actor::ServerRef;
/// use quorum_rt::cluster::NodeId;
/// use quorum_rt::util::ServerId;
///
/// let node = NodeId::parse("alpha@127.0.0.1:4369").unwrap();
/// let a = ServerRef::new(ServerId::new(), node.clone());
/// assert!(a.is_local_to(&node));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerRef {
    /// Unique actor id.
    pub id: ServerId,
    /// The node that owns the actor.
    pub node: NodeId,
}

impl ServerRef {
    /// Create a ref from its parts.
    pub fn new(id: ServerId, node: NodeId) -> Self {
        Self { id, node }
    }

    /// Check whether this ref lives on the given node.
    pub fn is_local_to(&self, node: &NodeId) -> bool {
        &self.node == node
    }
}

impl Display for ServerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.node)
    }
}

/// Typed handle to an actor of behavior `B`.
///
/// A thin, compile-time-only layer over [`ServerRef`]: the runtime itself is
/// uniform and untyped, and the typed ref pins the `Call`/`Cast`/`Reply`
/// types at the API seam. Converting an untyped ref back into a typed one
/// (for refs received from a registry or a remote spawn) asserts the behavior
/// type; a mismatch surfaces as a type-mismatch or decode error at call time,
/// never as memory unsafety.
pub struct ActorRef<B: Behavior> {
    server: ServerRef,
    _marker: PhantomData<fn() -> B>,
}

impl<B: Behavior> ActorRef<B> {
    /// Wrap an untyped ref, asserting it refers to an actor of behavior `B`.
    pub fn from_server_ref(server: ServerRef) -> Self {
        Self {
            server,
            _marker: PhantomData,
        }
    }

    /// The underlying untyped ref.
    pub fn server_ref(&self) -> &ServerRef {
        &self.server
    }

    /// The actor id.
    pub fn id(&self) -> ServerId {
        self.server.id
    }

    /// The owning node.
    pub fn node(&self) -> &NodeId {
        &self.server.node
    }

    /// Drop the type layer.
    pub fn into_server_ref(self) -> ServerRef {
        self.server
    }
}

impl<B: Behavior> Clone for ActorRef<B> {
    fn clone(&self) -> Self {
        Self {
            server: self.server.clone(),
            _marker: PhantomData,
        }
    }
}

impl<B: Behavior> fmt::Debug for ActorRef<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef").field("server", &self.server).finish()
    }
}

impl<B: Behavior> PartialEq for ActorRef<B> {
    fn eq(&self, other: &Self) -> bool {
        self.server == other.server
    }
}

impl<B: Behavior> Eq for ActorRef<B> {}

impl<B: Behavior> Display for ActorRef<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.server)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::actor::behavior::{BehaviorError, CallOutcome, CastOutcome};
    use async_trait::async_trait;

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

    fn node() -> NodeId {
        NodeId::parse("test@127.0.0.1:4369").unwrap()
    }

    #[test]
    fn test_server_ref_identity() {
        let id = ServerId::new();
        let a = ServerRef::new(id, node());
        let b = ServerRef::new(id, node());
        assert_eq!(a, b);

        let c = ServerRef::new(ServerId::new(), node());
        assert_ne!(a, c);
    }

    #[test]
    fn test_server_ref_display() {
        let r = ServerRef::new(ServerId::new(), node());
        let shown = format!("{r}");
        assert!(shown.contains("test@127.0.0.1:4369"));
    }

    #[test]
    fn test_server_ref_serde_round_trip() {
        let r = ServerRef::new(ServerId::new(), node());
        let json = serde_json::to_string(&r).unwrap();
        let back: ServerRef = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }

    #[test]
    fn test_actor_ref_wraps_server_ref() {
        let r = ServerRef::new(ServerId::new(), node());
        let typed: ActorRef<Echo> = ActorRef::from_server_ref(r.clone());
        assert_eq!(typed.server_ref(), &r);
        assert_eq!(typed.id(), r.id);
        assert_eq!(typed.clone().into_server_ref(), r);
    }
}
