//! Wire protocol: envelopes, the tagged message set, framing, and signing.

pub mod codec;
pub mod envelope;
pub mod message;

pub use codec::{WireCodec, DEFAULT_MAX_FRAME_BYTES};
pub use envelope::{Envelope, ProtoError, WIRE_VERSION};
pub use message::{
    CallErrorKind, ClusterMessage, NodeDownReason, NodeInfo, NodeStatus, RegistryDelta,
    SpawnErrorKind, WireSpawnOptions,
};
