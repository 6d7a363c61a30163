//! Distributed operations: pending-op correlation, remote errors, the
//! behavior registry for remote spawn, and the router seam into the system.

pub mod error;
pub mod pending;
pub mod registry;

pub(crate) mod router;

pub use error::RemoteError;
pub use registry::BehaviorRegistry;
