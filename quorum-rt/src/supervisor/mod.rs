//! Supervision: child specs, restart strategies, intensity, and the engine.

pub mod engine;
pub mod error;
pub mod intensity;
pub mod types;

pub(crate) mod stats;

pub use engine::{ChildCounts, ChildInfo, Supervisor, SupervisorSpec};
pub use error::SupervisorError;
pub use intensity::RestartIntensity;
pub use types::{
    ChildSpec, DynamicTemplate, RestartPolicy, StartedChild, SupervisorId, SupervisorStrategy,
};
