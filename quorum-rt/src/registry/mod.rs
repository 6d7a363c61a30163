//! Node-local name registry with unique and duplicate modes.

pub mod error;
pub mod local;
pub mod pattern;

pub use error::RegistryError;
pub use local::{LocalRegistry, RegistryMode};
pub use pattern::NamePattern;
