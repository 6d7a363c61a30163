//! Cluster-wide replicated name registry.

pub mod names;

pub use names::GlobalNames;
