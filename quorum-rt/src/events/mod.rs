//! Lifecycle events and the process-wide event bus.

pub mod bus;

pub use bus::{EventBus, LifecycleEvent, Subscription};
