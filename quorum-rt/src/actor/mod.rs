//! Actor model surface: the `Behavior` trait, exit reasons, refs, and errors.

pub mod behavior;
pub mod error;
pub mod exit;
pub mod options;
pub mod refs;

pub use behavior::{Behavior, BehaviorError, CallOutcome, CastOutcome, InfoMsg};
pub use error::ActorError;
pub use exit::ExitReason;
pub use options::{Registration, StartOptions};
pub use refs::{ActorRef, ServerRef};
