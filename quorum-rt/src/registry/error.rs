//! Registry error types.

// Layer 1: Standard library
// (none)

// Layer 2: Third-party
use thiserror::Error;

// Layer 3: Internal
// (none)

/// Errors raised by local and global name registries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The name is already registered to a different actor
    #[error("Name already registered: {0}")]
    AlreadyRegistered(String),

    /// No actor is registered under the name
    #[error("Name not registered: {0}")]
    NotRegistered(String),
}
