//! Start options for spawning actors.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Where to register a named actor at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Registration {
    /// Register in the node-local unique registry.
    Local,

    /// Register in the cluster-wide replicated registry.
    Global,

    /// Do not register.
    #[default]
    None,
}

/// Options accepted by `start` and remote spawn.
///
/// # Example
/// ```rust
/// use quorum_rt::actor::{Registration, StartOptions};
/// use std::time::Duration;
///
/// let opts = StartOptions::named("db")
///     .with_init_timeout(Duration::from_secs(2))
///     .with_trap_exit(true);
/// assert_eq!(opts.name.as_deref(), Some("db"));
/// assert_eq!(opts.registration, Registration::Local);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Name to register, when `registration` is not `None`.
    pub name: Option<String>,

    /// Registry to register the name in.
    pub registration: Registration,

    /// Bound on `init`; falls back to the system default when absent.
    pub init_timeout: Option<Duration>,

    /// Convert incoming exit signals into info messages instead of dying.
    pub trap_exit: bool,
}

impl StartOptions {
    /// Options with a locally registered name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            registration: Registration::Local,
            ..Default::default()
        }
    }

    /// Options with a globally registered name.
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            registration: Registration::Global,
            ..Default::default()
        }
    }

    /// Set the init timeout.
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = Some(timeout);
        self
    }

    /// Set the trap-exit flag.
    pub fn with_trap_exit(mut self, trap: bool) -> Self {
        self.trap_exit = trap;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = StartOptions::default();
        assert!(opts.name.is_none());
        assert_eq!(opts.registration, Registration::None);
        assert!(opts.init_timeout.is_none());
        assert!(!opts.trap_exit);
    }

    #[test]
    fn test_named_sets_local_registration() {
        let opts = StartOptions::named("worker");
        assert_eq!(opts.name.as_deref(), Some("worker"));
        assert_eq!(opts.registration, Registration::Local);
    }

    #[test]
    fn test_global_registration() {
        let opts = StartOptions::global("singleton");
        assert_eq!(opts.registration, Registration::Global);
    }

    #[test]
    fn test_builder_chaining() {
        let opts = StartOptions::named("a")
            .with_init_timeout(Duration::from_millis(100))
            .with_trap_exit(true);
        assert_eq!(opts.init_timeout, Some(Duration::from_millis(100)));
        assert!(opts.trap_exit);
    }

    #[test]
    fn test_registration_serde_names() {
        assert_eq!(
            serde_json::to_string(&Registration::Local).unwrap(),
            "\"local\""
        );
        assert_eq!(
            serde_json::to_string(&Registration::Global).unwrap(),
            "\"global\""
        );
        assert_eq!(
            serde_json::to_string(&Registration::None).unwrap(),
            "\"none\""
        );
    }
}
