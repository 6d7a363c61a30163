//! Exit reasons carried by terminations, exit signals, and down notifications.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Why an actor terminated.
///
/// The reason travels through links, monitors, and supervisors, and crosses
/// node boundaries inside `process_down` and `exit_signal` messages.
///
/// # Normality
///
/// `Normal` and `Shutdown` are "clean" exits: they do not propagate through
/// links and do not trigger `Transient` restarts. Everything else is abnormal.
///
/// # Example
/// ```rust
/// use quorum_rt::actor::ExitReason;
///
/// assert!(!ExitReason::Normal.is_abnormal());
/// assert!(!ExitReason::Shutdown.is_abnormal());
/// assert!(ExitReason::error("boom").is_abnormal());
/// assert!(ExitReason::NoConnection.is_abnormal());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitReason {
    /// Clean, voluntary termination.
    Normal,

    /// Clean termination requested by a supervisor or the system.
    Shutdown,

    /// Forced termination: shutdown grace expired or an explicit kill.
    Kill,

    /// Abnormal termination with an error description.
    Error {
        /// Human-readable failure description (stacks never cross the wire).
        message: String,
    },

    /// The target never existed or was already dead when observed.
    NoProc,

    /// The connection to the owning node was lost.
    NoConnection,
}

impl ExitReason {
    /// Shorthand for an error exit.
    pub fn error(message: impl Into<String>) -> Self {
        ExitReason::Error {
            message: message.into(),
        }
    }

    /// `true` for every reason except `Normal` and `Shutdown`.
    pub fn is_abnormal(&self) -> bool {
        !matches!(self, ExitReason::Normal | ExitReason::Shutdown)
    }

    /// `true` when the reason indicates a lost node connection.
    pub fn is_noconnection(&self) -> bool {
        matches!(self, ExitReason::NoConnection)
    }
}

impl Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Normal => write!(f, "normal"),
            ExitReason::Shutdown => write!(f, "shutdown"),
            ExitReason::Kill => write!(f, "kill"),
            ExitReason::Error { message } => write!(f, "error: {message}"),
            ExitReason::NoProc => write!(f, "noproc"),
            ExitReason::NoConnection => write!(f, "noconnection"),
        }
    }
}
