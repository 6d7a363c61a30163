//! Sliding-window restart intensity.

// Layer 1: Standard library imports
use std::collections::VecDeque;
use std::time::Duration;

// Layer 2: Third-party crate imports
use tokio::time::Instant;

// Layer 3: Internal module imports
// (none)

/// Default restart ceiling.
pub const DEFAULT_MAX_RESTARTS: u32 = 3;

/// Default window width.
pub const DEFAULT_WITHIN: Duration = Duration::from_millis(5000);

/// Restart budget: at most `max_restarts` within any window of `within`.
///
/// # Example
/// ```rust
/// use quorum_rt::supervisor::RestartIntensity;
/// use std::time::Duration;
///
/// let intensity = RestartIntensity::default();
/// assert_eq!(intensity.max_restarts, 3);
/// assert_eq!(intensity.within, Duration::from_millis(5000));
///
/// let tight = RestartIntensity::new(1, Duration::from_secs(1));
/// assert_eq!(tight.max_restarts, 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartIntensity {
    /// Maximum restarts tolerated inside the window.
    pub max_restarts: u32,

    /// Width of the sliding window.
    pub within: Duration,
}

impl RestartIntensity {
    /// Create an intensity bound.
    pub fn new(max_restarts: u32, within: Duration) -> Self {
        Self {
            max_restarts,
            within,
        }
    }
}

impl Default for RestartIntensity {
    fn default() -> Self {
        Self {
            max_restarts: DEFAULT_MAX_RESTARTS,
            within: DEFAULT_WITHIN,
        }
    }
}

/// The sliding deque of restart instants behind one supervisor.
#[derive(Debug)]
pub(crate) struct RestartWindow {
    intensity: RestartIntensity,
    restarts: VecDeque<Instant>,
}

impl RestartWindow {
    pub fn new(intensity: RestartIntensity) -> Self {
        Self {
            intensity,
            restarts: VecDeque::new(),
        }
    }

    /// Ask permission for one restart at `now`.
    ///
    /// Prunes entries older than the window, then: if the remaining count has
    /// reached the ceiling the restart is denied (and not recorded);
    /// otherwise `now` is recorded and the restart may proceed.
    pub fn try_restart(&mut self, now: Instant) -> bool {
        while let Some(oldest) = self.restarts.front() {
            if now.duration_since(*oldest) > self.intensity.within {
                self.restarts.pop_front();
            } else {
                break;
            }
        }
        if self.restarts.len() as u32 >= self.intensity.max_restarts {
            return false;
        }
        self.restarts.push_back(now);
        true
    }

    pub fn intensity(&self) -> RestartIntensity {
        self.intensity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_max() {
        let mut window = RestartWindow::new(RestartIntensity::new(3, Duration::from_secs(5)));
        let now = Instant::now();
        assert!(window.try_restart(now));
        assert!(window.try_restart(now));
        assert!(window.try_restart(now));
        assert!(!window.try_restart(now));
    }

    #[test]
    fn test_denied_attempt_is_not_recorded() {
        let mut window = RestartWindow::new(RestartIntensity::new(1, Duration::from_secs(5)));
        let now = Instant::now();
        assert!(window.try_restart(now));
        assert!(!window.try_restart(now));
        // The denial itself must not extend the window.
        let later = now + Duration::from_secs(6);
        assert!(window.try_restart(later));
    }

    #[test]
    fn test_window_slides() {
        let mut window = RestartWindow::new(RestartIntensity::new(2, Duration::from_millis(2000)));
        let t0 = Instant::now();
        assert!(window.try_restart(t0));
        assert!(window.try_restart(t0 + Duration::from_millis(1500)));
        assert!(!window.try_restart(t0 + Duration::from_millis(1800)));
        // t0 falls out of the window after 2000ms.
        assert!(window.try_restart(t0 + Duration::from_millis(2100)));
    }

    #[test]
    fn test_zero_max_always_denies() {
        let mut window = RestartWindow::new(RestartIntensity::new(0, Duration::from_secs(1)));
        assert!(!window.try_restart(Instant::now()));
    }
}
