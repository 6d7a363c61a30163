//! Actor system configuration with sensible defaults.

// Layer 1: Standard library
use std::time::Duration;

// Layer 2: Third-party
// (none)

// Layer 3: Internal
// (none)

/// Default timeout for `call` operations (5 seconds)
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a behavior's `init` (5 seconds)
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default grace given to `terminate` before force-kill (5 seconds)
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default maximum concurrent actors (0 = unlimited)
pub const DEFAULT_MAX_ACTORS: usize = 0;

/// Configuration of one local actor system.
///
/// # Examples
///
/// ```rust
/// use quorum_rt::system::SystemConfig;
/// use std::time::Duration;
///
/// let config = SystemConfig::default();
/// assert_eq!(config.call_timeout, Duration::from_secs(5));
///
/// let config = SystemConfig::builder()
///     .with_call_timeout(Duration::from_secs(2))
///     .with_max_actors(10_000)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_actors, 10_000);
/// ```
#[derive(Debug, Clone)]
pub struct SystemConfig {
    /// Timeout applied to `call` when the caller does not pass one
    pub call_timeout: Duration,

    /// Bound on `init` when start options do not pass one
    pub init_timeout: Duration,

    /// Grace period for `terminate` before an actor is force-killed
    pub shutdown_timeout: Duration,

    /// Maximum concurrent actors (0 = unlimited)
    pub max_actors: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            init_timeout: DEFAULT_INIT_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_actors: DEFAULT_MAX_ACTORS,
        }
    }
}

impl SystemConfig {
    /// Create a new configuration builder.
    pub fn builder() -> SystemConfigBuilder {
        SystemConfigBuilder::default()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.call_timeout.is_zero() {
            return Err("call_timeout must be > 0".to_string());
        }
        if self.init_timeout.is_zero() {
            return Err("init_timeout must be > 0".to_string());
        }
        if self.shutdown_timeout.is_zero() {
            return Err("shutdown_timeout must be > 0".to_string());
        }
        Ok(())
    }
}

/// Builder for [`SystemConfig`] with a fluent API.
#[derive(Debug, Default)]
pub struct SystemConfigBuilder {
    config: SystemConfig,
}

impl SystemConfigBuilder {
    /// Set the default `call` timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Set the default `init` timeout.
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.config.init_timeout = timeout;
        self
    }

    /// Set the default shutdown grace period.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Set the maximum number of concurrent actors (0 = unlimited).
    pub fn with_max_actors(mut self, max: usize) -> Self {
        self.config.max_actors = max;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<SystemConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SystemConfig::default();
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert_eq!(config.init_timeout, Duration::from_secs(5));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.max_actors, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = SystemConfig::builder()
            .with_call_timeout(Duration::from_millis(100))
            .with_init_timeout(Duration::from_millis(200))
            .with_shutdown_timeout(Duration::from_millis(300))
            .with_max_actors(5)
            .build()
            .unwrap();

        assert_eq!(config.call_timeout, Duration::from_millis(100));
        assert_eq!(config.init_timeout, Duration::from_millis(200));
        assert_eq!(config.shutdown_timeout, Duration::from_millis(300));
        assert_eq!(config.max_actors, 5);
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        assert!(SystemConfig::builder()
            .with_call_timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(SystemConfig::builder()
            .with_init_timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(SystemConfig::builder()
            .with_shutdown_timeout(Duration::ZERO)
            .build()
            .is_err());
    }
}
