//! Cluster configuration with validation and a fluent builder.
//!
//! The serde form matches the documented config keys (`nodeName`,
//! `heartbeatIntervalMs`, ...) and rejects unknown keys.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use super::error::ClusterError;
use super::node_id::NodeId;
use crate::proto::codec::DEFAULT_MAX_FRAME_BYTES;

/// Default cluster listen port.
pub const DEFAULT_CLUSTER_PORT: u16 = 4369;

/// Default heartbeat interval (5 s).
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5000;

/// Default missed-heartbeat threshold before a peer is declared down.
pub const DEFAULT_HEARTBEAT_MISS_THRESHOLD: u32 = 3;

/// Default reconnect backoff floor (1 s).
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1000;

/// Default reconnect backoff ceiling (30 s).
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Default timeout for remote spawn and monitor/link setup (10 s).
pub const DEFAULT_SETUP_TIMEOUT_MS: u64 = 10_000;

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_CLUSTER_PORT
}

fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_heartbeat_miss_threshold() -> u32 {
    DEFAULT_HEARTBEAT_MISS_THRESHOLD
}

fn default_reconnect_base_delay_ms() -> u64 {
    DEFAULT_RECONNECT_BASE_DELAY_MS
}

fn default_reconnect_max_delay_ms() -> u64 {
    DEFAULT_RECONNECT_MAX_DELAY_MS
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

fn default_setup_timeout_ms() -> u64 {
    DEFAULT_SETUP_TIMEOUT_MS
}

/// Configuration of one cluster node.
///
/// # Examples
///
/// ```rust
/// use quorum_rt::cluster::ClusterConfig;
///
/// let config = ClusterConfig::builder("alpha")
///     .with_host("127.0.0.1")
///     .with_port(4369)
///     .with_seed("beta@127.0.0.1:4370")
///     .with_secret("s3cret")
///     .build()
///     .unwrap();
/// assert_eq!(config.node_id().unwrap().as_str(), "alpha@127.0.0.1:4369");
/// ```
///
/// Unknown keys in the serialized form are rejected:
///
/// ```rust
/// use quorum_rt::cluster::ClusterConfig;
///
/// let result: Result<ClusterConfig, _> =
///     serde_json::from_str(r#"{"nodeName":"a","bogusKey":1}"#);
/// assert!(result.is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClusterConfig {
    /// Node name (the part before `@`). Required.
    pub node_name: String,

    /// Host to listen on and advertise.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on and advertise.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Nodes to dial at start, as full `name@host:port` identifiers.
    #[serde(default)]
    pub seeds: Vec<String>,

    /// Shared secret enabling HMAC envelope signing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_secret: Option<String>,

    /// Heartbeat period, milliseconds.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Missed heartbeats before a peer is declared down.
    #[serde(default = "default_heartbeat_miss_threshold")]
    pub heartbeat_miss_threshold: u32,

    /// Reconnect backoff floor, milliseconds.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Reconnect backoff ceiling, milliseconds.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Maximum wire frame size in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Timeout for remote spawn and monitor/link setup, milliseconds.
    #[serde(default = "default_setup_timeout_ms")]
    pub setup_timeout_ms: u64,
}

impl ClusterConfig {
    /// A config with defaults for everything but the node name.
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            host: default_host(),
            port: default_port(),
            seeds: Vec::new(),
            cluster_secret: None,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_miss_threshold: default_heartbeat_miss_threshold(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            max_frame_bytes: default_max_frame_bytes(),
            setup_timeout_ms: default_setup_timeout_ms(),
        }
    }

    /// Create a configuration builder.
    pub fn builder(node_name: impl Into<String>) -> ClusterConfigBuilder {
        ClusterConfigBuilder {
            config: Self::new(node_name),
        }
    }

    /// This node's identity derived from name, host, and port.
    pub fn node_id(&self) -> Result<NodeId, ClusterError> {
        NodeId::from_parts(&self.node_name, &self.host, self.port)
    }

    /// Parsed seed identities.
    pub fn seed_nodes(&self) -> Result<Vec<NodeId>, ClusterError> {
        self.seeds.iter().map(|s| NodeId::parse(s)).collect()
    }

    /// Heartbeat period.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Silence duration after which a peer is declared down.
    pub fn down_after(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms * u64::from(self.heartbeat_miss_threshold))
    }

    /// Reconnect backoff floor.
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    /// Reconnect backoff ceiling.
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    /// Remote spawn / monitor setup timeout.
    pub fn setup_timeout(&self) -> Duration {
        Duration::from_millis(self.setup_timeout_ms)
    }

    /// Validate every field.
    pub fn validate(&self) -> Result<(), ClusterError> {
        self.node_id()?;
        self.seed_nodes()?;
        if self.port == 0 {
            return Err(ClusterError::InvalidConfig(
                "port must be nonzero".to_string(),
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ClusterError::InvalidConfig(
                "heartbeatIntervalMs must be > 0".to_string(),
            ));
        }
        if self.heartbeat_miss_threshold == 0 {
            return Err(ClusterError::InvalidConfig(
                "heartbeatMissThreshold must be >= 1".to_string(),
            ));
        }
        if self.reconnect_base_delay_ms == 0
            || self.reconnect_base_delay_ms > self.reconnect_max_delay_ms
        {
            return Err(ClusterError::InvalidConfig(
                "reconnect delays must satisfy 0 < base <= max".to_string(),
            ));
        }
        if self.max_frame_bytes < 1024 {
            return Err(ClusterError::InvalidConfig(
                "maxFrameBytes must be at least 1024".to_string(),
            ));
        }
        if self.setup_timeout_ms == 0 {
            return Err(ClusterError::InvalidConfig(
                "setupTimeoutMs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`ClusterConfig`] with a fluent API.
#[derive(Debug)]
pub struct ClusterConfigBuilder {
    config: ClusterConfig,
}

impl ClusterConfigBuilder {
    /// Set the listen/advertise host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the listen/advertise port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Add a seed node (`name@host:port`).
    pub fn with_seed(mut self, seed: impl Into<String>) -> Self {
        self.config.seeds.push(seed.into());
        self
    }

    /// Set the shared cluster secret.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.cluster_secret = Some(secret.into());
        self
    }

    /// Set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the missed-heartbeat threshold.
    pub fn with_heartbeat_miss_threshold(mut self, threshold: u32) -> Self {
        self.config.heartbeat_miss_threshold = threshold;
        self
    }

    /// Set the reconnect backoff bounds.
    pub fn with_reconnect_delays(mut self, base: Duration, max: Duration) -> Self {
        self.config.reconnect_base_delay_ms = base.as_millis() as u64;
        self.config.reconnect_max_delay_ms = max.as_millis() as u64;
        self
    }

    /// Set the maximum frame size.
    pub fn with_max_frame_bytes(mut self, bytes: usize) -> Self {
        self.config.max_frame_bytes = bytes;
        self
    }

    /// Set the remote setup timeout.
    pub fn with_setup_timeout(mut self, timeout: Duration) -> Self {
        self.config.setup_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Build and validate.
    pub fn build(self) -> Result<ClusterConfig, ClusterError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClusterConfig::new("alpha");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, DEFAULT_CLUSTER_PORT);
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(5000));
        assert_eq!(config.heartbeat_miss_threshold, 3);
        assert_eq!(config.down_after(), Duration::from_millis(15_000));
        assert_eq!(config.reconnect_base_delay(), Duration::from_secs(1));
        assert_eq!(config.reconnect_max_delay(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_round_trip() {
        let config = ClusterConfig::builder("n1")
            .with_host("10.0.0.1")
            .with_port(5000)
            .with_seed("n2@10.0.0.2:5000")
            .with_secret("k")
            .with_heartbeat_interval(Duration::from_millis(100))
            .with_heartbeat_miss_threshold(2)
            .with_reconnect_delays(Duration::from_millis(10), Duration::from_millis(100))
            .build()
            .unwrap();

        assert_eq!(config.node_id().unwrap().as_str(), "n1@10.0.0.1:5000");
        assert_eq!(config.seed_nodes().unwrap().len(), 1);
        assert_eq!(config.down_after(), Duration::from_millis(200));
    }

    #[test]
    fn test_invalid_node_name_rejected() {
        assert!(ClusterConfig::new("bad name").validate().is_err());
    }

    #[test]
    fn test_invalid_seed_rejected() {
        let config = ClusterConfig::builder("a").with_seed("not-a-node").build();
        assert!(config.is_err());
    }

    #[test]
    fn test_zero_port_rejected() {
        assert!(ClusterConfig::builder("a").with_port(0).build().is_err());
    }

    #[test]
    fn test_bad_reconnect_bounds_rejected() {
        let result = ClusterConfig::builder("a")
            .with_reconnect_delays(Duration::from_secs(10), Duration::from_secs(1))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_serde_keys_are_camel_case() {
        let config = ClusterConfig::new("alpha");
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("nodeName").is_some());
        assert!(json.get("heartbeatIntervalMs").is_some());
        assert!(json.get("reconnectBaseDelayMs").is_some());
    }

    #[test]
    fn test_serde_defaults_apply() {
        let config: ClusterConfig = serde_json::from_str(r#"{"nodeName":"solo"}"#).unwrap();
        assert_eq!(config.port, DEFAULT_CLUSTER_PORT);
        assert!(config.seeds.is_empty());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result: Result<ClusterConfig, _> =
            serde_json::from_str(r#"{"nodeName":"a","extra":true}"#);
        assert!(result.is_err());
    }
}
