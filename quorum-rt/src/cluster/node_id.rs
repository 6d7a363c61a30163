//! Node identity: parsing and validation of `name@host:port` identifiers.

// Layer 1: Standard library imports
use std::fmt::{self, Display};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use super::error::ClusterError;

/// Identity of one runtime instance in a cluster.
///
/// The textual form is `name@host:port` where `name` is `[A-Za-z0-9_-]+`,
/// `host` is `[A-Za-z0-9_.-]+`, and `port` is one to five digits that fit in
/// a `u16`. Comparison is case sensitive.
///
/// # Example
/// ```rust
/// use quorum_rt::cluster::NodeId;
///
/// let id = NodeId::parse("alpha@127.0.0.1:4369").unwrap();
/// assert_eq!(id.name(), "alpha");
/// assert_eq!(id.host(), "127.0.0.1");
/// assert_eq!(id.port(), 4369);
///
/// assert!(NodeId::parse("no-at-sign").is_err());
/// assert!(NodeId::parse("bad name@host:1").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    full: Arc<str>,
    at: usize,
    colon: usize,
    port: u16,
}

impl NodeId {
    /// Parse and validate a node identifier.
    ///
    /// Returns [`ClusterError::InvalidNodeId`] when the string does not match
    /// the `name@host:port` shape or any charset rule is violated.
    pub fn parse(s: &str) -> Result<Self, ClusterError> {
        let invalid = || ClusterError::InvalidNodeId(s.to_string());

        let at = s.find('@').ok_or_else(invalid)?;
        let name = &s[..at];
        let host_port = &s[at + 1..];
        let colon_rel = host_port.rfind(':').ok_or_else(invalid)?;
        let host = &host_port[..colon_rel];
        let port_str = &host_port[colon_rel + 1..];

        if name.is_empty() || host.is_empty() || port_str.is_empty() {
            return Err(invalid());
        }
        if !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(invalid());
        }
        if !host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'-')
        {
            return Err(invalid());
        }
        if port_str.len() > 5 || !port_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let port: u16 = port_str.parse().map_err(|_| invalid())?;

        Ok(Self {
            full: Arc::from(s),
            at,
            colon: at + 1 + colon_rel,
            port,
        })
    }

    /// Build a node identifier from its parts.
    pub fn from_parts(name: &str, host: &str, port: u16) -> Result<Self, ClusterError> {
        Self::parse(&format!("{name}@{host}:{port}"))
    }

    /// The node name (before the `@`).
    pub fn name(&self) -> &str {
        &self.full[..self.at]
    }

    /// The host part.
    pub fn host(&self) -> &str {
        &self.full[self.at + 1..self.colon]
    }

    /// The TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The full `name@host:port` string.
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// The `host:port` dial address for this node.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host(), self.port)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full)
    }
}

impl TryFrom<String> for NodeId {
    type Error = ClusterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NodeId> for String {
    fn from(value: NodeId) -> Self {
        value.full.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let id = NodeId::parse("node_1@localhost:4369").unwrap();
        assert_eq!(id.name(), "node_1");
        assert_eq!(id.host(), "localhost");
        assert_eq!(id.port(), 4369);
        assert_eq!(id.as_str(), "node_1@localhost:4369");
        assert_eq!(id.addr(), "localhost:4369");
    }

    #[test]
    fn test_parse_dotted_host() {
        let id = NodeId::parse("a@10.0.0.1:80").unwrap();
        assert_eq!(id.host(), "10.0.0.1");
        assert_eq!(id.port(), 80);
    }

    #[test]
    fn test_parse_missing_at() {
        assert!(NodeId::parse("nodehost:4369").is_err());
    }

    #[test]
    fn test_parse_missing_port() {
        assert!(NodeId::parse("node@host").is_err());
        assert!(NodeId::parse("node@host:").is_err());
    }

    #[test]
    fn test_parse_empty_parts() {
        assert!(NodeId::parse("@host:1").is_err());
        assert!(NodeId::parse("node@:1").is_err());
    }

    #[test]
    fn test_parse_bad_name_charset() {
        assert!(NodeId::parse("bad name@host:1").is_err());
        assert!(NodeId::parse("bad.name@host:1").is_err());
    }

    #[test]
    fn test_parse_bad_port() {
        assert!(NodeId::parse("n@h:abc").is_err());
        assert!(NodeId::parse("n@h:123456").is_err());
        // Five digits but out of u16 range.
        assert!(NodeId::parse("n@h:99999").is_err());
    }

    #[test]
    fn test_case_sensitive_identity() {
        let a = NodeId::parse("Node@host:1").unwrap();
        let b = NodeId::parse("node@host:1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_parts() {
        let id = NodeId::from_parts("worker", "0.0.0.0", 4369).unwrap();
        assert_eq!(id.as_str(), "worker@0.0.0.0:4369");
    }

    #[test]
    fn test_serde_round_trip() {
        let id = NodeId::parse("alpha@127.0.0.1:4369").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"alpha@127.0.0.1:4369\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let result: Result<NodeId, _> = serde_json::from_str("\"not-a-node\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let a = NodeId::parse("a@h:1").unwrap();
        let b = NodeId::parse("b@h:1").unwrap();
        assert!(a < b);
    }
}
