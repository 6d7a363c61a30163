//! The seam through which the local system dispatches to remote actors.
//!
//! The cluster runtime implements this trait and attaches itself to the
//! system when the node starts; a system without a router rejects remote
//! refs with `ClusterNotStarted`. Keeping a trait here lets tests inject a
//! loopback router without a real TCP stack.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::Value;

// Layer 3: Internal module imports
use super::error::RemoteError;
use crate::actor::ServerRef;

/// Remote dispatch operations the system can delegate.
#[async_trait]
pub(crate) trait RemoteRouter: Send + Sync {
    /// Remote call: JSON payload in, JSON reply out, caller-side timeout.
    async fn call_value(
        &self,
        target: &ServerRef,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, RemoteError>;

    /// Remote cast: fire-and-forget, silently dropped when disconnected.
    fn cast_value(&self, target: &ServerRef, payload: Value);
}
