//! The versioned, optionally signed envelope wrapping every frame.
//!
//! When a cluster secret is configured, the signature is HMAC-SHA256 over
//! the canonical serialization of `{version, from, timestamp, payload}`
//! (struct field order is the canonical order), base64-encoded. Frames whose
//! signature is absent or wrong are dropped before touching any state.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

// Layer 3: Internal module imports
use super::message::ClusterMessage;
use crate::cluster::NodeId;

/// The only wire version this build speaks.
pub const WIRE_VERSION: u8 = 1;

type HmacSha256 = Hmac<Sha256>;

/// Errors raised while encoding, decoding, or verifying frames.
#[derive(Error, Debug)]
pub enum ProtoError {
    /// Underlying transport failure
    #[error("Wire I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame was not valid JSON for an envelope
    #[error("Envelope decode failed: {0}")]
    Decode(String),

    /// An envelope could not be serialized
    #[error("Envelope encode failed: {0}")]
    Encode(String),

    /// The envelope version is not supported
    #[error("Unsupported wire version: {0}")]
    Version(u8),
}

/// One transmitted unit: version, sender, timestamp, optional signature,
/// payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Always [`WIRE_VERSION`]; anything else is rejected.
    pub version: u8,

    /// Sending node.
    pub from: NodeId,

    /// Milliseconds since epoch at send time.
    pub timestamp: i64,

    /// HMAC-SHA256 over the canonical form, when a secret is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    /// The tagged payload.
    pub payload: ClusterMessage,
}

/// Canonical form the signature covers: everything except the signature.
#[derive(Serialize)]
struct CanonicalView<'a> {
    version: u8,
    from: &'a NodeId,
    timestamp: i64,
    payload: &'a ClusterMessage,
}

impl Envelope {
    /// Build an unsigned envelope stamped with the current time.
    pub fn new(from: NodeId, payload: ClusterMessage) -> Self {
        Self {
            version: WIRE_VERSION,
            from,
            timestamp: Utc::now().timestamp_millis(),
            signature: None,
            payload,
        }
    }

    /// Build an envelope, signing it when a secret is configured.
    pub fn sealed(
        from: NodeId,
        payload: ClusterMessage,
        secret: Option<&str>,
    ) -> Result<Self, ProtoError> {
        let mut envelope = Self::new(from, payload);
        if let Some(secret) = secret {
            envelope.sign(secret)?;
        }
        Ok(envelope)
    }

    fn canonical_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        serde_json::to_vec(&CanonicalView {
            version: self.version,
            from: &self.from,
            timestamp: self.timestamp,
            payload: &self.payload,
        })
        .map_err(|err| ProtoError::Encode(err.to_string()))
    }

    /// Attach the HMAC-SHA256 signature.
    pub fn sign(&mut self, secret: &str) -> Result<(), ProtoError> {
        let bytes = self.canonical_bytes()?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|err| ProtoError::Encode(err.to_string()))?;
        mac.update(&bytes);
        self.signature = Some(BASE64.encode(mac.finalize().into_bytes()));
        Ok(())
    }

    /// Verify the signature in constant time.
    ///
    /// With no secret configured every envelope verifies. With a secret, an
    /// envelope verifies only when it carries a signature matching the
    /// canonical form.
    pub fn verify(&self, secret: Option<&str>) -> bool {
        let Some(secret) = secret else {
            return true;
        };
        let Some(signature) = &self.signature else {
            return false;
        };
        let Ok(raw) = BASE64.decode(signature) else {
            return false;
        };
        let Ok(bytes) = self.canonical_bytes() else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(&bytes);
        mac.verify_slice(&raw).is_ok()
    }
}
