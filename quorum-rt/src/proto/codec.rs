//! Length-prefixed framing for envelopes.
//!
//! Frames are a 4-byte big-endian length followed by the JSON envelope. The
//! maximum frame size is configurable; an oversized inbound frame errors the
//! codec, which tears the connection down (reconnect logic takes over).

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

// Layer 3: Internal module imports
use super::envelope::{Envelope, ProtoError, WIRE_VERSION};

/// Default maximum frame size (1 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Codec turning a TCP stream into a stream/sink of envelopes.
pub struct WireCodec {
    inner: LengthDelimitedCodec,
}

impl WireCodec {
    /// A codec with an explicit frame-size ceiling.
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .big_endian()
                .max_frame_length(max_frame_bytes)
                .new_codec(),
        }
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl Decoder for WireCodec {
    type Item = Envelope;
    type Error = ProtoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Envelope>, ProtoError> {
        let Some(frame) = self.inner.decode(src)? else {
            return Ok(None);
        };
        let envelope: Envelope = serde_json::from_slice(&frame)
            .map_err(|err| ProtoError::Decode(err.to_string()))?;
        if envelope.version != WIRE_VERSION {
            return Err(ProtoError::Version(envelope.version));
        }
        Ok(Some(envelope))
    }
}

impl Encoder<Envelope> for WireCodec {
    type Error = ProtoError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), ProtoError> {
        let bytes = serde_json::to_vec(&item).map_err(|err| ProtoError::Encode(err.to_string()))?;
        self.inner.encode(Bytes::from(bytes), dst)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cluster::NodeId;
    use crate::proto::message::{ClusterMessage, NodeDownReason};

    fn envelope() -> Envelope {
        let node = NodeId::parse("a@h:1").unwrap();
        Envelope::new(
            node.clone(),
            ClusterMessage::NodeDown {
                node_id: node,
                detected_at: 1,
                reason: NodeDownReason::GracefulShutdown,
            },
        )
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let mut codec = WireCodec::default();
        let mut buf = BytesMut::new();
        let env = envelope();

        codec.encode(env.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, env);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_length_prefix_is_big_endian_u32() {
        let mut codec = WireCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(envelope(), &mut buf).unwrap();

        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, buf.len() - 4);
    }

    #[test]
    fn test_partial_frame_returns_none() {
        let mut codec = WireCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(envelope(), &mut buf).unwrap();

        let mut partial = buf.split_to(buf.len() - 1);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut codec = WireCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(envelope(), &mut buf).unwrap();
        codec.encode(envelope(), &mut buf).unwrap();

        assert!(codec.decode(&mut buf).unwrap().is_some());
        assert!(codec.decode(&mut buf).unwrap().is_some());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_oversized_frame_errors() {
        let mut small = WireCodec::new(16);
        let mut buf = BytesMut::new();
        let mut large = WireCodec::default();
        large.encode(envelope(), &mut buf).unwrap();

        assert!(small.decode(&mut buf).is_err());
    }

    #[test]
    fn test_garbage_payload_errors() {
        let mut codec = WireCodec::default();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&5u32.to_be_bytes());
        buf.extend_from_slice(b"hello");

        assert!(matches!(codec.decode(&mut buf), Err(ProtoError::Decode(_))));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut env = envelope();
        env.version = 9;
        let bytes = serde_json::to_vec(&env).unwrap();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        buf.extend_from_slice(&bytes);

        let mut codec = WireCodec::default();
        assert!(matches!(codec.decode(&mut buf), Err(ProtoError::Version(9))));
    }
}
