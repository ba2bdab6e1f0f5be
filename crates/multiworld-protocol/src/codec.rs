//! Frame codec: one WebSocket text frame holds a JSON array of packets.
//!
//! Decoding works element by element. A frame that is not a JSON array is
//! an error, but a single packet the client cannot read (an unknown `cmd`,
//! or a known one with a broken shape) is logged and skipped so the rest of
//! the frame still arrives.

use serde_json::Value;

use crate::{ClientPacket, PacketKind, ProtocolError, ServerPacket};

/// Converts between packets and text frames.
pub trait Codec: Send + Sync + 'static {
    /// Serializes outbound packets into a single frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode_frame(
        &self,
        packets: &[ClientPacket],
    ) -> Result<String, ProtocolError>;

    /// Parses a frame into the inbound packets it contains, in order.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the frame is not a JSON array.
    fn decode_frame(
        &self,
        frame: &str,
    ) -> Result<Vec<ServerPacket>, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// The room server's JSON framing.
///
/// ```rust
/// use multiworld_protocol::{ClientPacket, Codec, JsonCodec, PacketKind};
///
/// let codec = JsonCodec;
/// let frame = codec
///     .encode_frame(&[ClientPacket::Say { text: "hi".into() }])
///     .unwrap();
/// assert_eq!(frame, r#"[{"cmd":"Say","text":"hi"}]"#);
///
/// let packets = codec
///     .decode_frame(r#"[{"cmd":"LocationInfo","locations":[]},{"cmd":"Nope"}]"#)
///     .unwrap();
/// assert_eq!(packets.len(), 1);
/// assert_eq!(packets[0].kind(), PacketKind::LocationInfo);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode_frame(
        &self,
        packets: &[ClientPacket],
    ) -> Result<String, ProtocolError> {
        serde_json::to_string(packets).map_err(ProtocolError::Encode)
    }

    fn decode_frame(
        &self,
        frame: &str,
    ) -> Result<Vec<ServerPacket>, ProtocolError> {
        let elements: Vec<Value> =
            serde_json::from_str(frame).map_err(ProtocolError::Decode)?;

        let mut packets = Vec::with_capacity(elements.len());
        for element in elements {
            let cmd = element
                .get("cmd")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            if let Err(e) = cmd.parse::<PacketKind>() {
                tracing::debug!(error = %e, "skipping packet");
                continue;
            }

            match serde_json::from_value::<ServerPacket>(element) {
                Ok(packet) => packets.push(packet),
                Err(e) => {
                    tracing::warn!(cmd = %cmd, error = %e, "skipping malformed packet");
                }
            }
        }
        Ok(packets)
    }
}
