//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the problem is in turning packets into
//! frames or frames into packets, never in networking or session state.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing outbound packets failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The frame is not a JSON array of objects.
    ///
    /// Individual malformed packets inside a well-formed frame do not
    /// produce this error; they are skipped.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// A `cmd` tag that no inbound packet uses.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// A value passed serde's shape checks but breaks a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
