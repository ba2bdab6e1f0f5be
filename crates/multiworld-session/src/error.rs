//! Error types for the session layer.

use multiworld_datapackage::CacheError;
use multiworld_protocol::{ConnectionRefusal, PacketKind, ProtocolError};
use multiworld_transport::TransportError;

/// Errors that can occur while running a room session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No candidate endpoint produced a room handshake. Carries the error
    /// of the last attempt.
    #[error("could not reach the room server: {0}")]
    Connect(#[source] TransportError),

    /// The room server answered the login with `ConnectionRefused`.
    #[error("login refused: {}", join_reasons(.0))]
    LoginRefused(Vec<ConnectionRefusal>),

    /// The operation needs a live, logged-in connection.
    #[error("not connected to a room server")]
    NotConnected,

    /// The session was closed and cannot be used again.
    #[error("session is closed")]
    Closed,

    /// A correlated reply arrived with the wrong packet type.
    #[error("unexpected {0} packet")]
    UnexpectedPacket(PacketKind),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

fn join_reasons(reasons: &[ConnectionRefusal]) -> String {
    if reasons.is_empty() {
        return "no reason given".into();
    }
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A reference in a log line that could not be resolved.
///
/// The decoder logs these and drops the offending node; the rest of the
/// line still renders.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown player '{0}'")]
    UnresolvedPlayer(String),

    #[error("cannot resolve item {item}: receiving slot {receiving} is unknown")]
    UnresolvedItem { item: i64, receiving: u32 },
}
