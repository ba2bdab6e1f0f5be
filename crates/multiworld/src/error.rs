//! Unified error type for the multiworld client.

use multiworld_datapackage::{CacheError, StoreError};
use multiworld_protocol::ProtocolError;
use multiworld_session::SessionError;
use multiworld_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each layer's variant lets `?` convert
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum MultiworldError {
    /// A transport-level error (bad address, dial, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, unknown packet).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (connect, refused login, closed).
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A session with the same `slot@host:port` is already registered.
    #[error("a session for {0} already exists")]
    DuplicateSession(String),

    /// A saved credentials record could not be read back.
    #[error("saved credentials under '{key}' are unreadable: {source}")]
    Credentials {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
