/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The room address could not be turned into a WebSocket endpoint.
    #[error("invalid room address '{input}': {reason}")]
    InvalidAddress { input: String, reason: String },

    /// Opening the connection failed (DNS, TCP, TLS or the HTTP upgrade).
    #[error("could not connect to {endpoint}: {source}")]
    DialFailed {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// No live connection exists.
    #[error("not connected to a room server")]
    NotConnected,

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}
