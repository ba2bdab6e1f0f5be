//! Session and socket configuration.

use std::time::Duration;

use multiworld_protocol::{ItemsHandling, NetworkVersion, TEXT_ONLY_TAG};

// ---------------------------------------------------------------------------
// SocketConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`RoomSocket`](crate::RoomSocket).
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// How long one endpoint candidate gets to deliver `RoomInfo` after the
    /// dial starts. Default: 10 seconds.
    pub handshake_timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Session`](crate::Session).
///
/// ```rust
/// use std::time::Duration;
/// use multiworld_session::SessionConfig;
///
/// let config = SessionConfig::default()
///     .with_tags(["DeathLink"])
///     .with_reconnect_base(Duration::from_secs(2));
/// assert_eq!(config.tags, vec!["DeathLink".to_string()]);
/// assert_eq!(config.reconnect_ceiling, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Room socket settings: handshake timeout.
    pub socket: SocketConfig,

    /// First reconnect delay, and the step added after each failure.
    /// Default: 5 seconds.
    pub reconnect_base: Duration,

    /// Upper bound for the reconnect delay. Default: 60 seconds.
    pub reconnect_ceiling: Duration,

    /// Maximum number of entries kept in the message log. Default: 500.
    pub log_capacity: usize,

    /// Maximum number of submitted chat lines kept for recall. Default: 50.
    pub chat_history_capacity: usize,

    /// Buffer size of the event broadcast channel. Default: 256.
    pub event_capacity: usize,

    /// Tags declared at login. Default: `["TextOnly"]`.
    pub tags: Vec<String>,

    /// Which received items the server reports. Default: all of them.
    pub items_handling: ItemsHandling,

    /// Game name sent at login. Empty for a text-only client.
    pub game: String,

    /// Protocol version sent at login. `None` echoes the server's version
    /// from `RoomInfo`.
    pub version: Option<NetworkVersion>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            socket: SocketConfig::default(),
            reconnect_base: Duration::from_secs(5),
            reconnect_ceiling: Duration::from_secs(60),
            log_capacity: 500,
            chat_history_capacity: 50,
            event_capacity: 256,
            tags: vec![TEXT_ONLY_TAG.to_string()],
            items_handling: ItemsHandling::ALL,
            game: String::new(),
            version: None,
        }
    }
}

impl SessionConfig {
    /// Replaces the tags declared at login.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the first reconnect delay and the step between attempts.
    pub fn with_reconnect_base(mut self, base: Duration) -> Self {
        self.reconnect_base = base;
        self
    }

    /// Caps the reconnect delay.
    pub fn with_reconnect_ceiling(mut self, ceiling: Duration) -> Self {
        self.reconnect_ceiling = ceiling;
        self
    }

    /// Sets how long each endpoint gets to deliver `RoomInfo`.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.socket.handshake_timeout = timeout;
        self
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    pub fn with_chat_history_capacity(mut self, capacity: usize) -> Self {
        self.chat_history_capacity = capacity;
        self
    }

    pub fn with_items_handling(mut self, items_handling: ItemsHandling) -> Self {
        self.items_handling = items_handling;
        self
    }

    pub fn with_game(mut self, game: impl Into<String>) -> Self {
        self.game = game.into();
        self
    }

    /// Pins the protocol version sent at login instead of echoing the server's.
    pub fn with_version(mut self, version: NetworkVersion) -> Self {
        self.version = Some(version);
        self
    }
}
