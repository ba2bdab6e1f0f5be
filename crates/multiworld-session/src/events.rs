//! Session lifecycle states and the events a session broadcasts.

use std::fmt;

use multiworld_protocol::{DeathLink, NetworkItem};

use crate::{Message, Player};

/// Where a session is in its lifecycle.
///
/// ```text
/// Disconnected → Connecting → AwaitingHandshake → FetchingDataPackages
///                                   → SendingLogin → Ready
///
/// any non-terminal state ──(link lost / login failed)──→ Reconnecting
/// any state ──(close)──→ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    /// Dialing the room server.
    Connecting,
    /// Connected, waiting for `RoomInfo`.
    AwaitingHandshake,
    FetchingDataPackages,
    /// `Connect` sent, waiting for `Connected` or `ConnectionRefused`.
    SendingLogin,
    Ready,
    /// Waiting out a backoff delay before the next login attempt.
    Reconnecting,
    Closed,
}

impl SessionState {
    /// Whether no further state can follow.
    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }

    /// Whether a login attempt is in flight.
    pub fn is_logging_in(self) -> bool {
        matches!(
            self,
            Self::Connecting
                | Self::AwaitingHandshake
                | Self::FetchingDataPackages
                | Self::SendingLogin
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHandshake => "awaiting handshake",
            Self::FetchingDataPackages => "fetching data packages",
            Self::SendingLogin => "sending login",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(text)
    }
}

/// Notifications broadcast by a [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A login completed.
    Connected,
    /// The session closed for good. Sent exactly once.
    Closed,
    HintsChanged {
        hint_points: u32,
        hints: u32,
    },
    AliasChanged {
        player: Player,
        old_alias: String,
        new_alias: String,
    },
    /// Items not received before. `replay` is set for the inventory the
    /// server resends at login.
    NewItems {
        items: Vec<NetworkItem>,
        replay: bool,
    },
    CountdownChanged(i64),
    DeathLink(DeathLink),
    /// A line was added to the message log. `hidden` lines are local
    /// notices a front end may choose not to announce.
    Message {
        message: Message,
        hidden: bool,
    },
}
