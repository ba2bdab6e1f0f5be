//! Slot sessions for multiworld rooms.
//!
//! A [`Session`] logs one slot into one room and keeps what the room tells
//! it: the player roster, checked and missing locations, received items,
//! hint points and a bounded log of decoded chat lines.
//!
//! # How it fits in the stack
//!
//! ```text
//! Client (above)             ← owns many sessions, persists credentials
//!     ↕
//! Session Layer (this crate) ← login, reconnect, slot state, messages
//!     ↕
//! RoomSocket                 ← one WebSocket, packet waits, handshake
//!     ↕
//! Transport / Protocol / Data packages (below)
//! ```
//!
//! Lost links are retried with a linear [`Backoff`]; a refused login is
//! never retried.

mod backoff;
mod config;
mod error;
mod events;
mod log;
mod message;
mod names;
mod roster;
mod session;
mod socket;
mod tracker;

pub use backoff::Backoff;
pub use config::{SessionConfig, SocketConfig};
pub use error::{DecodeError, SessionError};
pub use events::{SessionEvent, SessionState};
pub use log::{ChatHistory, MessageLog};
pub use message::{Decoded, Message, MessageDecoder, MessageNode};
pub use names::{NameResolver, ResolvedItem};
pub use roster::{AliasChange, Player, Roster};
pub use session::{Credentials, Session};
pub use socket::{RoomSocket, SocketEvent, SocketHandler, Wait};
pub use tracker::Tracker;
