//! Wire protocol for multiworld room servers.
//!
//! This crate defines what the client and the room server say to each other:
//!
//! - **Packets** ([`ServerPacket`], [`ClientPacket`]): one sum type per
//!   direction, tagged by the `cmd` field on the wire.
//! - **Message parts** ([`MessagePart`]): the typed pieces of a
//!   `PrintJSON` log line.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): frames are JSON arrays of
//!   packets.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer knows nothing about connections or sessions. It sits
//! between the raw text frames of the transport and the session state
//! machine:
//!
//! ```text
//! Transport (text frames) → Protocol (ServerPacket) → Session (state, events)
//! ```

mod codec;
mod error;
mod packets;
mod parts;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use packets::{
    BouncedPacket, ClientPacket, ConnectedPacket, ConnectionRefusedPacket,
    DataPackagePacket, DeathLink, InvalidPacketPacket, LocationInfoPacket,
    PacketKind, PrintJson, PrintJsonPacket, ReceivedItemsPacket,
    RetrievedPacket, RoomInfoPacket, RoomUpdatePacket, ServerPacket,
    SetReplyPacket,
};
pub use parts::MessagePart;
pub use types::{
    ClientStatus, ConnectionRefusal, DEATH_LINK_TAG, DataPackage, GamePackage,
    ItemFlags, ItemsHandling, NetworkItem, NetworkPlayer, NetworkSlot,
    NetworkVersion, ROOM_GAME, SlotType, TEXT_ONLY_TAG,
};
