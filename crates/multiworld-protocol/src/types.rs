//! Value types shared by many packets.
//!
//! Everything here mirrors a JSON object or scalar the room server puts on
//! the wire. Ids for items and locations are `i64`: the server uses negative
//! location ids for starting inventory and cheats.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag a client declares to receive DeathLink bounces.
pub const DEATH_LINK_TAG: &str = "DeathLink";

/// Tag for clients that only read and send text.
pub const TEXT_ONLY_TAG: &str = "TextOnly";

/// Game name of slot 0, the room itself.
pub const ROOM_GAME: &str = "Archipelago";

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Classification bits carried by every network item.
///
/// Several bits may be set at once. No bits set means filler.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ItemFlags(pub u32);

impl ItemFlags {
    /// No classification bits.
    pub const FILLER: Self = Self(0);
    /// Logically required to finish a game.
    pub const PROGRESSION: Self = Self(0b001);
    /// Helpful, but not required.
    pub const USEFUL: Self = Self(0b010);
    /// Harms the receiver.
    pub const TRAP: Self = Self(0b100);

    /// Whether every bit of `other` is set. Always `false` for [`FILLER`](Self::FILLER).
    pub fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_progression(self) -> bool {
        self.contains(Self::PROGRESSION)
    }

    pub fn is_useful(self) -> bool {
        self.contains(Self::USEFUL)
    }

    pub fn is_trap(self) -> bool {
        self.contains(Self::TRAP)
    }

    /// Whether none of the three classification bits is set.
    pub fn is_filler(self) -> bool {
        self.0 & 0b111 == 0
    }

    /// Style classes for rich rendering, e.g. `["progression", "trap"]`.
    ///
    /// Always returns at least one class.
    pub fn classes(self) -> Vec<&'static str> {
        if self.is_filler() {
            return vec!["filler"];
        }
        let mut classes = Vec::with_capacity(3);
        if self.is_progression() {
            classes.push("progression");
        }
        if self.is_useful() {
            classes.push("useful");
        }
        if self.is_trap() {
            classes.push("trap");
        }
        classes
    }

    /// Short human label: the most significant classification.
    pub fn label(self) -> &'static str {
        if self.is_progression() {
            "progression"
        } else if self.is_useful() {
            "useful"
        } else if self.is_trap() {
            "trap"
        } else {
            "filler"
        }
    }
}

impl std::ops::BitOr for ItemFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One item placement: which item, found where, by whom.
///
/// In `ReceivedItems` the `player` is the sender. In `LocationInfo` it is
/// the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkItem {
    pub item: i64,
    pub location: i64,
    pub player: u32,
    #[serde(default)]
    pub flags: ItemFlags,
}

// ---------------------------------------------------------------------------
// Players and slots
// ---------------------------------------------------------------------------

/// A player as listed in `Connected` and `RoomUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPlayer {
    pub team: u32,
    pub slot: u32,
    pub alias: String,
    pub name: String,
}

/// What kind of participant occupies a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SlotType {
    Spectator,
    Player,
    Group,
}

impl TryFrom<u8> for SlotType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Spectator),
            1 => Ok(Self::Player),
            2 => Ok(Self::Group),
            other => Err(format!("unknown slot type {other}")),
        }
    }
}

impl From<SlotType> for u8 {
    fn from(value: SlotType) -> Self {
        match value {
            SlotType::Spectator => 0,
            SlotType::Player => 1,
            SlotType::Group => 2,
        }
    }
}

/// Static information about a slot, from `Connected.slot_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSlot {
    pub name: String,
    pub game: String,
    #[serde(rename = "type")]
    pub kind: SlotType,
    /// Member slots, only populated for [`SlotType::Group`].
    #[serde(default)]
    pub group_members: Vec<u32>,
}

// ---------------------------------------------------------------------------
// Versions, status, refusals
// ---------------------------------------------------------------------------

/// A protocol or generator version, tagged with `"class": "Version"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkVersion {
    #[serde(default = "version_class")]
    class: String,
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

fn version_class() -> String {
    "Version".to_string()
}

impl NetworkVersion {
    /// A version with the `Version` class tag the server expects.
    pub fn new(major: u32, minor: u32, build: u32) -> Self {
        Self {
            class: version_class(),
            major,
            minor,
            build,
        }
    }
}

impl fmt::Display for NetworkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Client progress as reported with `StatusUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ClientStatus {
    Disconnected,
    Connected,
    Ready,
    Playing,
    Goal,
}

impl TryFrom<u8> for ClientStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Disconnected),
            5 => Ok(Self::Connected),
            10 => Ok(Self::Ready),
            20 => Ok(Self::Playing),
            30 => Ok(Self::Goal),
            other => Err(format!("unknown client status {other}")),
        }
    }
}

impl From<ClientStatus> for u8 {
    fn from(value: ClientStatus) -> Self {
        match value {
            ClientStatus::Disconnected => 0,
            ClientStatus::Connected => 5,
            ClientStatus::Ready => 10,
            ClientStatus::Playing => 20,
            ClientStatus::Goal => 30,
        }
    }
}

/// Which received items the server should send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemsHandling(pub u8);

impl ItemsHandling {
    /// Items from other worlds only.
    pub const OTHERS: Self = Self(0b001);
    /// Items found in the player's own world.
    pub const OWN: Self = Self(0b010);
    /// Starting inventory.
    pub const STARTING: Self = Self(0b100);
    /// Everything: other worlds, own world and starting inventory.
    pub const ALL: Self = Self(0b111);
}

impl Default for ItemsHandling {
    fn default() -> Self {
        Self::ALL
    }
}

/// A reason reported in `ConnectionRefused`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionRefusal {
    IncompatibleVersion,
    InvalidGame,
    InvalidItemsHandling,
    InvalidPassword,
    InvalidSlot,
    #[serde(other)]
    Other,
}

impl fmt::Display for ConnectionRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::IncompatibleVersion => "incompatible version",
            Self::InvalidGame => "invalid game",
            Self::InvalidItemsHandling => "invalid items handling",
            Self::InvalidPassword => "invalid password",
            Self::InvalidSlot => "invalid slot",
            Self::Other => "unknown reason",
        };
        f.write_str(text)
    }
}

// ---------------------------------------------------------------------------
// Data packages
// ---------------------------------------------------------------------------

/// Name-to-id tables for one game at one checksum.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GamePackage {
    #[serde(default)]
    pub item_name_to_id: BTreeMap<String, i64>,
    #[serde(default)]
    pub location_name_to_id: BTreeMap<String, i64>,
    #[serde(default)]
    pub checksum: String,
}

/// Payload of the `DataPackage` packet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataPackage {
    #[serde(default)]
    pub games: BTreeMap<String, GamePackage>,
}
