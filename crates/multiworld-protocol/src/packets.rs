//! Inbound and outbound packets.
//!
//! Every packet is a JSON object tagged by its `cmd` field. Inbound packets
//! form [`ServerPacket`], outbound ones [`ClientPacket`]. Fields the server
//! may omit are `Option` or `#[serde(default)]`; unknown fields are ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    ClientStatus, ConnectionRefusal, DataPackage, ItemsHandling, MessagePart,
    NetworkItem, NetworkPlayer, NetworkSlot, NetworkVersion, ProtocolError,
    DEATH_LINK_TAG,
};

// ---------------------------------------------------------------------------
// PacketKind
// ---------------------------------------------------------------------------

/// The `cmd` tag of an inbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    RoomInfo,
    Connected,
    ConnectionRefused,
    ReceivedItems,
    RoomUpdate,
    PrintJson,
    DataPackage,
    Bounced,
    LocationInfo,
    Retrieved,
    SetReply,
    InvalidPacket,
}

impl PacketKind {
    /// Every kind, in declaration order.
    pub const ALL: [PacketKind; 12] = [
        Self::RoomInfo,
        Self::Connected,
        Self::ConnectionRefused,
        Self::ReceivedItems,
        Self::RoomUpdate,
        Self::PrintJson,
        Self::DataPackage,
        Self::Bounced,
        Self::LocationInfo,
        Self::Retrieved,
        Self::SetReply,
        Self::InvalidPacket,
    ];

    /// The tag exactly as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoomInfo => "RoomInfo",
            Self::Connected => "Connected",
            Self::ConnectionRefused => "ConnectionRefused",
            Self::ReceivedItems => "ReceivedItems",
            Self::RoomUpdate => "RoomUpdate",
            Self::PrintJson => "PrintJSON",
            Self::DataPackage => "DataPackage",
            Self::Bounced => "Bounced",
            Self::LocationInfo => "LocationInfo",
            Self::Retrieved => "Retrieved",
            Self::SetReply => "SetReply",
            Self::InvalidPacket => "InvalidPacket",
        }
    }
}

impl FromStr for PacketKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownCommand(s.to_string()))
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ServerPacket
// ---------------------------------------------------------------------------

/// A packet sent by the room server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd")]
pub enum ServerPacket {
    RoomInfo(RoomInfoPacket),
    Connected(ConnectedPacket),
    ConnectionRefused(ConnectionRefusedPacket),
    ReceivedItems(ReceivedItemsPacket),
    RoomUpdate(RoomUpdatePacket),
    #[serde(rename = "PrintJSON")]
    PrintJson(PrintJsonPacket),
    DataPackage(DataPackagePacket),
    Bounced(BouncedPacket),
    LocationInfo(LocationInfoPacket),
    Retrieved(RetrievedPacket),
    SetReply(SetReplyPacket),
    InvalidPacket(InvalidPacketPacket),
}

impl ServerPacket {
    /// The kind tag of this packet, as used by waiters.
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::RoomInfo(_) => PacketKind::RoomInfo,
            Self::Connected(_) => PacketKind::Connected,
            Self::ConnectionRefused(_) => PacketKind::ConnectionRefused,
            Self::ReceivedItems(_) => PacketKind::ReceivedItems,
            Self::RoomUpdate(_) => PacketKind::RoomUpdate,
            Self::PrintJson(_) => PacketKind::PrintJson,
            Self::DataPackage(_) => PacketKind::DataPackage,
            Self::Bounced(_) => PacketKind::Bounced,
            Self::LocationInfo(_) => PacketKind::LocationInfo,
            Self::Retrieved(_) => PacketKind::Retrieved,
            Self::SetReply(_) => PacketKind::SetReply,
            Self::InvalidPacket(_) => PacketKind::InvalidPacket,
        }
    }
}

/// First packet after the WebSocket opens.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoomInfoPacket {
    pub version: NetworkVersion,
    #[serde(default)]
    pub generator_version: Option<NetworkVersion>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub password: bool,
    #[serde(default)]
    pub permissions: BTreeMap<String, u8>,
    /// Percentage of the room's locations one hint costs.
    #[serde(default)]
    pub hint_cost: u32,
    #[serde(default)]
    pub location_check_points: u32,
    #[serde(default)]
    pub games: Vec<String>,
    /// Game name to data package checksum.
    #[serde(default)]
    pub datapackage_checksums: BTreeMap<String, String>,
    #[serde(default)]
    pub seed_name: String,
    #[serde(default)]
    pub time: f64,
}

/// Successful reply to `Connect`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectedPacket {
    pub team: u32,
    pub slot: u32,
    #[serde(default)]
    pub players: Vec<NetworkPlayer>,
    #[serde(default)]
    pub missing_locations: Vec<i64>,
    #[serde(default)]
    pub checked_locations: Vec<i64>,
    #[serde(default)]
    pub slot_data: Value,
    /// Keyed by slot number.
    #[serde(default, deserialize_with = "numeric_keys")]
    pub slot_info: BTreeMap<u32, NetworkSlot>,
    #[serde(default)]
    pub hint_points: u32,
}

/// JSON object keys are strings. Inside an internally tagged enum serde
/// buffers them as strings, so integer keys have to be parsed by hand.
fn numeric_keys<'de, D, V>(deserializer: D) -> Result<BTreeMap<u32, V>, D::Error>
where
    D: serde::Deserializer<'de>,
    V: Deserialize<'de>,
{
    let raw = BTreeMap::<String, V>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            key.parse::<u32>()
                .map(|slot| (slot, value))
                .map_err(|_| {
                    serde::de::Error::custom(format!("slot key '{key}' is not a number"))
                })
        })
        .collect()
}

/// The server's answer to a rejected `Connect`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionRefusedPacket {
    #[serde(default)]
    pub errors: Vec<ConnectionRefusal>,
}

/// Items sent to this slot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReceivedItemsPacket {
    /// Position of the first item in the full received list; 0 means the
    /// server is resending everything.
    pub index: u32,
    pub items: Vec<NetworkItem>,
}

/// Partial room state change. Absent fields are unchanged.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RoomUpdatePacket {
    pub hint_points: Option<u32>,
    pub players: Option<Vec<NetworkPlayer>>,
    pub checked_locations: Option<Vec<i64>>,
    pub tags: Option<Vec<String>>,
    pub password: Option<bool>,
    pub permissions: Option<BTreeMap<String, u8>>,
    pub hint_cost: Option<u32>,
    pub location_check_points: Option<u32>,
    pub time: Option<f64>,
}

/// Reply to `GetDataPackage`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DataPackagePacket {
    pub data: DataPackage,
}

/// A `Bounce` relayed by the server. DeathLink travels this way.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BouncedPacket {
    pub games: Option<Vec<String>>,
    pub slots: Option<Vec<u32>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Reply to `LocationScouts`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocationInfoPacket {
    pub locations: Vec<NetworkItem>,
}

/// Reply to `Get`: the requested data storage keys.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetrievedPacket {
    #[serde(default)]
    pub keys: Map<String, Value>,
}

/// Sent when a watched data storage key changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetReplyPacket {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub original_value: Value,
}

/// The server could not process a packet we sent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InvalidPacketPacket {
    /// `"cmd"` or `"arguments"`.
    #[serde(rename = "type", default)]
    pub kind: String,
    pub original_cmd: Option<String>,
    #[serde(default)]
    pub text: String,
}

// ---------------------------------------------------------------------------
// PrintJSON
// ---------------------------------------------------------------------------

/// A structured log line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawPrintJson")]
pub struct PrintJsonPacket {
    /// The parts of the line, rendered in order.
    pub data: Vec<MessagePart>,
    pub detail: PrintJson,
}

/// What a log line is about, with the fields that line type carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintJson {
    ItemSend {
        receiving: u32,
        item: NetworkItem,
    },
    /// Item granted by an admin; `team` scopes the receiver.
    ItemCheat {
        receiving: u32,
        item: NetworkItem,
        team: u32,
    },
    Hint {
        receiving: u32,
        item: NetworkItem,
        found: bool,
    },
    Join {
        team: u32,
        slot: u32,
        tags: Vec<String>,
    },
    Part {
        team: u32,
        slot: u32,
    },
    Chat {
        team: u32,
        slot: u32,
        message: String,
    },
    ServerChat {
        message: String,
    },
    Tutorial,
    TagsChanged {
        team: u32,
        slot: u32,
        tags: Vec<String>,
    },
    CommandResult,
    AdminCommandResult,
    Goal {
        team: u32,
        slot: u32,
    },
    Release {
        team: u32,
        slot: u32,
    },
    Collect {
        team: u32,
        slot: u32,
    },
    Countdown {
        countdown: i64,
    },
    /// No `type`, or one this client does not know.
    Plain,
}

impl PrintJson {
    /// Receiving slot, team override and item for item-bearing lines.
    pub fn item_context(&self) -> Option<(u32, Option<u32>, &NetworkItem)> {
        match self {
            Self::ItemSend { receiving, item } => Some((*receiving, None, item)),
            Self::ItemCheat {
                receiving,
                item,
                team,
            } => Some((*receiving, Some(*team), item)),
            Self::Hint {
                receiving, item, ..
            } => Some((*receiving, None, item)),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct RawPrintJson {
    #[serde(default)]
    data: Vec<MessagePart>,
    #[serde(rename = "type")]
    kind: Option<String>,
    receiving: Option<u32>,
    item: Option<NetworkItem>,
    team: Option<u32>,
    slot: Option<u32>,
    found: Option<bool>,
    countdown: Option<i64>,
    message: Option<String>,
    tags: Option<Vec<String>>,
}

fn required<T>(value: Option<T>, kind: &str, field: &str) -> Result<T, String> {
    value.ok_or_else(|| format!("{kind} line without '{field}'"))
}

impl TryFrom<RawPrintJson> for PrintJsonPacket {
    type Error = String;

    fn try_from(raw: RawPrintJson) -> Result<Self, Self::Error> {
        let Some(kind) = raw.kind.as_deref() else {
            return Ok(Self {
                data: raw.data,
                detail: PrintJson::Plain,
            });
        };
        let team_slot = |raw: &RawPrintJson| {
            Ok::<_, String>((
                required(raw.team, kind, "team")?,
                required(raw.slot, kind, "slot")?,
            ))
        };

        let detail = match kind {
            "ItemSend" => PrintJson::ItemSend {
                receiving: required(raw.receiving, kind, "receiving")?,
                item: required(raw.item, kind, "item")?,
            },
            "ItemCheat" => PrintJson::ItemCheat {
                receiving: required(raw.receiving, kind, "receiving")?,
                item: required(raw.item, kind, "item")?,
                team: required(raw.team, kind, "team")?,
            },
            "Hint" => PrintJson::Hint {
                receiving: required(raw.receiving, kind, "receiving")?,
                item: required(raw.item, kind, "item")?,
                found: raw.found.unwrap_or(false),
            },
            "Join" => {
                let (team, slot) = team_slot(&raw)?;
                PrintJson::Join {
                    team,
                    slot,
                    tags: raw.tags.clone().unwrap_or_default(),
                }
            }
            "Part" => {
                let (team, slot) = team_slot(&raw)?;
                PrintJson::Part { team, slot }
            }
            "Chat" => {
                let (team, slot) = team_slot(&raw)?;
                PrintJson::Chat {
                    team,
                    slot,
                    message: raw.message.clone().unwrap_or_default(),
                }
            }
            "ServerChat" => PrintJson::ServerChat {
                message: raw.message.clone().unwrap_or_default(),
            },
            "Tutorial" => PrintJson::Tutorial,
            "TagsChanged" => {
                let (team, slot) = team_slot(&raw)?;
                PrintJson::TagsChanged {
                    team,
                    slot,
                    tags: raw.tags.clone().unwrap_or_default(),
                }
            }
            "CommandResult" => PrintJson::CommandResult,
            "AdminCommandResult" => PrintJson::AdminCommandResult,
            "Goal" => {
                let (team, slot) = team_slot(&raw)?;
                PrintJson::Goal { team, slot }
            }
            "Release" => {
                let (team, slot) = team_slot(&raw)?;
                PrintJson::Release { team, slot }
            }
            "Collect" => {
                let (team, slot) = team_slot(&raw)?;
                PrintJson::Collect { team, slot }
            }
            "Countdown" => PrintJson::Countdown {
                countdown: required(raw.countdown, kind, "countdown")?,
            },
            _ => PrintJson::Plain,
        };

        Ok(Self {
            data: raw.data,
            detail,
        })
    }
}

// ---------------------------------------------------------------------------
// ClientPacket
// ---------------------------------------------------------------------------

/// A packet sent to the room server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum ClientPacket {
    /// Login.
    Connect {
        password: String,
        game: String,
        name: String,
        uuid: String,
        version: NetworkVersion,
        items_handling: ItemsHandling,
        tags: Vec<String>,
        slot_data: bool,
    },
    /// Changes tags or items handling after login.
    ConnectUpdate {
        items_handling: ItemsHandling,
        tags: Vec<String>,
    },
    Say {
        text: String,
    },
    StatusUpdate {
        status: ClientStatus,
    },
    /// `games: None` asks for every game in the room.
    GetDataPackage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        games: Option<Vec<String>>,
    },
    Bounce {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        games: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slots: Option<Vec<u32>>,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        data: Map<String, Value>,
    },
}

impl ClientPacket {
    /// The `cmd` tag, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "Connect",
            Self::ConnectUpdate { .. } => "ConnectUpdate",
            Self::Say { .. } => "Say",
            Self::StatusUpdate { .. } => "StatusUpdate",
            Self::GetDataPackage { .. } => "GetDataPackage",
            Self::Bounce { .. } => "Bounce",
        }
    }
}

// ---------------------------------------------------------------------------
// DeathLink
// ---------------------------------------------------------------------------

/// A DeathLink event: someone's game character died.
#[derive(Debug, Clone, PartialEq)]
pub struct DeathLink {
    /// Slot name of the player who died.
    pub source: String,
    /// Free text describing the death. May be empty.
    pub cause: String,
    /// Unix time in seconds.
    pub time: f64,
}

impl DeathLink {
    /// Wraps the event in a `Bounce` tagged `DeathLink`.
    pub fn into_bounce(self) -> ClientPacket {
        let mut data = Map::new();
        data.insert("source".into(), Value::String(self.source));
        data.insert("cause".into(), Value::String(self.cause));
        data.insert("time".into(), Value::from(self.time));
        ClientPacket::Bounce {
            games: None,
            slots: None,
            tags: vec![DEATH_LINK_TAG.to_string()],
            data,
        }
    }

    /// Extracts a DeathLink from a bounce carrying the tag and all three
    /// fields. Anything else is `None`.
    pub fn from_bounced(packet: &BouncedPacket) -> Option<Self> {
        if !packet.tags.iter().any(|t| t == DEATH_LINK_TAG) {
            return None;
        }
        Some(Self {
            source: packet.data.get("source")?.as_str()?.to_string(),
            cause: packet.data.get("cause")?.as_str()?.to_string(),
            time: packet.data.get("time")?.as_f64()?,
        })
    }
}
