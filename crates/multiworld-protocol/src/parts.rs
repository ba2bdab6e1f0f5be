//! Typed message parts of a `PrintJSON` packet.
//!
//! On the wire every part is a flat object with an optional `type` string
//! and a `text` field, plus `color`, `flags` and `player` for some types.
//! [`MessagePart`] turns that into a sum type so the decoder can match on
//! it exhaustively. A missing or unrecognised `type` is plain text.

use serde::Deserialize;

use crate::ItemFlags;

/// One part of a server log line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawPart")]
pub enum MessagePart {
    Text { text: String },
    /// `text` is the slot number in decimal.
    PlayerId { text: String },
    PlayerName { text: String },
    /// `text` is the item id in decimal; `player` owns the item's world.
    ItemId {
        text: String,
        flags: ItemFlags,
        player: u32,
    },
    ItemName {
        text: String,
        flags: ItemFlags,
        player: u32,
    },
    /// `text` is the location id in decimal; `player` owns the location.
    LocationId { text: String, player: u32 },
    LocationName { text: String, player: u32 },
    EntranceName { text: String },
    Color { text: String, color: String },
}

impl MessagePart {
    /// The raw `text` field, whatever the part type.
    pub fn text(&self) -> &str {
        match self {
            Self::Text { text }
            | Self::PlayerId { text }
            | Self::PlayerName { text }
            | Self::ItemId { text, .. }
            | Self::ItemName { text, .. }
            | Self::LocationId { text, .. }
            | Self::LocationName { text, .. }
            | Self::EntranceName { text }
            | Self::Color { text, .. } => text,
        }
    }

    /// A plain text part.
    pub fn text_part(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

#[derive(Deserialize)]
struct RawPart {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    text: String,
    color: Option<String>,
    #[serde(default)]
    flags: ItemFlags,
    #[serde(default)]
    player: u32,
}

impl From<RawPart> for MessagePart {
    fn from(raw: RawPart) -> Self {
        let RawPart {
            kind,
            text,
            color,
            flags,
            player,
        } = raw;
        match kind.as_deref() {
            Some("player_id") => Self::PlayerId { text },
            Some("player_name") => Self::PlayerName { text },
            Some("item_id") => Self::ItemId {
                text,
                flags,
                player,
            },
            Some("item_name") => Self::ItemName {
                text,
                flags,
                player,
            },
            Some("location_id") => Self::LocationId { text, player },
            Some("location_name") => Self::LocationName { text, player },
            Some("entrance_name") => Self::EntranceName { text },
            Some("color") => match color {
                Some(color) => Self::Color { text, color },
                None => Self::Text { text },
            },
            _ => Self::Text { text },
        }
    }
}
