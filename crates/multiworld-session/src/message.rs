//! Turns `PrintJSON` lines into plain text and an HTML fragment.
//!
//! Each [`MessagePart`] becomes one [`MessageNode`]. Players are looked up
//! in the [`Roster`], ids are named through the [`NameResolver`]. A part
//! that references a player the roster does not know is logged as a
//! [`DecodeError`] and dropped; the rest of the line still renders.

use multiworld_protocol::{ItemFlags, MessagePart, NetworkItem, PrintJson, PrintJsonPacket};

use crate::{DecodeError, NameResolver, Player, ResolvedItem, Roster};

/// One rendered log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Plain text, the concatenation of every node's text.
    pub text: String,
    /// HTML fragment with the markup of every node.
    pub html: String,
    pub nodes: Vec<MessageNode>,
}

impl Message {
    /// A locally generated line with no structure.
    pub fn notice(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            html: format!(r#"<span class="text">{}</span>"#, escape(&text)),
            text,
            nodes: Vec::new(),
        }
    }

    /// Renders decoded nodes into both text and HTML.
    pub fn from_nodes(nodes: Vec<MessageNode>) -> Self {
        Self {
            text: nodes.iter().map(MessageNode::text).collect(),
            html: nodes.iter().map(MessageNode::html).collect(),
            nodes,
        }
    }
}

/// A resolved message part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageNode {
    Text {
        text: String,
    },
    Entrance {
        text: String,
    },
    Color {
        text: String,
        color: String,
    },
    Item(ResolvedItem),
    Location {
        id: Option<i64>,
        name: String,
    },
    Player {
        player: Player,
        /// Same team as the logged-in player.
        teammate: bool,
        /// The logged-in player.
        is_self: bool,
    },
}

impl MessageNode {
    /// The node as plain text. Players render as their alias.
    pub fn text(&self) -> &str {
        match self {
            Self::Text { text } | Self::Entrance { text } | Self::Color { text, .. } => text,
            Self::Item(item) => &item.name,
            Self::Location { name, .. } => name,
            Self::Player { player, .. } => &player.alias,
        }
    }

    /// The node as an HTML fragment. All text is escaped.
    pub fn html(&self) -> String {
        match self {
            Self::Text { text } | Self::Entrance { text } => paragraphs(text),
            Self::Color { text, color } => {
                format!(r#"<span class="{}">{}</span>"#, escape(color), escape(text))
            }
            Self::Item(item) => format!(
                r#"<span class="item {}">{}</span>"#,
                item.flags.classes().join(" "),
                escape(&item.name)
            ),
            Self::Location { name, .. } => {
                format!(r#"<span class="location">{}</span>"#, escape(name))
            }
            Self::Player {
                player,
                teammate,
                is_self,
            } => format!(
                r#"<span class="player team-{} {} {}">{}</span>"#,
                player.team,
                if *teammate { "teammate" } else { "opponent" },
                if *is_self { "self" } else { "other" },
                escape(&player.alias)
            ),
        }
    }
}

/// One `<p>` per line. Leading whitespace becomes a margin class of twice
/// its length and is stripped from the content.
fn paragraphs(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            let margin = line.chars().take_while(|c| c.is_whitespace()).count();
            if margin == 0 || margin == line.chars().count() {
                format!("<p>{}</p>", escape(line))
            } else {
                let content = line.trim_start();
                format!(r#"<p class="ml-{}">{}</p>"#, margin * 2, escape(content))
            }
        })
        .collect()
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// MessageDecoder
// ---------------------------------------------------------------------------

/// The result of decoding one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub message: Message,
    /// Set for countdown lines.
    pub countdown: Option<i64>,
}

/// Resolves the parts of a `PrintJSON` packet against a roster and the
/// room's names.
///
/// Parts that cannot be resolved, such as a player id the roster does not
/// know, are logged and dropped; the rest of the line still renders.
pub struct MessageDecoder<'a> {
    roster: &'a Roster,
    names: &'a NameResolver,
}

impl<'a> MessageDecoder<'a> {
    pub fn new(roster: &'a Roster, names: &'a NameResolver) -> Self {
        Self { roster, names }
    }

    /// Decodes one line. Never fails as a whole.
    pub fn decode(&self, packet: &PrintJsonPacket) -> Decoded {
        let mut nodes = Vec::with_capacity(packet.data.len());
        for part in &packet.data {
            match self.node(part, &packet.detail) {
                Ok(node) => nodes.push(node),
                Err(error) => {
                    tracing::warn!(error = %error, "dropping message part");
                }
            }
        }
        // A countdown tick only counts when the line carries text.
        let has_text = packet
            .data
            .iter()
            .any(|part| matches!(part, MessagePart::Text { .. }));
        let countdown = match packet.detail {
            PrintJson::Countdown { countdown } if has_text => Some(countdown),
            _ => None,
        };
        Decoded {
            message: Message::from_nodes(nodes),
            countdown,
        }
    }

    fn node(&self, part: &MessagePart, detail: &PrintJson) -> Result<MessageNode, DecodeError> {
        match part {
            MessagePart::Text { text } => Ok(MessageNode::Text { text: text.clone() }),
            MessagePart::EntranceName { text } => Ok(MessageNode::Entrance { text: text.clone() }),
            MessagePart::Color { text, color } => Ok(MessageNode::Color {
                text: text.clone(),
                color: color.clone(),
            }),
            MessagePart::PlayerId { text } => {
                let player = text
                    .parse::<u32>()
                    .ok()
                    .and_then(|slot| self.roster.player(slot, None))
                    .ok_or_else(|| DecodeError::UnresolvedPlayer(text.clone()))?;
                Ok(self.player_node(player))
            }
            MessagePart::PlayerName { text } => {
                let player = self
                    .roster
                    .own_team()
                    .and_then(|team| self.roster.find_by_name(team, text))
                    .ok_or_else(|| DecodeError::UnresolvedPlayer(text.clone()))?;
                Ok(self.player_node(player))
            }
            MessagePart::ItemId {
                text,
                flags,
                player,
            }
            | MessagePart::ItemName {
                text,
                flags,
                player,
            } => self.item_node(part, text, *flags, *player, detail),
            MessagePart::LocationId { text, player } => {
                let game = self.roster.player(*player, None).map(|p| p.game.as_str());
                let Ok(id) = text.parse::<i64>() else {
                    return Ok(MessageNode::Location {
                        id: None,
                        name: text.clone(),
                    });
                };
                let name = match game {
                    Some(game) => self.names.location_name(game, id),
                    None => multiworld_datapackage::location_fallback(id),
                };
                Ok(MessageNode::Location { id: Some(id), name })
            }
            MessagePart::LocationName { text, player } => {
                let id = self
                    .roster
                    .player(*player, None)
                    .and_then(|p| self.names.location_id(&p.game, text));
                Ok(MessageNode::Location {
                    id,
                    name: text.clone(),
                })
            }
        }
    }

    fn item_node(
        &self,
        part: &MessagePart,
        text: &str,
        flags: ItemFlags,
        player: u32,
        detail: &PrintJson,
    ) -> Result<MessageNode, DecodeError> {
        if let Some((receiving, team, item)) = detail.item_context() {
            let receiver = self.roster.player(receiving, team).ok_or(DecodeError::UnresolvedItem {
                item: item.item,
                receiving,
            })?;
            let sender = self.roster.player(item.player, Some(receiver.team));
            return Ok(MessageNode::Item(self.names.resolve_item(
                item,
                sender,
                Some(receiver),
            )));
        }

        // No item record on the line: the part's player owns the item.
        let receiver = self.roster.player(player, None);
        let id = match part {
            MessagePart::ItemId { .. } => text.parse::<i64>().ok(),
            _ => receiver.and_then(|r| self.names.item_id(&r.game, text)),
        };
        let Some(id) = id else {
            return Ok(MessageNode::Text {
                text: text.to_string(),
            });
        };
        let Some(receiver) = receiver else {
            return Err(DecodeError::UnresolvedItem {
                item: id,
                receiving: player,
            });
        };
        let item = NetworkItem {
            item: id,
            location: 0,
            player,
            flags,
        };
        let mut resolved = self.names.resolve_item(&item, None, Some(receiver));
        if matches!(part, MessagePart::ItemName { .. }) {
            resolved.name = text.to_string();
        }
        Ok(MessageNode::Item(resolved))
    }

    fn player_node(&self, player: &Player) -> MessageNode {
        let own = self.roster.own().ok();
        let teammate = own.is_some_and(|own| own.team == player.team);
        let is_self = own.is_some_and(|own| own.team == player.team && own.slot == player.slot);
        MessageNode::Player {
            player: player.clone(),
            teammate,
            is_self,
        }
    }
}
