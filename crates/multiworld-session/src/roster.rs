//! Player roster: every slot of every team in the room.
//!
//! Built from `Connected` and patched by `RoomUpdate`. Slot 0 of each team
//! is a synthetic entry for the room server itself, so log lines that
//! mention "player 0" still resolve.

use std::collections::BTreeMap;

use multiworld_protocol::{ConnectedPacket, NetworkPlayer, ROOM_GAME, SlotType};

use crate::SessionError;

/// One slot on one team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub team: u32,
    pub slot: u32,
    /// Slot name chosen at generation time.
    pub name: String,
    /// Display name; players may change it during the game.
    pub alias: String,
    pub game: String,
    pub kind: SlotType,
    /// Member slots if this is a group.
    pub group_members: Vec<u32>,
}

impl Player {
    fn room(team: u32) -> Self {
        Self {
            team,
            slot: 0,
            name: ROOM_GAME.to_string(),
            alias: ROOM_GAME.to_string(),
            game: ROOM_GAME.to_string(),
            kind: SlotType::Spectator,
            group_members: Vec::new(),
        }
    }

    /// Whether this slot stands for a group of other slots.
    pub fn is_group(&self) -> bool {
        self.kind == SlotType::Group
    }
}

/// A player whose alias changed in a `RoomUpdate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasChange {
    /// The entry after the change.
    pub player: Player,
    pub old_alias: String,
    pub new_alias: String,
}

/// Every player in the room, indexed by team and slot.
///
/// Slot 0 of each team is a synthetic entry named `Archipelago` that stands
/// for the server itself. Rebuilt on every login and patched by alias
/// changes in `RoomUpdate`.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    teams: BTreeMap<u32, BTreeMap<u32, Player>>,
    own: Option<(u32, u32)>,
}

impl Roster {
    /// An empty roster. Lookups fail until [`rebuild`](Self::rebuild).
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the roster with the players listed in `connected`.
    pub fn rebuild(&mut self, connected: &ConnectedPacket) {
        self.teams.clear();
        for network in &connected.players {
            let info = connected.slot_info.get(&network.slot);
            let team = self
                .teams
                .entry(network.team)
                .or_insert_with(|| BTreeMap::from([(0, Player::room(network.team))]));
            team.insert(
                network.slot,
                Player {
                    team: network.team,
                    slot: network.slot,
                    name: network.name.clone(),
                    alias: network.alias.clone(),
                    game: info.map(|i| i.game.clone()).unwrap_or_default(),
                    kind: info.map_or(SlotType::Player, |i| i.kind),
                    group_members: info.map(|i| i.group_members.clone()).unwrap_or_default(),
                },
            );
        }
        self.teams
            .entry(connected.team)
            .or_insert_with(|| BTreeMap::from([(0, Player::room(connected.team))]));
        self.own = Some((connected.team, connected.slot));
        tracing::debug!(
            teams = self.teams.len(),
            team = connected.team,
            slot = connected.slot,
            "roster rebuilt"
        );
    }

    /// Looks up a slot. `team` defaults to the own team.
    pub fn player(&self, slot: u32, team: Option<u32>) -> Option<&Player> {
        let team = team.or_else(|| self.own_team())?;
        self.teams.get(&team)?.get(&slot)
    }

    /// The logged-in player.
    ///
    /// # Errors
    /// Returns [`SessionError::NotConnected`] before the first login.
    pub fn own(&self) -> Result<&Player, SessionError> {
        let (team, slot) = self.own.ok_or(SessionError::NotConnected)?;
        self.player(slot, Some(team)).ok_or(SessionError::NotConnected)
    }

    /// The own team, known after the first login.
    pub fn own_team(&self) -> Option<u32> {
        self.own.map(|(team, _)| team)
    }

    /// Members of a group slot; empty for anything else.
    pub fn members(&self, player: &Player) -> Vec<&Player> {
        if !player.is_group() {
            return Vec::new();
        }
        self.team(player.team)
            .filter(|p| player.group_members.contains(&p.slot))
            .collect()
    }

    /// Group slots that list `player` as a member. The room player belongs
    /// to no group.
    pub fn groups(&self, player: &Player) -> Vec<&Player> {
        if player.slot == 0 {
            return Vec::new();
        }
        self.team(player.team)
            .filter(|p| p.is_group() && p.group_members.contains(&player.slot))
            .collect()
    }

    /// Applies the player list from a `RoomUpdate` and returns the alias
    /// changes it carried. Unknown slots are ignored.
    pub fn apply_update(&mut self, players: &[NetworkPlayer]) -> Vec<AliasChange> {
        let mut changes = Vec::new();
        for network in players {
            let Some(entry) = self
                .teams
                .get_mut(&network.team)
                .and_then(|team| team.get_mut(&network.slot))
            else {
                tracing::debug!(
                    team = network.team,
                    slot = network.slot,
                    "ignoring update for unknown slot"
                );
                continue;
            };
            if entry.alias != network.alias {
                let old_alias = std::mem::replace(&mut entry.alias, network.alias.clone());
                changes.push(AliasChange {
                    player: entry.clone(),
                    old_alias,
                    new_alias: network.alias.clone(),
                });
            }
            entry.name.clone_from(&network.name);
        }
        changes
    }

    /// Finds a player on `team` by slot name, then by alias.
    pub fn find_by_name(&self, team: u32, name: &str) -> Option<&Player> {
        let mut team = self.team(team).filter(|p| p.slot != 0);
        team.clone()
            .find(|p| p.name == name)
            .or_else(|| team.find(|p| p.alias == name))
    }

    /// Team numbers in ascending order.
    pub fn teams(&self) -> impl Iterator<Item = u32> + '_ {
        self.teams.keys().copied()
    }

    /// Players on `team` in slot order, the room player first.
    pub fn team(&self, team: u32) -> impl Iterator<Item = &Player> + Clone {
        self.teams
            .get(&team)
            .into_iter()
            .flat_map(|players| players.values())
    }

    /// Whether no login has populated the roster yet.
    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}
