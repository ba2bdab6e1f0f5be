use std::collections::{BTreeMap, HashMap};

use multiworld_protocol::GamePackage;

/// Immutable item and location tables for one game at one checksum.
///
/// Both directions are indexed: names are kept in a sorted map and ids in a
/// hash map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameTable {
    game: String,
    checksum: String,
    items: BTreeMap<String, i64>,
    locations: BTreeMap<String, i64>,
    item_names: HashMap<i64, String>,
    location_names: HashMap<i64, String>,
}

impl GameTable {
    /// Indexes `package` for `game`. The checksum is taken from the package.
    pub fn new(game: impl Into<String>, package: GamePackage) -> Self {
        let GamePackage {
            item_name_to_id,
            location_name_to_id,
            checksum,
        } = package;
        Self {
            game: game.into(),
            checksum,
            item_names: reverse(&item_name_to_id),
            location_names: reverse(&location_name_to_id),
            items: item_name_to_id,
            locations: location_name_to_id,
        }
    }

    pub fn game(&self) -> &str {
        &self.game
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Item name for `id`, if this game defines it.
    pub fn item_name(&self, id: i64) -> Option<&str> {
        self.item_names.get(&id).map(String::as_str)
    }

    /// Location name for `id`, if this game defines it.
    pub fn location_name(&self, id: i64) -> Option<&str> {
        self.location_names.get(&id).map(String::as_str)
    }

    pub fn item_id(&self, name: &str) -> Option<i64> {
        self.items.get(name).copied()
    }

    pub fn location_id(&self, name: &str) -> Option<i64> {
        self.locations.get(name).copied()
    }

    /// `(name, id)` pairs sorted by name.
    pub fn items(&self) -> impl Iterator<Item = (&str, i64)> {
        self.items.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// `(name, id)` pairs sorted by name.
    pub fn locations(&self) -> impl Iterator<Item = (&str, i64)> {
        self.locations.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// The wire form, as persisted.
    pub fn to_package(&self) -> GamePackage {
        GamePackage {
            item_name_to_id: self.items.clone(),
            location_name_to_id: self.locations.clone(),
            checksum: self.checksum.clone(),
        }
    }
}

fn reverse(forward: &BTreeMap<String, i64>) -> HashMap<i64, String> {
    forward
        .iter()
        .map(|(name, id)| (*id, name.clone()))
        .collect()
}
