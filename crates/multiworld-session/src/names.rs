//! Id-to-name resolution for one room.
//!
//! The cache is keyed by `(game, checksum)`; the room's `RoomInfo` says
//! which checksum each game uses. [`NameResolver`] joins the two so
//! callers only name the game.

use std::collections::BTreeMap;
use std::sync::Arc;

use multiworld_datapackage::{DataPackageCache, GameTable, item_fallback, location_fallback};
use multiworld_protocol::{ItemFlags, NetworkItem};

use crate::Player;

/// Turns item and location ids into names for one room.
///
/// Holds the room's per-game checksums and reads the shared
/// [`DataPackageCache`] with them, so two rooms on different versions of a
/// game each see their own names.
#[derive(Debug, Clone)]
pub struct NameResolver {
    cache: Arc<DataPackageCache>,
    checksums: BTreeMap<String, String>,
}

impl NameResolver {
    /// A resolver that knows no games until
    /// [`set_checksums`](Self::set_checksums).
    pub fn new(cache: Arc<DataPackageCache>) -> Self {
        Self {
            cache,
            checksums: BTreeMap::new(),
        }
    }

    /// Replaces the per-game checksums with those of a new `RoomInfo`.
    pub fn set_checksums(&mut self, checksums: BTreeMap<String, String>) {
        self.checksums = checksums;
    }

    /// `(game, checksum)` pairs in game order.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.checksums
            .iter()
            .map(|(game, checksum)| (game.clone(), checksum.clone()))
            .collect()
    }

    /// The checksum this room announced for `game`.
    pub fn checksum(&self, game: &str) -> Option<&str> {
        self.checksums.get(game).map(String::as_str)
    }

    /// The cached table for `game` at this room's checksum.
    pub fn table(&self, game: &str) -> Option<Arc<GameTable>> {
        self.cache.get(game, self.checksum(game)?)
    }

    /// Item name, or `"Item #<id>"` when the game or id is unknown.
    pub fn item_name(&self, game: &str, id: i64) -> String {
        match self.checksum(game) {
            Some(checksum) => self
                .cache
                .item_name(game, checksum, id, true)
                .unwrap_or_else(|| item_fallback(id)),
            None => item_fallback(id),
        }
    }

    /// Location name, or `"Location #<id>"` when the game or id is unknown.
    pub fn location_name(&self, game: &str, id: i64) -> String {
        match self.checksum(game) {
            Some(checksum) => self
                .cache
                .location_name(game, checksum, id, true)
                .unwrap_or_else(|| location_fallback(id)),
            None => location_fallback(id),
        }
    }

    /// Reverse lookup of an item name.
    pub fn item_id(&self, game: &str, name: &str) -> Option<i64> {
        self.table(game)?.item_id(name)
    }

    pub fn location_id(&self, game: &str, name: &str) -> Option<i64> {
        self.table(game)?.location_id(name)
    }

    /// Attaches names to an item record.
    ///
    /// The item id belongs to the receiver's game and the location to the
    /// sender's. A missing player yields fallback labels.
    pub fn resolve_item(
        &self,
        item: &NetworkItem,
        sender: Option<&Player>,
        receiver: Option<&Player>,
    ) -> ResolvedItem {
        let name = match receiver {
            Some(receiver) => self.item_name(&receiver.game, item.item),
            None => item_fallback(item.item),
        };
        let location_name = match sender {
            Some(sender) => self.location_name(&sender.game, item.location),
            None => location_fallback(item.location),
        };
        ResolvedItem {
            id: item.item,
            name,
            location: item.location,
            location_name,
            flags: item.flags,
            sender: sender.cloned(),
            receiver: receiver.cloned(),
        }
    }
}

/// An item record with its names filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedItem {
    pub id: i64,
    pub name: String,
    pub location: i64,
    pub location_name: String,
    pub flags: ItemFlags,
    /// The player whose world the item was found in.
    pub sender: Option<Player>,
    /// The player the item belongs to.
    pub receiver: Option<Player>,
}

impl ResolvedItem {
    /// Most significant classification, e.g. `"progression"`.
    pub fn label(&self) -> &'static str {
        self.flags.label()
    }
}
