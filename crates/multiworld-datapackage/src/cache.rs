//! The shared data package cache.
//!
//! Entries are keyed by `(game, checksum)` and are write-once: the first
//! table stored for a pair wins, and later stores of the same pair return
//! that first table untouched. A new checksum for the same game is a new
//! entry next to the old one. Because entries never change after insert,
//! any number of sessions can read them concurrently.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use multiworld_protocol::{DataPackage, GamePackage};
use serde::{Deserialize, Serialize};

use crate::{CacheError, GameTable, Store};

/// Key prefix for persisted cache entries.
pub const DATAPACKAGE_PREFIX: &str = "datapackage/";

/// Something that can ask a room server for one game's data package.
///
/// The session's room socket implements this by sending
/// `GetDataPackage { games: [game] }` and waiting for the `DataPackage`
/// reply.
pub trait PackageFetcher: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Requests the data package of a single game.
    fn fetch_package(
        &self,
        game: &str,
    ) -> impl std::future::Future<Output = Result<DataPackage, Self::Error>> + Send;
}

#[derive(Serialize, Deserialize)]
struct StoredPackage {
    game: String,
    #[serde(flatten)]
    package: GamePackage,
}

fn persist(store: &dyn Store, table: &GameTable) {
    let key = format!("{DATAPACKAGE_PREFIX}{}/{}", table.game(), table.checksum());
    let stored = StoredPackage {
        game: table.game().to_string(),
        package: table.to_package(),
    };
    let result = serde_json::to_value(&stored)
        .map_err(|e| e.to_string())
        .and_then(|value| store.put(&key, value).map_err(|e| e.to_string()));
    if let Err(error) = result {
        tracing::warn!(key = %key, error = %error, "could not persist data package");
    }
}

/// Checksum-addressed, persisted `(game, checksum) → GameTable` cache.
pub struct DataPackageCache {
    entries: DashMap<(String, String), Arc<GameTable>>,
    store: Arc<dyn Store>,
}

impl DataPackageCache {
    /// Creates an empty cache that persists new entries into `store`.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            entries: DashMap::new(),
            store,
        }
    }

    /// Creates a cache warmed with every entry already in `store`.
    ///
    /// Entries that fail to parse are logged and skipped.
    ///
    /// # Errors
    /// Returns [`CacheError::Store`] if the store cannot be read.
    pub fn load(store: Arc<dyn Store>) -> Result<Self, CacheError> {
        let cache = Self::new(store);
        for key in cache.store.keys_with_prefix(DATAPACKAGE_PREFIX)? {
            let Some(value) = cache.store.get(&key)? else {
                continue;
            };
            match serde_json::from_value::<StoredPackage>(value) {
                Ok(StoredPackage { game, package }) => {
                    let table = Arc::new(GameTable::new(game, package));
                    cache.entries.insert(
                        (table.game().to_string(), table.checksum().to_string()),
                        table,
                    );
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "skipping unreadable data package entry");
                }
            }
        }
        tracing::info!(entries = cache.entries.len(), "data package cache loaded");
        Ok(cache)
    }

    /// The table for `(game, checksum)`, if cached.
    pub fn get(&self, game: &str, checksum: &str) -> Option<Arc<GameTable>> {
        self.entries
            .get(&(game.to_string(), checksum.to_string()))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Whether `(game, checksum)` is cached.
    pub fn contains(&self, game: &str, checksum: &str) -> bool {
        self.entries
            .contains_key(&(game.to_string(), checksum.to_string()))
    }

    /// Number of cached `(game, checksum)` pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stores `package` for `game` unless its pair is already cached.
    ///
    /// Returns the cached table, which is the existing one if another
    /// writer got there first. Only the first writer persists.
    pub fn insert(&self, game: &str, package: GamePackage) -> Arc<GameTable> {
        let (table, created) = self.insert_entry(game, package);
        if created {
            persist(self.store.as_ref(), &table);
        }
        table
    }

    /// Like [`insert`](Self::insert), but writes to the store on the
    /// blocking pool so a file-backed store does not stall the runtime.
    async fn insert_async(&self, game: &str, package: GamePackage) -> Arc<GameTable> {
        let (table, created) = self.insert_entry(game, package);
        if created {
            let store = Arc::clone(&self.store);
            let stored = Arc::clone(&table);
            let task = tokio::task::spawn_blocking(move || persist(store.as_ref(), &stored));
            if let Err(error) = task.await {
                tracing::warn!(game, error = %error, "data package persist task failed");
            }
        }
        table
    }

    fn insert_entry(&self, game: &str, package: GamePackage) -> (Arc<GameTable>, bool) {
        let key = (game.to_string(), package.checksum.clone());
        match self.entries.entry(key) {
            Entry::Occupied(existing) => (Arc::clone(existing.get()), false),
            Entry::Vacant(slot) => {
                let table = Arc::new(GameTable::new(game, package));
                slot.insert(Arc::clone(&table));
                tracing::info!(game, checksum = table.checksum(), "storing data package");
                (table, true)
            }
        }
    }

    /// Makes sure every `(game, checksum)` pair in `requests` is cached.
    ///
    /// Pairs already cached cost nothing. For each remaining pair one
    /// request goes through `fetcher`. A reply whose checksum differs from
    /// the requested one is logged as [`CacheError::ChecksumMismatch`] and
    /// skipped; the rest of the batch continues.
    ///
    /// Returns the tables for every requested pair that is cached
    /// afterwards, in request order.
    ///
    /// # Errors
    /// Returns [`CacheError::Fetch`] if the fetcher itself fails.
    pub async fn fetch<F: PackageFetcher>(
        &self,
        fetcher: &F,
        requests: &[(String, String)],
    ) -> Result<Vec<Arc<GameTable>>, CacheError> {
        let mut tables = Vec::with_capacity(requests.len());

        for (game, checksum) in requests {
            if let Some(table) = self.get(game, checksum) {
                tracing::debug!(game = %game, checksum = %checksum, "data package cached");
                tables.push(table);
                continue;
            }

            tracing::info!(game = %game, checksum = %checksum, "fetching data package");
            let mut reply = fetcher.fetch_package(game).await.map_err(|e| {
                CacheError::Fetch {
                    game: game.clone(),
                    source: Box::new(e),
                }
            })?;

            let Some(package) = reply.games.remove(game) else {
                let error = CacheError::MissingGame(game.clone());
                tracing::warn!(%error, "skipping data package");
                continue;
            };

            if package.checksum != *checksum {
                let error = CacheError::ChecksumMismatch {
                    game: game.clone(),
                    expected: checksum.clone(),
                    actual: package.checksum,
                };
                tracing::warn!(%error, "skipping data package");
                continue;
            }

            tables.push(self.insert_async(game, package).await);
        }

        Ok(tables)
    }

    /// Item name for `id`, or `"Item #<id>"` when unknown and
    /// `use_fallback` is set.
    pub fn item_name(
        &self,
        game: &str,
        checksum: &str,
        id: i64,
        use_fallback: bool,
    ) -> Option<String> {
        self.get(game, checksum)
            .and_then(|table| table.item_name(id).map(str::to_owned))
            .or_else(|| use_fallback.then(|| item_fallback(id)))
    }

    /// Location name for `id`, or `"Location #<id>"` when unknown and
    /// `use_fallback` is set.
    pub fn location_name(
        &self,
        game: &str,
        checksum: &str,
        id: i64,
        use_fallback: bool,
    ) -> Option<String> {
        self.get(game, checksum)
            .and_then(|table| table.location_name(id).map(str::to_owned))
            .or_else(|| use_fallback.then(|| location_fallback(id)))
    }
}

impl std::fmt::Debug for DataPackageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataPackageCache")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

/// Label shown for an item id no table knows: `Item #<id>`.
pub fn item_fallback(id: i64) -> String {
    format!("Item #{id}")
}

/// Label shown for a location id no table knows: `Location #<id>`.
pub fn location_fallback(id: i64) -> String {
    format!("Location #{id}")
}
