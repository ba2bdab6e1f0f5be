//! Data package cache for multiworld sessions.
//!
//! A *data package* is the item and location name table of one game. The
//! room server identifies each version of it by a checksum, so the cache is
//! keyed by `(game, checksum)` and an entry never changes once stored.
//!
//! - [`DataPackageCache`]: the shared, write-once cache and its `fetch`
//!   batch operation.
//! - [`GameTable`]: one immutable entry with forward and reverse lookups.
//! - [`PackageFetcher`]: the seam through which the cache asks a room
//!   server for a game it does not have.
//! - [`Store`], [`MemoryStore`], [`JsonFileStore`]: the key-value store
//!   entries are persisted to so a restart does not refetch them.

mod cache;
mod error;
mod store;
mod table;

pub use cache::{
    DATAPACKAGE_PREFIX, DataPackageCache, PackageFetcher, item_fallback,
    location_fallback,
};
pub use error::{CacheError, StoreError};
pub use store::{JsonFileStore, MemoryStore, Store};
pub use table::GameTable;
