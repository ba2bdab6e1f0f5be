//! String-keyed JSON value store.
//!
//! The cache and the client persist through the [`Store`] trait and never
//! touch files directly. [`MemoryStore`] keeps everything in a map;
//! [`JsonFileStore`] mirrors the same map into one JSON file and rewrites
//! it atomically after every mutation.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::StoreError;

/// A synchronous key-value store holding JSON values.
///
/// Keys are `/`-separated paths such as `datapackage/Alpha/abc123`.
pub trait Store: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Inserts or replaces the value under `key`.
    fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Deletes `key`. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// All keys starting with `prefix`, in sorted order.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

fn lock(map: &Mutex<BTreeMap<String, Value>>) -> MutexGuard<'_, BTreeMap<String, Value>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

fn prefixed(map: &BTreeMap<String, Value>, prefix: &str) -> Vec<String> {
    map.range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, _)| key.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// A [`Store`] that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        lock(&self.entries).insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(lock(&self.entries).remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(prefixed(&lock(&self.entries), prefix))
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// A [`Store`] backed by a single JSON object on disk.
///
/// The whole object is rewritten on every `put`/`remove`: it is written to
/// a temporary file in the same directory and renamed over the original, so
/// a crash leaves either the old or the new contents.
///
/// Every mutation costs a full rewrite and an fsync, which suits the small
/// files this store is made for: a handful of data packages and saved
/// logins. Async callers on a hot path should move writes to the blocking
/// pool, as [`DataPackageCache::fetch`](crate::DataPackageCache::fetch) does.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Opens the store at `path`, starting empty if the file is missing.
    ///
    /// # Errors
    /// Returns [`StoreError::Corrupt`] if the file exists but does not hold
    /// a JSON object, or [`StoreError::Io`] if it cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(StoreError::Corrupt)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "store opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// The file this store mirrors.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let bytes = serde_json::to_vec_pretty(entries).map_err(StoreError::Serialize)?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(&self.path)?;
        Ok(())
    }
}

impl Store for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = lock(&self.entries);
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = lock(&self.entries);
        if entries.remove(key).is_none() {
            return Ok(false);
        }
        self.flush(&entries)?;
        Ok(true)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(prefixed(&lock(&self.entries), prefix))
    }
}
