/// Errors from a [`Store`](crate::Store).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file exists but is not a JSON object.
    #[error("store contents are not valid JSON: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("could not serialize store contents: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Renaming the temporary file over the store file failed.
    #[error("could not replace store file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Errors from the data package cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The server answered with a different checksum than it advertised.
    #[error(
        "checksum mismatch for game '{game}': expected '{expected}', got '{actual}'"
    )]
    ChecksumMismatch {
        game: String,
        expected: String,
        actual: String,
    },

    /// The reply to a request for one game did not contain that game.
    #[error("data package reply has no entry for game '{0}'")]
    MissingGame(String),

    /// The fetcher could not deliver a reply at all.
    #[error("fetching the data package for '{game}' failed: {source}")]
    Fetch {
        game: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
