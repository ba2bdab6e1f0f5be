//! The multi-session client.
//!
//! A [`Client`] owns every [`Session`] of the process, the data package
//! cache they share, and the credentials saved for each successful login.
//!
//! ```text
//! connect(url, slot, password)
//!   ├─ reject if slot@host:port is already registered
//!   ├─ Session::login (no retry on the first attempt)
//!   ├─ register by id, save credentials/<connection string>/<slot>
//!   └─ watch the session: on Closed, unregister and drop the credentials
//!
//! start()  → connect() for every saved record; drop the ones that fail
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use multiworld_datapackage::{DataPackageCache, Store};
use multiworld_session::{Credentials, Session, SessionConfig, SessionEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::MultiworldError;

/// Store key prefix of saved connection records.
pub const CREDENTIALS_PREFIX: &str = "credentials/";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Configuration for a [`Client`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Template every new session is created with.
    pub session: SessionConfig,
}

impl ClientConfig {
    /// Replaces the session template.
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}

/// What is saved for a session that logged in successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCredentials {
    /// The endpoint that answered, e.g. `wss://room.example:38281`.
    pub address: String,
    /// Slot name used to log in.
    pub slot: String,
    /// Room password, empty for open rooms.
    #[serde(default)]
    pub password: String,
}

impl SavedCredentials {
    /// Store key of this record: `credentials/<address>/<slot>`.
    ///
    /// One record per slot per endpoint, so logging in again overwrites
    /// the previous record instead of adding a second one.
    pub fn key(&self) -> String {
        format!("{CREDENTIALS_PREFIX}{}/{}", self.address, self.slot)
    }
}

struct ClientInner {
    config: ClientConfig,
    store: Arc<dyn Store>,
    cache: Arc<DataPackageCache>,
    /// Registered sessions, oldest first.
    sessions: Mutex<Vec<Session>>,
    /// Lowercased display names of sessions still logging in.
    pending: Mutex<HashSet<String>>,
}

/// Owns the sessions of one process.
///
/// Cloning is cheap; all clones share the same registry, cache and store.
/// Sessions are registered only after a successful login and leave the
/// registry when they close, whether through [`disconnect`](Self::disconnect),
/// [`shutdown`](Self::shutdown), or a refusal while reconnecting.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Creates a client persisting to `store`. Data packages already in the
    /// store are loaded into the cache.
    ///
    /// # Errors
    /// Returns [`MultiworldError::Cache`] if the store cannot be read.
    pub fn new(store: Arc<dyn Store>, config: ClientConfig) -> Result<Self, MultiworldError> {
        let cache = Arc::new(DataPackageCache::load(Arc::clone(&store))?);
        tracing::info!(packages = cache.len(), "client ready");
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                store,
                cache,
                sessions: Mutex::new(Vec::new()),
                pending: Mutex::new(HashSet::new()),
            }),
        })
    }

    /// The data package cache every session of this client reads from.
    pub fn cache(&self) -> &Arc<DataPackageCache> {
        &self.inner.cache
    }

    /// Creates a session, logs it in and registers it.
    ///
    /// `existing_id` keeps a caller-chosen session id; otherwise a fresh
    /// one is generated.
    ///
    /// # Errors
    /// - [`MultiworldError::DuplicateSession`] if `slot@host:port` is taken,
    ///   compared case-insensitively.
    /// - [`MultiworldError::Session`] if the login fails.
    pub async fn connect(
        &self,
        url: &str,
        slot: &str,
        password: &str,
        existing_id: Option<&str>,
    ) -> Result<Session, MultiworldError> {
        let credentials = Credentials::new(url, slot, password);
        let config = self.inner.config.session.clone();
        let cache = Arc::clone(&self.inner.cache);
        let session = match existing_id {
            Some(id) => Session::with_id(id, credentials, config, cache)?,
            None => Session::new(credentials, config, cache)?,
        };

        let display_name = session.display_name();
        let identity = display_name.to_lowercase();
        {
            let sessions = lock(&self.inner.sessions);
            let mut pending = lock(&self.inner.pending);
            let taken = sessions
                .iter()
                .any(|s| s.display_name().to_lowercase() == identity);
            if taken || !pending.insert(identity.clone()) {
                tracing::warn!(session = %display_name, "session already exists");
                return Err(MultiworldError::DuplicateSession(display_name));
            }
        }

        tracing::info!(session = %display_name, "connecting");
        let events = session.subscribe();
        let result = self.register(&session, events).await;
        lock(&self.inner.pending).remove(&identity);

        if let Err(error) = result {
            tracing::error!(session = %display_name, error = %error, "could not create session");
            session.close().await;
            return Err(error);
        }
        Ok(session)
    }

    async fn register(
        &self,
        session: &Session,
        events: broadcast::Receiver<SessionEvent>,
    ) -> Result<(), MultiworldError> {
        session.login(false).await?;

        let saved = saved_credentials(session);
        let key = saved.key();
        let value = serde_json::to_value(&saved).map_err(|source| MultiworldError::Credentials {
            key: key.clone(),
            source,
        })?;
        self.inner.store.put(&key, value)?;

        lock(&self.inner.sessions).push(session.clone());
        tokio::spawn(watch_session(
            Arc::downgrade(&self.inner),
            session.id().to_string(),
            key,
            events,
        ));
        tracing::info!(session = %session.display_name(), id = %session.id(), "session registered");
        Ok(())
    }

    /// Reconnects every saved record.
    ///
    /// Records that fail to connect are deleted. Returns the sessions that
    /// came back.
    ///
    /// # Errors
    /// Returns [`MultiworldError::Store`] if the store cannot be read.
    pub async fn start(&self) -> Result<Vec<Session>, MultiworldError> {
        let keys = self.inner.store.keys_with_prefix(CREDENTIALS_PREFIX)?;
        let mut started = Vec::new();

        for key in keys {
            let Some(value) = self.inner.store.get(&key)? else {
                continue;
            };
            let saved = match serde_json::from_value::<SavedCredentials>(value) {
                Ok(saved) => saved,
                Err(error) => {
                    tracing::warn!(key = %key, error = %error, "unreadable saved session, removing");
                    self.inner.store.remove(&key)?;
                    continue;
                }
            };

            match self.connect(&saved.address, &saved.slot, &saved.password, None).await {
                Ok(session) => started.push(session),
                Err(MultiworldError::DuplicateSession(display_name)) => {
                    tracing::debug!(session = %display_name, "saved session already running");
                }
                Err(error) => {
                    tracing::warn!(
                        address = %saved.address,
                        slot = %saved.slot,
                        error = %error,
                        "couldn't reconnect saved session, removing"
                    );
                    self.inner.store.remove(&key)?;
                }
            }
        }
        Ok(started)
    }

    /// Looks a session up by name.
    ///
    /// Without a query the oldest session is returned. Otherwise the first
    /// session whose `slot@host:port` equals the query wins, then the first
    /// whose slot, `host:port` or host equals it. Comparisons ignore case.
    pub fn find_session(&self, query: Option<&str>) -> Option<Session> {
        let sessions = lock(&self.inner.sessions);
        let Some(query) = query.filter(|q| !q.is_empty()) else {
            return sessions.first().cloned();
        };
        let query = query.to_lowercase();

        if let Some(exact) = sessions
            .iter()
            .find(|s| s.display_name().to_lowercase() == query)
        {
            return Some(exact.clone());
        }
        sessions
            .iter()
            .find(|s| {
                let address = s.address();
                let host_port = format!("{}:{}", address.host(), address.port());
                s.slot().to_lowercase() == query || host_port == query || address.host() == query
            })
            .cloned()
    }

    /// The registered session with this id, if any.
    pub fn session(&self, id: &str) -> Option<Session> {
        lock(&self.inner.sessions)
            .iter()
            .find(|s| s.id() == id)
            .cloned()
    }

    /// Ids of every registered session, oldest first.
    pub fn session_ids(&self) -> Vec<String> {
        lock(&self.inner.sessions)
            .iter()
            .map(|s| s.id().to_string())
            .collect()
    }

    /// `(id, slot@host:port)` for every session, oldest first.
    pub fn session_table(&self) -> Vec<(String, String)> {
        lock(&self.inner.sessions)
            .iter()
            .map(|s| (s.id().to_string(), s.display_name()))
            .collect()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        lock(&self.inner.sessions).len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        lock(&self.inner.sessions).is_empty()
    }

    /// Closes a session on purpose. Its saved credentials are deleted.
    ///
    /// Returns whether the id was registered.
    pub async fn disconnect(&self, id: &str) -> bool {
        let Some(session) = self.inner.unregister(id) else {
            return false;
        };
        session.close().await;
        let key = saved_credentials(&session).key();
        if let Err(error) = self.inner.store.remove(&key) {
            tracing::warn!(id = %id, key = %key, error = %error, "could not remove credentials");
        }
        true
    }

    /// Closes every session but keeps the saved credentials, so the next
    /// [`start`](Self::start) reconnects them.
    ///
    /// The client stays usable: sessions connected afterwards are watched
    /// as usual.
    pub async fn shutdown(&self) {
        // Unregistered first, so their watchers leave the credentials alone.
        let sessions: Vec<Session> = std::mem::take(&mut *lock(&self.inner.sessions));
        tracing::info!(count = sessions.len(), "shutting down");
        for session in sessions {
            session.close().await;
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("sessions", &self.session_table())
            .finish_non_exhaustive()
    }
}

impl ClientInner {
    fn unregister(&self, id: &str) -> Option<Session> {
        let mut sessions = lock(&self.sessions);
        let index = sessions.iter().position(|s| s.id() == id)?;
        Some(sessions.remove(index))
    }
}

fn saved_credentials(session: &Session) -> SavedCredentials {
    SavedCredentials {
        address: session
            .endpoint()
            .map(|e| e.connection_string())
            .unwrap_or_else(|| session.credentials().address.clone()),
        slot: session.slot().to_string(),
        password: session.credentials().password.clone(),
    }
}

/// Removes a session and its saved credentials once it closes.
///
/// A session that is no longer registered when it closes was taken out by
/// [`Client::shutdown`] or [`Client::disconnect`], which handle the
/// credentials themselves.
async fn watch_session(
    client: Weak<ClientInner>,
    id: String,
    key: String,
    mut events: broadcast::Receiver<SessionEvent>,
) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Closed) => break,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }

    let Some(client) = client.upgrade() else {
        return;
    };
    if client.unregister(&id).is_none() {
        return;
    }
    match client.store.remove(&key) {
        Ok(_) => tracing::info!(id = %id, key = %key, "session closed, credentials removed"),
        Err(error) => tracing::warn!(id = %id, key = %key, error = %error, "could not remove credentials"),
    }
}
