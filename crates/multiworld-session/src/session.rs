//! One slot in one room: login, reconnect, and the state the room reports.
//!
//! A [`Session`] is a cheap, clonable handle. All clones share one room
//! socket and one copy of the slot's state. Packets are applied on the
//! socket's reader task in arrival order; observers follow along through
//! [`Session::subscribe`] (events) and [`Session::watch_state`] (state).

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use multiworld_datapackage::DataPackageCache;
use multiworld_protocol::{
    ClientPacket, ClientStatus, DEATH_LINK_TAG, DeathLink, NetworkItem, PacketKind,
    ServerPacket,
};
use multiworld_transport::{Endpoint, RoomAddress};
use rand::Rng;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::{
    Backoff, ChatHistory, Message, MessageDecoder, MessageLog, NameResolver, Player,
    ResolvedItem, RoomSocket, Roster, SessionConfig, SessionError, SessionEvent,
    SessionState, SocketEvent, SocketHandler, Tracker,
};

/// Where and as whom to log in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Room address as typed by the user, e.g. `room.example:38281`.
    pub address: String,
    /// Slot name to log in as.
    pub slot: String,
    /// Room password, empty for open rooms.
    pub password: String,
}

impl Credentials {
    /// Bundles a login. The address is only parsed when a session is
    /// created from it.
    pub fn new(
        address: impl Into<String>,
        slot: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            slot: slot.into(),
            password: password.into(),
        }
    }
}

/// Generates a random session id.
///
/// 128 bits from the thread-local CSPRNG, hex encoded. Also sent as the
/// login `uuid`.
fn generate_id() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct SlotState {
    tracker: Tracker,
    roster: Roster,
    names: NameResolver,
    log: MessageLog,
    chat: ChatHistory,
    tags: Vec<String>,
    endpoint: Option<Endpoint>,
    slot_data: Value,
    /// Set by the first successful login and never cleared.
    ready: bool,
    last_countdown: Option<i64>,
}

struct Inner {
    id: String,
    credentials: Credentials,
    address: RoomAddress,
    config: SessionConfig,
    cache: Arc<DataPackageCache>,
    socket: RoomSocket,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    slot: Mutex<SlotState>,
    closed: AtomicBool,
    /// Serializes login attempts.
    login_lock: tokio::sync::Mutex<()>,
    reconnect: Mutex<Option<JoinHandle<()>>>,
}

/// A logged-in (or logging-in) slot in a room.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Creates a session with a fresh id. Nothing is dialed until
    /// [`login`](Self::login).
    ///
    /// # Errors
    /// Returns [`SessionError::Transport`] if the address cannot be parsed.
    pub fn new(
        credentials: Credentials,
        config: SessionConfig,
        cache: Arc<DataPackageCache>,
    ) -> Result<Self, SessionError> {
        Self::with_id(generate_id(), credentials, config, cache)
    }

    /// Like [`new`](Self::new) but keeps a caller-chosen id.
    pub fn with_id(
        id: impl Into<String>,
        credentials: Credentials,
        config: SessionConfig,
        cache: Arc<DataPackageCache>,
    ) -> Result<Self, SessionError> {
        let address = RoomAddress::parse(&credentials.address)?;
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let slot = SlotState {
            tracker: Tracker::new(),
            roster: Roster::new(),
            names: NameResolver::new(Arc::clone(&cache)),
            log: MessageLog::new(config.log_capacity),
            chat: ChatHistory::new(config.chat_history_capacity),
            tags: config.tags.clone(),
            endpoint: None,
            slot_data: Value::Null,
            ready: false,
            last_countdown: None,
        };

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let handler: SocketHandler = Arc::new(move |event: SocketEvent<'_>| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_socket_event(event);
                }
            });
            Inner {
                id: id.into(),
                credentials,
                address,
                socket: RoomSocket::new(config.socket.clone(), handler),
                config,
                cache,
                state,
                events,
                slot: Mutex::new(slot),
                closed: AtomicBool::new(false),
                login_lock: tokio::sync::Mutex::new(()),
                reconnect: Mutex::new(None),
            }
        });
        tracing::debug!(session = %inner.id, address = %inner.credentials.address, "session created");
        Ok(Self { inner })
    }

    // -- identity ----------------------------------------------------------

    /// The session id, also sent as the login `uuid`.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The credentials as given, before any endpoint was verified.
    pub fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }

    /// The slot name this session logs in as.
    pub fn slot(&self) -> &str {
        &self.inner.credentials.slot
    }

    /// The parsed room address.
    pub fn address(&self) -> &RoomAddress {
        &self.inner.address
    }

    /// `slot@host:port`, used to tell sessions apart.
    pub fn display_name(&self) -> String {
        format!(
            "{}@{}:{}",
            self.inner.credentials.slot,
            self.inner.address.host(),
            self.inner.address.port()
        )
    }

    /// The endpoint of the last successful handshake.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.inner.slot().endpoint.clone()
    }

    // -- lifecycle ---------------------------------------------------------

    /// The current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Follows state changes. Only the latest state is kept, so a slow
    /// receiver may skip intermediate states.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Subscribes to events emitted from now on.
    ///
    /// Events come out in the order packets arrived. A receiver that falls
    /// more than [`SessionConfig::event_capacity`] events behind gets
    /// `RecvError::Lagged` and misses the oldest ones.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Whether the first login has completed.
    pub fn is_ready(&self) -> bool {
        self.inner.slot().ready
    }

    /// Whether [`close`](Self::close) ran. A closed session never logs in again.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Connects, fetches missing data packages and logs in.
    ///
    /// On failure other than a refusal, `reconnect_on_failure` moves the
    /// session to [`SessionState::Reconnecting`] and keeps retrying in the
    /// background; the error is still returned.
    ///
    /// # Errors
    /// - [`SessionError::Closed`] if the session was closed.
    /// - [`SessionError::LoginRefused`] if the server refused the login.
    /// - [`SessionError::Connect`] if no endpoint answered.
    pub async fn login(&self, reconnect_on_failure: bool) -> Result<(), SessionError> {
        let inner = &self.inner;
        let result = {
            let _guard = inner.login_lock.lock().await;
            if inner.is_closed() {
                return Err(SessionError::Closed);
            }
            inner.try_login().await
        };

        let Err(error) = result else {
            return Ok(());
        };
        if inner.is_closed() {
            return Err(SessionError::Closed);
        }
        match &error {
            SessionError::LoginRefused(reasons) => {
                tracing::warn!(session = %inner.id, reasons = ?reasons, "login refused");
                inner.socket.disconnect(false).await;
                inner.set_state(SessionState::Disconnected);
            }
            _ if reconnect_on_failure => {
                tracing::warn!(session = %inner.id, error = %error, "login failed, will retry");
                inner.schedule_reconnect();
            }
            _ => {
                tracing::warn!(session = %inner.id, error = %error, "login failed");
                inner.socket.disconnect(false).await;
                inner.set_state(SessionState::Disconnected);
            }
        }
        Err(error)
    }

    /// Closes the session for good.
    ///
    /// Cancels a pending reconnect, drops the link and emits
    /// [`SessionEvent::Closed`]. Calling it again does nothing.
    pub async fn close(&self) {
        self.inner.close().await;
    }

    // -- commands ----------------------------------------------------------

    /// Sends a chat line and records it in the chat history.
    ///
    /// # Errors
    /// Returns [`SessionError::NotConnected`] unless the session is ready.
    pub async fn say(&self, text: &str) -> Result<(), SessionError> {
        self.inner.ensure_ready()?;
        self.inner.slot().chat.push(text);
        self.inner
            .socket
            .send(&[ClientPacket::Say {
                text: text.to_string(),
            }])
            .await
    }

    /// Recalls a submitted chat line; see [`ChatHistory::recall`].
    pub fn chat_history(&self, offset: Option<usize>) -> Option<(String, usize)> {
        self.inner.slot().chat.recall(offset)
    }

    /// Reports the client status to the room.
    ///
    /// # Errors
    /// Returns [`SessionError::NotConnected`] unless the session is ready.
    pub async fn update_status(&self, status: ClientStatus) -> Result<(), SessionError> {
        self.inner.ensure_ready()?;
        self.inner
            .socket
            .send(&[ClientPacket::StatusUpdate { status }])
            .await
    }

    /// Shorthand for `update_status(ClientStatus::Ready)`.
    pub async fn set_ready(&self) -> Result<(), SessionError> {
        self.update_status(ClientStatus::Ready).await
    }

    /// Replaces the declared tags. While logged in the server is told at
    /// once; otherwise they apply from the next login.
    pub async fn update_tags<I, S>(&self, tags: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        self.inner.slot().tags.clone_from(&tags);
        if self.state() != SessionState::Ready {
            return Ok(());
        }
        tracing::info!(session = %self.inner.id, tags = ?tags, "updating tags");
        self.inner
            .socket
            .send(&[ClientPacket::ConnectUpdate {
                items_handling: self.inner.config.items_handling,
                tags,
            }])
            .await
    }

    /// The tags declared at the next login, or right now when ready.
    pub fn tags(&self) -> Vec<String> {
        self.inner.slot().tags.clone()
    }

    /// Broadcasts a DeathLink naming the own slot as the source.
    ///
    /// Sent even without the `DeathLink` tag, with a warning, since other
    /// clients filter on their own tags.
    pub async fn trigger_death_link(&self, cause: &str) -> Result<(), SessionError> {
        self.inner.ensure_ready()?;
        let (source, tagged) = {
            let slot = self.inner.slot();
            let own = slot.roster.own()?;
            (
                own.name.clone(),
                slot.tags.iter().any(|t| t == DEATH_LINK_TAG),
            )
        };
        if !tagged {
            tracing::warn!(
                session = %self.inner.id,
                "sending a DeathLink without the DeathLink tag"
            );
        }
        let death = DeathLink {
            source,
            cause: cause.to_string(),
            time: unix_time(),
        };
        self.inner.socket.send(&[death.into_bounce()]).await
    }

    // -- message log -------------------------------------------------------

    /// Every logged message, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.inner.slot().log.iter().cloned().collect()
    }

    /// The log as plain text, one line per message.
    pub fn text_log(&self) -> Vec<String> {
        self.inner.slot().log.iter().map(|m| m.text.clone()).collect()
    }

    /// The log as HTML fragments, one per message.
    pub fn html_log(&self) -> Vec<String> {
        self.inner.slot().log.iter().map(|m| m.html.clone()).collect()
    }

    /// Empties the message log. Chat history is kept.
    pub fn clear_log(&self) {
        self.inner.slot().log.clear();
    }

    /// Adds a local line to the log, e.g. a client-side status message.
    pub fn push_notice(&self, text: &str, hidden: bool) {
        let message = Message::notice(text);
        self.inner.slot().log.push(message.clone());
        self.inner.emit(SessionEvent::Message { message, hidden });
    }

    // -- slot state --------------------------------------------------------

    /// Location ids the slot has checked.
    pub fn checked_locations(&self) -> BTreeSet<i64> {
        self.inner.slot().tracker.checked().clone()
    }

    /// Location ids the slot still has to check.
    pub fn missing_locations(&self) -> BTreeSet<i64> {
        self.inner.slot().tracker.missing().clone()
    }

    /// Items received so far, deduplicated, in arrival order.
    pub fn received_items(&self) -> Vec<NetworkItem> {
        self.inner.slot().tracker.items().to_vec()
    }

    /// Hint points the slot holds.
    pub fn hint_points(&self) -> u32 {
        self.inner.slot().tracker.hint_points()
    }

    /// Hint cost as a percentage of all locations, from `RoomInfo`.
    pub fn hint_cost_percent(&self) -> u32 {
        self.inner.slot().tracker.hint_cost_percent()
    }

    /// Points one hint costs; see [`Tracker::hint_cost`].
    pub fn hint_cost(&self) -> u32 {
        self.inner.slot().tracker.hint_cost()
    }

    /// How many hints the current points buy.
    pub fn hints(&self) -> u32 {
        self.inner.slot().tracker.hints()
    }

    /// The `slot_data` object from the last login, `null` before it.
    pub fn slot_data(&self) -> Value {
        self.inner.slot().slot_data.clone()
    }

    // -- players -----------------------------------------------------------

    /// A copy of the roster.
    pub fn roster(&self) -> Roster {
        self.inner.slot().roster.clone()
    }

    /// Looks a player up by slot. `team` defaults to the own team.
    pub fn player(&self, slot: u32, team: Option<u32>) -> Option<Player> {
        self.inner.slot().roster.player(slot, team).cloned()
    }

    /// # Errors
    /// Returns [`SessionError::NotConnected`] before the first login.
    pub fn own_player(&self) -> Result<Player, SessionError> {
        self.inner.slot().roster.own().cloned()
    }

    // -- names -------------------------------------------------------------

    /// Item name in `game`, or a fallback label such as `Item #42`.
    pub fn item_name(&self, game: &str, id: i64) -> String {
        self.inner.slot().names.item_name(game, id)
    }

    /// Location name in `game`, or a fallback label.
    pub fn location_name(&self, game: &str, id: i64) -> String {
        self.inner.slot().names.location_name(game, id)
    }

    /// Names an item the own slot received.
    pub fn resolve_item(&self, item: &NetworkItem) -> ResolvedItem {
        let slot = self.inner.slot();
        let receiver = slot.roster.own().ok();
        let sender = slot
            .roster
            .player(item.player, receiver.map(|r| r.team));
        slot.names.resolve_item(item, sender, receiver)
    }

    /// Every item of the own game, sorted by name, with how many copies
    /// were received. Empty before login or without the data package.
    pub fn item_table(&self) -> Vec<(String, usize)> {
        let slot = self.inner.slot();
        let Some(table) = slot.own_table() else {
            return Vec::new();
        };
        table
            .items()
            .map(|(name, id)| (name.to_string(), slot.tracker.received_count(id)))
            .collect()
    }

    /// The own slot's locations, sorted by name, with their checked flag.
    pub fn location_table(&self) -> Vec<(String, bool)> {
        let slot = self.inner.slot();
        let Some(table) = slot.own_table() else {
            return Vec::new();
        };
        let (checked, missing) = (slot.tracker.checked(), slot.tracker.missing());
        table
            .locations()
            .filter(|(_, id)| checked.contains(id) || missing.contains(id))
            .map(|(name, id)| (name.to_string(), checked.contains(&id)))
            .collect()
    }

    /// `(name, id)` of the checked locations, sorted by name.
    pub fn checked_location_names(&self) -> Vec<(String, i64)> {
        let slot = self.inner.slot();
        slot.location_names(slot.tracker.checked())
    }

    /// `(name, id)` of the missing locations, sorted by name.
    pub fn missing_location_names(&self) -> Vec<(String, i64)> {
        let slot = self.inner.slot();
        slot.location_names(slot.tracker.missing())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("display_name", &self.display_name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SlotState {
    fn own_table(&self) -> Option<Arc<multiworld_datapackage::GameTable>> {
        let own = self.roster.own().ok()?;
        self.names.table(&own.game)
    }

    fn location_names(&self, ids: &BTreeSet<i64>) -> Vec<(String, i64)> {
        let Some(table) = self.own_table() else {
            return Vec::new();
        };
        table
            .locations()
            .filter(|(_, id)| ids.contains(id))
            .map(|(name, id)| (name.to_string(), id))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Inner: login, reconnect, packet handling
// ---------------------------------------------------------------------------

impl Inner {
    fn slot(&self) -> MutexGuard<'_, SlotState> {
        lock(&self.slot)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_ready(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        if *self.state.borrow() != SessionState::Ready {
            return Err(SessionError::NotConnected);
        }
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_state(&self, next: SessionState) {
        if self.is_closed() && next != SessionState::Closed {
            return;
        }
        let changed = self.state.send_if_modified(|current| {
            if *current == next || current.is_terminal() {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            tracing::debug!(session = %self.id, state = %next, "state changed");
        }
    }

    async fn try_login(&self) -> Result<(), SessionError> {
        self.set_state(SessionState::Connecting);
        tracing::info!(
            session = %self.id,
            address = %self.credentials.address,
            slot = %self.credentials.slot,
            "logging in"
        );

        let (room, endpoint) = self.socket.connect(&self.address).await?;
        self.slot().endpoint = Some(endpoint);

        self.set_state(SessionState::FetchingDataPackages);
        let requests = self.slot().names.requests();
        self.cache.fetch(&self.socket, &requests).await?;

        self.set_state(SessionState::SendingLogin);
        let connected = self.socket.wait(PacketKind::Connected);
        let refused = self.socket.wait(PacketKind::ConnectionRefused);
        let tags = self.slot().tags.clone();
        self.socket
            .send(&[ClientPacket::Connect {
                password: self.credentials.password.clone(),
                game: self.config.game.clone(),
                name: self.credentials.slot.clone(),
                uuid: self.id.clone(),
                version: self.config.version.clone().unwrap_or(room.version),
                items_handling: self.config.items_handling,
                tags,
                slot_data: true,
            }])
            .await?;

        tokio::select! {
            reply = connected => {
                reply?;
                tracing::info!(session = %self.id, "logged in");
                Ok(())
            }
            reply = refused => match reply? {
                ServerPacket::ConnectionRefused(packet) => {
                    Err(SessionError::LoginRefused(packet.errors))
                }
                other => Err(SessionError::UnexpectedPacket(other.kind())),
            },
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        if self.is_closed() {
            return;
        }
        let mut task = lock(&self.reconnect);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        self.set_state(SessionState::Reconnecting);
        let backoff = Backoff::new(self.config.reconnect_base, self.config.reconnect_ceiling);
        *task = Some(tokio::spawn(reconnect_loop(Arc::downgrade(self), backoff)));
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = lock(&self.reconnect).take() {
            task.abort();
        }
        self.socket.disconnect(false).await;
        self.set_state(SessionState::Closed);
        tracing::info!(session = %self.id, "session closed");
        self.emit(SessionEvent::Closed);
    }

    fn on_socket_event(self: &Arc<Self>, event: SocketEvent<'_>) {
        if self.is_closed() {
            return;
        }
        match event {
            SocketEvent::Opened(endpoint) => {
                tracing::debug!(session = %self.id, endpoint = %endpoint, "awaiting room handshake");
                self.set_state(SessionState::AwaitingHandshake);
            }
            SocketEvent::Packet(packet) => self.on_packet(packet),
            SocketEvent::Closed { reconnect } => {
                if !reconnect {
                    return;
                }
                // A login in flight sees the failure itself.
                if self.state.borrow().is_logging_in() {
                    return;
                }
                tracing::warn!(session = %self.id, "connection to room server lost");
                self.schedule_reconnect();
            }
        }
    }

    fn on_packet(&self, packet: &ServerPacket) {
        let mut events = Vec::new();
        {
            let mut guard = self.slot();
            let slot = &mut *guard;
            match packet {
                ServerPacket::RoomInfo(info) => {
                    tracing::debug!(
                        session = %self.id,
                        seed = %info.seed_name,
                        version = %info.version,
                        games = info.games.len(),
                        "room info"
                    );
                    slot.names.set_checksums(info.datapackage_checksums.clone());
                    slot.tracker.set_hint_cost_percent(info.hint_cost);
                }
                ServerPacket::Connected(connected) => {
                    slot.roster.rebuild(connected);
                    slot.tracker.seed(
                        &connected.checked_locations,
                        &connected.missing_locations,
                        connected.hint_points,
                    );
                    slot.slot_data = connected.slot_data.clone();
                    slot.ready = true;
                    events.push(SessionEvent::Connected);
                }
                ServerPacket::ConnectionRefused(refused) => {
                    tracing::debug!(session = %self.id, reasons = ?refused.errors, "connection refused");
                }
                ServerPacket::ReceivedItems(received) => {
                    let items = slot.tracker.receive(&received.items);
                    if !items.is_empty() {
                        let replay = !slot.ready || received.index == 0;
                        tracing::info!(
                            session = %self.id,
                            count = items.len(),
                            replay,
                            "received items"
                        );
                        events.push(SessionEvent::NewItems { items, replay });
                    }
                }
                ServerPacket::RoomUpdate(update) => {
                    if let Some(checked) = &update.checked_locations {
                        slot.tracker.check(checked);
                    }
                    if let Some(percent) = update.hint_cost {
                        slot.tracker.set_hint_cost_percent(percent);
                    }
                    if let Some(points) = update.hint_points {
                        if slot.tracker.set_hint_points(points) {
                            events.push(SessionEvent::HintsChanged {
                                hint_points: points,
                                hints: slot.tracker.hints(),
                            });
                        }
                    }
                    if let Some(players) = &update.players {
                        for change in slot.roster.apply_update(players) {
                            tracing::info!(
                                session = %self.id,
                                old = %change.old_alias,
                                new = %change.new_alias,
                                "player renamed"
                            );
                            events.push(SessionEvent::AliasChanged {
                                player: change.player,
                                old_alias: change.old_alias,
                                new_alias: change.new_alias,
                            });
                        }
                    }
                }
                ServerPacket::PrintJson(line) => {
                    let decoded = MessageDecoder::new(&slot.roster, &slot.names).decode(line);
                    if let Some(countdown) = decoded.countdown {
                        if slot.last_countdown != Some(countdown) {
                            slot.last_countdown = Some(countdown);
                            events.push(SessionEvent::CountdownChanged(countdown));
                        }
                    }
                    slot.log.push(decoded.message.clone());
                    events.push(SessionEvent::Message {
                        message: decoded.message,
                        hidden: false,
                    });
                }
                ServerPacket::DataPackage(_) => {
                    // Delivered to the waiting fetch.
                }
                ServerPacket::Bounced(bounced) => match DeathLink::from_bounced(bounced) {
                    Some(death) => {
                        tracing::info!(
                            session = %self.id,
                            source = %death.source,
                            cause = %death.cause,
                            "DeathLink received"
                        );
                        events.push(SessionEvent::DeathLink(death));
                    }
                    None => {
                        tracing::debug!(session = %self.id, tags = ?bounced.tags, "ignoring bounce");
                    }
                },
                ServerPacket::LocationInfo(info) => {
                    tracing::debug!(session = %self.id, count = info.locations.len(), "location info");
                }
                ServerPacket::Retrieved(_) | ServerPacket::SetReply(_) => {
                    tracing::debug!(session = %self.id, kind = %packet.kind(), "ignoring storage reply");
                }
                ServerPacket::InvalidPacket(invalid) => {
                    tracing::warn!(
                        session = %self.id,
                        kind = %invalid.kind,
                        original_cmd = ?invalid.original_cmd,
                        text = %invalid.text,
                        "room server rejected a packet"
                    );
                }
            }
        }

        for event in events {
            if matches!(event, SessionEvent::Connected) {
                self.set_state(SessionState::Ready);
            }
            self.emit(event);
        }
    }
}

async fn reconnect_loop(weak: Weak<Inner>, mut backoff: Backoff) {
    loop {
        backoff.wait().await;
        tracing::info!(attempt = backoff.attempt(), "reconnecting");

        let Some(inner) = weak.upgrade() else {
            return;
        };
        let result = {
            let _guard = inner.login_lock.lock().await;
            if inner.is_closed() {
                return;
            }
            inner.try_login().await
        };

        match result {
            Ok(()) => {
                let mut task = lock(&inner.reconnect);
                if inner.socket.is_connected() {
                    task.take();
                    tracing::info!(session = %inner.id, "reconnected");
                    return;
                }
                // Logged in, but the link dropped again straight away.
                backoff.reset();
            }
            Err(SessionError::LoginRefused(reasons)) => {
                tracing::warn!(
                    session = %inner.id,
                    reasons = ?reasons,
                    "login refused while reconnecting, closing session"
                );
                lock(&inner.reconnect).take();
                inner.close().await;
                return;
            }
            Err(error) => {
                if inner.is_closed() {
                    return;
                }
                tracing::warn!(session = %inner.id, error = %error, "reconnect attempt failed");
            }
        }
        inner.set_state(SessionState::Reconnecting);
    }
}
