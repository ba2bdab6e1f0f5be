//! Packet-level link to one room server.
//!
//! A [`RoomSocket`] owns at most one live WebSocket at a time. A reader
//! task decodes every inbound frame and hands each packet, in arrival
//! order, first to the socket's handler and then to any pending
//! [`Wait`] for that packet kind.
//!
//! ```text
//! connect(address)
//!   ├─ try wss://host:port, then ws://host:port (unless a scheme is given
//!   │  or one was verified earlier)
//!   ├─ Opened(endpoint) → handler
//!   └─ first RoomInfo → returned to the caller
//!
//! reader task:  frame → packets → handler(Packet) → resolve waits
//!               end of stream  → handler(Closed { reconnect: true })
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use multiworld_datapackage::PackageFetcher;
use multiworld_protocol::{
    ClientPacket, Codec, DataPackage, JsonCodec, PacketKind, RoomInfoPacket, ServerPacket,
};
use multiworld_transport::{
    Connection, Endpoint, RoomAddress, Scheme, TransportError, WebSocketConnection,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::{SessionError, SocketConfig};

/// What the socket reports to its owner.
#[derive(Debug)]
pub enum SocketEvent<'a> {
    /// A connection was dialed; the room handshake is pending.
    Opened(&'a Endpoint),
    Packet(&'a ServerPacket),
    /// An established link ended. `reconnect` is `false` only for a
    /// deliberate [`RoomSocket::disconnect`] that asked for no retry.
    Closed { reconnect: bool },
}

/// Receives every [`SocketEvent`], synchronously, on the reader task.
pub type SocketHandler = Arc<dyn Fn(SocketEvent<'_>) + Send + Sync>;

type Waiters = HashMap<PacketKind, Vec<oneshot::Sender<ServerPacket>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

/// State shared between a link and its reader task.
#[derive(Default)]
struct LinkState {
    waiters: Mutex<Waiters>,
    /// Set once `RoomInfo` arrived.
    established: AtomicBool,
    /// Set when the owner tears the link down on purpose.
    closing: AtomicBool,
    /// Set by the reader when the stream ends. Written under `waiters`.
    ended: AtomicBool,
}

impl LinkState {
    fn register(&self, kind: PacketKind) -> Wait {
        let mut waiters = lock(&self.waiters);
        if self.ended.load(Ordering::SeqCst) {
            return Wait { rx: None };
        }
        let (tx, rx) = oneshot::channel();
        waiters.entry(kind).or_default().push(tx);
        Wait { rx: Some(rx) }
    }

    fn resolve(&self, packet: &ServerPacket) {
        let senders = lock(&self.waiters).remove(&packet.kind());
        for tx in senders.into_iter().flatten() {
            // The receiver may have given up; that is fine.
            let _ = tx.send(packet.clone());
        }
    }

    fn end(&self) {
        let mut waiters = lock(&self.waiters);
        self.ended.store(true, Ordering::SeqCst);
        waiters.clear();
    }

    fn is_live(&self) -> bool {
        self.established.load(Ordering::SeqCst) && !self.ended.load(Ordering::SeqCst)
    }
}

struct Link {
    conn: Arc<WebSocketConnection>,
    reader: JoinHandle<()>,
    state: Arc<LinkState>,
}

// ---------------------------------------------------------------------------
// Wait
// ---------------------------------------------------------------------------

/// A one-shot handle for the next inbound packet of one kind.
///
/// Resolves with [`SessionError::NotConnected`] if the link ends first, or
/// if there was no link when the handle was created.
#[derive(Debug)]
pub struct Wait {
    rx: Option<oneshot::Receiver<ServerPacket>>,
}

impl Future for Wait {
    type Output = Result<ServerPacket, SessionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.rx.as_mut() {
            None => Poll::Ready(Err(SessionError::NotConnected)),
            Some(rx) => Pin::new(rx)
                .poll(cx)
                .map(|result| result.map_err(|_| SessionError::NotConnected)),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomSocket
// ---------------------------------------------------------------------------

/// One WebSocket link to a room, replaced on every connect.
///
/// Incoming frames are decoded on a reader task and handed to the
/// [`SocketHandler`] in arrival order. Replies a caller waits for are
/// matched through [`wait`](Self::wait) handles registered before the
/// request goes out.
pub struct RoomSocket {
    config: SocketConfig,
    codec: JsonCodec,
    handler: SocketHandler,
    link: Mutex<Option<Link>>,
    verified: Mutex<Option<Scheme>>,
}

impl RoomSocket {
    /// Creates an unconnected socket. `handler` sees every event of every
    /// link this socket opens.
    pub fn new(config: SocketConfig, handler: SocketHandler) -> Self {
        Self {
            config,
            codec: JsonCodec,
            handler,
            link: Mutex::new(None),
            verified: Mutex::new(None),
        }
    }

    /// The scheme that last completed a handshake, if any.
    pub fn verified_scheme(&self) -> Option<Scheme> {
        *lock(&self.verified)
    }

    /// Whether a link is up and past the room handshake.
    pub fn is_connected(&self) -> bool {
        lock(&self.link)
            .as_ref()
            .is_some_and(|link| link.state.is_live())
    }

    /// Connects to `address` and waits for the room handshake.
    ///
    /// Any existing link is dropped first without a [`SocketEvent::Closed`].
    /// Each candidate endpoint gets [`SocketConfig::handshake_timeout`].
    ///
    /// # Errors
    /// Returns [`SessionError::Connect`] with the last candidate's error if
    /// none of them delivered `RoomInfo`.
    pub async fn connect(
        &self,
        address: &RoomAddress,
    ) -> Result<(RoomInfoPacket, Endpoint), SessionError> {
        self.drop_link().await;

        let candidates = match self.verified_scheme() {
            Some(scheme) => vec![address.with_scheme(scheme)],
            None => address.candidates(),
        };

        let mut last_error = TransportError::NotConnected;
        for endpoint in candidates {
            tracing::debug!(endpoint = %endpoint, "trying endpoint");
            let attempt = tokio::time::timeout(self.config.handshake_timeout, self.open(&endpoint));
            match attempt.await {
                Ok(Ok(room_info)) => {
                    *lock(&self.verified) = Some(endpoint.scheme());
                    tracing::info!(endpoint = %endpoint, "room handshake complete");
                    return Ok((room_info, endpoint));
                }
                Ok(Err(error)) => {
                    tracing::warn!(endpoint = %endpoint, error = %error, "endpoint failed");
                    last_error = error;
                }
                Err(_) => {
                    tracing::warn!(endpoint = %endpoint, "room handshake timed out");
                    last_error = TransportError::ConnectionClosed(format!(
                        "no room handshake from {endpoint} within {:?}",
                        self.config.handshake_timeout
                    ));
                }
            }
            self.drop_link().await;
        }
        Err(SessionError::Connect(last_error))
    }

    async fn open(&self, endpoint: &Endpoint) -> Result<RoomInfoPacket, TransportError> {
        let state = Arc::new(LinkState::default());
        let room_info = state.register(PacketKind::RoomInfo);

        let conn = Arc::new(WebSocketConnection::dial(endpoint).await?);
        (self.handler)(SocketEvent::Opened(endpoint));

        let reader = tokio::spawn(read_loop(
            Arc::clone(&conn),
            self.codec,
            Arc::clone(&self.handler),
            Arc::clone(&state),
        ));
        *lock(&self.link) = Some(Link {
            conn,
            reader,
            state,
        });

        match room_info.await {
            Ok(ServerPacket::RoomInfo(info)) => Ok(info),
            Ok(other) => Err(TransportError::ConnectionClosed(format!(
                "expected RoomInfo, got {}",
                other.kind()
            ))),
            Err(_) => Err(TransportError::ConnectionClosed(
                "closed before the room handshake".into(),
            )),
        }
    }

    /// Sends `packets` as one frame.
    ///
    /// # Errors
    /// Returns [`SessionError::NotConnected`] without a live link.
    pub async fn send(&self, packets: &[ClientPacket]) -> Result<(), SessionError> {
        let conn = lock(&self.link)
            .as_ref()
            .filter(|link| !link.state.ended.load(Ordering::SeqCst))
            .map(|link| Arc::clone(&link.conn))
            .ok_or(SessionError::NotConnected)?;

        let frame = self.codec.encode_frame(packets)?;
        conn.send(&frame).await?;
        tracing::debug!(
            id = %conn.id(),
            packets = ?packets.iter().map(ClientPacket::name).collect::<Vec<_>>(),
            "sent"
        );
        Ok(())
    }

    /// Registers interest in the next packet of `kind`.
    ///
    /// The handle is registered before this returns, so a reply to a
    /// request sent afterwards cannot be missed.
    pub fn wait(&self, kind: PacketKind) -> Wait {
        match lock(&self.link).as_ref() {
            Some(link) => link.state.register(kind),
            None => Wait { rx: None },
        }
    }

    /// Closes the link on purpose.
    ///
    /// Emits [`SocketEvent::Closed`] with `reconnect` if the link had
    /// completed the room handshake.
    pub async fn disconnect(&self, reconnect: bool) {
        let Some(link) = self.take_link() else {
            return;
        };
        let established = link.state.established.load(Ordering::SeqCst);
        if let Err(error) = link.conn.close().await {
            tracing::debug!(id = %link.conn.id(), error = %error, "close failed");
        }
        if established {
            tracing::info!(id = %link.conn.id(), reconnect, "disconnected from room server");
            (self.handler)(SocketEvent::Closed { reconnect });
        }
    }

    fn take_link(&self) -> Option<Link> {
        let link = lock(&self.link).take()?;
        link.state.closing.store(true, Ordering::SeqCst);
        link.reader.abort();
        Some(link)
    }

    async fn drop_link(&self) {
        if let Some(link) = self.take_link() {
            let _ = link.conn.close().await;
        }
    }
}

impl Drop for RoomSocket {
    fn drop(&mut self) {
        if let Some(link) = lock(&self.link).take() {
            link.reader.abort();
        }
    }
}

impl std::fmt::Debug for RoomSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSocket")
            .field("connected", &self.is_connected())
            .field("verified", &self.verified_scheme())
            .finish_non_exhaustive()
    }
}

/// Fetches one game's data package over the socket.
impl PackageFetcher for RoomSocket {
    type Error = SessionError;

    async fn fetch_package(&self, game: &str) -> Result<DataPackage, SessionError> {
        let reply = self.wait(PacketKind::DataPackage);
        self.send(&[ClientPacket::GetDataPackage {
            games: Some(vec![game.to_string()]),
        }])
        .await?;
        match reply.await? {
            ServerPacket::DataPackage(packet) => Ok(packet.data),
            other => Err(SessionError::UnexpectedPacket(other.kind())),
        }
    }
}

// ---------------------------------------------------------------------------
// Reader task
// ---------------------------------------------------------------------------

async fn read_loop(
    conn: Arc<WebSocketConnection>,
    codec: JsonCodec,
    handler: SocketHandler,
    state: Arc<LinkState>,
) {
    let id = conn.id();
    loop {
        let frame = match conn.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!(%id, "room server closed the connection");
                break;
            }
            Err(error) => {
                tracing::warn!(%id, error = %error, "connection lost");
                break;
            }
        };

        let packets = match codec.decode_frame(&frame) {
            Ok(packets) => packets,
            Err(error) => {
                tracing::warn!(%id, error = %error, "dropping undecodable frame");
                continue;
            }
        };

        for packet in &packets {
            if packet.kind() == PacketKind::RoomInfo {
                state.established.store(true, Ordering::SeqCst);
            }
            tracing::trace!(%id, kind = %packet.kind(), "received");
            handler(SocketEvent::Packet(packet));
            state.resolve(packet);
        }
    }

    state.end();
    if state.established.load(Ordering::SeqCst) && !state.closing.load(Ordering::SeqCst) {
        tracing::info!(%id, "link to room server lost");
        handler(SocketEvent::Closed { reconnect: true });
    }
}
