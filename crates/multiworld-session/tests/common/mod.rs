//! A scripted room server for session integration tests.
//!
//! Speaks just enough of the room protocol over a real WebSocket:
//! `RoomInfo` on connect, `DataPackage` for `GetDataPackage`, and
//! `Connected` + `ReceivedItems` (or `ConnectionRefused`) for `Connect`.
//! Every client packet is forwarded to the test.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use multiworld_protocol::{ClientPacket, GamePackage};
use multiworld_session::{SessionEvent, SessionState};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

pub const GAME: &str = "Clique";
pub const CHECKSUM: &str = "c1ique";
pub const PASSWORD: &str = "hunter2";

/// How long a test waits for anything before failing.
pub const PATIENCE: Duration = Duration::from_secs(5);

pub fn package() -> GamePackage {
    GamePackage {
        item_name_to_id: [("Feather".to_string(), 1001), ("Key".to_string(), 1002)]
            .into_iter()
            .collect(),
        location_name_to_id: [
            ("Button".to_string(), 2001),
            ("Lever".to_string(), 2002),
            ("Door".to_string(), 2003),
        ]
        .into_iter()
        .collect(),
        checksum: CHECKSUM.to_string(),
    }
}

fn room_info() -> Value {
    json!({
        "cmd": "RoomInfo",
        "version": {"class": "Version", "major": 0, "minor": 5, "build": 1},
        "tags": ["AP"],
        "password": true,
        "hint_cost": 50,
        "location_check_points": 1,
        "games": [GAME],
        "datapackage_checksums": {GAME: CHECKSUM},
        "seed_name": "seed-1",
        "time": 1.0
    })
}

fn connected() -> Value {
    json!({
        "cmd": "Connected",
        "team": 0,
        "slot": 1,
        "players": [
            {"team": 0, "slot": 1, "alias": "Alice", "name": "Alice"},
            {"team": 0, "slot": 2, "alias": "Bob", "name": "Bob"}
        ],
        "missing_locations": [2002, 2003],
        "checked_locations": [2001],
        "slot_data": {"goal": 3},
        "slot_info": {
            "1": {"name": "Alice", "game": GAME, "type": 1, "group_members": []},
            "2": {"name": "Bob", "game": GAME, "type": 1, "group_members": []}
        },
        "hint_points": 50
    })
}

fn received_items() -> Value {
    json!({
        "cmd": "ReceivedItems",
        "index": 0,
        "items": [{"item": 1001, "location": 2005, "player": 2, "flags": 1}]
    })
}

#[derive(Debug, Clone)]
enum Command {
    Send(String),
    Kick,
}

struct Shared {
    packets: mpsc::UnboundedSender<ClientPacket>,
    commands: broadcast::Sender<Command>,
    connections: AtomicUsize,
    fetches: AtomicUsize,
    logins_open: AtomicBool,
    /// When each TCP connection was accepted, handshake or not.
    accepted: Mutex<Vec<Instant>>,
    /// Connections still to be dropped before the WebSocket handshake.
    hang_ups: AtomicUsize,
}

pub struct MockRoom {
    port: u16,
    shared: Arc<Shared>,
    packets: mpsc::UnboundedReceiver<ClientPacket>,
}

impl MockRoom {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let port = listener.local_addr().unwrap().port();
        let (packets_tx, packets) = mpsc::unbounded_channel();
        let (commands, _) = broadcast::channel(64);
        let shared = Arc::new(Shared {
            packets: packets_tx,
            commands,
            connections: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            logins_open: AtomicBool::new(true),
            accepted: Mutex::new(Vec::new()),
            hang_ups: AtomicUsize::new(0),
        });

        let accept_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_shared.accepted.lock().unwrap().push(Instant::now());
                tokio::spawn(serve(stream, Arc::clone(&accept_shared)));
            }
        });

        Self {
            port,
            shared,
            packets,
        }
    }

    /// `ws://127.0.0.1:<port>`.
    pub fn address(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// `127.0.0.1:<port>`, with no scheme.
    pub fn bare_address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// WebSocket handshakes completed so far.
    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// TCP connections accepted so far, including failed handshakes.
    pub fn accepts(&self) -> usize {
        self.shared.accepted.lock().unwrap().len()
    }

    /// Accept times, oldest first.
    pub fn accept_times(&self) -> Vec<Instant> {
        self.shared.accepted.lock().unwrap().clone()
    }

    /// Drops the next `count` connections before the WebSocket handshake.
    pub fn hang_up_next(&self, count: usize) {
        self.shared.hang_ups.store(count, Ordering::SeqCst);
    }

    /// `GetDataPackage` requests answered so far.
    pub fn fetches(&self) -> usize {
        self.shared.fetches.load(Ordering::SeqCst)
    }

    /// Refuses every later `Connect` with `InvalidPassword`.
    pub fn close_logins(&self) {
        self.shared.logins_open.store(false, Ordering::SeqCst);
    }

    /// Sends one packet to every open connection.
    pub fn push(&self, packet: Value) {
        let frame = Value::Array(vec![packet]).to_string();
        let _ = self.shared.commands.send(Command::Send(frame));
    }

    /// Closes every open connection.
    pub fn kick(&self) {
        let _ = self.shared.commands.send(Command::Kick);
    }

    /// Skips client packets until one named `name` arrives.
    pub async fn expect_packet(&mut self, name: &str) -> ClientPacket {
        tokio::time::timeout(PATIENCE, async {
            loop {
                let packet = self.packets.recv().await.expect("room server stopped");
                if packet.name() == name {
                    return packet;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no {name} packet arrived"))
    }
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let hang_up = shared
        .hang_ups
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if hang_up {
        return;
    }
    // A wss:// attempt against this plain listener fails here.
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    shared.connections.fetch_add(1, Ordering::SeqCst);
    let mut commands = shared.commands.subscribe();

    if send(&mut ws, vec![room_info()]).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = ws.next() => {
                let Some(Ok(message)) = incoming else {
                    return;
                };
                if !message.is_text() {
                    continue;
                }
                let text = message.into_text().unwrap();
                let packets: Vec<ClientPacket> =
                    serde_json::from_str(text.as_str()).expect("client frame should decode");
                for packet in packets {
                    let replies = respond(&shared, &packet);
                    let _ = shared.packets.send(packet);
                    if !replies.is_empty() && send(&mut ws, replies).await.is_err() {
                        return;
                    }
                }
            }
            command = commands.recv() => match command {
                Ok(Command::Send(frame)) => {
                    if ws.send(Message::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
                Ok(Command::Kick) | Err(_) => {
                    let _ = ws.close(None).await;
                    return;
                }
            },
        }
    }
}

async fn send(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
    packets: Vec<Value>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let frame = Value::Array(packets).to_string();
    ws.send(Message::Text(frame.into())).await
}

fn respond(shared: &Shared, packet: &ClientPacket) -> Vec<Value> {
    match packet {
        ClientPacket::GetDataPackage { .. } => {
            shared.fetches.fetch_add(1, Ordering::SeqCst);
            vec![json!({
                "cmd": "DataPackage",
                "data": {"games": {GAME: package()}}
            })]
        }
        ClientPacket::Connect { name, password, .. } => {
            let refusal = if name != "Alice" {
                Some("InvalidSlot")
            } else if password != PASSWORD || !shared.logins_open.load(Ordering::SeqCst) {
                Some("InvalidPassword")
            } else {
                None
            };
            match refusal {
                Some(reason) => vec![json!({"cmd": "ConnectionRefused", "errors": [reason]})],
                None => vec![connected(), received_items()],
            }
        }
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Session helpers
// ---------------------------------------------------------------------------

/// Waits for the first event matching `pred`, skipping the rest.
pub async fn next_event<F>(events: &mut broadcast::Receiver<SessionEvent>, pred: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    tokio::time::timeout(PATIENCE, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("expected event did not arrive")
}

pub async fn wait_for_state(states: &mut watch::Receiver<SessionState>, target: SessionState) {
    tokio::time::timeout(PATIENCE, states.wait_for(|state| *state == target))
        .await
        .unwrap_or_else(|_| panic!("session never reached {target}"))
        .expect("session dropped");
}
