//! A minimal room server for client tests: handshake, data package and
//! login for the slots `Alice` and `Bob`.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use multiworld_protocol::ClientPacket;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

pub const PATIENCE: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Counters {
    fetches: AtomicUsize,
    logins: AtomicUsize,
}

pub struct MockRoom {
    port: u16,
    counters: Arc<Counters>,
}

impl MockRoom {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let port = listener.local_addr().unwrap().port();
        let counters = Arc::new(Counters::default());
        let accept_counters = Arc::clone(&counters);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&accept_counters)));
            }
        });
        Self { port, counters }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn address(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    pub fn fetches(&self) -> usize {
        self.counters.fetches.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> usize {
        self.counters.logins.load(Ordering::SeqCst)
    }
}

/// An address nothing listens on.
pub async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("ws://127.0.0.1:{port}")
}

async fn serve(stream: TcpStream, counters: Arc<Counters>) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let room_info = json!({
        "cmd": "RoomInfo",
        "version": {"class": "Version", "major": 0, "minor": 5, "build": 1},
        "hint_cost": 10,
        "games": ["Clique"],
        "datapackage_checksums": {"Clique": "c1ique"}
    });
    if send(&mut ws, vec![room_info]).await.is_err() {
        return;
    }

    while let Some(Ok(message)) = ws.next().await {
        if !message.is_text() {
            continue;
        }
        let text = message.into_text().unwrap();
        let packets: Vec<ClientPacket> = serde_json::from_str(text.as_str()).unwrap();
        for packet in packets {
            let replies = respond(&counters, &packet);
            if !replies.is_empty() && send(&mut ws, replies).await.is_err() {
                return;
            }
        }
    }
}

async fn send(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
    packets: Vec<Value>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    ws.send(Message::Text(Value::Array(packets).to_string().into()))
        .await
}

fn respond(counters: &Counters, packet: &ClientPacket) -> Vec<Value> {
    match packet {
        ClientPacket::GetDataPackage { .. } => {
            counters.fetches.fetch_add(1, Ordering::SeqCst);
            vec![json!({
                "cmd": "DataPackage",
                "data": {"games": {"Clique": {
                    "item_name_to_id": {"Feather": 1001},
                    "location_name_to_id": {"Button": 2001, "Lever": 2002},
                    "checksum": "c1ique"
                }}}
            })]
        }
        ClientPacket::Connect { name, .. } => {
            let slot = match name.as_str() {
                "Alice" => 1,
                "Bob" => 2,
                _ => {
                    return vec![json!({"cmd": "ConnectionRefused", "errors": ["InvalidSlot"]})];
                }
            };
            counters.logins.fetch_add(1, Ordering::SeqCst);
            vec![json!({
                "cmd": "Connected",
                "team": 0,
                "slot": slot,
                "players": [
                    {"team": 0, "slot": 1, "alias": "Alice", "name": "Alice"},
                    {"team": 0, "slot": 2, "alias": "Bob", "name": "Bob"}
                ],
                "missing_locations": [2002],
                "checked_locations": [2001],
                "slot_info": {
                    "1": {"name": "Alice", "game": "Clique", "type": 1},
                    "2": {"name": "Bob", "game": "Clique", "type": 1}
                },
                "hint_points": 10
            })]
        }
        _ => Vec::new(),
    }
}
