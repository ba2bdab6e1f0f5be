//! Integration tests for [`Session`] against a scripted room server.
//!
//! Each test starts its own [`MockRoom`](common::MockRoom) on an
//! OS-assigned port, so logins, fetches and reconnects cross a real
//! WebSocket.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use common::{GAME, MockRoom, PASSWORD, next_event, package, wait_for_state};
use multiworld_datapackage::{DataPackageCache, MemoryStore};
use multiworld_protocol::{ClientPacket, ConnectionRefusal, NetworkVersion};
use multiworld_session::{
    Credentials, Session, SessionConfig, SessionError, SessionEvent, SessionState,
};
use multiworld_transport::Scheme;
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Instant;

fn cache() -> Arc<DataPackageCache> {
    Arc::new(DataPackageCache::new(Arc::new(MemoryStore::new())))
}

fn config() -> SessionConfig {
    SessionConfig::default()
        .with_reconnect_base(Duration::from_millis(50))
        .with_reconnect_ceiling(Duration::from_millis(200))
        .with_handshake_timeout(Duration::from_secs(2))
}

fn session(address: &str, slot: &str, config: SessionConfig) -> Session {
    Session::new(
        Credentials::new(address, slot, PASSWORD),
        config,
        cache(),
    )
    .expect("address should parse")
}

/// Asserts the gaps from `start` through each of `times` match `expected`
/// milliseconds, give or take a scheduling tick.
fn assert_gaps(start: Instant, times: &[Instant], expected: &[u64]) {
    assert_eq!(times.len(), expected.len(), "attempt count");
    let mut previous = start;
    for (at, want) in times.iter().zip(expected) {
        let gap = at.duration_since(previous);
        let want = Duration::from_millis(*want);
        assert!(
            gap >= want && gap < want + Duration::from_millis(25),
            "expected a gap of {want:?}, got {gap:?}"
        );
        previous = *at;
    }
}

/// Logs Alice in and waits for the login inventory.
async fn logged_in(room: &MockRoom, config: SessionConfig) -> Session {
    let session = session(&room.address(), "Alice", config);
    let mut events = session.subscribe();
    session.login(false).await.expect("login should succeed");
    next_event(&mut events, |e| matches!(e, SessionEvent::NewItems { .. })).await;
    session
}

// =========================================================================
// Login
// =========================================================================

#[tokio::test]
async fn test_login_seeds_slot_state() {
    let mut room = MockRoom::start().await;
    let session = logged_in(&room, config()).await;

    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.is_ready());
    assert_eq!(session.checked_locations(), BTreeSet::from([2001]));
    assert_eq!(session.missing_locations(), BTreeSet::from([2002, 2003]));
    assert_eq!(session.hint_points(), 50);
    assert_eq!(session.hint_cost_percent(), 50);
    assert_eq!(session.hint_cost(), 1);
    assert_eq!(session.hints(), 50);
    assert_eq!(session.slot_data()["goal"], 3);
    assert_eq!(session.own_player().unwrap().name, "Alice");
    assert_eq!(session.endpoint().unwrap().scheme(), Scheme::Insecure);
    assert_eq!(room.fetches(), 1);

    let ClientPacket::Connect {
        name,
        uuid,
        version,
        tags,
        slot_data,
        ..
    } = room.expect_packet("Connect").await
    else {
        unreachable!()
    };
    assert_eq!(name, "Alice");
    assert_eq!(uuid, session.id());
    assert_eq!(version, NetworkVersion::new(0, 5, 1));
    assert_eq!(tags, vec!["TextOnly".to_string()]);
    assert!(slot_data);
}

#[tokio::test]
async fn test_login_builds_item_and_location_tables() {
    let room = MockRoom::start().await;
    let session = logged_in(&room, config()).await;

    assert_eq!(
        session.item_table(),
        vec![("Feather".to_string(), 1), ("Key".to_string(), 0)]
    );
    assert_eq!(
        session.location_table(),
        vec![
            ("Button".to_string(), true),
            ("Door".to_string(), false),
            ("Lever".to_string(), false),
        ]
    );
    assert_eq!(
        session.missing_location_names(),
        vec![("Door".to_string(), 2003), ("Lever".to_string(), 2002)]
    );
    assert_eq!(session.checked_location_names(), vec![("Button".to_string(), 2001)]);
}

#[tokio::test]
async fn test_login_bare_address_falls_back_to_insecure() {
    let room = MockRoom::start().await;
    let session = session(&room.bare_address(), "Alice", config());

    session.login(false).await.expect("ws:// should answer");

    assert_eq!(session.endpoint().unwrap().scheme(), Scheme::Insecure);
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_login_with_cached_package_skips_fetch() {
    let room = MockRoom::start().await;
    let cache = cache();
    cache.insert(GAME, package());
    let session = Session::new(
        Credentials::new(room.address(), "Alice", PASSWORD),
        config(),
        cache,
    )
    .unwrap();

    session.login(false).await.unwrap();

    assert_eq!(room.fetches(), 0);
    assert_eq!(session.item_name(GAME, 1001), "Feather");
    assert_eq!(session.location_name(GAME, 2003), "Door");
}

#[tokio::test]
async fn test_login_refused_returns_reasons_without_retry() {
    let room = MockRoom::start().await;
    let session = session(&room.address(), "Mallory", config());

    let result = session.login(true).await;

    match result {
        Err(SessionError::LoginRefused(reasons)) => {
            assert_eq!(reasons, vec![ConnectionRefusal::InvalidSlot]);
        }
        other => panic!("expected a refusal, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(room.connections(), 1);
}

#[tokio::test]
async fn test_login_unreachable_without_retry_is_disconnected() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let session = session(&format!("ws://127.0.0.1:{port}"), "Alice", config());

    let result = session.login(false).await;

    assert!(matches!(result, Err(SessionError::Connect(_))));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_login_unreachable_with_retry_keeps_reconnecting() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let session = session(&format!("ws://127.0.0.1:{port}"), "Alice", config());

    let result = session.login(true).await;

    assert!(matches!(result, Err(SessionError::Connect(_))));
    assert_eq!(session.state(), SessionState::Reconnecting);
    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
}

// =========================================================================
// Room packets
// =========================================================================

#[tokio::test]
async fn test_received_items_are_deduplicated_and_flag_replay() {
    let room = MockRoom::start().await;
    let session = session(&room.address(), "Alice", config());
    let mut events = session.subscribe();
    session.login(false).await.unwrap();

    let first = next_event(&mut events, |e| matches!(e, SessionEvent::NewItems { .. })).await;
    let SessionEvent::NewItems { items, replay } = first else {
        unreachable!()
    };
    assert_eq!(items.len(), 1);
    assert!(replay);

    room.push(json!({
        "cmd": "ReceivedItems",
        "index": 1,
        "items": [
            {"item": 1001, "location": 2005, "player": 2, "flags": 1},
            {"item": 1002, "location": 2006, "player": 2, "flags": 0}
        ]
    }));
    let second = next_event(&mut events, |e| matches!(e, SessionEvent::NewItems { .. })).await;
    let SessionEvent::NewItems { items, replay } = second else {
        unreachable!()
    };
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].item, 1002);
    assert!(!replay);
    assert_eq!(session.received_items().len(), 2);
    assert_eq!(session.resolve_item(&items[0]).name, "Key");
}

#[tokio::test]
async fn test_room_update_emits_hint_and_alias_changes() {
    let room = MockRoom::start().await;
    let session = logged_in(&room, config()).await;
    let mut events = session.subscribe();

    room.push(json!({
        "cmd": "RoomUpdate",
        "hint_points": 80,
        "checked_locations": [2002],
        "players": [{"team": 0, "slot": 2, "alias": "Bobby", "name": "Bob"}]
    }));

    let hints = next_event(&mut events, |e| matches!(e, SessionEvent::HintsChanged { .. })).await;
    assert!(matches!(
        hints,
        SessionEvent::HintsChanged {
            hint_points: 80,
            hints: 80
        }
    ));
    let alias = next_event(&mut events, |e| matches!(e, SessionEvent::AliasChanged { .. })).await;
    let SessionEvent::AliasChanged {
        player,
        old_alias,
        new_alias,
    } = alias
    else {
        unreachable!()
    };
    assert_eq!(player.slot, 2);
    assert_eq!(old_alias, "Bob");
    assert_eq!(new_alias, "Bobby");
    assert_eq!(session.checked_locations(), BTreeSet::from([2001, 2002]));
    assert_eq!(session.missing_locations(), BTreeSet::from([2003]));
}

#[tokio::test]
async fn test_print_json_lands_in_log() {
    let room = MockRoom::start().await;
    let session = logged_in(&room, config()).await;
    let mut events = session.subscribe();

    room.push(json!({
        "cmd": "PrintJSON",
        "data": [{"text": "Hello "}, {"type": "player_id", "text": "2"}]
    }));

    let event = next_event(&mut events, |e| matches!(e, SessionEvent::Message { .. })).await;
    let SessionEvent::Message { message, hidden } = event else {
        unreachable!()
    };
    assert!(!hidden);
    assert_eq!(message.text, "Hello Bob");
    assert_eq!(session.text_log().last().map(String::as_str), Some("Hello Bob"));

    session.clear_log();
    assert!(session.messages().is_empty());
}

#[tokio::test]
async fn test_countdown_changes_are_reported_once() {
    let room = MockRoom::start().await;
    let session = logged_in(&room, config()).await;
    let mut events = session.subscribe();

    for value in [3, 3, 2] {
        room.push(json!({
            "cmd": "PrintJSON",
            "type": "Countdown",
            "countdown": value,
            "data": [{"text": format!("[Server]: {value}")}]
        }));
    }

    let mut seen = Vec::new();
    while seen.last() != Some(&2) {
        let event =
            next_event(&mut events, |e| matches!(e, SessionEvent::CountdownChanged(_))).await;
        if let SessionEvent::CountdownChanged(value) = event {
            seen.push(value);
        }
    }
    assert_eq!(seen, vec![3, 2]);
    assert_eq!(session.text_log().len(), 3);
}

// =========================================================================
// Commands
// =========================================================================

#[tokio::test]
async fn test_say_sends_and_records_history() {
    let mut room = MockRoom::start().await;
    let session = logged_in(&room, config()).await;

    session.say("hello room").await.unwrap();

    let packet = room.expect_packet("Say").await;
    assert_eq!(
        packet,
        ClientPacket::Say {
            text: "hello room".into()
        }
    );
    assert_eq!(session.chat_history(None), Some(("hello room".to_string(), 0)));
}

#[tokio::test]
async fn test_say_before_login_is_not_connected() {
    let room = MockRoom::start().await;
    let session = session(&room.address(), "Alice", config());

    let result = session.say("anyone?").await;

    assert!(matches!(result, Err(SessionError::NotConnected)));
}

#[tokio::test]
async fn test_update_tags_sends_connect_update_when_ready() {
    let mut room = MockRoom::start().await;
    let session = logged_in(&room, config()).await;

    session.update_tags(["TextOnly", "DeathLink"]).await.unwrap();

    let ClientPacket::ConnectUpdate { tags, .. } = room.expect_packet("ConnectUpdate").await else {
        unreachable!()
    };
    assert_eq!(tags, vec!["TextOnly".to_string(), "DeathLink".to_string()]);
    assert_eq!(session.tags(), tags);
}

#[tokio::test]
async fn test_death_link_is_received_and_sent() {
    let mut room = MockRoom::start().await;
    let session = logged_in(&room, config().with_tags(["DeathLink"])).await;
    let mut events = session.subscribe();

    room.push(json!({
        "cmd": "Bounced",
        "tags": ["DeathLink"],
        "data": {"source": "Bob", "cause": "fell", "time": 1.5}
    }));
    let event = next_event(&mut events, |e| matches!(e, SessionEvent::DeathLink(_))).await;
    let SessionEvent::DeathLink(death) = event else {
        unreachable!()
    };
    assert_eq!(death.source, "Bob");
    assert_eq!(death.cause, "fell");

    session.trigger_death_link("lava").await.unwrap();
    let ClientPacket::Bounce { tags, data, .. } = room.expect_packet("Bounce").await else {
        unreachable!()
    };
    assert_eq!(tags, vec!["DeathLink".to_string()]);
    assert_eq!(data["source"], "Alice");
    assert_eq!(data["cause"], "lava");
}

#[tokio::test]
async fn test_push_notice_is_logged_and_broadcast() {
    let room = MockRoom::start().await;
    let session = session(&room.address(), "Alice", config());
    let mut events = session.subscribe();

    session.push_notice("hello", true);

    let event = next_event(&mut events, |e| matches!(e, SessionEvent::Message { .. })).await;
    assert!(matches!(event, SessionEvent::Message { hidden: true, .. }));
    assert_eq!(session.text_log(), vec!["hello".to_string()]);
    assert_eq!(session.html_log(), vec!["<span class=\"text\">hello</span>".to_string()]);
}

// =========================================================================
// Close and reconnect
// =========================================================================

#[tokio::test]
async fn test_close_is_idempotent() {
    let room = MockRoom::start().await;
    let session = logged_in(&room, config()).await;
    let mut events = session.subscribe();

    session.close().await;
    session.close().await;

    let mut closed = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SessionEvent::Closed) {
            closed += 1;
        }
    }
    assert_eq!(closed, 1);
    assert!(session.is_closed());
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(session.login(false).await, Err(SessionError::Closed)));
}

#[tokio::test]
async fn test_reconnects_after_link_loss() {
    let room = MockRoom::start().await;
    let session = logged_in(&room, config()).await;
    let mut events = session.subscribe();
    let mut states = session.watch_state();

    room.kick();

    next_event(&mut events, |e| matches!(e, SessionEvent::Connected)).await;
    wait_for_state(&mut states, SessionState::Ready).await;
    assert_eq!(room.connections(), 2);
    // The package stays cached across logins.
    assert_eq!(room.fetches(), 1);
    session.close().await;
}

#[tokio::test]
async fn test_refusal_while_reconnecting_closes_session() {
    let room = MockRoom::start().await;
    let session = logged_in(&room, config()).await;
    let mut events = session.subscribe();

    room.close_logins();
    room.kick();

    next_event(&mut events, |e| matches!(e, SessionEvent::Closed)).await;
    assert!(session.is_closed());
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_reconnect_reuses_the_scheme_that_worked() {
    let room = MockRoom::start().await;
    let session = session(&room.bare_address(), "Alice", config());
    session.login(false).await.unwrap();
    // wss:// was dialed and failed, then ws:// answered.
    assert_eq!(room.accepts(), 2);
    assert_eq!(room.connections(), 1);
    let mut events = session.subscribe();

    room.kick();
    next_event(&mut events, |e| matches!(e, SessionEvent::Connected)).await;

    assert_eq!(room.accepts(), 3);
    assert_eq!(room.connections(), 2);
    assert_eq!(session.endpoint().unwrap().scheme(), Scheme::Insecure);
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_delay_grows_then_resets_after_login() {
    let room = MockRoom::start().await;
    let session = logged_in(&room, config()).await;
    let mut events = session.subscribe();

    room.hang_up_next(3);
    let kicked = Instant::now();
    room.kick();
    next_event(&mut events, |e| matches!(e, SessionEvent::Connected)).await;

    let times = room.accept_times();
    assert_gaps(kicked, &times[1..], &[50, 100, 150, 200]);
    assert_eq!(session.state(), SessionState::Ready);

    room.hang_up_next(1);
    let kicked = Instant::now();
    room.kick();
    next_event(&mut events, |e| matches!(e, SessionEvent::Connected)).await;

    let times = room.accept_times();
    assert_gaps(kicked, &times[5..], &[50, 100]);
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_close_while_reconnecting_cancels_the_pending_dial() {
    let room = MockRoom::start().await;
    let session = logged_in(&room, config()).await;
    let mut states = session.watch_state();

    room.kick();
    wait_for_state(&mut states, SessionState::Reconnecting).await;
    let mut events = session.subscribe();
    session.close().await;
    next_event(&mut events, |e| matches!(e, SessionEvent::Closed)).await;

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(room.accepts(), 1);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(session.state(), SessionState::Closed);
}
