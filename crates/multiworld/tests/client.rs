//! Integration tests for [`Client`]: registration, lookup, persistence and
//! startup replay against a local room server.

mod common;

use std::sync::Arc;

use common::{MockRoom, PATIENCE, dead_address};
use multiworld::prelude::*;
use multiworld::{CREDENTIALS_PREFIX, SavedCredentials};
use serde_json::json;

fn client_with(store: Arc<dyn Store>) -> Client {
    Client::new(store, ClientConfig::default()).expect("client should build")
}

fn memory_client() -> (Client, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (client_with(store.clone()), store)
}

fn saved(room: &MockRoom, slot: &str) -> SavedCredentials {
    SavedCredentials {
        address: room.address(),
        slot: slot.to_string(),
        password: String::new(),
    }
}

async fn wait_until_empty(client: &Client) {
    tokio::time::timeout(PATIENCE, async {
        while !client.is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session was never unregistered");
}

// =========================================================================
// connect
// =========================================================================

#[tokio::test]
async fn test_connect_registers_and_saves_credentials() {
    let room = MockRoom::start().await;
    let (client, store) = memory_client();

    let session = client
        .connect(&room.address(), "Alice", "", None)
        .await
        .expect("should connect");

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(client.session_ids(), vec![session.id().to_string()]);
    assert_eq!(
        client.session_table(),
        vec![(
            session.id().to_string(),
            format!("Alice@127.0.0.1:{}", room.port())
        )]
    );

    let record = saved(&room, "Alice");
    let value = store.get(&record.key()).unwrap().expect("credentials saved");
    assert_eq!(serde_json::from_value::<SavedCredentials>(value).unwrap(), record);
}

#[tokio::test]
async fn test_connect_keeps_existing_id() {
    let room = MockRoom::start().await;
    let (client, _) = memory_client();

    let session = client
        .connect(&room.address(), "Alice", "", Some("fixed-id"))
        .await
        .unwrap();

    assert_eq!(session.id(), "fixed-id");
    assert!(client.session("fixed-id").is_some());
}

#[tokio::test]
async fn test_connect_duplicate_identity_ignores_case() {
    let room = MockRoom::start().await;
    let (client, _) = memory_client();
    client.connect(&room.address(), "Alice", "", None).await.unwrap();

    let result = client.connect(&room.address(), "ALICE", "", None).await;

    assert!(matches!(result, Err(MultiworldError::DuplicateSession(_))));
    assert_eq!(client.len(), 1);
    assert_eq!(room.logins(), 1);
}

#[tokio::test]
async fn test_connect_refused_is_not_registered() {
    let room = MockRoom::start().await;
    let (client, store) = memory_client();

    let result = client.connect(&room.address(), "Mallory", "", None).await;

    assert!(matches!(
        result,
        Err(MultiworldError::Session(SessionError::LoginRefused(_)))
    ));
    assert!(client.is_empty());
    assert!(store.keys_with_prefix(CREDENTIALS_PREFIX).unwrap().is_empty());
}

#[tokio::test]
async fn test_connect_unreachable_fails_without_retry() {
    let (client, _) = memory_client();

    let result = client.connect(&dead_address().await, "Alice", "", None).await;

    assert!(matches!(
        result,
        Err(MultiworldError::Session(SessionError::Connect(_)))
    ));
    assert!(client.is_empty());
}

#[tokio::test]
async fn test_sessions_share_the_data_package_cache() {
    let room = MockRoom::start().await;
    let (client, _) = memory_client();

    let alice = client.connect(&room.address(), "Alice", "", None).await.unwrap();
    let bob = client.connect(&room.address(), "Bob", "", None).await.unwrap();

    assert_eq!(room.fetches(), 1);
    assert_eq!(alice.item_name("Clique", 1001), "Feather");
    assert_eq!(bob.location_name("Clique", 2002), "Lever");
}

// =========================================================================
// find_session
// =========================================================================

#[tokio::test]
async fn test_find_session_matches_name_slot_and_host() {
    let room = MockRoom::start().await;
    let (client, _) = memory_client();
    assert!(client.find_session(None).is_none());

    let alice = client.connect(&room.address(), "Alice", "", None).await.unwrap();
    let bob = client.connect(&room.address(), "Bob", "", None).await.unwrap();

    let first = client.find_session(None).unwrap();
    assert_eq!(first.id(), alice.id());

    let exact = format!("bob@127.0.0.1:{}", room.port());
    assert_eq!(client.find_session(Some(&exact)).unwrap().id(), bob.id());
    assert_eq!(client.find_session(Some("BOB")).unwrap().id(), bob.id());
    assert_eq!(client.find_session(Some("127.0.0.1")).unwrap().id(), alice.id());
    assert!(client.find_session(Some("carol")).is_none());
    assert!(client.find_session(Some("ali")).is_none());
}

// =========================================================================
// disconnect and close
// =========================================================================

#[tokio::test]
async fn test_disconnect_removes_session_and_credentials() {
    let room = MockRoom::start().await;
    let (client, store) = memory_client();
    let session = client.connect(&room.address(), "Alice", "", None).await.unwrap();

    assert!(client.disconnect(session.id()).await);

    assert!(client.is_empty());
    assert!(session.is_closed());
    assert!(store.get(&saved(&room, "Alice").key()).unwrap().is_none());
    assert!(!client.disconnect(session.id()).await);
}

#[tokio::test]
async fn test_closed_session_is_unregistered() {
    let room = MockRoom::start().await;
    let (client, store) = memory_client();
    let session = client.connect(&room.address(), "Alice", "", None).await.unwrap();

    session.close().await;

    wait_until_empty(&client).await;
    tokio::time::timeout(PATIENCE, async {
        while store.get(&saved(&room, "Alice").key()).unwrap().is_some() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("credentials were never removed");
}

#[tokio::test]
async fn test_shutdown_keeps_credentials() {
    let room = MockRoom::start().await;
    let (client, store) = memory_client();
    let session = client.connect(&room.address(), "Alice", "", None).await.unwrap();

    client.shutdown().await;

    assert!(client.is_empty());
    assert!(session.is_closed());
    // Give the watcher a chance to run.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(store.get(&saved(&room, "Alice").key()).unwrap().is_some());
}

#[tokio::test]
async fn test_session_closing_after_shutdown_and_start_drops_credentials() {
    let room = MockRoom::start().await;
    let (client, store) = memory_client();
    client.connect(&room.address(), "Alice", "", None).await.unwrap();
    client.shutdown().await;

    let started = client.start().await.unwrap();
    assert_eq!(started.len(), 1);
    started[0].close().await;

    wait_until_empty(&client).await;
    tokio::time::timeout(PATIENCE, async {
        while store.get(&saved(&room, "Alice").key()).unwrap().is_some() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("credentials were never removed");
}

// =========================================================================
// start
// =========================================================================

#[tokio::test]
async fn test_start_replays_saved_credentials() {
    let room = MockRoom::start().await;
    let store = Arc::new(MemoryStore::new());
    let record = saved(&room, "Bob");
    store
        .put(&record.key(), serde_json::to_value(&record).unwrap())
        .unwrap();
    let client = client_with(store.clone());

    let started = client.start().await.unwrap();

    assert_eq!(started.len(), 1);
    assert_eq!(started[0].slot(), "Bob");
    assert_eq!(client.len(), 1);
    assert!(store.get(&record.key()).unwrap().is_some());
}

#[tokio::test]
async fn test_start_discards_failing_and_unreadable_records() {
    let dead = SavedCredentials {
        address: dead_address().await,
        slot: "Alice".into(),
        password: String::new(),
    };
    let store = Arc::new(MemoryStore::new());
    store
        .put(&dead.key(), serde_json::to_value(&dead).unwrap())
        .unwrap();
    store
        .put("credentials/garbage/Alice", json!("not a record"))
        .unwrap();
    let client = client_with(store.clone());

    let started = client.start().await.unwrap();

    assert!(started.is_empty());
    assert!(client.is_empty());
    assert!(store.keys_with_prefix(CREDENTIALS_PREFIX).unwrap().is_empty());
}

#[tokio::test]
async fn test_restart_from_file_store_reuses_packages_and_sessions() {
    let room = MockRoom::start().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("multiworld.json");

    let first = client_with(Arc::new(JsonFileStore::open(&path).unwrap()));
    first.connect(&room.address(), "Alice", "", None).await.unwrap();
    first.shutdown().await;
    assert_eq!(room.fetches(), 1);

    let second = client_with(Arc::new(JsonFileStore::open(&path).unwrap()));
    let started = second.start().await.unwrap();

    assert_eq!(started.len(), 1);
    assert_eq!(started[0].slot(), "Alice");
    assert_eq!(room.fetches(), 1);
    assert_eq!(started[0].item_name("Clique", 1001), "Feather");
}
