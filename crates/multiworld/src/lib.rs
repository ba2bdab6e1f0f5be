//! # Multiworld
//!
//! Client engine for multiworld randomizer room servers.
//!
//! A [`Client`] keeps any number of [`Session`]s, each one slot logged into
//! one room. Sessions track the slot's locations, received items and hint
//! points, resolve item and location ids through a shared data package
//! cache, and decode the room's chat into text and HTML.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use multiworld::prelude::*;
//!
//! # async fn run() -> Result<(), MultiworldError> {
//! multiworld::init_logging();
//!
//! let store = Arc::new(JsonFileStore::open("multiworld.json")?);
//! let client = Client::new(store, ClientConfig::default())?;
//! client.start().await?;
//!
//! let session = client.connect("room.example:38281", "Alice", "", None).await?;
//! let mut events = session.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let SessionEvent::Message { message, .. } = event {
//!         println!("{}", message.text);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;

pub use client::{CREDENTIALS_PREFIX, Client, ClientConfig, SavedCredentials};
pub use error::MultiworldError;

pub use multiworld_datapackage as datapackage;
pub use multiworld_protocol as protocol;
pub use multiworld_session as session;
pub use multiworld_transport as transport;

/// Installs a `tracing` subscriber that honours `RUST_LOG` and defaults to
/// `info`.
///
/// Meant for binaries; calling it twice is harmless.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Common imports for client code.
pub mod prelude {
    pub use crate::{Client, ClientConfig, MultiworldError, SavedCredentials};
    pub use multiworld_datapackage::{DataPackageCache, JsonFileStore, MemoryStore, Store};
    pub use multiworld_protocol::{ClientStatus, DeathLink, ItemFlags, NetworkItem};
    pub use multiworld_session::{
        Message, MessageNode, Player, Session, SessionConfig, SessionError, SessionEvent,
        SessionState,
    };
    pub use multiworld_transport::{Endpoint, RoomAddress};
}
