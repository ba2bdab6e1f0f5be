//! A terminal chat client for one room.
//!
//! ```text
//! text-client <address> <slot> [password]
//! ```
//!
//! Room chat is printed as plain text; lines typed on stdin are sent as
//! chat. `/ready` marks the slot ready, `/quit` disconnects.

use std::sync::Arc;

use multiworld::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};

const STORE_FILE: &str = "multiworld.json";

// ---------------------------------------------------------------------------
// Event printing
// ---------------------------------------------------------------------------

fn print_event(session: &Session, event: SessionEvent) {
    match event {
        SessionEvent::Connected => println!("* connected as {}", session.display_name()),
        SessionEvent::Closed => println!("* session closed"),
        SessionEvent::Message { message, .. } => println!("{}", message.text),
        SessionEvent::HintsChanged { hint_points, hints } => {
            println!("* {hint_points} hint points ({hints} hints)");
        }
        SessionEvent::AliasChanged {
            old_alias,
            new_alias,
            ..
        } => println!("* {old_alias} is now known as {new_alias}"),
        SessionEvent::NewItems { items, replay } => {
            if !replay {
                for item in &items {
                    let item = session.resolve_item(item);
                    println!("* received {} ({})", item.name, item.label());
                }
            }
        }
        SessionEvent::CountdownChanged(value) => println!("* countdown: {value}"),
        SessionEvent::DeathLink(death) => {
            println!("* {} died: {}", death.source, death.cause);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    multiworld::init_logging();

    let mut args = std::env::args().skip(1);
    let (Some(address), Some(slot)) = (args.next(), args.next()) else {
        eprintln!("usage: text-client <address> <slot> [password]");
        std::process::exit(2);
    };
    let password = args.next().unwrap_or_default();

    let store = Arc::new(JsonFileStore::open(STORE_FILE)?);
    let client = Client::new(store, ClientConfig::default())?;
    let session = client.connect(&address, &slot, &password, None).await?;
    println!(
        "* {} hints available, {} of {} locations checked",
        session.hints(),
        session.checked_locations().len(),
        session.checked_locations().len() + session.missing_locations().len()
    );

    let mut events = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::Closed) | Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                Ok(event) => print_event(&session, event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "dropped events");
                }
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let result = match line.trim() {
                    "" => Ok(()),
                    "/quit" => break,
                    "/ready" => session.set_ready().await,
                    text => session.say(text).await,
                };
                if let Err(error) = result {
                    eprintln!("! {error}");
                }
            }
        }
    }

    client.disconnect(session.id()).await;
    Ok(())
}
