//! Reconnecting client against a local server.
//!
//! Demonstrates:
//! - Building a client from a URL
//! - Retrying while the server is down
//! - Reconnecting after the server closes the session
//! - Graceful stop on Ctrl+C
//!
//! Usage:
//!   cargo run --example reconnect_client
//!   cargo run --example reconnect_client -- ws://127.0.0.1:9000/ocpp/CP01
//!   cargo run --example reconnect_client -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing_subscriber::EnvFilter;
use ws_reconnect::{ClientEvent, Message, ReconnectClient, Result};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_URL: &str = "ws://127.0.0.1:8080";

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let debug = args.iter().any(|a| a == "--debug");
    let url = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| DEFAULT_URL.to_owned());

    init_logging(debug);

    if let Err(e) = run(&url).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(url: &str) -> Result<()> {
    println!("=== Reconnect Client ===\n");

    let client = ReconnectClient::builder()
        .url(url)
        .initial_backoff(Duration::from_secs(1))
        .max_backoff(Duration::from_secs(5))
        .heartbeat(Duration::from_secs(30))
        .build()?;

    client.set_message_handler(|message: Message| {
        println!("[Recv] {message}");
    });

    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ClientEvent::Connected { session_id } => println!("[Event] connected ({session_id})"),
                ClientEvent::Retrying { delay, .. } => {
                    println!("[Event] refused, retrying in {}ms", delay.as_millis());
                }
                ClientEvent::Closed { info, .. } => println!("[Event] closed: {info}"),
                other => println!("[Event] {other:?}"),
            }
        }
    });

    println!("[Start] Connecting to {}", client.endpoint());
    client.start(true)?;

    println!("Press Ctrl+C to exit...");
    tokio::signal::ctrl_c().await.ok();

    client.stop().await;
    println!("[Done] Client stopped");
    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "ws_reconnect=debug"
    } else {
        "ws_reconnect=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
