//! Self-healing WebSocket client.
//!
//! This library keeps a WebSocket connection to a server alive: it retries
//! refused connections with exponential backoff and, when enabled, replaces a
//! closed session with a fresh one.
//!
//! # Architecture
//!
//! - **Coordinator**: one task per `start()`; connects, backs off, runs sessions
//! - **Session**: socket plus framing state plus read worker of one connection
//! - **Connector**: capability onto the protocol engine (`tokio-tungstenite`)
//!
//! Key design principles:
//!
//! - Only connection-refused failures are retried; everything else ends the loop
//! - Every refusal doubles the previous delay, capped by the ceiling
//! - Every session is fresh; nothing is reused across connections
//! - `stop()` returns after all background tasks have exited
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use ws_reconnect::{Message, ReconnectClient, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = ReconnectClient::builder()
//!         .url("ws://127.0.0.1:8080/ocpp/CP01")
//!         .protocol("ocpp1.6")
//!         .initial_backoff(Duration::from_secs(1))
//!         .max_backoff(Duration::from_secs(5))
//!         .build()?;
//!
//!     client.set_message_handler(|message: Message| println!("{message}"));
//!     client.start(true)?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`backoff`] | Exponential backoff policy |
//! | [`client`] | [`ReconnectClient`], builder, states and events |
//! | [`endpoint`] | Connection targets |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`transport`] | Resolver, connector and session |

// ============================================================================
// Modules
// ============================================================================

/// Exponential backoff for reconnect attempts.
pub mod backoff;

/// Reconnecting client and its configuration.
///
/// Use [`ReconnectClient::builder()`] to create a configured client.
pub mod client;

/// Connection targets: TCP host and port, or Unix socket path.
pub mod endpoint;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// WebSocket transport layer.
///
/// Address resolution, the protocol engine capability and sessions.
pub mod transport;

#[cfg(test)]
mod test_support;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{ClientBuilder, ClientConfig, ClientEvent, ClientState, ReconnectClient};

// Configuration types
pub use backoff::BackoffPolicy;
pub use endpoint::Endpoint;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::SessionId;

// Transport types
pub use transport::{CloseInfo, Connector, MessageHandler, TungsteniteConnector};

// Message type of the protocol engine
pub use tokio_tungstenite::tungstenite::Message;
