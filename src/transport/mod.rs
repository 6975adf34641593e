//! WebSocket transport layer.
//!
//! This module turns an [`Endpoint`](crate::Endpoint) into an open WebSocket
//! session and runs that session's read worker.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  prepare   ┌──────────────┐  handshake  ┌──────────────┐
//! │   Endpoint   │───────────►│   Resolver   │────────────►│  Connector   │
//! │ host:port or │            │ socket +     │             │ (tungstenite)│
//! │ unix path    │            │ options      │             └──────┬───────┘
//! └──────────────┘            └──────────────┘                    │ WsStream
//!                                                                 ▼
//!                                                          ┌──────────────┐
//!                                                          │   Session    │
//!                                                          │ read worker  │
//!                                                          └──────────────┘
//! ```
//!
//! # Session Lifecycle
//!
//! 1. `resolver::prepare` - Fresh socket with options for this attempt
//! 2. `Connector::connect` - Transport connect + WebSocket handshake
//! 3. `Session::open` - Spawns the read worker
//! 4. `Session::wait_closed` / `Session::close` - Worker exits, reports once
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connector` | Protocol engine capability and default implementation |
//! | `resolver` | Address resolution and socket preparation |
//! | `session` | Session ownership and read worker |

// ============================================================================
// Submodules
// ============================================================================

/// Protocol engine capability.
pub mod connector;

/// Address resolution and socket options.
pub mod resolver;

/// Connection session and read worker.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use connector::{ClientRequest, Connector, HandshakeOptions, TungsteniteConnector, WsStream};
pub use resolver::{AddressFamily, AsyncIo, BoxedIo, ConnectTarget, PreparedSocket};
pub use session::{
    CLOSE_ABNORMAL, CLOSE_GOING_AWAY, CLOSE_NO_STATUS, CloseInfo, MessageHandler, Session,
    SessionHandle,
};
