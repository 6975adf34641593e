//! Reconnecting client.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent configuration and validation |
//! | `coordinator` | Connect, back off, run sessions, reconnect |
//! | `core` | [`ReconnectClient`] façade |
//! | `state` | [`ClientState`] and [`ClientEvent`] |

// ============================================================================
// Submodules
// ============================================================================

/// Client builder and validated configuration.
pub mod builder;

/// Reconnect loop.
pub(crate) mod coordinator;

/// Caller-facing client.
pub mod core;

/// States and lifecycle events.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{ClientBuilder, ClientConfig, DEFAULT_CONNECT_TIMEOUT};
pub use core::ReconnectClient;
pub use state::{ClientEvent, ClientState};
