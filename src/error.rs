//! Error types for the reconnecting WebSocket client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use ws_reconnect::{ReconnectClient, Result};
//!
//! async fn example(client: &ReconnectClient) -> Result<()> {
//!     client.send_text("hello").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connect (transient) | [`Error::ConnectionRefused`] |
//! | Connect (fatal) | [`Error::Resolve`], [`Error::Connection`], [`Error::ConnectionTimeout`] |
//! | Usage | [`Error::NotConnected`], [`Error::ConnectionClosed`], [`Error::Timeout`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |
//!
//! Only connection-refused failures are retried by the reconnect loop, see
//! [`Error::is_connection_refused`].

// ============================================================================
// Imports
// ============================================================================

use std::io::{Error as IoError, ErrorKind};
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when the client configuration or endpoint is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connect Errors
    // ========================================================================
    /// The peer actively refused the connection.
    ///
    /// This is the only failure the reconnect loop retries.
    #[error("Connection to {endpoint} refused")]
    ConnectionRefused {
        /// Endpoint that refused the connection.
        endpoint: String,
    },

    /// Host name could not be resolved.
    #[error("Failed to resolve {host}: {message}")]
    Resolve {
        /// Host that failed to resolve.
        host: String,
        /// Description of the resolution failure.
        message: String,
    },

    /// WebSocket connection failed.
    ///
    /// Returned when the handshake is rejected or the transport fails.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connect attempt exceeded the configured timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Usage Errors
    // ========================================================================
    /// A message was sent while no session is open.
    #[error("Not connected")]
    NotConnected,

    /// The session closed while an operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection refused error.
    #[inline]
    pub fn connection_refused(endpoint: impl Into<String>) -> Self {
        Self::ConnectionRefused {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a resolution error.
    #[inline]
    pub fn resolve(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolve {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the peer actively refused the connection.
    ///
    /// Covers the dedicated variant as well as raw I/O errors of kind
    /// [`ErrorKind::ConnectionRefused`], bare or wrapped by the WebSocket
    /// engine.
    #[must_use]
    pub fn is_connection_refused(&self) -> bool {
        match self {
            Self::ConnectionRefused { .. } => true,
            Self::Io(err) => err.kind() == ErrorKind::ConnectionRefused,
            Self::WebSocket(WsError::Io(err)) => err.kind() == ErrorKind::ConnectionRefused,
            _ => false,
        }
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::Timeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused { .. }
                | Self::Resolve { .. }
                | Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::NotConnected
                | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
