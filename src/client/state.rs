//! Client state and lifecycle events.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use crate::identifiers::SessionId;
use crate::transport::CloseInfo;

// ============================================================================
// ClientState
// ============================================================================

/// Coarse state of the reconnect coordinator.
///
/// ```text
/// Idle ──start──► Connecting ──handshake──► Open ──closed──► Connecting
///   ▲                 │ fatal                 │ stop            (reconnect)
///   └─────────────────┘                       ▼
///                                          Closing ──► Stopped
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// Not connected and not trying to.
    #[default]
    Idle,
    /// Attempting to connect or waiting out a backoff delay.
    Connecting,
    /// A session is open.
    Open,
    /// A requested close is in progress.
    Closing,
    /// Stopped by the caller.
    Stopped,
}

impl ClientState {
    /// Returns `true` while the coordinator loop is running.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open | Self::Closing)
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ClientEvent
// ============================================================================

/// Lifecycle notification published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A connect attempt started (1-based within the connecting phase).
    Connecting {
        /// Attempt number.
        attempt: u32,
    },
    /// Handshake completed and a session is open.
    Connected {
        /// The new session.
        session_id: SessionId,
    },
    /// The attempt was refused; the next one follows after `delay`.
    Retrying {
        /// Refused attempt number.
        attempt: u32,
        /// Wait before the next attempt.
        delay: Duration,
    },
    /// An open session ended.
    Closed {
        /// The session that ended.
        session_id: SessionId,
        /// Close code and reason.
        info: CloseInfo,
    },
    /// The attempt failed with a non-retryable error; the loop stopped.
    Failed {
        /// Failed attempt number.
        attempt: u32,
        /// Error description.
        error: String,
    },
    /// The loop ended without a stop request.
    Idle,
    /// The client was stopped.
    Stopped,
}

// ============================================================================
// Tests
// ============================================================================
