//! Type-safe identifiers.
//!
//! Newtype wrappers prevent mixing unrelated counters at compile time.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// SessionId
// ============================================================================

/// Process-wide counter backing [`SessionId::next`].
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one connection session.
///
/// Every successful handshake gets a fresh id, so log lines and events of
/// consecutive connections can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocates the next session id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
