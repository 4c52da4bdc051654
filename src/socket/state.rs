//! Connection state.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a socket's connection.
///
/// ```text
/// Connecting ──► Open ──► Reconnecting ──► Open
///                  │            │
///                  ▼            ▼
///               Closing ──► Closed
/// ```
///
/// Only `Open` accepts submissions, plus `Reconnecting` when the offline
/// policy queues commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Dialing the endpoint for the first time.
    Connecting,
    /// Connected, commands are written immediately.
    Open,
    /// Connection lost, reconnect policy is retrying.
    Reconnecting,
    /// Shutting down, pending commands are being drained.
    Closing,
    /// Terminal state.
    Closed,
}

impl ConnectionState {
    /// Returns `true` for [`ConnectionState::Open`].
    #[inline]
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` once the socket can never carry commands again.
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }

    /// Returns the lowercase state name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
