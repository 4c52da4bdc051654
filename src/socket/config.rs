//! Socket configuration.
//!
//! Timeouts, back-pressure limits, and the policies that decide what happens
//! when the connection drops.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use devtools_socket::{OfflinePolicy, ReconnectPolicy, SocketConfig};
//!
//! let config = SocketConfig::new()
//!     .with_command_timeout(Duration::from_secs(10))
//!     .with_reconnect(ReconnectPolicy::exponential(5))
//!     .with_offline(OfflinePolicy::Queue { capacity: 64 });
//!
//! config.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default time a caller waits for a command's response.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed to dial the endpoint.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum number of commands awaiting a response.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Default first reconnect delay.
pub const DEFAULT_RECONNECT_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Default reconnect delay cap.
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// What the socket does when the connection drops unexpectedly.
///
/// Commands already written when the connection drops are never replayed;
/// they fail with [`Error::ConnectionClosed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Connection loss is terminal.
    #[default]
    Disabled,

    /// Retry with exponential backoff.
    Exponential {
        /// Attempts before giving up.
        max_attempts: u32,
        /// Delay before the first attempt.
        initial_delay: Duration,
        /// Upper bound for any single delay.
        max_delay: Duration,
    },
}

impl ReconnectPolicy {
    /// Exponential backoff with default delays.
    #[inline]
    #[must_use]
    pub const fn exponential(max_attempts: u32) -> Self {
        Self::Exponential {
            max_attempts,
            initial_delay: DEFAULT_RECONNECT_INITIAL_DELAY,
            max_delay: DEFAULT_RECONNECT_MAX_DELAY,
        }
    }

    /// Returns `true` if reconnection is attempted.
    #[inline]
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Exponential { .. })
    }

    /// Delay before the zero-based `attempt`, or `None` once attempts are
    /// exhausted.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match *self {
            Self::Disabled => None,
            Self::Exponential {
                max_attempts,
                initial_delay,
                max_delay,
            } => {
                if attempt >= max_attempts {
                    return None;
                }
                let factor = 2u32.saturating_pow(attempt);
                Some(initial_delay.saturating_mul(factor).min(max_delay))
            }
        }
    }
}

// ============================================================================
// OfflinePolicy
// ============================================================================

/// What happens to commands submitted while the socket is reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OfflinePolicy {
    /// Reject with [`Error::NotOpen`].
    #[default]
    FailFast,

    /// Hold up to `capacity` commands and write them in submission order
    /// once reconnected. Overflow fails with [`Error::QueueFull`].
    Queue {
        /// Maximum queued commands.
        capacity: usize,
    },
}

impl OfflinePolicy {
    /// Returns `true` if commands are queued while reconnecting.
    #[inline]
    #[must_use]
    pub const fn queues(&self) -> bool {
        matches!(self, Self::Queue { .. })
    }
}

// ============================================================================
// SocketConfig
// ============================================================================

/// Socket configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    /// Default response timeout for [`Socket::submit`](crate::Socket::submit).
    pub command_timeout: Duration,

    /// Timeout for each dial, including reconnect attempts.
    pub connect_timeout: Duration,

    /// Maximum commands awaiting a response.
    pub max_pending: usize,

    /// Reconnect behavior on unexpected disconnect.
    pub reconnect: ReconnectPolicy,

    /// Submission behavior while reconnecting.
    pub offline: OfflinePolicy,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl SocketConfig {
    /// Creates a configuration with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_pending: DEFAULT_MAX_PENDING,
            reconnect: ReconnectPolicy::Disabled,
            offline: OfflinePolicy::FailFast,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SocketConfig {
    /// Sets the default command timeout.
    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the dial timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the pending command limit.
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Sets the offline submission policy.
    #[inline]
    #[must_use]
    pub fn with_offline(mut self, offline: OfflinePolicy) -> Self {
        self.offline = offline;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SocketConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout.is_zero() {
            return Err(Error::config("command_timeout must be greater than zero"));
        }

        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect_timeout must be greater than zero"));
        }

        if self.max_pending == 0 {
            return Err(Error::config("max_pending must be greater than zero"));
        }

        if let ReconnectPolicy::Exponential {
            max_attempts,
            initial_delay,
            max_delay,
        } = self.reconnect
        {
            if max_attempts == 0 {
                return Err(Error::config("reconnect max_attempts must be greater than zero"));
            }
            if initial_delay > max_delay {
                return Err(Error::config(
                    "reconnect initial_delay must not exceed max_delay",
                ));
            }
        }

        if let OfflinePolicy::Queue { capacity } = self.offline {
            if capacity == 0 {
                return Err(Error::config("offline queue capacity must be greater than zero"));
            }
            if !self.reconnect.is_enabled() {
                return Err(Error::config(
                    "offline queueing requires a reconnect policy",
                ));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_default() {
        let config = SocketConfig::new();
        assert_eq!(config.command_timeout, DEFAULT_COMMAND_TIMEOUT);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.max_pending, DEFAULT_MAX_PENDING);
        assert_eq!(config.reconnect, ReconnectPolicy::Disabled);
        assert_eq!(config.offline, OfflinePolicy::FailFast);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = SocketConfig::new()
            .with_command_timeout(Duration::from_secs(5))
            .with_connect_timeout(Duration::from_secs(2))
            .with_max_pending(8)
            .with_reconnect(ReconnectPolicy::exponential(3))
            .with_offline(OfflinePolicy::Queue { capacity: 4 });

        assert_eq!(config.command_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.max_pending, 8);
        assert!(config.reconnect.is_enabled());
        assert!(config.offline.queues());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::Exponential {
            max_attempts: 6,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };

        let delays: Vec<_> = (0..7).map(|a| policy.delay_for(a)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(100)),
                Some(Duration::from_millis(200)),
                Some(Duration::from_millis(400)),
                Some(Duration::from_millis(800)),
                Some(Duration::from_millis(1000)),
                Some(Duration::from_millis(1000)),
                None,
            ]
        );
    }

    #[test]
    fn test_disabled_has_no_delay() {
        assert_eq!(ReconnectPolicy::Disabled.delay_for(0), None);
    }

    #[test]
    fn test_validate_zero_timeout() {
        let config = SocketConfig::new().with_command_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_max_pending() {
        let config = SocketConfig::new().with_max_pending(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_queue_without_reconnect() {
        let config = SocketConfig::new().with_offline(OfflinePolicy::Queue { capacity: 4 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_inverted_delays() {
        let config = SocketConfig::new().with_reconnect(ReconnectPolicy::Exponential {
            max_attempts: 1,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(1),
        });
        assert!(config.validate().is_err());
    }
}
