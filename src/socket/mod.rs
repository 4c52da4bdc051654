//! Socket core: command correlation, event routing and connection lifecycle.
//!
//! | Component | Role |
//! |-----------|------|
//! | [`Socket`] | Facade handed to domain clients |
//! | [`SocketBuilder`] | Fluent configuration and connect |
//! | [`SocketConfig`] | Timeouts, limits, reconnect and offline policies |
//! | [`PendingTable`] | In-flight commands by correlation ID |
//! | [`EventRouter`] | Event handlers by event name |
//! | `manager` | Event loop owning the transport |
//!
//! # Data Flow
//!
//! ```text
//! submit ──► PendingTable::register ──► loop channel ──► FrameSink
//!                                                           │
//! caller ◄── oneshot ◄── PendingTable::complete ◄── decode ◄┤ FrameStream
//!                                                           │
//! handlers ◄────────── EventRouter::dispatch ◄──── decode ◄─┘
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent socket builder.
pub mod builder;

/// Configuration and policies.
pub mod config;

/// Socket facade.
pub mod core;

/// Event loop and connection lifecycle.
mod manager;

/// Pending-request table.
pub mod pending;

/// Event router.
pub mod router;

/// Connection state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SocketBuilder;
pub use config::{
    DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_PENDING, OfflinePolicy,
    ReconnectPolicy, SocketConfig,
};
pub use core::Socket;
pub use pending::{PendingTable, ResolutionReceiver};
pub use router::{EventHandler, EventRouter};
pub use state::ConnectionState;
