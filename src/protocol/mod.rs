//! Protocol message types and wire codec.
//!
//! This module defines the message format exchanged with the remote end.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Local → Remote | Command request `{id, method, params}` |
//! | `Response` | Remote → Local | Command reply `{id, result\|error}` |
//! | `Event` | Remote → Local | Push notification `{method, params}` |
//!
//! # Command Naming
//!
//! Commands and events follow `Domain.name` format:
//!
//! - `Page.navigate`
//! - `DOM.getDocument`
//! - `HeadlessExperimental.needsBeginFramesChanged`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Frame encoding and classification |
//! | `command` | Command built by façades |
//! | `event` | Event type |
//! | `request` | Request, Response and RemoteError types |

// ============================================================================
// Submodules
// ============================================================================

/// Frame encoding and classification.
pub mod codec;

/// Command definition.
pub mod command;

/// Event message type.
pub mod event;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::DecodedFrame;
pub use command::Command;
pub use event::Event;
pub use request::{RemoteError, Request, Response};
