//! Protocol types shared by the engine and the host.
//!
//! # Overview
//!
//! | Type | Direction | Purpose |
//! |------|-----------|---------|
//! | `Frame` | Transport ↔ Engine | One decoded WebSocket frame |
//! | `Message` | Engine → Host | Reassembled text/binary payload |
//! | `Operation` | Host → Engine | `create`, `send`, `close` |
//! | `Event` | Engine → Host | `onopen`, `onmessage`, `onclose`, `onerror` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Host operations and `create` options |
//! | `event` | Host events and their JSON form |
//! | `frame` | Frames, opcodes and close codes |
//! | `message` | Reassembled messages |

// ============================================================================
// Submodules
// ============================================================================

/// Host operations.
pub mod command;

/// Host events.
pub mod event;

/// Frames and close codes.
pub mod frame;

/// Reassembled messages.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{CreateOptions, DEFAULT_MAX_MESSAGE_SIZE, Operation};
pub use event::Event;
pub use frame::{Frame, OpCode, close_code, decode_close_payload, encode_close_payload};
pub use message::{Message, MessageKind};
