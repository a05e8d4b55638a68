//! Frame-level codecs.
//!
//! # Pipeline
//!
//! ```text
//! inbound:  Frame ─► PerMessageDeflate::on_frame ─► MessageReassembler::push ─► Step
//! outbound: Message ─► Frame(s) ─► PerMessageDeflate::add_frame ─► FrameSink
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `buffer` | Growable byte accumulator |
//! | `deflate` | permessage-deflate negotiation and transform |
//! | `reassembler` | Fragment-to-message state machine |
//! | `wire` | RFC 6455 frame encoding and decoding |

// ============================================================================
// Submodules
// ============================================================================

/// Byte accumulator.
pub mod buffer;

/// permessage-deflate extension.
pub mod deflate;

/// Message reassembly.
pub mod reassembler;

/// Frame wire format.
pub mod wire;

// ============================================================================
// Re-exports
// ============================================================================

pub use buffer::FrameBuffer;
pub use deflate::{ExtensionParameters, PerMessageDeflate, parse_extension_header};
pub use reassembler::{MessageReassembler, Step};
pub use wire::{FrameDecoder, encode_frame};

use crate::error::{Error, Result};
use crate::protocol::MessageKind;

// ============================================================================
// CodecConfig
// ============================================================================

/// Sizing parameters shared by the codecs of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Initial capacity of the reassembly buffer.
    pub message_buffer_capacity: usize,
    /// Initial capacity of the inflate/deflate scratch buffer.
    pub compression_buffer_capacity: usize,
    /// DEFLATE level, 0..=9.
    pub compression_level: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            message_buffer_capacity: 8192,
            compression_buffer_capacity: 16384,
            compression_level: 6,
        }
    }
}

// ============================================================================
// MessageLimits
// ============================================================================

/// Per-kind message size ceilings in bytes; `None` is unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageLimits {
    /// Ceiling for text messages.
    pub max_text: Option<usize>,
    /// Ceiling for binary messages.
    pub max_binary: Option<usize>,
}

impl MessageLimits {
    /// No ceilings.
    #[inline]
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_text: None,
            max_binary: None,
        }
    }

    /// Ceiling for messages of `kind`.
    #[inline]
    #[must_use]
    pub const fn ceiling(&self, kind: MessageKind) -> Option<usize> {
        match kind {
            MessageKind::Text => self.max_text,
            MessageKind::Binary => self.max_binary,
        }
    }

    /// Checks a message of `kind` that has grown to `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] (1009) if `size` exceeds the ceiling.
    pub fn check(&self, kind: MessageKind, size: usize) -> Result<()> {
        match self.ceiling(kind) {
            Some(max) if size > max => Err(exceeded(kind, max)),
            _ => Ok(()),
        }
    }
}

/// 1009 error for a `kind` message over `max` bytes.
pub(crate) fn exceeded(kind: MessageKind, max: usize) -> Error {
    let label = match kind {
        MessageKind::Text => "Text",
        MessageKind::Binary => "Binary",
    };
    Error::message_too_big(format!("{label} message size > {max} bytes"))
}

// ============================================================================
// Tests
// ============================================================================
