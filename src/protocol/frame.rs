//! WebSocket frames as delivered by the lower transport.
//!
//! A [`Frame`] is one `(fin, rsv1, opcode, payload)` unit. Masking, length
//! encoding and the other wire details belong to the transport; the engine
//! only sees decoded frames.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::{Error, Result};

// ============================================================================
// Close Codes
// ============================================================================

/// Close codes used by the engine (RFC 6455 Section 7.4.1).
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away (used on shutdown).
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error.
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Unsupported or malformed data.
    pub const BAD_DATA: u16 = 1003;
    /// No status code was present. Never sent on the wire.
    pub const NO_STATUS: u16 = 1005;
    /// Connection dropped without a close frame. Never sent on the wire.
    pub const ABNORMAL: u16 = 1006;
    /// Text payload was not valid UTF-8.
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Message exceeded the configured ceiling.
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    /// Local failure unrelated to the peer's data.
    pub const INTERNAL_ERROR: u16 = 1011;

    /// Returns `true` if `code` may appear in a close frame.
    #[must_use]
    pub const fn is_sendable(code: u16) -> bool {
        !matches!(code, NO_STATUS | ABNORMAL | 1015)
    }

    /// Longest close reason that fits a control frame, in bytes.
    pub const MAX_REASON_LEN: usize = 123;

    /// Prepares `code` and `reason` for a close frame.
    ///
    /// Codes outside 1000-4999 become [`NORMAL`] and the reason is cut to
    /// [`MAX_REASON_LEN`] bytes on a char boundary. Returns `None` for codes
    /// that are never sent.
    #[must_use]
    pub fn normalize(code: u16, reason: &str) -> Option<(u16, &str)> {
        let code = if (1000..=4999).contains(&code) { code } else { NORMAL };
        if !is_sendable(code) {
            return None;
        }

        let mut end = reason.len().min(MAX_REASON_LEN);
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        Some((code, &reason[..end]))
    }
}

// ============================================================================
// OpCode
// ============================================================================

/// Frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Continuation of a fragmented message.
    Continuation = 0x0,
    /// First frame of a text message.
    Text = 0x1,
    /// First frame of a binary message.
    Binary = 0x2,
    /// Connection close.
    Close = 0x8,
    /// Ping.
    Ping = 0x9,
    /// Pong.
    Pong = 0xA,
}

impl OpCode {
    /// Returns `true` for close, ping and pong.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    /// Returns `true` for text and binary (message-starting opcodes).
    #[inline]
    #[must_use]
    pub const fn is_message_start(self) -> bool {
        matches!(self, Self::Text | Self::Binary)
    }

    /// Parses a 4-bit opcode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] (1002) for reserved opcodes.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(Error::protocol(
                close_code::PROTOCOL_ERROR,
                format!("Unknown opcode {other:#x}"),
            )),
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Continuation => "continuation",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Frame
// ============================================================================

/// One decoded WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    fin: bool,
    rsv1: bool,
    opcode: OpCode,
    payload: Vec<u8>,
}

impl Frame {
    /// Creates an uncompressed frame.
    #[inline]
    #[must_use]
    pub fn new(opcode: OpCode, fin: bool, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin,
            rsv1: false,
            opcode,
            payload: payload.into(),
        }
    }

    /// Creates a text frame.
    #[inline]
    #[must_use]
    pub fn text(fin: bool, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Text, fin, payload)
    }

    /// Creates a binary frame.
    #[inline]
    #[must_use]
    pub fn binary(fin: bool, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Binary, fin, payload)
    }

    /// Creates a continuation frame.
    #[inline]
    #[must_use]
    pub fn continuation(fin: bool, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(OpCode::Continuation, fin, payload)
    }

    /// Creates a close frame carrying `code` and `reason`.
    #[must_use]
    pub fn close(code: u16, reason: &str) -> Self {
        Self::new(OpCode::Close, true, encode_close_payload(code, reason))
    }

    /// Returns a copy of this frame with RSV1 set to `rsv1`.
    #[inline]
    #[must_use]
    pub fn with_rsv1(mut self, rsv1: bool) -> Self {
        self.rsv1 = rsv1;
        self
    }

    /// Final-fragment flag.
    #[inline]
    #[must_use]
    pub fn fin(&self) -> bool {
        self.fin
    }

    /// RSV1 bit; marks the first frame of a compressed message.
    #[inline]
    #[must_use]
    pub fn rsv1(&self) -> bool {
        self.rsv1
    }

    /// Frame opcode.
    #[inline]
    #[must_use]
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the frame and returns its payload.
    #[inline]
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Replaces the payload, keeping flags and opcode.
    #[inline]
    #[must_use]
    pub(crate) fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }
}

// ============================================================================
// Close Payload
// ============================================================================

/// Encodes a close frame body: big-endian code followed by the UTF-8 reason.
///
/// Codes that must not appear on the wire produce an empty body; see
/// [`close_code::normalize`] for the rest.
#[must_use]
pub fn encode_close_payload(code: u16, reason: &str) -> Vec<u8> {
    let Some((code, reason)) = close_code::normalize(code, reason) else {
        return Vec::new();
    };
    let mut payload = Vec::with_capacity(2 + reason.len());
    payload.extend_from_slice(&code.to_be_bytes());
    payload.extend_from_slice(reason.as_bytes());
    payload
}

/// Decodes a close frame body into `(code, reason)`.
///
/// An empty body means no status (1005).
///
/// # Errors
///
/// Returns [`Error::Protocol`] (1002) for a one-byte body.
pub fn decode_close_payload(payload: &[u8]) -> Result<(u16, String)> {
    match payload {
        [] => Ok((close_code::NO_STATUS, String::new())),
        [_] => Err(Error::protocol(
            close_code::PROTOCOL_ERROR,
            "Close frame payload too short",
        )),
        [hi, lo, reason @ ..] => Ok((
            u16::from_be_bytes([*hi, *lo]),
            String::from_utf8_lossy(reason).into_owned(),
        )),
    }
}

// ============================================================================
// Tests
// ============================================================================
