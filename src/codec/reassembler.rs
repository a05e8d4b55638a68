//! Fragmented message reassembly.
//!
//! A [`MessageReassembler`] consumes one connection's frames (already
//! inflated) and yields a [`Step`] per frame. Data frames accumulate until
//! the final fragment; control frames are reported as they arrive, even in
//! the middle of a fragmented message.

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{Frame, Message, MessageKind, OpCode, close_code, decode_close_payload};

use super::buffer::FrameBuffer;
use super::{CodecConfig, MessageLimits};

// ============================================================================
// Step
// ============================================================================

/// Outcome of pushing one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Frame consumed; no message is complete yet.
    Pending,
    /// A complete message.
    Message(Message),
    /// Ping with its payload; the caller answers with a pong.
    Ping(Vec<u8>),
    /// Pong.
    Pong,
    /// The peer started the close handshake.
    Close {
        /// Close code (1005 if the frame had no body).
        code: u16,
        /// Close reason.
        reason: String,
    },
}

// ============================================================================
// MessageReassembler
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Accumulating(MessageKind),
    Closed,
}

/// Per-connection state machine turning frames into messages.
#[derive(Debug)]
pub struct MessageReassembler {
    state: State,
    buffer: FrameBuffer,
    limits: MessageLimits,
}

impl MessageReassembler {
    /// Creates an idle reassembler enforcing `limits`.
    #[must_use]
    pub fn new(limits: MessageLimits, config: &CodecConfig) -> Self {
        Self {
            state: State::Idle,
            buffer: FrameBuffer::with_capacity(config.message_buffer_capacity),
            limits,
        }
    }

    /// Returns `true` while a fragmented message is in progress.
    #[inline]
    #[must_use]
    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, State::Accumulating(_))
    }

    /// Returns `true` once a close frame was seen.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Bytes buffered for the message in progress.
    #[inline]
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds one frame.
    ///
    /// Frames pushed after a close frame are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] with:
    /// - 1002 for a continuation without a message in progress, a new
    ///   message inside a fragmented one, or a malformed close body
    /// - 1007 for a text message that is not valid UTF-8
    /// - 1009 when the message would exceed its size ceiling
    ///
    /// The message in progress is discarded on error.
    pub fn push(&mut self, frame: Frame) -> Result<Step> {
        if self.state == State::Closed {
            trace!(opcode = %frame.opcode(), "Frame after close ignored");
            return Ok(Step::Pending);
        }

        let result = self.process(frame);
        if result.is_err() && self.state != State::Closed {
            self.reset();
        }
        result
    }

    fn process(&mut self, frame: Frame) -> Result<Step> {
        let opcode = frame.opcode();

        match (self.state, opcode) {
            (_, OpCode::Close) => {
                self.release();
                let (code, reason) = decode_close_payload(frame.payload())?;
                debug!(code, %reason, "Close frame received");
                Ok(Step::Close { code, reason })
            }
            (_, OpCode::Ping) => Ok(Step::Ping(frame.into_payload())),
            (_, OpCode::Pong) => Ok(Step::Pong),

            (State::Idle, OpCode::Text | OpCode::Binary) => {
                let kind = if opcode == OpCode::Text {
                    MessageKind::Text
                } else {
                    MessageKind::Binary
                };
                self.check_limit(kind, frame.payload().len())?;

                if frame.fin() {
                    return finish(kind, frame.into_payload()).map(Step::Message);
                }
                self.buffer.append(frame.payload());
                self.state = State::Accumulating(kind);
                Ok(Step::Pending)
            }
            (State::Accumulating(kind), OpCode::Continuation) => {
                self.check_limit(kind, self.buffer.len() + frame.payload().len())?;
                self.buffer.append(frame.payload());

                if !frame.fin() {
                    return Ok(Step::Pending);
                }
                self.state = State::Idle;
                finish(kind, self.buffer.take()).map(Step::Message)
            }

            (State::Idle, OpCode::Continuation) => Err(Error::protocol(
                close_code::PROTOCOL_ERROR,
                "Continuation frame without a message in progress",
            )),
            (State::Accumulating(_), _) => Err(Error::protocol(
                close_code::PROTOCOL_ERROR,
                format!("Unexpected {opcode} frame inside a fragmented message"),
            )),
            (State::Closed, _) => Ok(Step::Pending),
        }
    }

    fn check_limit(&self, kind: MessageKind, size: usize) -> Result<()> {
        self.limits.check(kind, size)
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.state = State::Idle;
    }

    /// Drops the buffer allocation; the reassembler is terminal afterwards.
    fn release(&mut self) {
        self.buffer = FrameBuffer::default();
        self.state = State::Closed;
    }
}

fn finish(kind: MessageKind, bytes: Vec<u8>) -> Result<Message> {
    match kind {
        MessageKind::Binary => Ok(Message::Binary(bytes)),
        MessageKind::Text => String::from_utf8(bytes).map(Message::Text).map_err(|_| {
            Error::protocol(close_code::INVALID_PAYLOAD, "Invalid UTF-8 in text message")
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================
