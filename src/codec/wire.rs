//! RFC 6455 wire format.
//!
//! [`encode_frame`] writes one frame in client form (always masked) and
//! [`FrameDecoder`] cuts server frames out of a byte stream. Both keep RSV1,
//! which carries the permessage-deflate marker.
//!
//! ```text
//!  0               1               2               3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |            (16/64)            |
//! |N|V|V|V|       |S|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |       Masking key (client frames only)        |    Payload    |
//! +-----------------------------------------------+---------------+
//! ```

// ============================================================================
// Imports
// ============================================================================

use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::{Frame, OpCode, close_code};

use super::buffer::FrameBuffer;

// ============================================================================
// Constants
// ============================================================================

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

const FIN: u8 = 0x80;
const RSV1: u8 = 0x40;
const RSV2: u8 = 0x20;
const RSV3: u8 = 0x10;
const MASKED: u8 = 0x80;

// ============================================================================
// Encoding
// ============================================================================

/// Appends `frame` to `out`, masked with `mask`.
pub fn encode_frame(frame: &Frame, mask: [u8; 4], out: &mut Vec<u8>) {
    let payload = frame.payload();

    let mut first = frame.opcode() as u8;
    if frame.fin() {
        first |= FIN;
    }
    if frame.rsv1() {
        first |= RSV1;
    }
    out.push(first);

    match payload.len() {
        len @ 0..=125 => out.push(MASKED | len as u8),
        len @ 126..=0xFFFF => {
            out.push(MASKED | 126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        len => {
            out.push(MASKED | 127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
    }

    out.extend_from_slice(&mask);
    out.extend(
        payload
            .iter()
            .zip(mask.iter().cycle())
            .map(|(byte, key)| byte ^ key),
    );
}

// ============================================================================
// FrameDecoder
// ============================================================================

/// Incremental decoder for frames sent by a server.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: FrameBuffer,
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Creates a decoder that rejects payloads above `max_frame_size` bytes.
    #[must_use]
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: FrameBuffer::with_capacity(4096),
            max_frame_size,
        }
    }

    /// Queues bytes read from the socket.
    #[inline]
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.append(bytes);
    }

    /// Bytes received but not yet decoded.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decodes the next complete frame.
    ///
    /// Returns `Ok(None)` until enough bytes are buffered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] with 1002 for reserved bits or opcodes, a
    /// masked frame, or a fragmented or oversized control frame, and 1009
    /// for a payload above the size ceiling.
    pub fn decode(&mut self) -> Result<Option<Frame>> {
        let bytes = self.buffer.as_slice();
        let &[first, second, ..] = bytes else {
            return Ok(None);
        };

        if first & (RSV2 | RSV3) != 0 {
            return Err(violation("Reserved bits set"));
        }
        if second & MASKED != 0 {
            return Err(violation("Masked frame from server"));
        }

        let opcode = OpCode::from_u8(first & 0x0F)?;
        let fin = first & FIN != 0;
        let rsv1 = first & RSV1 != 0;

        let (len, header): (u64, usize) = match second & 0x7F {
            126 => match bytes.get(2..4) {
                Some(ext) => (u64::from(u16::from_be_bytes([ext[0], ext[1]])), 4),
                None => return Ok(None),
            },
            127 => match bytes.get(2..10) {
                Some(ext) => {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(ext);
                    (u64::from_be_bytes(raw), 10)
                }
                None => return Ok(None),
            },
            len => (u64::from(len), 2),
        };

        if opcode.is_control() {
            if !fin {
                return Err(violation("Fragmented control frame"));
            }
            if len > MAX_CONTROL_PAYLOAD as u64 {
                return Err(violation("Control frame payload too long"));
            }
        }

        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len <= self.max_frame_size)
            .ok_or_else(|| {
                Error::message_too_big(format!("Frame size > {} bytes", self.max_frame_size))
            })?;

        let Some(payload) = bytes.get(header..header.saturating_add(len)) else {
            return Ok(None);
        };

        let frame = Frame::new(opcode, fin, payload).with_rsv1(rsv1);
        self.buffer.consume_front(header + len);

        trace!(%opcode, fin, rsv1, len, "Frame decoded");
        Ok(Some(frame))
    }
}

fn violation(reason: &str) -> Error {
    Error::protocol(close_code::PROTOCOL_ERROR, reason)
}

// ============================================================================
// Tests
// ============================================================================
