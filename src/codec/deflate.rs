//! permessage-deflate extension (RFC 7692).
//!
//! Negotiation turns the server's `Sec-WebSocket-Extensions` response into
//! [`ExtensionParameters`]; [`PerMessageDeflate`] then sits between the
//! transport and the reassembler, inflating inbound frames and deflating
//! outbound ones.
//!
//! # Wire Format
//!
//! A compressed message is a raw DEFLATE stream flushed with a sync flush,
//! minus the trailing `00 00 FF FF` of the final empty stored block. RSV1 is
//! set on the first frame only. The inflater is fed each frame as it
//! arrives and the trailer is restored after the final frame.
//!
//! # Context Takeover
//!
//! | Parameter | Effect |
//! |-----------|--------|
//! | `server_no_context_takeover` | Inflater reset before every inbound message |
//! | `client_no_context_takeover` | Deflater reset before every outbound message |

// ============================================================================
// Imports
// ============================================================================

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{Frame, MessageKind, OpCode, close_code};

use super::buffer::FrameBuffer;
use super::{CodecConfig, MessageLimits, exceeded};

// ============================================================================
// Constants
// ============================================================================

/// Extension token.
pub const EXTENSION_NAME: &str = "permessage-deflate";

const CLIENT_NO_CONTEXT_TAKEOVER: &str = "client_no_context_takeover";
const SERVER_NO_CONTEXT_TAKEOVER: &str = "server_no_context_takeover";
const SERVER_MAX_WINDOW_BITS: &str = "server_max_window_bits";

/// Empty stored block emitted by a sync flush; stripped on the wire.
const TRAILER: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Valid range for `server_max_window_bits`.
const WINDOW_BITS: std::ops::RangeInclusive<u8> = 8..=15;

/// Minimum spare room kept in the scratch buffer per codec call.
const CODEC_CHUNK: usize = 4096;

// ============================================================================
// ExtensionParameters
// ============================================================================

/// Negotiated permessage-deflate parameters.
///
/// Fixed for the lifetime of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtensionParameters {
    /// The extension is active.
    pub enabled: bool,
    /// Reset the outbound deflater before every message.
    pub client_no_context_takeover: bool,
    /// Reset the inbound inflater before every message.
    pub server_no_context_takeover: bool,
    /// Server's LZ77 window size, if the server announced one.
    pub server_max_window_bits: Option<u8>,
}

impl ExtensionParameters {
    /// Parameters for a connection without compression.
    #[inline]
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            client_no_context_takeover: false,
            server_no_context_takeover: false,
            server_max_window_bits: None,
        }
    }

    /// Accepts the server's extension parameters.
    ///
    /// Recognized keys are `permessage-deflate`, `client_no_context_takeover`
    /// and `server_no_context_takeover` (presence only), and
    /// `server_max_window_bits` (integer in 8..=15). Without the
    /// `permessage-deflate` key the result is [`ExtensionParameters::disabled`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Negotiation`] for an unknown or repeated key, a value
    /// on a presence-only key, or an invalid window size.
    pub fn negotiate<K, V>(params: &[(K, V)]) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut accepted = Self::disabled();

        for (key, value) in params {
            let (key, value) = (key.as_ref(), value.as_ref());

            match key {
                EXTENSION_NAME if value.is_empty() && !accepted.enabled => {
                    accepted.enabled = true;
                }
                CLIENT_NO_CONTEXT_TAKEOVER
                    if value.is_empty() && !accepted.client_no_context_takeover =>
                {
                    accepted.client_no_context_takeover = true;
                }
                SERVER_NO_CONTEXT_TAKEOVER
                    if value.is_empty() && !accepted.server_no_context_takeover =>
                {
                    accepted.server_no_context_takeover = true;
                }
                SERVER_MAX_WINDOW_BITS if accepted.server_max_window_bits.is_none() => {
                    accepted.server_max_window_bits = Some(parse_window_bits(value)?);
                }
                _ => return Err(unexpected_parameter(key, value)),
            }
        }

        if accepted.enabled {
            Ok(accepted)
        } else {
            Ok(Self::disabled())
        }
    }

    /// Canonical `Sec-WebSocket-Extensions` form of the accepted set.
    ///
    /// Empty when the extension is disabled.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        if !self.enabled {
            return String::new();
        }

        let mut parts = vec![EXTENSION_NAME.to_string()];
        if self.client_no_context_takeover {
            parts.push(CLIENT_NO_CONTEXT_TAKEOVER.to_string());
        }
        if self.server_no_context_takeover {
            parts.push(SERVER_NO_CONTEXT_TAKEOVER.to_string());
        }
        if let Some(bits) = self.server_max_window_bits {
            parts.push(format!("{SERVER_MAX_WINDOW_BITS}={bits}"));
        }
        parts.join("; ")
    }
}

/// Window sizes are one or two digits without a leading zero.
fn parse_window_bits(value: &str) -> Result<u8> {
    let well_formed = matches!(value.len(), 1 | 2)
        && value.bytes().all(|b| b.is_ascii_digit())
        && !value.starts_with('0');

    match value.parse::<u8>() {
        Ok(bits) if well_formed && WINDOW_BITS.contains(&bits) => Ok(bits),
        _ => Err(unexpected_parameter(SERVER_MAX_WINDOW_BITS, value)),
    }
}

fn unexpected_parameter(key: &str, value: &str) -> Error {
    let message = if value.is_empty() {
        format!("Unexpected parameter: {key}")
    } else {
        format!("Unexpected parameter: {key}={value}")
    };
    warn!(%message, "Extension negotiation rejected");
    Error::negotiation(message)
}

/// Parses a `Sec-WebSocket-Extensions` header into key/value pairs.
///
/// Only the first extension offer is considered. The extension token itself
/// becomes a key with an empty value, so the result feeds straight into
/// [`ExtensionParameters::negotiate`]:
///
/// ```
/// use socket_mux::codec::deflate::parse_extension_header;
///
/// let params = parse_extension_header("permessage-deflate; server_max_window_bits=10");
/// assert_eq!(params[0], ("permessage-deflate".to_string(), String::new()));
/// assert_eq!(params[1], ("server_max_window_bits".to_string(), "10".to_string()));
/// ```
#[must_use]
pub fn parse_extension_header(header: &str) -> Vec<(String, String)> {
    let first = header.split(',').next().unwrap_or_default();

    first
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, value)) => (
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            ),
            None => (part.to_string(), String::new()),
        })
        .collect()
}

// ============================================================================
// CompressionContext
// ============================================================================

/// Per-connection inflate/deflate state.
struct CompressionContext {
    inflater: Decompress,
    deflater: Compress,
    /// The peer ended a message with BFINAL; the inflater must restart.
    inflater_finished: bool,
}

impl CompressionContext {
    fn new(level: u32) -> Self {
        Self {
            inflater: Decompress::new(false),
            deflater: Compress::new(Compression::new(level), false),
            inflater_finished: false,
        }
    }
}

/// Inbound message currently being inflated.
#[derive(Debug, Clone, Copy)]
struct InboundMessage {
    kind: MessageKind,
    compressed: bool,
    compressed_len: usize,
    inflated_len: usize,
}

/// Where an inflate call stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inflated {
    /// Input consumed; the stream continues.
    Partial,
    /// The final DEFLATE block was reached.
    StreamEnd,
    /// Output passed the allowed size; inflation stopped early.
    Overflow,
}

// ============================================================================
// PerMessageDeflate
// ============================================================================

/// permessage-deflate transform for one connection.
///
/// Never shared between connections. Frames must be fed by a single
/// writer in arrival order.
pub struct PerMessageDeflate {
    params: ExtensionParameters,
    context: Option<CompressionContext>,
    scratch: FrameBuffer,
    limits: MessageLimits,
    inbound: Option<InboundMessage>,
    outbound_compressing: bool,
}

impl PerMessageDeflate {
    /// Creates the transform for negotiated `params`.
    ///
    /// Compression state is only allocated when the extension is enabled.
    #[must_use]
    pub fn new(params: ExtensionParameters, config: &CodecConfig) -> Self {
        let context = params
            .enabled
            .then(|| CompressionContext::new(config.compression_level));

        Self {
            params,
            context,
            scratch: FrameBuffer::with_capacity(if params.enabled {
                config.compression_buffer_capacity
            } else {
                0
            }),
            limits: MessageLimits::unlimited(),
            inbound: None,
            outbound_compressing: false,
        }
    }

    /// Stops inflating a message as soon as it outgrows `limits`.
    #[inline]
    #[must_use]
    pub fn with_limits(mut self, limits: MessageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Returns the negotiated parameters.
    #[inline]
    #[must_use]
    pub fn params(&self) -> &ExtensionParameters {
        &self.params
    }

    /// Returns `true` if frames are being transformed.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.context.is_some()
    }

    /// Inbound transform: inflates the frames of compressed messages.
    ///
    /// The returned frame has RSV1 cleared. Frames of uncompressed messages
    /// and control frames pass through.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] (1002) if RSV1 is set where it is not allowed
    /// - [`Error::Protocol`] (1003, "Bad data") if the DEFLATE stream is malformed
    /// - [`Error::Protocol`] (1009) if the inflated message outgrows its limit
    pub fn on_frame(&mut self, frame: Frame) -> Result<Frame> {
        let opcode = frame.opcode();

        if frame.rsv1() && (!opcode.is_message_start() || self.context.is_none()) {
            return Err(Error::protocol(
                close_code::PROTOCOL_ERROR,
                format!("RSV1 set on unexpected {opcode} frame"),
            ));
        }

        match opcode {
            OpCode::Text | OpCode::Binary => {
                let kind = if opcode == OpCode::Text {
                    MessageKind::Text
                } else {
                    MessageKind::Binary
                };
                self.inbound = Some(InboundMessage {
                    kind,
                    compressed: frame.rsv1(),
                    compressed_len: 0,
                    inflated_len: 0,
                });
                if frame.rsv1() {
                    self.begin_inbound_message();
                }
            }
            OpCode::Continuation => {}
            _ => return Ok(frame),
        }

        let Some(mut message) = self.inbound else {
            // Continuation without a message start; the reassembler rejects it.
            return Ok(frame);
        };

        let fin = frame.fin();
        if fin {
            self.inbound = None;
        }
        if !message.compressed {
            return Ok(frame.with_rsv1(false));
        }

        message.compressed_len += frame.payload().len();

        let inflated = if fin && message.compressed_len == 0 {
            Vec::new()
        } else {
            self.inflate(frame.payload(), fin, &message)?
        };

        message.inflated_len += inflated.len();
        if !fin {
            self.inbound = Some(message);
        }

        trace!(
            compressed = frame.payload().len(),
            inflated = inflated.len(),
            fin,
            "Inflated frame"
        );

        Ok(frame.with_payload(inflated).with_rsv1(false))
    }

    /// Outbound transform: deflates text and binary messages.
    ///
    /// RSV1 is set on the first frame of the message and the sync-flush
    /// trailer is stripped from the final frame. Control frames and frames
    /// of a disabled extension pass through.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] (1011) if the compressor fails.
    pub fn add_frame(&mut self, frame: Frame) -> Result<Frame> {
        if self.context.is_none() {
            return Ok(frame);
        }

        let first = match frame.opcode() {
            OpCode::Text | OpCode::Binary => {
                self.begin_outbound_message();
                true
            }
            OpCode::Continuation if self.outbound_compressing => false,
            _ => return Ok(frame),
        };

        let fin = frame.fin();
        let compressed = self.deflate(frame.payload(), fin)?;
        if fin {
            self.outbound_compressing = false;
        }

        trace!(
            uncompressed = frame.payload().len(),
            compressed = compressed.len(),
            fin,
            "Deflated frame"
        );

        Ok(frame.with_payload(compressed).with_rsv1(first))
    }

    fn begin_inbound_message(&mut self) {
        if let Some(context) = self.context.as_mut()
            && (self.params.server_no_context_takeover || context.inflater_finished)
        {
            context.inflater.reset(false);
            context.inflater_finished = false;
        }
    }

    fn begin_outbound_message(&mut self) {
        self.outbound_compressing = true;
        if self.params.client_no_context_takeover
            && let Some(context) = self.context.as_mut()
        {
            context.deflater.reset();
        }
    }

    fn inflate(&mut self, payload: &[u8], fin: bool, message: &InboundMessage) -> Result<Vec<u8>> {
        let Some(context) = self.context.as_mut() else {
            return Ok(payload.to_vec());
        };

        self.scratch.clear();
        if context.inflater_finished {
            // Data after the final block of a message.
            return Err(Error::bad_data());
        }

        let ceiling = self.limits.ceiling(message.kind);
        let budget = ceiling.map_or(usize::MAX, |max| max.saturating_sub(message.inflated_len));

        let mut status = inflate_into(&mut context.inflater, payload, &mut self.scratch, budget)?;
        if fin && status == Inflated::Partial {
            status = inflate_into(&mut context.inflater, &TRAILER, &mut self.scratch, budget)?;
        }

        match (status, ceiling) {
            (Inflated::Overflow, Some(max)) => {
                self.scratch.clear();
                debug!(kind = ?message.kind, max, "Inflated message over its limit");
                Err(exceeded(message.kind, max))
            }
            _ => {
                context.inflater_finished = status == Inflated::StreamEnd;
                Ok(self.scratch.take())
            }
        }
    }

    fn deflate(&mut self, payload: &[u8], fin: bool) -> Result<Vec<u8>> {
        let Some(context) = self.context.as_mut() else {
            return Ok(payload.to_vec());
        };

        self.scratch.clear();
        deflate_into(&mut context.deflater, payload, &mut self.scratch)?;

        if fin {
            if self.scratch.as_slice().ends_with(&TRAILER) {
                self.scratch.truncate_tail(TRAILER.len());
            }
            if self.scratch.is_empty() {
                // An empty message is a single empty stored block.
                self.scratch.append(&[0x00]);
            }
        }

        Ok(self.scratch.take())
    }
}

impl Drop for PerMessageDeflate {
    fn drop(&mut self) {
        if self.context.take().is_some() {
            trace!("Compression context released");
        }
    }
}

// ============================================================================
// Codec Loops
// ============================================================================

/// Feeds `input` to the inflater, appending output to `out`.
///
/// Stops with [`Inflated::Overflow`] once `out` holds more than `budget`
/// bytes.
fn inflate_into(
    inflater: &mut Decompress,
    mut input: &[u8],
    out: &mut FrameBuffer,
    budget: usize,
) -> Result<Inflated> {
    loop {
        out.reserve(CODEC_CHUNK);

        let before_in = inflater.total_in();
        let before_out = inflater.total_out();

        let status = inflater
            .decompress_vec(input, out.as_mut_vec(), FlushDecompress::Sync)
            .map_err(|e| {
                warn!(error = %e, "Malformed DEFLATE stream");
                Error::bad_data()
            })?;

        let consumed = (inflater.total_in() - before_in) as usize;
        let produced = inflater.total_out() - before_out;
        input = &input[consumed..];

        if out.len() > budget {
            return Ok(Inflated::Overflow);
        }
        if status == Status::StreamEnd {
            return Ok(Inflated::StreamEnd);
        }
        if input.is_empty() && out.len() < out.capacity() {
            return Ok(Inflated::Partial);
        }
        if consumed == 0 && produced == 0 {
            if input.is_empty() {
                return Ok(Inflated::Partial);
            }
            warn!(remaining = input.len(), "Inflater made no progress");
            return Err(Error::bad_data());
        }
    }
}

/// Compresses `input` with a sync flush, appending output to `out`.
fn deflate_into(deflater: &mut Compress, mut input: &[u8], out: &mut FrameBuffer) -> Result<()> {
    loop {
        out.reserve(CODEC_CHUNK);

        let before_in = deflater.total_in();

        deflater
            .compress_vec(input, out.as_mut_vec(), FlushCompress::Sync)
            .map_err(|e| Error::protocol(close_code::INTERNAL_ERROR, format!("Compression failed: {e}")))?;

        let consumed = (deflater.total_in() - before_in) as usize;
        input = &input[consumed..];

        if input.is_empty() && out.len() < out.capacity() {
            return Ok(());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
