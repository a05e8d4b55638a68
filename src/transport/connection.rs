//! Per-socket event loop and its handle.
//!
//! Each open socket is driven by one tokio task that owns the socket halves,
//! the compression context and the reassembler. The task `select!`s over
//! inbound frames and commands from its [`Connection`] handles, so frame
//! processing for a connection is always single-writer.
//!
//! # Event Loop
//!
//! - Inbound frames: inflate, reassemble, report messages, answer pings
//! - Peer close: echo the close frame and finish
//! - `Send` command: fragment, deflate and write the message
//! - `Close` command: send a close frame and wait for the peer's reply
//! - Protocol error: close with the error's code and reason
//!
//! The listener's `on_close` runs exactly once, after the loop ends.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::codec::{MessageReassembler, PerMessageDeflate, Step};
use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::{Frame, Message, MessageKind, OpCode, close_code};

use super::{FrameSink, OpenedSocket};

// ============================================================================
// Constants
// ============================================================================

/// Default wait for the peer's close frame.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

/// Called once when the event loop starts, with the negotiated subprotocol.
pub type OpenCallback = Box<dyn FnOnce(&str) + Send>;

/// Called for each complete inbound message.
pub type MessageCallback = Box<dyn FnMut(Message) + Send>;

/// Called once when the connection is finished, with `(code, reason)`.
pub type CloseCallback = Box<dyn FnOnce(u16, String) + Send>;

/// Lifecycle callbacks of one connection.
pub struct Listener {
    /// Connection opened.
    pub on_open: OpenCallback,
    /// Message received.
    pub on_message: MessageCallback,
    /// Connection finished.
    pub on_close: CloseCallback,
}

impl Listener {
    /// Listener that ignores everything.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            on_open: Box::new(|_: &str| {}),
            on_message: Box::new(|_| {}),
            on_close: Box::new(|_, _| {}),
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").finish_non_exhaustive()
    }
}

/// Event-loop tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Wait for the peer's close frame after sending ours.
    pub close_timeout: Duration,
    /// Maximum payload per outbound frame; `None` sends one frame per message.
    pub fragment_size: Option<usize>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            fragment_size: None,
        }
    }
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write a message.
    Send(Message),
    /// Start the close handshake.
    Close { code: u16, reason: String },
}

// ============================================================================
// Connection
// ============================================================================

/// Handle to one socket's event loop.
///
/// Cheap to clone. All operations are non-blocking; once the loop has
/// finished they are silently ignored.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
}

impl Connection {
    /// Creates the handle and the event loop for an opened socket.
    ///
    /// The loop does nothing until [`EventLoop::spawn`] is called, so the
    /// handle can be registered before any callback fires.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        socket: OpenedSocket,
        deflate: PerMessageDeflate,
        reassembler: MessageReassembler,
        settings: ConnectionSettings,
        listener: Listener,
    ) -> (Self, EventLoop) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let event_loop = EventLoop {
            id,
            protocol: socket.protocol,
            sink: socket.sink,
            frames: socket.frames,
            commands: command_rx,
            deflate,
            reassembler,
            settings,
            listener,
        };

        (Self { id, command_tx }, event_loop)
    }

    /// Connection id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a message for sending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the event loop has finished.
    pub fn send(&self, message: Message) -> Result<()> {
        self.command_tx
            .send(ConnectionCommand::Send(message))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Starts the close handshake. Repeated calls are ignored by the loop.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let _ = self.command_tx.send(ConnectionCommand::Close {
            code,
            reason: reason.into(),
        });
    }

    /// Returns `true` once the event loop has finished.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Returns `true` if both handles drive the same event loop.
    #[inline]
    #[must_use]
    pub fn same_connection(&self, other: &Self) -> bool {
        self.command_tx.same_channel(&other.command_tx)
    }
}

// ============================================================================
// EventLoop
// ============================================================================

/// Why the loop stopped reading.
enum Exit {
    /// We (or a protocol failure) asked to close.
    Local { code: u16, reason: String },
    /// The peer sent a close frame.
    Remote { code: u16, reason: String },
    /// The socket failed or ended without a close frame.
    Abnormal { reason: String },
}

/// State owned by one connection's task.
pub struct EventLoop {
    id: ConnectionId,
    protocol: String,
    sink: Box<dyn FrameSink>,
    frames: BoxStream<'static, Result<Frame>>,
    commands: mpsc::UnboundedReceiver<ConnectionCommand>,
    deflate: PerMessageDeflate,
    reassembler: MessageReassembler,
    settings: ConnectionSettings,
    listener: Listener,
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("id", &self.id)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

impl EventLoop {
    /// Runs the loop on the tokio runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs the loop to completion.
    pub async fn run(mut self) {
        let id = self.id;
        let on_open = std::mem::replace(&mut self.listener.on_open, Box::new(|_: &str| {}));
        on_open(&self.protocol);

        debug!(%id, protocol = %self.protocol, compressed = self.deflate.is_enabled(), "Event loop started");

        let exit = loop {
            tokio::select! {
                frame = self.frames.next() => {
                    match frame {
                        Some(Ok(frame)) => {
                            if let Some(exit) = self.handle_frame(frame).await {
                                break exit;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(%id, error = %e, "Socket read failed");
                            break Exit::Abnormal { reason: e.to_string() };
                        }
                        None => {
                            debug!(%id, "Socket stream ended");
                            break Exit::Abnormal { reason: String::new() };
                        }
                    }
                }

                command = self.commands.recv() => {
                    match command {
                        Some(ConnectionCommand::Send(message)) => {
                            if let Err(e) = self.send_message(message).await {
                                if e.is_protocol_error() {
                                    break Exit::Local { code: e.close_code(), reason: protocol_reason(&e) };
                                }
                                warn!(%id, error = %e, "Socket write failed");
                                break Exit::Abnormal { reason: e.to_string() };
                            }
                        }
                        Some(ConnectionCommand::Close { code, reason }) => {
                            break Exit::Local { code, reason };
                        }
                        None => {
                            debug!(%id, "All handles dropped");
                            break Exit::Local {
                                code: close_code::GOING_AWAY,
                                reason: "Going away".to_string(),
                            };
                        }
                    }
                }
            }
        };

        let (code, reason) = match exit {
            Exit::Local { code, reason } => {
                self.close_handshake(code, &reason).await;
                (code, reason)
            }
            Exit::Remote { code, reason } => (code, reason),
            Exit::Abnormal { reason } => (close_code::ABNORMAL, reason),
        };

        // Stop accepting commands before reporting.
        self.commands.close();

        debug!(%id, code, %reason, "Event loop terminated");
        (self.listener.on_close)(code, reason);
    }

    /// Processes one inbound frame; returns the exit if the loop must stop.
    async fn handle_frame(&mut self, frame: Frame) -> Option<Exit> {
        trace!(id = %self.id, opcode = %frame.opcode(), fin = frame.fin(), len = frame.payload().len(), "Frame received");

        let step = self
            .deflate
            .on_frame(frame)
            .and_then(|frame| self.reassembler.push(frame));

        match step {
            Ok(Step::Pending | Step::Pong) => None,
            Ok(Step::Message(message)) => {
                (self.listener.on_message)(message);
                None
            }
            Ok(Step::Ping(payload)) => {
                let pong = Frame::new(OpCode::Pong, true, payload);
                match self.sink.send_frame(pong).await {
                    Ok(()) => None,
                    Err(e) => Some(Exit::Abnormal { reason: e.to_string() }),
                }
            }
            Ok(Step::Close { code, reason }) => {
                debug!(id = %self.id, code, %reason, "Peer closed");
                if let Err(e) = self.sink.close(code, &reason).await {
                    trace!(id = %self.id, error = %e, "Close echo failed");
                }
                Some(Exit::Remote { code, reason })
            }
            Err(e) => {
                warn!(id = %self.id, code = e.close_code(), error = %e, "Protocol failure");
                Some(Exit::Local {
                    code: e.close_code(),
                    reason: protocol_reason(&e),
                })
            }
        }
    }

    /// Splits, compresses and writes one message.
    async fn send_message(&mut self, message: Message) -> Result<()> {
        let opcode = match message.kind() {
            MessageKind::Text => OpCode::Text,
            MessageKind::Binary => OpCode::Binary,
        };
        let payload = message.into_bytes();
        let fragment_size = self
            .settings
            .fragment_size
            .filter(|size| *size > 0)
            .unwrap_or(usize::MAX);

        let mut chunks = payload.chunks(fragment_size).peekable();
        if chunks.peek().is_none() {
            let frame = self.deflate.add_frame(Frame::new(opcode, true, Vec::new()))?;
            return self.sink.send_frame(frame).await;
        }

        let mut first = true;
        while let Some(chunk) = chunks.next() {
            let fin = chunks.peek().is_none();
            let frame_opcode = if first { opcode } else { OpCode::Continuation };
            first = false;

            let frame = self.deflate.add_frame(Frame::new(frame_opcode, fin, chunk))?;
            self.sink.send_frame(frame).await?;
        }

        trace!(id = %self.id, len = payload.len(), "Message sent");
        Ok(())
    }

    /// Sends our close frame and waits for the peer's.
    async fn close_handshake(&mut self, code: u16, reason: &str) {
        let id = self.id;

        if let Err(e) = self.sink.close(code, reason).await {
            debug!(%id, error = %e, "Close frame not sent");
            return;
        }

        let frames = &mut self.frames;
        let wait_for_close = async {
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(frame) if frame.opcode() == OpCode::Close => return,
                    Ok(_) => continue,
                    Err(_) => return,
                }
            }
        };

        if timeout(self.settings.close_timeout, wait_for_close)
            .await
            .is_err()
        {
            let timeout_ms = self.settings.close_timeout.as_millis() as u64;
            debug!(%id, timeout_ms, "Close handshake timed out");
        }
    }
}

/// Close reason for a protocol failure.
fn protocol_reason(error: &Error) -> String {
    match error {
        Error::Protocol { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
