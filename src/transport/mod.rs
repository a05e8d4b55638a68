//! Socket transport layer.
//!
//! A [`SocketFactory`] opens a socket and hands back a frame stream plus a
//! [`FrameSink`]; everything above that line (compression, reassembly,
//! close handshake) is handled by the per-connection event loop in
//! [`connection`]. [`StreamFactory`] is the production factory: it does its
//! own upgrade handshake and carries RSV1, so permessage-deflate works.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   Operation   ┌──────────────┐   Frame    ┌──────────────┐
//! │     Host     │──────────────►│  Dispatcher  │◄──────────►│ SocketFactory│
//! │              │◄──────────────│  + Registry  │            │ (stream,     │
//! └──────────────┘    Event      └──────────────┘            │  tungstenite,│
//!                                                            │  memory)     │
//!                                                            └──────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Per-socket event loop and handle |
//! | `endpoint` | `ws://` / `wss://` URL normalization |
//! | `memory` | In-process socket factory |
//! | `registry` | Live connections by id |
//! | `stream` | Frame-level socket factory over TCP/TLS |
//! | `tungstenite` | `tokio-tungstenite` socket factory |

// ============================================================================
// Submodules
// ============================================================================

/// Per-socket event loop.
pub mod connection;

/// Endpoint normalization.
pub mod endpoint;

/// In-process sockets.
pub mod memory;

/// Connection registry.
pub mod registry;

/// Frame-level TCP/TLS client.
pub mod stream;

/// `tokio-tungstenite` adapter.
pub mod tungstenite;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::identifiers::ConnectionId;
use crate::protocol::{Event, Frame};

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, ConnectionSettings, Listener};
pub use endpoint::Endpoint;
pub use memory::{MemoryFactory, MemoryPeer, Outbound};
pub use registry::ConnectionRegistry;
pub use stream::StreamFactory;
pub use tungstenite::TungsteniteFactory;

// ============================================================================
// Socket Traits
// ============================================================================

/// Parameters for opening one socket.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    /// Normalized target.
    pub endpoint: Endpoint,
    /// Requested subprotocol; empty for none.
    pub protocol: String,
    /// `Origin` header; empty for none.
    pub origin: String,
    /// `Cookie` header, if the provider had one for the host.
    pub cookie: Option<String>,
    /// Handshake deadline.
    pub timeout: Duration,
}

/// A socket after a successful handshake.
pub struct OpenedSocket {
    /// Subprotocol selected by the server; empty for none.
    pub protocol: String,
    /// Raw `Sec-WebSocket-Extensions` response header; empty for none.
    pub extensions: String,
    /// Outbound half.
    pub sink: Box<dyn FrameSink>,
    /// Inbound frames, in arrival order.
    pub frames: BoxStream<'static, Result<Frame>>,
}

impl std::fmt::Debug for OpenedSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedSocket")
            .field("protocol", &self.protocol)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

/// Opens sockets for the dispatcher.
#[async_trait]
pub trait SocketFactory: Send + Sync {
    /// Performs the opening handshake.
    ///
    /// # Errors
    ///
    /// Returns a connection-class error if the socket cannot be opened.
    async fn open(&self, request: OpenRequest) -> Result<OpenedSocket>;
}

/// Outbound half of an open socket.
#[async_trait]
pub trait FrameSink: Send {
    /// Writes one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is no longer writable.
    async fn send_frame(&mut self, frame: Frame) -> Result<()>;

    /// Writes a close frame.
    ///
    /// Codes that may not appear on the wire produce an empty close frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is no longer writable.
    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;
}

// ============================================================================
// Host Collaborators
// ============================================================================

/// Receives events for the host.
///
/// Called from connection tasks; implementations must not block.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    fn emit(&self, id: ConnectionId, event: Event);
}

impl<F> EventSink for F
where
    F: Fn(ConnectionId, Event) + Send + Sync,
{
    fn emit(&self, id: ConnectionId, event: Event) {
        self(id, event);
    }
}

/// Event sink backed by an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(ConnectionId, Event)>,
}

impl ChannelSink {
    /// Creates a sink and the receiver the host reads events from.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(ConnectionId, Event)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, id: ConnectionId, event: Event) {
        // Receiver gone means the host stopped listening.
        let _ = self.tx.send((id, event));
    }
}

/// Supplies `Cookie` headers for outgoing handshakes.
pub trait CookieProvider: Send + Sync {
    /// Returns the cookie header for `host`, if any.
    fn cookie_header(&self, host: &str) -> Option<String>;
}

/// Provider that never sends cookies.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCookies;

impl CookieProvider for NoCookies {
    #[inline]
    fn cookie_header(&self, _host: &str) -> Option<String> {
        None
    }
}

/// Fixed per-host cookie headers.
#[derive(Debug, Clone, Default)]
pub struct StaticCookies {
    headers: FxHashMap<String, String>,
}

impl StaticCookies {
    /// Creates an empty provider.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cookie header sent to `host`.
    #[must_use]
    pub fn with_cookie(mut self, host: impl Into<String>, header: impl Into<String>) -> Self {
        self.headers
            .insert(host.into().to_ascii_lowercase(), header.into());
        self
    }
}

impl CookieProvider for StaticCookies {
    fn cookie_header(&self, host: &str) -> Option<String> {
        self.headers.get(&host.to_ascii_lowercase()).cloned()
    }
}

// ============================================================================
// Tests
// ============================================================================
