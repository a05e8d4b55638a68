//! In-process socket factory.
//!
//! [`MemoryFactory`] opens sockets without any network. Each successful
//! `open` produces a [`MemoryPeer`] on the factory's peer channel; the peer
//! plays the server side, injecting frames and observing what the engine
//! writes.
//!
//! # Example
//!
//! ```ignore
//! let (factory, mut peers) = MemoryFactory::new();
//! let factory = factory.with_extensions("permessage-deflate");
//!
//! // ... dispatcher.create(...) ...
//!
//! let mut peer = peers.recv().await.unwrap();
//! peer.send(Frame::text(true, "hello"));
//! ```

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::Frame;

use super::{FrameSink, OpenRequest, OpenedSocket, SocketFactory};

// ============================================================================
// Outbound
// ============================================================================

/// What the engine wrote to a memory socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A data or control frame.
    Frame(Frame),
    /// A close frame.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

// ============================================================================
// MemoryFactory
// ============================================================================

/// Socket factory connecting to in-process peers.
#[derive(Debug, Clone)]
pub struct MemoryFactory {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    protocol: Option<String>,
    extensions: String,
    refuse: bool,
}

impl MemoryFactory {
    /// Creates a factory and the receiver of its peers.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let factory = Self {
            peers,
            protocol: None,
            extensions: String::new(),
            refuse: false,
        };
        (factory, rx)
    }

    /// Answers every handshake with `protocol` instead of echoing the request.
    #[inline]
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Answers every handshake with this `Sec-WebSocket-Extensions` value.
    #[inline]
    #[must_use]
    pub fn with_extensions(mut self, extensions: impl Into<String>) -> Self {
        self.extensions = extensions.into();
        self
    }

    /// Fails every handshake.
    #[inline]
    #[must_use]
    pub fn refusing(mut self) -> Self {
        self.refuse = true;
        self
    }
}

#[async_trait]
impl SocketFactory for MemoryFactory {
    async fn open(&self, request: OpenRequest) -> Result<OpenedSocket> {
        if self.refuse {
            return Err(Error::connection(format!(
                "Connection refused: {}",
                request.endpoint
            )));
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Result<Frame>>();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let protocol = self
            .protocol
            .clone()
            .unwrap_or_else(|| request.protocol.clone());

        debug!(endpoint = %request.endpoint, %protocol, "Memory socket opened");

        let peer = MemoryPeer {
            request,
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
        };
        self.peers
            .send(peer)
            .map_err(|_| Error::connection("Memory peer receiver dropped"))?;

        let frames = stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        })
        .boxed();

        Ok(OpenedSocket {
            protocol,
            extensions: self.extensions.clone(),
            sink: Box::new(MemorySink { tx: outbound_tx }),
            frames,
        })
    }
}

// ============================================================================
// MemorySink
// ============================================================================

struct MemorySink {
    tx: mpsc::UnboundedSender<Outbound>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_frame(&mut self, frame: Frame) -> Result<()> {
        self.tx
            .send(Outbound::Frame(frame))
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.tx
            .send(Outbound::Close {
                code,
                reason: reason.to_string(),
            })
            .map_err(|_| Error::ConnectionClosed)
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

/// Server side of a memory socket.
#[derive(Debug)]
pub struct MemoryPeer {
    request: OpenRequest,
    inbound: Option<mpsc::UnboundedSender<Result<Frame>>>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl MemoryPeer {
    /// The request the socket was opened with.
    #[inline]
    #[must_use]
    pub fn request(&self) -> &OpenRequest {
        &self.request
    }

    /// Delivers a frame to the engine. Ignored after disconnect.
    pub fn send(&self, frame: Frame) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Ok(frame));
        }
    }

    /// Delivers a read error to the engine.
    pub fn fail(&self, error: Error) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Err(error));
        }
    }

    /// Ends the inbound stream without a close frame.
    pub fn disconnect(&mut self) {
        self.inbound = None;
    }

    /// Waits for the next thing the engine wrote.
    ///
    /// Returns `None` once the engine dropped the socket.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// Returns what the engine wrote without waiting.
    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.outbound.try_recv().ok()
    }
}

// ============================================================================
// Tests
// ============================================================================
