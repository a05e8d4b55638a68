//! Socket Mux - WebSocket multiplexing engine.
//!
//! This library runs many independent WebSocket client connections on
//! behalf of a host application. The host addresses each socket by a
//! caller-chosen [`ConnectionId`] and talks to the engine in two directions:
//!
//! - **Operations in**: `create`, `send` and `close`, queued per connection
//! - **Events out**: `onopen`, `onmessage`, `onclose` and `onerror`
//!
//! # Architecture
//!
//! ```text
//! host ──► Dispatcher ──► lane(id) ──► ConnectionRegistry ──► Connection
//!                                                                 │
//!              SocketFactory ◄── FrameSink / frame stream ◄── EventLoop
//!                                                                 │
//! host ◄── EventSink ◄──────────── Listener ◄── PerMessageDeflate + MessageReassembler
//! ```
//!
//! Key design principles:
//!
//! - Operations for one id run in submission order; ids never block each other
//! - Each [`Connection`] owns one tokio event loop and one codec pipeline
//! - Protocol violations close the socket with the matching close code
//! - Exactly one close event per successfully opened connection
//!
//! # Quick Start
//!
//! ```no_run
//! use socket_mux::{ChannelSink, ConnectionId, CreateOptions, Dispatcher, Event, Result, StreamFactory};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (sink, mut events) = ChannelSink::new();
//!     let dispatcher = Dispatcher::builder()
//!         .factory(StreamFactory::new())
//!         .event_sink(sink)
//!         .build()?;
//!
//!     let id = ConnectionId::new(1);
//!     dispatcher.create(id, "ws://127.0.0.1:9001/chat", "", CreateOptions::default());
//!
//!     while let Some((id, event)) = events.recv().await {
//!         match event {
//!             Event::Open { .. } => dispatcher.send(id, "hello", false),
//!             Event::Message(message) => {
//!                 println!("{id}: {} bytes", message.len());
//!                 dispatcher.close(id, 1000, "done");
//!             }
//!             Event::Close { .. } | Event::Error { .. } => break,
//!         }
//!     }
//!
//!     dispatcher.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`codec`] | Frame buffer, permessage-deflate, message reassembly |
//! | [`dispatcher`] | Operation lanes, builder and configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Frames, messages, operations and events |
//! | [`transport`] | Connections, registry and socket factories |
//!
//! # Features
//!
//! - `native-tls`: enables `wss://` endpoints in [`TungsteniteFactory`]
//!   ([`StreamFactory`] always supports them through rustls)

// ============================================================================
// Modules
// ============================================================================

/// Frame-level codecs.
///
/// Compression and reassembly run inside each connection's event loop.
pub mod codec;

/// Operation dispatch.
///
/// Use [`Dispatcher::builder()`] to create a configured engine.
pub mod dispatcher;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for connections.
pub mod identifiers;

/// Protocol data types.
///
/// Frames, messages, host operations and host events.
pub mod protocol;

/// Socket transport layer.
///
/// Per-connection event loops, the registry and socket factories.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Codec types
pub use codec::{CodecConfig, ExtensionParameters, MessageLimits, MessageReassembler, PerMessageDeflate};

// Dispatcher types
pub use dispatcher::{DEFAULT_CONNECT_TIMEOUT, Dispatcher, DispatcherBuilder, MuxConfig};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::ConnectionId;

// Protocol types
pub use protocol::{CreateOptions, Event, Frame, Message, MessageKind, OpCode, Operation};

// Transport types
pub use transport::{
    ChannelSink, Connection, CookieProvider, EventSink, MemoryFactory, MemoryPeer, NoCookies,
    SocketFactory, StaticCookies, StreamFactory, TungsteniteFactory,
};
