//! Task dispatcher.
//!
//! The [`Dispatcher`] is the engine's entry point. The host submits
//! operations addressed by connection id; each id gets its own FIFO lane
//! (a tokio task draining an unbounded queue), so operations for one
//! connection run in submission order while different connections proceed
//! concurrently.
//!
//! # Example
//!
//! ```no_run
//! use socket_mux::{ChannelSink, ConnectionId, CreateOptions, Dispatcher, StreamFactory};
//!
//! # async fn example() -> socket_mux::Result<()> {
//! let (sink, mut events) = ChannelSink::new();
//! let dispatcher = Dispatcher::builder()
//!     .factory(StreamFactory::new())
//!     .event_sink(sink)
//!     .build()?;
//!
//! let id = ConnectionId::new(1);
//! dispatcher.create(id, "ws://127.0.0.1:9001/", "", CreateOptions::default());
//! dispatcher.send(id, "hello", false);
//!
//! while let Some((id, event)) = events.recv().await {
//!     println!("{id}: {}", event.to_json()?);
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::codec::{ExtensionParameters, MessageReassembler, PerMessageDeflate, parse_extension_header};
use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::{CreateOptions, Event, Message, Operation, close_code};
use crate::transport::{
    Connection, ConnectionRegistry, CookieProvider, Endpoint, EventSink, Listener, OpenRequest,
    SocketFactory,
};

use super::builder::DispatcherBuilder;
use super::options::MuxConfig;

// ============================================================================
// Types
// ============================================================================

/// Queue feeding one connection's lane.
type Lane = mpsc::UnboundedSender<LaneItem>;

/// Work item on a lane.
#[derive(Debug)]
enum LaneItem {
    Run(Operation),
    /// Connection finished; end the lane once nothing else is queued.
    Retire,
}

/// Shared state behind every [`Dispatcher`] clone.
pub(crate) struct DispatcherInner {
    factory: Arc<dyn SocketFactory>,
    events: Arc<dyn EventSink>,
    cookies: Arc<dyn CookieProvider>,
    config: MuxConfig,
    registry: ConnectionRegistry,
    lanes: Mutex<FxHashMap<ConnectionId, Lane>>,
    /// Bumped by every reset; work from an older generation is discarded.
    generation: AtomicU64,
    shut_down: AtomicBool,
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Multiplexes host operations onto per-connection lanes.
///
/// Cheap to clone; clones share the same registry and lanes. Operations
/// must be submitted from within a tokio runtime.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("connections", &self.inner.registry.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Dispatcher - Constructor
// ============================================================================

impl Dispatcher {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub(crate) fn new(
        factory: Arc<dyn SocketFactory>,
        events: Arc<dyn EventSink>,
        cookies: Arc<dyn CookieProvider>,
        config: MuxConfig,
    ) -> Self {
        debug!(?config, "Dispatcher created");

        Self {
            inner: Arc::new(DispatcherInner {
                factory,
                events,
                cookies,
                config,
                registry: ConnectionRegistry::new(),
                lanes: Mutex::new(FxHashMap::default()),
                generation: AtomicU64::new(0),
                shut_down: AtomicBool::new(false),
            }),
        }
    }
}

// ============================================================================
// Dispatcher - Public API
// ============================================================================

impl Dispatcher {
    /// Opens a socket to `url`.
    ///
    /// Emits `onopen` on success and `onerror` on failure; a failed create
    /// leaves nothing registered under `id`.
    pub fn create(
        &self,
        id: ConnectionId,
        url: impl Into<String>,
        protocol: impl Into<String>,
        options: CreateOptions,
    ) {
        self.submit(Operation::Create {
            id,
            url: url.into(),
            protocol: protocol.into(),
            options,
        });
    }

    /// Sends a message. `data` is base64 when `is_binary_encoded` is set.
    ///
    /// Unknown ids are ignored.
    pub fn send(&self, id: ConnectionId, data: impl Into<String>, is_binary_encoded: bool) {
        self.submit(Operation::Send {
            id,
            data: data.into(),
            binary: is_binary_encoded,
        });
    }

    /// Closes a socket. A code of 0 closes normally without a reason.
    ///
    /// Unknown ids are ignored; repeated closes produce one `onclose`.
    pub fn close(&self, id: ConnectionId, code: u16, reason: impl Into<String>) {
        self.submit(Operation::Close {
            id,
            code,
            reason: reason.into(),
        });
    }

    /// Queues an operation on its connection's lane.
    pub fn submit(&self, operation: Operation) {
        if self.inner.shut_down.load(Ordering::Acquire) {
            warn!(id = %operation.id(), action = operation.action(), "Dispatcher shut down, operation dropped");
            return;
        }

        let id = operation.id();
        let mut lanes = self.inner.lanes.lock();
        let generation = self.inner.generation.load(Ordering::SeqCst);

        let item = match lanes.get(&id) {
            Some(lane) => match lane.send(LaneItem::Run(operation)) {
                Ok(()) => return,
                Err(mpsc::error::SendError(item)) => item,
            },
            None => LaneItem::Run(operation),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // Receiver is alive; this cannot fail.
        let _ = tx.send(item);
        lanes.insert(id, tx);
        drop(lanes);

        trace!(%id, "Lane opened");
        tokio::spawn(run_lane(Arc::downgrade(&self.inner), id, generation, rx));
    }

    /// Decodes and queues a host operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the action or its arguments are malformed; nothing
    /// is queued in that case.
    pub fn submit_raw(&self, action: &str, raw_args: &str) -> Result<()> {
        let operation = Operation::from_raw(action, raw_args)?;
        self.submit(operation);
        Ok(())
    }

    /// Closes every connection with 1001 and stops accepting operations.
    ///
    /// Returns the number of connections closed. Each still emits its
    /// `onclose` once its close handshake finishes. A `create` still in
    /// flight is closed as soon as its socket opens and reports nothing.
    pub fn shutdown(&self) -> usize {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return 0;
        }

        let count = self.inner.start_generation();
        info!(count, "Dispatcher shut down");
        count
    }

    /// Closes every connection with 1001 and drops all queued operations,
    /// then keeps accepting new ones.
    ///
    /// Returns the number of connections closed. Ids may be reused right
    /// away. Has no effect after [`Dispatcher::shutdown`].
    pub fn reset(&self) -> usize {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            warn!("Dispatcher shut down, reset ignored");
            return 0;
        }

        let count = self.inner.start_generation();
        info!(count, "Dispatcher reset");
        count
    }

    /// Returns `true` after [`Dispatcher::shutdown`].
    #[inline]
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Number of open connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Returns `true` if `id` has an open connection.
    #[inline]
    #[must_use]
    pub fn is_open(&self, id: ConnectionId) -> bool {
        self.inner.registry.lookup(id).is_some()
    }

    /// The configuration in use.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MuxConfig {
        &self.inner.config
    }
}

// ============================================================================
// Lanes
// ============================================================================

/// Drains one connection's queue in order.
async fn run_lane(
    inner: Weak<DispatcherInner>,
    id: ConnectionId,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<LaneItem>,
) {
    while let Some(item) = rx.recv().await {
        let Some(dispatcher) = inner.upgrade() else {
            break;
        };

        if let LaneItem::Run(operation) = item {
            if dispatcher.is_current(generation) {
                trace!(%id, action = operation.action(), "Operation started");
                dispatcher.execute(operation, generation).await;
            } else {
                debug!(%id, action = operation.action(), "Queued operation dropped by reset or shutdown");
            }
        }

        if dispatcher.retire_idle_lane(id, generation, &rx) {
            break;
        }
    }
    trace!(%id, "Lane closed");
}

impl DispatcherInner {
    /// Returns `true` while work from `generation` may still run.
    fn is_current(&self, generation: u64) -> bool {
        !self.shut_down.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Retires every lane and closes every registered connection.
    fn start_generation(&self) -> usize {
        {
            let mut lanes = self.lanes.lock();
            self.generation.fetch_add(1, Ordering::SeqCst);
            lanes.clear();
        }
        self.registry
            .close_all(close_code::GOING_AWAY, "Going away")
    }

    /// Drops the lane of an id with no connection and nothing queued.
    ///
    /// Lanes of an older generation just end; the map belongs to newer ones.
    fn retire_idle_lane(
        &self,
        id: ConnectionId,
        generation: u64,
        rx: &mpsc::UnboundedReceiver<LaneItem>,
    ) -> bool {
        let mut lanes = self.lanes.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            return true;
        }
        if rx.is_empty() && self.registry.lookup(id).is_none() {
            lanes.remove(&id);
            return true;
        }
        false
    }

    /// Asks the lane of a finished connection to end after its queued work.
    fn retire_lane(&self, id: ConnectionId) {
        if let Some(lane) = self.lanes.lock().get(&id) {
            let _ = lane.send(LaneItem::Retire);
            trace!(%id, "Lane retiring");
        }
    }
}

// ============================================================================
// Operations
// ============================================================================

impl DispatcherInner {
    async fn execute(self: &Arc<Self>, operation: Operation, generation: u64) {
        match operation {
            Operation::Create {
                id,
                url,
                protocol,
                options,
            } => {
                if self.registry.lookup(id).is_some() {
                    warn!(%id, "Connection id already in use");
                    self.events
                        .emit(id, Event::error(format!("Connection {id} already exists")));
                    return;
                }
                if let Err(e) = self.open(id, &url, protocol, &options, generation).await {
                    warn!(%id, %url, error = %e, "Create failed");
                    self.events.emit(id, Event::error(e.to_string()));
                }
            }
            Operation::Send { id, data, binary } => self.send(id, data, binary),
            Operation::Close { id, code, reason } => self.close(id, code, reason),
        }
    }

    async fn open(
        self: &Arc<Self>,
        id: ConnectionId,
        url: &str,
        protocol: String,
        options: &CreateOptions,
        generation: u64,
    ) -> Result<()> {
        let endpoint = Endpoint::parse(url)?;
        let connect_timeout = options
            .max_connect_time
            .map_or(self.config.connect_timeout, Duration::from_millis);

        let request = OpenRequest {
            cookie: self.cookies.cookie_header(endpoint.host()),
            endpoint,
            protocol,
            origin: options.origin.clone(),
            timeout: connect_timeout,
        };

        let timeout_ms = connect_timeout.as_millis() as u64;
        debug!(%id, endpoint = %request.endpoint, timeout_ms, "Opening socket");

        let mut socket = timeout(connect_timeout, self.factory.open(request))
            .await
            .map_err(|_| Error::connection_timeout(timeout_ms))??;

        if !self.is_current(generation) {
            debug!(%id, "Socket opened after reset or shutdown, closing it");
            if let Err(e) = socket.sink.close(close_code::GOING_AWAY, "Going away").await {
                trace!(%id, error = %e, "Close of discarded socket failed");
            }
            return Ok(());
        }

        let params = negotiate(id, &socket.extensions);
        let codec = self.config.codec_config();

        let (connection, event_loop) = Connection::new(
            id,
            socket,
            PerMessageDeflate::new(params, &codec).with_limits(options.limits()),
            MessageReassembler::new(options.limits(), &codec),
            self.config.connection_settings(),
            self.listener(id),
        );

        self.registry.insert(connection.clone());
        event_loop.spawn();

        // A reset or shutdown may have drained the registry just before the insert.
        if !self.is_current(generation) {
            debug!(%id, "Reset or shutdown raced the insert, closing");
            connection.close(close_code::GOING_AWAY, "Going away");
            return Ok(());
        }

        info!(%id, %url, compressed = params.enabled, "Connection opened");
        Ok(())
    }

    fn send(&self, id: ConnectionId, data: String, binary: bool) {
        let Some(connection) = self.registry.lookup(id) else {
            trace!(%id, "Send to unknown connection ignored");
            return;
        };

        let message = if binary {
            match BASE64.decode(data.as_bytes()) {
                Ok(bytes) => Message::Binary(bytes),
                Err(e) => {
                    warn!(%id, error = %e, "Invalid base64 payload");
                    self.events.emit(id, Event::error(Error::from(e).to_string()));
                    return;
                }
            }
        } else {
            Message::Text(data)
        };

        if connection.send(message).is_err() {
            debug!(%id, "Send after close dropped");
        }
    }

    fn close(&self, id: ConnectionId, code: u16, reason: String) {
        // Unregistered now so the id can be created again during the handshake.
        let Some(connection) = self.registry.remove(id) else {
            trace!(%id, "Close of unknown connection ignored");
            return;
        };

        let (code, reason) = if code > 0 {
            (code, reason)
        } else {
            (close_code::NORMAL, String::new())
        };

        debug!(%id, code, %reason, "Closing connection");
        connection.close(code, reason);
    }

    /// Routes one connection's lifecycle to the event sink.
    fn listener(self: &Arc<Self>, id: ConnectionId) -> Listener {
        let open_events = Arc::clone(&self.events);
        let message_events = Arc::clone(&self.events);
        let close_events = Arc::clone(&self.events);
        let inner = Arc::downgrade(self);

        Listener {
            on_open: Box::new(move |protocol: &str| open_events.emit(id, Event::open(protocol))),
            on_message: Box::new(move |message| message_events.emit(id, Event::Message(message))),
            on_close: Box::new(move |code, reason| {
                if let Some(inner) = inner.upgrade() {
                    inner.registry.remove_if_closed(id);
                    inner.retire_lane(id);
                }
                info!(%id, code, %reason, "Connection closed");
                close_events.emit(id, Event::close(code, reason));
            }),
        }
    }
}

/// Accepts the server's extension response; failures fall back to no
/// compression.
fn negotiate(id: ConnectionId, extensions: &str) -> ExtensionParameters {
    if extensions.trim().is_empty() {
        return ExtensionParameters::disabled();
    }

    match ExtensionParameters::negotiate(&parse_extension_header(extensions)) {
        Ok(params) => {
            debug!(%id, accepted = %params.to_header_value(), "Extensions negotiated");
            params
        }
        Err(e) => {
            warn!(%id, error = %e, "Extension negotiation failed, continuing uncompressed");
            ExtensionParameters::disabled()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::protocol::Frame;
    use crate::transport::{ChannelSink, MemoryFactory, MemoryPeer, OpenedSocket, Outbound, StaticCookies};

    type Events = UnboundedReceiver<(ConnectionId, Event)>;
    type Peers = UnboundedReceiver<MemoryPeer>;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn config() -> MuxConfig {
        MuxConfig::new().with_close_timeout(Duration::from_millis(50))
    }

    fn setup(factory: MemoryFactory, peers: Peers) -> (Dispatcher, Events, Peers) {
        init_tracing();
        let (sink, events) = ChannelSink::new();
        let dispatcher = Dispatcher::builder()
            .factory(factory)
            .event_sink(sink)
            .config(config())
            .build()
            .unwrap();
        (dispatcher, events, peers)
    }

    fn memory() -> (Dispatcher, Events, Peers) {
        let (factory, peers) = MemoryFactory::new();
        setup(factory, peers)
    }

    async fn next_event(events: &mut Events) -> (ConnectionId, Event) {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event timeout")
            .expect("event channel closed")
    }

    async fn assert_no_event(events: &mut Events) {
        let result = timeout(Duration::from_millis(150), events.recv()).await;
        assert!(result.is_err(), "unexpected event: {result:?}");
    }

    async fn open(dispatcher: &Dispatcher, events: &mut Events, peers: &mut Peers, id: u32) -> MemoryPeer {
        let id = ConnectionId::new(id);
        dispatcher.create(id, "ws://memory.test/socket", "", CreateOptions::default());
        assert_eq!(next_event(events).await, (id, Event::open("")));
        peers.recv().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_receive_fragmented_message() {
        let (dispatcher, mut events, mut peers) = memory();
        let peer = open(&dispatcher, &mut events, &mut peers, 1).await;
        assert!(dispatcher.is_open(ConnectionId::new(1)));

        peer.send(Frame::text(false, "hel"));
        peer.send(Frame::continuation(true, "lo"));

        assert_eq!(
            next_event(&mut events).await,
            (ConnectionId::new(1), Event::Message(Message::Text("hello".into())))
        );
    }

    #[tokio::test]
    async fn test_double_close_emits_one_close_event() {
        let (dispatcher, mut events, mut peers) = memory();
        let mut peer = open(&dispatcher, &mut events, &mut peers, 1).await;
        let id = ConnectionId::new(1);

        dispatcher.close(id, 1000, "bye");
        dispatcher.close(id, 1000, "bye");

        assert_eq!(
            peer.recv().await,
            Some(Outbound::Close {
                code: 1000,
                reason: "bye".into()
            })
        );
        peer.send(Frame::close(1000, "bye"));

        let (_, event) = next_event(&mut events).await;
        assert_eq!(event, Event::close(1000, "bye"));
        assert!(matches!(event, Event::Close { was_clean: true, .. }));

        assert_no_event(&mut events).await;
        assert!(peer.try_recv().is_none());
        assert_eq!(dispatcher.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_close_with_zero_code() {
        let (dispatcher, mut events, mut peers) = memory();
        let mut peer = open(&dispatcher, &mut events, &mut peers, 2).await;

        dispatcher.close(ConnectionId::new(2), 0, "ignored");
        assert_eq!(
            peer.recv().await,
            Some(Outbound::Close {
                code: 1000,
                reason: String::new()
            })
        );
        assert_eq!(next_event(&mut events).await.1, Event::close(1000, ""));
    }

    #[tokio::test]
    async fn test_unknown_id_is_silent() {
        let (dispatcher, mut events, _peers) = memory();
        dispatcher.send(ConnectionId::new(99), "x", false);
        dispatcher.close(ConnectionId::new(99), 1000, "");
        assert_no_event(&mut events).await;
    }

    #[tokio::test]
    async fn test_send_text_and_binary() {
        let (dispatcher, mut events, mut peers) = memory();
        let mut peer = open(&dispatcher, &mut events, &mut peers, 3).await;
        let id = ConnectionId::new(3);

        dispatcher.send(id, "plain", false);
        dispatcher.send(id, "AAEC", true);

        assert_eq!(peer.recv().await, Some(Outbound::Frame(Frame::text(true, "plain"))));
        assert_eq!(
            peer.recv().await,
            Some(Outbound::Frame(Frame::binary(true, vec![0, 1, 2])))
        );
    }

    #[tokio::test]
    async fn test_invalid_base64_emits_error() {
        let (dispatcher, mut events, mut peers) = memory();
        let mut peer = open(&dispatcher, &mut events, &mut peers, 4).await;

        dispatcher.send(ConnectionId::new(4), "***", true);
        let (id, event) = next_event(&mut events).await;
        assert_eq!(id, ConnectionId::new(4));
        assert!(matches!(event, Event::Error { .. }));
        assert!(peer.try_recv().is_none());
        assert!(dispatcher.is_open(id));
    }

    #[tokio::test]
    async fn test_sends_keep_submission_order() {
        let (dispatcher, mut events, mut peers) = memory();
        let mut peer = open(&dispatcher, &mut events, &mut peers, 5).await;

        for i in 0..50 {
            dispatcher.send(ConnectionId::new(5), i.to_string(), false);
        }
        for i in 0..50 {
            assert_eq!(
                peer.recv().await,
                Some(Outbound::Frame(Frame::text(true, i.to_string())))
            );
        }
    }

    #[tokio::test]
    async fn test_create_then_send_in_same_lane() {
        let (dispatcher, mut events, mut peers) = memory();
        let id = ConnectionId::new(6);
        dispatcher.create(id, "ws://memory.test/", "", CreateOptions::default());
        dispatcher.send(id, "first", false);

        let mut peer = peers.recv().await.unwrap();
        assert_eq!(next_event(&mut events).await.1, Event::open(""));
        assert_eq!(peer.recv().await, Some(Outbound::Frame(Frame::text(true, "first"))));
    }

    #[tokio::test]
    async fn test_refused_create_emits_error() {
        let (factory, peers) = MemoryFactory::new();
        let (dispatcher, mut events, _peers) = setup(factory.refusing(), peers);

        dispatcher.create(ConnectionId::new(7), "ws://memory.test/", "", CreateOptions::default());
        let (id, event) = next_event(&mut events).await;
        assert_eq!(id, ConnectionId::new(7));
        assert!(matches!(event, Event::Error { .. }));
        assert_eq!(dispatcher.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_url_emits_error() {
        let (dispatcher, mut events, _peers) = memory();
        dispatcher.create(ConnectionId::new(8), "http://memory.test/", "", CreateOptions::default());
        assert!(matches!(next_event(&mut events).await.1, Event::Error { .. }));
        assert!(!dispatcher.is_open(ConnectionId::new(8)));
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let (dispatcher, mut events, mut peers) = memory();
        let _peer = open(&dispatcher, &mut events, &mut peers, 9).await;

        dispatcher.create(ConnectionId::new(9), "ws://memory.test/", "", CreateOptions::default());
        assert!(matches!(next_event(&mut events).await.1, Event::Error { .. }));
        assert_eq!(dispatcher.connection_count(), 1);
    }

    struct StalledFactory;

    #[async_trait]
    impl SocketFactory for StalledFactory {
        async fn open(&self, _request: OpenRequest) -> Result<OpenedSocket> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        init_tracing();
        let (sink, mut events) = ChannelSink::new();
        let dispatcher = Dispatcher::builder()
            .factory(StalledFactory)
            .event_sink(sink)
            .build()
            .unwrap();

        let options = CreateOptions::default().with_max_connect_time(30);
        dispatcher.create(ConnectionId::new(10), "ws://stalled.test/", "", options);

        let (_, event) = next_event(&mut events).await;
        match event {
            Event::Error { message } => assert!(message.contains("timeout"), "{message}"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_carries_protocol_origin_and_cookie() {
        init_tracing();
        let (factory, mut peers) = MemoryFactory::new();
        let (sink, mut events) = ChannelSink::new();
        let dispatcher = Dispatcher::builder()
            .factory(factory)
            .event_sink(sink)
            .cookies(StaticCookies::new().with_cookie("memory.test", "session=abc"))
            .build()
            .unwrap();

        let options = CreateOptions::default().with_origin("https://app.test");
        dispatcher.create(ConnectionId::new(11), "ws://memory.test/x#frag", "chat", options);

        assert_eq!(next_event(&mut events).await.1, Event::open("chat"));
        let peer = peers.recv().await.unwrap();
        let request = peer.request();
        assert_eq!(request.endpoint.as_str(), "ws://memory.test/x");
        assert_eq!(request.origin, "https://app.test");
        assert_eq!(request.cookie.as_deref(), Some("session=abc"));
    }

    #[tokio::test]
    async fn test_negotiated_compression() {
        let (factory, peers) = MemoryFactory::new();
        let factory = factory.with_extensions("permessage-deflate; client_no_context_takeover");
        let (dispatcher, mut events, mut peers) = setup(factory, peers);
        let mut peer = open(&dispatcher, &mut events, &mut peers, 12).await;

        dispatcher.send(ConnectionId::new(12), "compressed payload", false);
        let Some(Outbound::Frame(frame)) = peer.recv().await else {
            panic!("expected frame");
        };
        assert!(frame.rsv1());

        // RFC 7692 "Hello" sample.
        peer.send(Frame::text(true, vec![0xf2, 0x48, 0xcd, 0xc9, 0xc9, 0x07, 0x00]).with_rsv1(true));
        assert_eq!(
            next_event(&mut events).await.1,
            Event::Message(Message::Text("Hello".into()))
        );
    }

    #[tokio::test]
    async fn test_failed_negotiation_continues_uncompressed() {
        let (factory, peers) = MemoryFactory::new();
        let factory = factory.with_extensions("permessage-deflate; server_max_window_bits=20");
        let (dispatcher, mut events, mut peers) = setup(factory, peers);
        let mut peer = open(&dispatcher, &mut events, &mut peers, 13).await;

        dispatcher.send(ConnectionId::new(13), "plain", false);
        assert_eq!(peer.recv().await, Some(Outbound::Frame(Frame::text(true, "plain"))));
    }

    #[tokio::test]
    async fn test_message_too_big_closes_with_1009() {
        let (dispatcher, mut events, mut peers) = memory();
        let id = ConnectionId::new(14);
        let options = CreateOptions::default().with_message_limits(Some(4), None);
        dispatcher.create(id, "ws://memory.test/", "", options);
        assert_eq!(next_event(&mut events).await.1, Event::open(""));
        let mut peer = peers.recv().await.unwrap();

        peer.send(Frame::text(true, "too long"));
        assert_eq!(
            peer.recv().await,
            Some(Outbound::Close {
                code: 1009,
                reason: "Text message size > 4 bytes".into()
            })
        );
        assert_eq!(
            next_event(&mut events).await.1,
            Event::close(1009, "Text message size > 4 bytes")
        );
    }

    #[tokio::test]
    async fn test_peer_disconnect_reports_abnormal_close() {
        let (dispatcher, mut events, mut peers) = memory();
        let mut peer = open(&dispatcher, &mut events, &mut peers, 15).await;

        peer.disconnect();
        let (_, event) = next_event(&mut events).await;
        assert!(matches!(event, Event::Close { code: 1006, was_clean: false, .. }));
        assert_eq!(dispatcher.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let (dispatcher, mut events, mut peers) = memory();
        let mut a = open(&dispatcher, &mut events, &mut peers, 16).await;
        let mut b = open(&dispatcher, &mut events, &mut peers, 17).await;

        assert_eq!(dispatcher.shutdown(), 2);
        assert_eq!(dispatcher.shutdown(), 0);
        assert!(dispatcher.is_shut_down());

        let going_away = Some(Outbound::Close {
            code: 1001,
            reason: "Going away".into(),
        });
        assert_eq!(a.recv().await, going_away);
        assert_eq!(b.recv().await, going_away);

        for _ in 0..2 {
            let (_, event) = next_event(&mut events).await;
            assert_eq!(event, Event::close(1001, "Going away"));
        }

        dispatcher.create(ConnectionId::new(18), "ws://memory.test/", "", CreateOptions::default());
        assert_no_event(&mut events).await;
    }

    #[tokio::test]
    async fn test_submit_raw() {
        let (dispatcher, mut events, mut peers) = memory();
        dispatcher
            .submit_raw("create", r#"[20, "ws://memory.test/", "", {"maxConnectTime": 1000}]"#)
            .unwrap();
        assert_eq!(next_event(&mut events).await, (ConnectionId::new(20), Event::open("")));

        let mut peer = peers.recv().await.unwrap();
        dispatcher.submit_raw("send", r#"[20, "hi", false]"#).unwrap();
        assert_eq!(peer.recv().await, Some(Outbound::Frame(Frame::text(true, "hi"))));

        assert!(dispatcher.submit_raw("explode", "[20]").is_err());
    }

    /// Opens memory sockets after a delay.
    struct SlowFactory {
        inner: MemoryFactory,
        delay: Duration,
    }

    #[async_trait]
    impl SocketFactory for SlowFactory {
        async fn open(&self, request: OpenRequest) -> Result<OpenedSocket> {
            tokio::time::sleep(self.delay).await;
            self.inner.open(request).await
        }
    }

    fn slow() -> (Dispatcher, Events, Peers) {
        init_tracing();
        let (factory, peers) = MemoryFactory::new();
        let (sink, events) = ChannelSink::new();
        let dispatcher = Dispatcher::builder()
            .factory(SlowFactory {
                inner: factory,
                delay: Duration::from_millis(100),
            })
            .event_sink(sink)
            .config(config())
            .build()
            .unwrap();
        (dispatcher, events, peers)
    }

    fn going_away() -> Option<Outbound> {
        Some(Outbound::Close {
            code: 1001,
            reason: "Going away".into(),
        })
    }

    #[tokio::test]
    async fn test_shutdown_closes_create_in_flight() {
        let (dispatcher, mut events, mut peers) = slow();
        let id = ConnectionId::new(1);

        dispatcher.create(id, "ws://memory.test/", "", CreateOptions::default());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(dispatcher.shutdown(), 0);

        let mut peer = timeout(Duration::from_secs(2), peers.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(peer.recv().await, going_away());
        assert_eq!(peer.recv().await, None);

        assert_no_event(&mut events).await;
        assert!(!dispatcher.is_open(id));
        assert_eq!(dispatcher.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_reset_closes_connections_and_accepts_new_work() {
        let (dispatcher, mut events, mut peers) = memory();
        let id = ConnectionId::new(30);
        let mut old = open(&dispatcher, &mut events, &mut peers, 30).await;

        assert_eq!(dispatcher.reset(), 1);
        assert!(!dispatcher.is_shut_down());
        assert!(!dispatcher.is_open(id));

        assert_eq!(old.recv().await, going_away());
        old.send(Frame::close(1001, "Going away"));
        assert_eq!(next_event(&mut events).await, (id, Event::close(1001, "Going away")));

        let mut new = open(&dispatcher, &mut events, &mut peers, 30).await;
        dispatcher.send(id, "again", false);
        assert_eq!(new.recv().await, Some(Outbound::Frame(Frame::text(true, "again"))));
    }

    #[tokio::test]
    async fn test_reset_discards_create_in_flight() {
        let (dispatcher, mut events, mut peers) = slow();
        let id = ConnectionId::new(32);

        dispatcher.create(id, "ws://memory.test/", "", CreateOptions::default());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(dispatcher.reset(), 0);

        let mut stale = peers.recv().await.unwrap();
        assert_eq!(stale.recv().await, going_away());
        assert_no_event(&mut events).await;
        assert!(!dispatcher.is_open(id));

        dispatcher.create(id, "ws://memory.test/", "", CreateOptions::default());
        assert_eq!(next_event(&mut events).await, (id, Event::open("")));
        assert!(dispatcher.is_open(id));
    }

    #[tokio::test]
    async fn test_reset_after_shutdown_is_ignored() {
        let (dispatcher, mut events, mut peers) = memory();
        let _peer = open(&dispatcher, &mut events, &mut peers, 33).await;
        assert_eq!(dispatcher.shutdown(), 1);
        assert_eq!(dispatcher.reset(), 0);
        assert!(dispatcher.is_shut_down());
    }

    #[tokio::test]
    async fn test_create_reuses_id_while_closing() {
        let (dispatcher, mut events, mut peers) = memory();
        let id = ConnectionId::new(31);
        let mut old = open(&dispatcher, &mut events, &mut peers, 31).await;

        dispatcher.close(id, 1000, "bye");
        dispatcher.create(id, "ws://memory.test/", "", CreateOptions::default());
        assert_eq!(next_event(&mut events).await, (id, Event::open("")));
        let mut new = peers.recv().await.unwrap();

        assert_eq!(
            old.recv().await,
            Some(Outbound::Close {
                code: 1000,
                reason: "bye".into()
            })
        );
        old.send(Frame::close(1000, "bye"));
        assert_eq!(next_event(&mut events).await, (id, Event::close(1000, "bye")));

        // The old connection's close leaves the new one registered.
        assert!(dispatcher.is_open(id));
        dispatcher.send(id, "fresh", false);
        assert_eq!(new.recv().await, Some(Outbound::Frame(Frame::text(true, "fresh"))));
    }

    #[tokio::test]
    async fn test_connections_are_independent() {
        let (dispatcher, mut events, mut peers) = memory();
        let a = open(&dispatcher, &mut events, &mut peers, 21).await;
        let b = open(&dispatcher, &mut events, &mut peers, 22).await;

        a.send(Frame::text(false, "a1"));
        b.send(Frame::text(true, "b"));
        a.send(Frame::continuation(true, "a2"));

        let mut received = vec![next_event(&mut events).await, next_event(&mut events).await];
        received.sort_by_key(|(id, _)| *id);
        assert_eq!(
            received,
            vec![
                (ConnectionId::new(21), Event::Message(Message::from("a1a2"))),
                (ConnectionId::new(22), Event::Message(Message::from("b"))),
            ]
        );
    }
}
