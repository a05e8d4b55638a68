//! Frame-level socket factory.
//!
//! Speaks RFC 6455 directly over a tokio [`TcpStream`], with rustls for
//! `wss://`. Frames cross the [`FrameSink`] boundary as they are on the
//! wire, RSV1 included, so this factory offers permessage-deflate on every
//! handshake and reports the server's `Sec-WebSocket-Extensions` answer.
//!
//! # Handshake
//!
//! ```text
//! client                                   server
//!   │ GET /path  Upgrade: websocket          │
//!   │ Sec-WebSocket-Key, -Version: 13        │
//!   │ Sec-WebSocket-Extensions: deflate ────►│
//!   │                                        │
//!   │◄──── 101  Sec-WebSocket-Accept         │
//!   │      Sec-WebSocket-Extensions          │
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{self, RootCertStore};
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tracing::{debug, trace, warn};

use crate::codec::{FrameDecoder, encode_frame};
use crate::error::{Error, Result};
use crate::protocol::Frame;

use super::{FrameSink, OpenRequest, OpenedSocket, SocketFactory};

// ============================================================================
// Constants
// ============================================================================

/// Default ceiling for a single inbound frame payload (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 << 20;

/// Extension offered on every handshake; parameters are left to the server.
const EXTENSION_OFFER: &str = "permessage-deflate";

const MAX_RESPONSE_HEAD: usize = 16 * 1024;
const READ_CHUNK: usize = 16 * 1024;

// ============================================================================
// Types
// ============================================================================

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

type BoxIo = Box<dyn Io>;

// ============================================================================
// StreamFactory
// ============================================================================

/// Socket factory that reads and writes raw frames.
///
/// Unlike [`TungsteniteFactory`](super::TungsteniteFactory), compressed
/// messages pass through untouched, so the connection's
/// [`PerMessageDeflate`](crate::codec::PerMessageDeflate) does the work.
///
/// # Example
///
/// ```no_run
/// use socket_mux::{ChannelSink, Dispatcher, StreamFactory};
///
/// # fn example() -> socket_mux::Result<()> {
/// let (sink, _events) = ChannelSink::new();
/// let dispatcher = Dispatcher::builder()
///     .factory(StreamFactory::new().with_max_frame_size(1 << 20))
///     .event_sink(sink)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StreamFactory {
    compression: bool,
    max_frame_size: usize,
    tls: Option<TlsConnector>,
}

impl fmt::Debug for StreamFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamFactory")
            .field("compression", &self.compression)
            .field("max_frame_size", &self.max_frame_size)
            .field("custom_tls", &self.tls.is_some())
            .finish()
    }
}

impl Default for StreamFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFactory {
    /// Creates a factory that offers compression and trusts the webpki roots.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            compression: true,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            tls: None,
        }
    }

    /// Stops offering permessage-deflate.
    #[inline]
    #[must_use]
    pub fn without_compression(mut self) -> Self {
        self.compression = false;
        self
    }

    /// Sets the largest inbound frame payload; bigger frames close with 1009.
    #[inline]
    #[must_use]
    pub fn with_max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    /// Uses `connector` for `wss://` instead of the default root store.
    #[inline]
    #[must_use]
    pub fn with_tls(mut self, connector: TlsConnector) -> Self {
        self.tls = Some(connector);
        self
    }

    async fn connect(&self, request: &OpenRequest) -> Result<BoxIo> {
        let endpoint = &request.endpoint;
        let host = endpoint.host().trim_start_matches('[').trim_end_matches(']');

        let tcp = TcpStream::connect((host, endpoint.port()))
            .await
            .map_err(|e| Error::connection(format!("Connection to {endpoint} failed: {e}")))?;
        tcp.set_nodelay(true)?;

        if !endpoint.is_secure() {
            return Ok(Box::new(tcp));
        }

        let connector = match &self.tls {
            Some(connector) => connector.clone(),
            None => default_tls()?,
        };
        let domain = ServerName::try_from(host.to_string())
            .map_err(|_| Error::invalid_url(endpoint.as_str(), "Invalid TLS server name"))?;

        let tls = connector
            .connect(domain, tcp)
            .await
            .map_err(|e| Error::connection(format!("TLS handshake with {endpoint} failed: {e}")))?;
        Ok(Box::new(tls))
    }
}

#[async_trait]
impl SocketFactory for StreamFactory {
    async fn open(&self, request: OpenRequest) -> Result<OpenedSocket> {
        let mut io = self.connect(&request).await?;

        let key = generate_key();
        let head = handshake_request(&request, &key, self.compression)?;
        io.write_all(head.as_bytes()).await?;
        io.flush().await?;

        let (raw, rest) = read_response_head(&mut io).await?;
        let response = HandshakeResponse::parse(&raw)?;
        response.validate(&key)?;

        let protocol = response.header("sec-websocket-protocol").unwrap_or_default();
        let mut extensions = response.header("sec-websocket-extensions").unwrap_or_default();
        if !self.compression && !extensions.is_empty() {
            warn!(%extensions, "Ignoring unsolicited extensions");
            extensions.clear();
        }

        debug!(endpoint = %request.endpoint, %protocol, %extensions, "WebSocket connected");

        let (reader, writer) = tokio::io::split(io);
        let mut decoder = FrameDecoder::new(self.max_frame_size);
        decoder.extend(&rest);

        Ok(OpenedSocket {
            protocol,
            extensions,
            sink: Box::new(StreamSink {
                writer,
                scratch: Vec::new(),
            }),
            frames: read_frames(reader, decoder),
        })
    }
}

fn default_tls() -> Result<TlsConnector> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let provider = rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::ring::default_provider()));

    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::config(format!("TLS setup failed: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

// ============================================================================
// Handshake
// ============================================================================

/// Builds the upgrade request.
fn handshake_request(request: &OpenRequest, key: &str, compression: bool) -> Result<String> {
    let endpoint = &request.endpoint;
    let mut head = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\nSec-WebSocket-Version: 13\r\n",
        endpoint.request_target(),
        endpoint.host_header(),
    );

    let optional = [
        ("Sec-WebSocket-Protocol", request.protocol.as_str()),
        ("Origin", request.origin.as_str()),
        ("Cookie", request.cookie.as_deref().unwrap_or_default()),
        ("Sec-WebSocket-Extensions", if compression { EXTENSION_OFFER } else { "" }),
    ];
    for (name, value) in optional {
        if value.is_empty() {
            continue;
        }
        if value.contains(['\r', '\n']) {
            return Err(Error::invalid_argument(format!("Invalid header value: {value}")));
        }
        head.push_str(&format!("{name}: {value}\r\n"));
    }

    head.push_str("\r\n");
    Ok(head)
}

/// Reads up to the blank line ending the response head.
///
/// Returns the head and whatever frame bytes arrived with it.
async fn read_response_head(io: &mut BoxIo) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut received = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        if let Some(end) = received.windows(4).position(|w| w == b"\r\n\r\n") {
            let rest = received.split_off(end + 4);
            return Ok((received, rest));
        }
        if received.len() > MAX_RESPONSE_HEAD {
            return Err(Error::connection("Handshake response too large"));
        }

        let n = io.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::connection("Connection closed during handshake"));
        }
        received.extend_from_slice(&chunk[..n]);
    }
}

/// Status and headers of the server's upgrade response.
#[derive(Debug)]
struct HandshakeResponse {
    status: u16,
    headers: Vec<(String, String)>,
}

impl HandshakeResponse {
    fn parse(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| Error::connection("Handshake response is not valid UTF-8"))?;
        let mut lines = text.split("\r\n").filter(|line| !line.is_empty());

        let status_line = lines.next().unwrap_or_default();
        let status = status_line
            .strip_prefix("HTTP/1.1 ")
            .and_then(|rest| rest.get(..3))
            .and_then(|code| code.parse().ok())
            .ok_or_else(|| Error::connection(format!("Malformed status line: {status_line}")))?;

        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();

        Ok(Self { status, headers })
    }

    /// Joins repeated headers with `, ` like HTTP list headers.
    fn header(&self, name: &str) -> Option<String> {
        let values: Vec<_> = self
            .headers
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect();
        (!values.is_empty()).then(|| values.join(", "))
    }

    fn validate(&self, key: &str) -> Result<()> {
        if self.status != 101 {
            return Err(Error::connection(format!(
                "Unexpected handshake status {}",
                self.status
            )));
        }

        let upgrade = self.header("upgrade").unwrap_or_default();
        let connection = self.header("connection").unwrap_or_default();
        if !upgrade.eq_ignore_ascii_case("websocket")
            || !connection.to_ascii_lowercase().contains("upgrade")
        {
            return Err(Error::connection("Server did not upgrade to WebSocket"));
        }

        let expected = derive_accept_key(key.as_bytes());
        if self.header("sec-websocket-accept").as_deref() != Some(expected.as_str()) {
            return Err(Error::connection("Invalid Sec-WebSocket-Accept"));
        }
        Ok(())
    }
}

// ============================================================================
// Reading
// ============================================================================

struct ReadState {
    reader: ReadHalf<BoxIo>,
    decoder: FrameDecoder,
    chunk: Vec<u8>,
    done: bool,
}

/// Turns the read half into a frame stream that ends after the first error.
fn read_frames(reader: ReadHalf<BoxIo>, decoder: FrameDecoder) -> BoxStream<'static, Result<Frame>> {
    let state = ReadState {
        reader,
        decoder,
        chunk: vec![0; READ_CHUNK],
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }

        loop {
            match state.decoder.decode() {
                Ok(Some(frame)) => return Some((Ok(frame), state)),
                Ok(None) => {}
                Err(e) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
            }

            match state.reader.read(&mut state.chunk).await {
                Ok(0) => {
                    trace!(buffered = state.decoder.buffered(), "Socket reached end of stream");
                    return None;
                }
                Ok(n) => state.decoder.extend(&state.chunk[..n]),
                Err(e) => {
                    state.done = true;
                    return Some((Err(e.into()), state));
                }
            }
        }
    })
    .boxed()
}

// ============================================================================
// StreamSink
// ============================================================================

/// Outbound half; masks and writes each frame as it comes.
struct StreamSink {
    writer: WriteHalf<BoxIo>,
    scratch: Vec<u8>,
}

impl StreamSink {
    async fn write(&mut self, frame: &Frame) -> Result<()> {
        self.scratch.clear();
        encode_frame(frame, rand::random(), &mut self.scratch);
        self.writer.write_all(&self.scratch).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl FrameSink for StreamSink {
    async fn send_frame(&mut self, frame: Frame) -> Result<()> {
        trace!(opcode = %frame.opcode(), fin = frame.fin(), rsv1 = frame.rsv1(), "Frame written");
        self.write(&frame).await
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.write(&Frame::close(code, reason)).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use futures_util::SinkExt;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    use crate::codec::{CodecConfig, ExtensionParameters, PerMessageDeflate};
    use crate::identifiers::ConnectionId;
    use crate::protocol::{CreateOptions, Event, Message, OpCode};
    use crate::transport::{ChannelSink, Endpoint};
    use crate::Dispatcher;

    /// `Hello` compressed with permessage-deflate (RFC 7692 section 7.2.3.1).
    const COMPRESSED_HELLO: [u8; 9] = [0xC1, 0x07, 0xF2, 0x48, 0xCD, 0xC9, 0xC9, 0x07, 0x00];

    fn request(port: u16) -> OpenRequest {
        OpenRequest {
            endpoint: Endpoint::parse(&format!("ws://127.0.0.1:{port}/feed?x=1")).unwrap(),
            protocol: "chat".into(),
            origin: "http://localhost".into(),
            cookie: Some("a=1".into()),
            timeout: Duration::from_secs(5),
        }
    }

    /// Reads an upgrade request and returns it as text.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut received = Vec::new();
        let mut chunk = [0u8; 512];
        while !received.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client hung up");
            received.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8(received).unwrap()
    }

    fn request_key(head: &str) -> String {
        head.lines()
            .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
            .unwrap()
            .trim()
            .to_string()
    }

    /// Reads one short masked client frame: (first byte, unmasked payload).
    async fn read_client_frame(stream: &mut TcpStream) -> (u8, Vec<u8>) {
        let mut header = [0u8; 6];
        stream.read_exact(&mut header).await.unwrap();
        assert_eq!(header[1] & 0x80, 0x80, "client frames are masked");
        let len = usize::from(header[1] & 0x7F);
        assert!(len < 126);

        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.unwrap();
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= header[2 + i % 4];
        }
        (header[0], payload)
    }

    /// Accepts one connection, answers with `response(key)` then sends `after`.
    async fn scripted_server<F>(response: F, after: &'static [u8]) -> (u16, tokio::task::JoinHandle<(String, TcpStream)>)
    where
        F: FnOnce(&str) -> String + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let head = read_request(&mut stream).await;
            let reply = response(&request_key(&head));
            let mut bytes = reply.into_bytes();
            bytes.extend_from_slice(after);
            stream.write_all(&bytes).await.unwrap();
            (head, stream)
        });

        (port, handle)
    }

    fn upgrade(key: &str, extensions: &str) -> String {
        let mut reply = format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\nSec-WebSocket-Protocol: chat\r\n",
            derive_accept_key(key.as_bytes())
        );
        if !extensions.is_empty() {
            reply.push_str(&format!("Sec-WebSocket-Extensions: {extensions}\r\n"));
        }
        reply.push_str("\r\n");
        reply
    }

    #[tokio::test]
    async fn test_negotiates_deflate_and_keeps_rsv1() {
        let (port, server) =
            scripted_server(|key| upgrade(key, "permessage-deflate"), &COMPRESSED_HELLO).await;

        let mut socket = StreamFactory::new().open(request(port)).await.unwrap();
        assert_eq!(socket.extensions, "permessage-deflate");
        assert_eq!(socket.protocol, "chat");

        let (head, mut stream) = server.await.unwrap();
        assert!(head.starts_with("GET /feed?x=1 HTTP/1.1\r\n"), "{head}");
        assert!(head.contains(&format!("Host: 127.0.0.1:{port}\r\n")), "{head}");
        assert!(head.contains("Sec-WebSocket-Extensions: permessage-deflate\r\n"), "{head}");
        assert!(head.contains("Sec-WebSocket-Protocol: chat\r\n"), "{head}");
        assert!(head.contains("Origin: http://localhost\r\n"), "{head}");
        assert!(head.contains("Cookie: a=1\r\n"), "{head}");

        // Inbound: the compressed frame arrives with RSV1 and inflates.
        let params = ExtensionParameters::negotiate(&[("permessage-deflate", "")]).unwrap();
        let config = CodecConfig::default();
        let mut client = PerMessageDeflate::new(params, &config);

        let frame = socket.frames.next().await.unwrap().unwrap();
        assert!(frame.rsv1());
        assert_eq!(client.on_frame(frame).unwrap().payload(), b"Hello");

        // Outbound: RSV1 reaches the wire and the server can inflate it.
        let compressed = client.add_frame(Frame::text(true, "Hello")).unwrap();
        socket.sink.send_frame(compressed).await.unwrap();

        let (first, payload) = read_client_frame(&mut stream).await;
        assert_eq!(first, 0xC1);
        let mut server_side = PerMessageDeflate::new(params, &config);
        let inflated = server_side
            .on_frame(Frame::text(true, payload).with_rsv1(true))
            .unwrap();
        assert_eq!(inflated.payload(), b"Hello");
    }

    #[tokio::test]
    async fn test_dispatcher_receives_compressed_message() {
        let (port, server) =
            scripted_server(|key| upgrade(key, "permessage-deflate"), &COMPRESSED_HELLO).await;

        let (sink, mut events) = ChannelSink::new();
        let dispatcher = Dispatcher::builder()
            .factory(StreamFactory::new())
            .event_sink(sink)
            .build()
            .unwrap();

        let id = ConnectionId::new(1);
        dispatcher.create(id, format!("ws://127.0.0.1:{port}/"), "chat", CreateOptions::default());

        assert_eq!(events.recv().await.unwrap(), (id, Event::open("chat")));
        assert_eq!(
            events.recv().await.unwrap(),
            (id, Event::Message(Message::Text("Hello".into())))
        );

        let (_, mut stream) = server.await.unwrap();
        dispatcher.close(id, 1000, "done");
        let (first, payload) = read_client_frame(&mut stream).await;
        assert_eq!(first, 0x88);
        assert_eq!(payload, [&1000u16.to_be_bytes()[..], &b"done"[..]].concat());
    }

    #[tokio::test]
    async fn test_without_compression_sends_no_offer() {
        let (port, server) = scripted_server(|key| upgrade(key, ""), &[]).await;

        let socket = StreamFactory::new()
            .without_compression()
            .open(request(port))
            .await
            .unwrap();
        assert!(socket.extensions.is_empty());

        let (head, _) = server.await.unwrap();
        assert!(!head.contains("Sec-WebSocket-Extensions"), "{head}");
    }

    #[tokio::test]
    async fn test_tungstenite_server_interop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                match message {
                    WsMessage::Text(_) | WsMessage::Binary(_) => ws.send(message).await.unwrap(),
                    // Keep reading so the queued close reply is flushed.
                    _ => {}
                }
            }
        });

        let mut request = request(port);
        request.protocol.clear();
        let mut socket = StreamFactory::new().open(request).await.unwrap();
        assert!(socket.extensions.is_empty());

        socket.sink.send_frame(Frame::text(false, "hel")).await.unwrap();
        socket.sink.send_frame(Frame::continuation(true, "lo")).await.unwrap();

        let frame = socket.frames.next().await.unwrap().unwrap();
        assert_eq!(frame.opcode(), OpCode::Text);
        assert!(frame.fin());
        assert!(!frame.rsv1());
        assert_eq!(frame.payload(), b"hello");

        socket.sink.close(1000, "done").await.unwrap();
        let reply = socket.frames.next().await.unwrap().unwrap();
        assert_eq!(reply.opcode(), OpCode::Close);
    }

    #[tokio::test]
    async fn test_rejects_wrong_accept_key() {
        let (port, _server) = scripted_server(
            |_| {
                "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
                 Sec-WebSocket-Accept: bm90LXRoZS1yaWdodC1rZXk=\r\n\r\n"
                    .to_string()
            },
            &[],
        )
        .await;

        let err = StreamFactory::new().open(request(port)).await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(err.to_string().contains("Sec-WebSocket-Accept"), "{err}");
    }

    #[tokio::test]
    async fn test_rejects_non_upgrade_response() {
        let (port, _server) = scripted_server(
            |_| "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_string(),
            &[],
        )
        .await;

        let err = StreamFactory::new().open(request(port)).await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(err.to_string().contains("404"), "{err}");
    }

    #[tokio::test]
    async fn test_masked_server_frame_ends_stream() {
        let masked: &'static [u8] = &[0x81, 0x81, 0, 0, 0, 0, b'x'];
        let (port, _server) = scripted_server(|key| upgrade(key, ""), masked).await;

        let mut socket = StreamFactory::new().open(request(port)).await.unwrap();
        let err = socket.frames.next().await.unwrap().unwrap_err();
        assert_eq!(err.close_code(), 1002);
        assert!(socket.frames.next().await.is_none());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = StreamFactory::new().open(request(port)).await.unwrap_err();
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_header_injection_rejected() {
        let mut request = request(80);
        request.origin = "http://a\r\nX-Evil: 1".into();
        assert!(handshake_request(&request, "key", true).is_err());
    }

    #[test]
    fn test_response_headers_case_insensitive() {
        let response = HandshakeResponse::parse(
            b"HTTP/1.1 101 Switching Protocols\r\nSEC-WEBSOCKET-EXTENSIONS: permessage-deflate\r\n\
              sec-websocket-extensions: x-other\r\n\r\n",
        )
        .unwrap();
        assert_eq!(response.status, 101);
        assert_eq!(
            response.header("sec-websocket-extensions").as_deref(),
            Some("permessage-deflate, x-other")
        );
    }
}
