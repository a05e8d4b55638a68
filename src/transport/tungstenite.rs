//! `tokio-tungstenite` socket factory.
//!
//! Opens real TCP sockets with `connect_async`. Tungstenite works at message
//! granularity, so the adapter maps each received message to one final
//! frame and buffers outbound fragments until the final one.
//!
//! Tungstenite cannot carry RSV1 frames, so this factory never offers
//! permessage-deflate and reports no extensions; use
//! [`StreamFactory`](super::StreamFactory) for compressed connections.
//! `wss://` endpoints need the crate's `native-tls` feature.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt, future};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{
    COOKIE, ORIGIN, SEC_WEBSOCKET_EXTENSIONS, SEC_WEBSOCKET_PROTOCOL,
};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{Frame, OpCode, close_code};

use super::{FrameSink, OpenRequest, OpenedSocket, SocketFactory};

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// TungsteniteFactory
// ============================================================================

/// Socket factory backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteFactory;

impl TungsteniteFactory {
    /// Creates the factory.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SocketFactory for TungsteniteFactory {
    async fn open(&self, request: OpenRequest) -> Result<OpenedSocket> {
        let mut ws_request = request.endpoint.as_str().into_client_request()?;

        let headers = ws_request.headers_mut();
        if !request.protocol.is_empty() {
            headers.insert(SEC_WEBSOCKET_PROTOCOL, header_value(&request.protocol)?);
        }
        if !request.origin.is_empty() {
            headers.insert(ORIGIN, header_value(&request.origin)?);
        }
        if let Some(cookie) = request.cookie.as_deref() {
            headers.insert(COOKIE, header_value(cookie)?);
        }

        let (stream, response) = connect_async(ws_request)
            .await
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        let protocol = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if let Some(extensions) = response.headers().get(SEC_WEBSOCKET_EXTENSIONS) {
            debug!(?extensions, "Ignoring unsolicited extensions");
        }

        debug!(endpoint = %request.endpoint, %protocol, "WebSocket connected");

        let (sink, stream) = stream.split();
        let frames = stream
            .filter_map(|message| future::ready(message_to_frame(message)))
            .boxed();

        Ok(OpenedSocket {
            protocol,
            extensions: String::new(),
            sink: Box::new(TungsteniteSink {
                sink,
                pending: None,
            }),
            frames,
        })
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::invalid_argument(format!("Invalid header value: {value}")))
}

/// Maps a received message to a final frame. Pings and pongs are handled by
/// tungstenite itself.
fn message_to_frame(message: std::result::Result<WsMessage, WsError>) -> Option<Result<Frame>> {
    let message = match message {
        Ok(message) => message,
        Err(e) => return Some(Err(e.into())),
    };

    match message {
        WsMessage::Text(text) => Some(Ok(Frame::text(true, text.as_str().as_bytes()))),
        WsMessage::Binary(bytes) => Some(Ok(Frame::binary(true, bytes.to_vec()))),
        WsMessage::Close(Some(frame)) => Some(Ok(Frame::close(
            u16::from(frame.code),
            frame.reason.as_str(),
        ))),
        WsMessage::Close(None) => Some(Ok(Frame::new(OpCode::Close, true, Vec::new()))),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => None,
    }
}

// ============================================================================
// TungsteniteSink
// ============================================================================

/// Outbound half; reassembles fragments into whole messages.
struct TungsteniteSink {
    sink: SplitSink<WsStream, WsMessage>,
    pending: Option<(OpCode, Vec<u8>)>,
}

impl TungsteniteSink {
    async fn send_message(&mut self, opcode: OpCode, payload: Vec<u8>) -> Result<()> {
        let message = match opcode {
            OpCode::Text => {
                let text = String::from_utf8(payload).map_err(|_| {
                    Error::protocol(close_code::INVALID_PAYLOAD, "Invalid UTF-8 in text message")
                })?;
                WsMessage::Text(text.into())
            }
            _ => WsMessage::Binary(payload.into()),
        };
        self.sink.send(message).await?;
        Ok(())
    }
}

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send_frame(&mut self, frame: Frame) -> Result<()> {
        if frame.rsv1() {
            return Err(Error::protocol(
                close_code::INTERNAL_ERROR,
                "Compressed frames are not supported by this transport",
            ));
        }

        let opcode = frame.opcode();
        let fin = frame.fin();

        match opcode {
            OpCode::Ping => self.sink.send(WsMessage::Ping(frame.into_payload().into())).await?,
            OpCode::Pong => self.sink.send(WsMessage::Pong(frame.into_payload().into())).await?,
            OpCode::Close => {
                let (code, reason) = crate::protocol::decode_close_payload(frame.payload())?;
                return self.close(code, &reason).await;
            }
            OpCode::Text | OpCode::Binary if fin => {
                self.send_message(opcode, frame.into_payload()).await?;
            }
            OpCode::Text | OpCode::Binary => {
                self.pending = Some((opcode, frame.into_payload()));
            }
            OpCode::Continuation => {
                let Some((kind, mut buffer)) = self.pending.take() else {
                    return Err(Error::protocol(
                        close_code::INTERNAL_ERROR,
                        "Continuation frame without a message in progress",
                    ));
                };
                buffer.extend_from_slice(frame.payload());
                if fin {
                    self.send_message(kind, buffer).await?;
                } else {
                    self.pending = Some((kind, buffer));
                }
            }
        }

        trace!(%opcode, fin, "Frame written");
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        let frame = close_code::normalize(code, reason).map(|(code, reason)| CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        });
        self.pending = None;
        self.sink.send(WsMessage::Close(frame)).await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::net::TcpListener;

    use crate::transport::Endpoint;

    /// Accepts one connection and echoes data messages until close.
    async fn echo_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                match message {
                    WsMessage::Text(_) | WsMessage::Binary(_) => {
                        ws.send(message).await.unwrap();
                    }
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
        });

        port
    }

    fn request(port: u16) -> OpenRequest {
        OpenRequest {
            endpoint: Endpoint::parse(&format!("ws://127.0.0.1:{port}/echo")).unwrap(),
            protocol: String::new(),
            origin: "http://localhost".into(),
            cookie: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_echo_fragmented_message() {
        let port = echo_server().await;
        let mut socket = TungsteniteFactory::new().open(request(port)).await.unwrap();
        assert!(socket.extensions.is_empty());

        socket.sink.send_frame(Frame::text(false, "hel")).await.unwrap();
        socket.sink.send_frame(Frame::continuation(true, "lo")).await.unwrap();

        let frame = socket.frames.next().await.unwrap().unwrap();
        assert_eq!(frame.opcode(), OpCode::Text);
        assert!(frame.fin());
        assert_eq!(frame.payload(), b"hello");

        socket.sink.close(1000, "").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_compressed_frames() {
        let port = echo_server().await;
        let mut socket = TungsteniteFactory::new().open(request(port)).await.unwrap();
        let err = socket
            .sink
            .send_frame(Frame::binary(true, vec![0]).with_rsv1(true))
            .await
            .unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = TungsteniteFactory::new().open(request(port)).await.unwrap_err();
        assert!(err.is_connection_error());
    }
}
