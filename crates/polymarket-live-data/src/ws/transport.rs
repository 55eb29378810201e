/*
[INPUT]:  Endpoint URL and outbound frames
[OUTPUT]: Connected socket handles yielding inbound frames
[POS]:    WebSocket layer - transport seam (tungstenite in production, doubles in tests)
[UPDATE]: When changing TLS/handshake options or adding a transport
*/

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::codec::Frame;
use crate::error::TransportError;

/// One physical, message-based connection.
///
/// Dropping the value releases the socket.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Next inbound frame; `None` once the connection is gone.
    ///
    /// Must be cancel-safe: it is polled inside `select!`.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;
}

/// Opens transports to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, TransportError>;
}

/// Default connector backed by `tokio-tungstenite` (rustls, native roots)
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, _response) = connect_async(url.as_str()).await?;
        Ok(Box::new(TungsteniteTransport { stream }))
    }
}

struct TungsteniteTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.stream.send(frame.into()).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Frame(_)) => continue,
                Ok(message) => return Some(Ok(message.into())),
                Err(err) => return Some(Err(err.into())),
            }
        }
    }
}

impl From<Frame> for WsMessage {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => WsMessage::Text(text.into()),
            Frame::Binary(bytes) => WsMessage::Binary(bytes.into()),
            Frame::Ping(payload) => WsMessage::Ping(payload.into()),
            Frame::Pong(payload) => WsMessage::Pong(payload.into()),
            Frame::Close => WsMessage::Close(None),
        }
    }
}

impl From<WsMessage> for Frame {
    fn from(message: WsMessage) -> Self {
        match message {
            WsMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
            WsMessage::Binary(bytes) => Frame::Binary(bytes.to_vec()),
            WsMessage::Ping(payload) => Frame::Ping(payload.to_vec()),
            WsMessage::Pong(payload) => Frame::Pong(payload.to_vec()),
            WsMessage::Close(_) => Frame::Close,
            WsMessage::Frame(frame) => Frame::Binary(frame.into_payload().to_vec()),
        }
    }
}
