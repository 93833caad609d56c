//! TradingView streaming WebSocket client
//!
//! Thin text-message transport. Framing, heartbeats and message semantics
//! live above it in the coordinator.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{
        self, client::IntoClientRequest, http::HeaderValue, protocol::WebSocketConfig, Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, trace, warn};
use tvfeed_metadata::WebSocketEndpoint;
use url::Url;

use crate::error::TransportError;
use crate::traits::Transport;

/// WebSocket client for the chart/quote data service
pub struct TradingViewWebSocket {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl TradingViewWebSocket {
    /// Default max message size: 8 MiB (a full daily series arrives in one message)
    pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

    /// Open a connection, sending the endpoint's Origin header with the upgrade
    pub async fn connect(endpoint: &WebSocketEndpoint) -> Result<Self, TransportError> {
        let url = Url::parse(&endpoint.url)
            .map_err(|e| TransportError::Connection(format!("invalid url {}: {}", endpoint.url, e)))?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let origin = HeaderValue::from_str(&endpoint.origin)
            .map_err(|e| TransportError::Connection(format!("invalid origin: {}", e)))?;
        request.headers_mut().insert("Origin", origin);

        let max_size = endpoint.max_message_size.unwrap_or(Self::MAX_MESSAGE_SIZE);
        let config = WebSocketConfig {
            max_message_size: Some(max_size),
            max_frame_size: Some(max_size),
            ..Default::default()
        };

        info!(url = %endpoint.url, origin = %endpoint.origin, "Connecting to TradingView WebSocket");

        let (ws, response) = connect_async_with_config(request, Some(config), false).await?;

        info!(status = ?response.status(), "TradingView WebSocket connected");

        Ok(Self { ws, closed: false })
    }
}

#[async_trait]
impl Transport for TradingViewWebSocket {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        trace!(msg = %text, "Sending");
        self.ws
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn receive(&mut self) -> Result<String, TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    trace!(len = text.len(), "Received text message");
                    return Ok(text);
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => return Ok(text),
                    Err(e) => {
                        warn!(error = %e, "Dropping non-UTF-8 binary message");
                        continue;
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    trace!("Received WS ping, sending pong");
                    self.ws.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(frame = ?frame, "TradingView WebSocket closed by server");
                    return Err(TransportError::ConnectionClosed);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(TransportError::ConnectionClosed),
            }
        }
    }

    /// Idempotent; a connection the server already closed counts as closed
    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.ws.close(None).await {
            Ok(()) => {
                debug!("TradingView WebSocket closed");
                Ok(())
            }
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
