//! WebSocket transport.
//!
//! Opens one `ws://` or `wss://` connection per [`Connector::connect`] call
//! and exposes its data frames as text:
//! - text frames are passed through
//! - binary frames are passed through when they hold UTF-8
//! - ping/pong and raw frames are dropped (pongs are answered by tungstenite)
//! - a close frame ends the stream

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info};

use super::{Connector, FrameStream};
use crate::error::TransportError;

/// Connects to a WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<FrameStream, TransportError> {
        debug!("Connecting to WebSocket: {}", self.url);

        let (ws_stream, _response) = connect_async(self.url.as_str()).await.map_err(|e| match e {
            WsError::Url(e) => TransportError::Configuration(e.to_string()),
            other => TransportError::Connection(other.to_string()),
        })?;

        info!("WebSocket connected to {}", self.url);

        let frames = ws_stream.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        debug!("Dropping non UTF-8 binary frame");
                        None
                    }
                },
                Ok(Message::Close(frame)) => {
                    info!("WebSocket closed by server: {:?}", frame);
                    None
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
                Err(e) => Some(Err(TransportError::from(e))),
            }
        });

        Ok(frames.boxed())
    }

    fn description(&self) -> &str {
        &self.url
    }
}
