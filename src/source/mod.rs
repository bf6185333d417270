//! Transports feeding the ingestion layer.
//!
//! This module provides trait-based abstractions for the two backend
//! endpoints: a streaming connection delivering text frames ([`Connector`])
//! and the request/response history endpoint ([`HistorySource`]).
//!
//! The [`ConnectionManager`] drives a [`Connector`] through the
//! connect / reconnect state machine.

mod channel;
mod connection;
mod history;
mod websocket;

pub use channel::{ChannelConnector, LinkHandle, LinkOffers};
pub use connection::{ConnectionEvents, ConnectionManager, ConnectionPhase, DEFAULT_RECONNECT_DELAY};
pub use history::{HistoryClient, HistoryClientBuilder};
pub use websocket::WebSocketConnector;

use std::fmt::Debug;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;

use crate::error::{BootstrapError, TransportError};

/// Text frames read from one established connection.
///
/// The stream ends when the peer closes the connection; an `Err` item means
/// the connection failed and no further items will be read from it.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

/// Opens streaming connections.
///
/// Implementations only establish the link; retrying is the job of the
/// [`ConnectionManager`].
///
/// # Example
///
/// ```
/// use lathewatch::source::{Connector, WebSocketConnector};
///
/// let connector = WebSocketConnector::new("ws://127.0.0.1:8000/ws");
/// assert_eq!(connector.description(), "ws://127.0.0.1:8000/ws");
/// ```
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    /// Establish a connection and return its frames.
    async fn connect(&self) -> Result<FrameStream, TransportError>;

    /// Returns a human-readable description of the endpoint.
    ///
    /// Used in log lines.
    fn description(&self) -> &str;
}

/// Serves the historical window used to seed the series.
#[async_trait]
pub trait HistorySource: Send + Sync + Debug {
    /// Fetch raw positional rows, in whatever order the backend keeps them.
    async fn fetch_history(&self) -> Result<Vec<Value>, BootstrapError>;

    /// Returns a human-readable description of the endpoint.
    fn description(&self) -> &str;
}
