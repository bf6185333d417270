//! Error types for transports and the history endpoint.
//!
//! None of these cross the consumer boundary of [`TelemetryHub`](crate::TelemetryHub):
//! transport errors only drive the reconnect cycle and bootstrap errors end up
//! in a [`BootstrapReport`](crate::data::history::BootstrapReport).

use thiserror::Error;

/// Errors raised while opening or reading a streaming connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint URL could not be used.
    #[error("Invalid endpoint: {0}")]
    Configuration(String),

    /// Connection refused, DNS failure, handshake failure, ...
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The established stream failed while reading.
    #[error("Stream error: {0}")]
    Stream(String),

    /// The transport has no more connections to offer.
    #[error("Transport closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::Url(e) => TransportError::Configuration(e.to_string()),
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
            other => TransportError::Stream(other.to_string()),
        }
    }
}

/// Errors that can occur when fetching history for the bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// The endpoint answered but had nothing to return.
    #[error("No data available")]
    Empty,
}

impl From<reqwest::Error> for BootstrapError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BootstrapError::Timeout
        } else if err.is_connect() {
            BootstrapError::Connection(err.to_string())
        } else if err.is_decode() {
            BootstrapError::Parse(err.to_string())
        } else {
            BootstrapError::Http(err.to_string())
        }
    }
}

/// A positional history row that could not be decoded.
#[derive(Debug, Error, PartialEq)]
pub enum RowError {
    /// The row is not a JSON array.
    #[error("row is not an array")]
    NotAnArray,

    /// The row has no timestamp column or it could not be interpreted.
    #[error("row has no usable timestamp")]
    Timestamp,
}
